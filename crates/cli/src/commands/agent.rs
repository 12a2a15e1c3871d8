//! `vigil agent`: interactive or single-message chat mode.
//!
//! The scheduler keeps running in the background, so the agent can wake
//! itself up between messages.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use vigil_agent::{Agent, AgentStreamEvent};
use vigil_config::AppConfig;
use vigil_core::error::Error;
use vigil_core::message::Message;

use super::runtime::{Runtime, require_api_key};

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    require_api_key(&config)?;

    let mut runtime = Runtime::from_config(&config)?;

    if let Some(msg) = message {
        // Single message mode: no background turns.
        chat_turn(&runtime.agent, &msg).await?;
        return Ok(());
    }

    runtime.scheduler = runtime.scheduler.with_reply_sink(Arc::new(|reply: &str| {
        println!("\n  Assistant (scheduled) > {reply}");
    }));
    let scheduler = config.scheduler.enabled.then(|| runtime.start_scheduler());

    println!();
    println!("  vigil agent, interactive mode");
    println!();
    println!("  Provider:   {}", config.default_provider);
    println!("  Model:      {}", config.default_model);
    println!("  Workspace:  {}", config.workspace.root.display());
    println!("  Tools:      {}", runtime.agent.tools().names().join(", "));
    println!("  Scheduler:  {}", if scheduler.is_some() { "running" } else { "disabled" });
    println!();
    println!("  Type your message and press Enter. Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        if let Err(e) = chat_turn(&runtime.agent, line).await {
            eprintln!("  [Error] {e}");
        }
        println!();
    }

    if let Some(handle) = scheduler {
        handle.abort();
    }
    println!("\n  Goodbye!\n");
    Ok(())
}

/// Stream one user turn to stdout, waiting for a scheduled turn to finish
/// first if one is running.
async fn chat_turn(agent: &Agent, input: &str) -> Result<(), Error> {
    loop {
        match stream_turn(agent, Message::user(input)).await {
            Err(Error::TurnInProgress) => tokio::time::sleep(Duration::from_millis(200)).await,
            other => return other,
        }
    }
}

async fn stream_turn(agent: &Agent, message: Message) -> Result<(), Error> {
    let mut stream = std::pin::pin!(agent.stream(Some(message)));
    let mut at_line_start = true;

    while let Some(event) = stream.next().await {
        match event? {
            AgentStreamEvent::Chunk { content } => {
                if at_line_start {
                    print!("  Assistant > ");
                    at_line_start = false;
                }
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
            AgentStreamEvent::ToolCall { name, input, .. } => {
                if !at_line_start {
                    println!();
                    at_line_start = true;
                }
                eprintln!("  [tool] {name} {input}");
            }
            AgentStreamEvent::ToolResult { name, response, .. } => {
                eprintln!("  [tool] {name} -> {}", first_line(&response));
            }
            AgentStreamEvent::Done { .. } => {
                if !at_line_start {
                    println!();
                }
            }
        }
    }

    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
