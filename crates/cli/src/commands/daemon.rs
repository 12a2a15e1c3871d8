//! `vigil daemon`: unattended runtime.
//!
//! Each line on stdin is ingested as an external event. Replies from
//! scheduler-started turns are printed to stdout.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use vigil_config::AppConfig;
use vigil_core::event::Event;

use super::runtime::{Runtime, require_api_key};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    require_api_key(&config)?;

    if !config.scheduler.enabled {
        warn!("Scheduler is disabled in config; the daemon only runs scheduled turns");
        return Err("scheduler.enabled = false, nothing to run".into());
    }

    let mut runtime = Runtime::from_config(&config)?;
    runtime.scheduler = runtime
        .scheduler
        .with_reply_sink(Arc::new(|reply: &str| println!("{reply}\n")));

    println!("vigil daemon");
    println!("  Provider:   {}", config.default_provider);
    println!("  Model:      {}", config.default_model);
    println!("  Workspace:  {}", config.workspace.root.display());
    println!("  Tick:       {} ms", config.scheduler.tick_interval_ms);
    println!();

    let scheduler = runtime.start_scheduler();
    let events = runtime.agent.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if !line.trim().is_empty() => {
                    info!("External event received");
                    events.push(Event::new(line.trim()));
                }
                Some(_) => {}
                None => {
                    info!("stdin closed, running on scheduled tasks only");
                    stdin_open = false;
                }
            },
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    scheduler.abort();
    Ok(())
}
