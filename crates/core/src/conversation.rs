//! The bounded conversation history.
//!
//! A [`Conversation`] is the literal model context: insertion order is
//! significant, and every append that pushes the history past `max_history`
//! trims the oldest non-system messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::message::{Message, MessageContent};

/// Default number of messages kept in context.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// An ordered, bounded sequence of messages.
///
/// Invariants:
/// - at most one SYSTEM message exists;
/// - after trimming, the SYSTEM message (if any) is the first element;
/// - `messages.len() <= max_history` after every append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: String,

    messages: Vec<Message>,

    max_history: usize,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation seeded with a single SYSTEM message.
    pub fn new(system_prompt: impl Into<String>, max_history: usize) -> Self {
        let mut conversation = Self::empty(max_history);
        conversation.messages.push(Message::system(system_prompt));
        conversation
    }

    /// Create a conversation with no messages at all.
    ///
    /// Providers refuse to stream such a conversation until a system prompt is
    /// set with [`replace_system`](Self::replace_system).
    pub fn empty(max_history: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            max_history: max_history.max(1),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Borrow the current messages in context order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// An owned copy of the current messages, as sent to the provider.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// The SYSTEM message, if present.
    pub fn system(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_system())
    }

    /// Append a message, trimming if the history grows past `max_history`.
    ///
    /// Appending a SYSTEM message when one already exists replaces the existing
    /// one's content in place instead of adding a second one. A first SYSTEM
    /// message goes to the front.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();

        if message.is_system() {
            match self.messages.iter_mut().find(|m| m.is_system()) {
                Some(existing) => {
                    existing.content = message.content;
                    existing.timestamp = message.timestamp;
                    return;
                }
                None => {
                    self.messages.insert(0, message);
                    if self.messages.len() > self.max_history {
                        self.trim();
                    }
                    return;
                }
            }
        }

        self.messages.push(message);
        if self.messages.len() > self.max_history {
            self.trim();
        }
    }

    /// Replace the SYSTEM message's content wholesale.
    ///
    /// If the conversation has no SYSTEM message, one is inserted at the front.
    pub fn replace_system(&mut self, content: impl Into<String>) {
        self.updated_at = Utc::now();
        let content = content.into();

        match self.messages.iter_mut().find(|m| m.is_system()) {
            Some(existing) => {
                existing.content = MessageContent::Text(content);
                existing.timestamp = Utc::now();
            }
            None => {
                self.messages.insert(0, Message::system(content));
                if self.messages.len() > self.max_history {
                    self.trim();
                }
            }
        }
    }

    /// Apply the trimming policy. A no-op when already within bounds.
    ///
    /// With a SYSTEM message: keep it plus the most recent `max_history - 1`
    /// other messages. Without one: keep the most recent `max_history`.
    pub fn trim(&mut self) {
        if self.messages.len() <= self.max_history {
            return;
        }

        let before = self.messages.len();
        let messages = std::mem::take(&mut self.messages);
        let (system, rest): (Vec<Message>, Vec<Message>) =
            messages.into_iter().partition(|m| m.is_system());

        let keep = match system.first() {
            Some(_) => self.max_history - 1,
            None => self.max_history,
        };
        let skip = rest.len().saturating_sub(keep);

        self.messages = system
            .into_iter()
            .take(1)
            .chain(rest.into_iter().skip(skip))
            .collect();

        debug!(
            conversation_id = %self.id,
            before,
            after = self.messages.len(),
            "Trimmed conversation history"
        );
    }
}
