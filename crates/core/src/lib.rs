//! # vigil core
//!
//! Domain types, traits, and error definitions for the vigil agent runtime.
//! This crate has **no framework dependencies**: it defines the domain model
//! that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the turn loop is a trait or a plain value type here:
//! - [`Provider`] is the streaming LLM boundary
//! - [`Tool`] and [`ToolRegistry`] describe the host capabilities
//! - [`Conversation`] is the bounded message history
//! - [`EventQueue`] and [`ThinkingFlag`] are the per-agent shared state the
//!   scheduler observes
//!
//! Implementations live in their respective crates.

pub mod agent;
pub mod conversation;
pub mod environment;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, ThinkingFlag, TurnGuard};
pub use conversation::Conversation;
pub use environment::Environment;
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{Event, EventQueue};
pub use message::{Message, MessageContent, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolRegistry};
