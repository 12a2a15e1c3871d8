//! Per-turn context assembly.
//!
//! Before each turn the agent drains its event queue and re-renders the
//! SYSTEM message so the model sees the current time, fresh events, and an
//! overview of its environment.

pub mod assembler;
pub mod events;

pub use assembler::{ContextAssembler, DEFAULT_INSTRUCTIONS};
pub use events::{NO_EVENTS, format_events};
