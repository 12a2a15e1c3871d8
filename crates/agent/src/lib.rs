//! The agent turn loop, the heart of vigil.
//!
//! A turn follows a **Stream → Act → Continue** cycle:
//!
//! 1. **Refresh context**: drain queued events and re-render the SYSTEM message
//! 2. **Append** the triggering message, if any
//! 3. **Stream** the conversation to the provider, forwarding text as it arrives
//! 4. **If tool calls**: run them concurrently, persist the results in request
//!    order, and go back to step 3
//! 5. **Otherwise** the turn is over
//!
//! Only one turn runs at a time per [`Agent`]; the thinking flag enforces it.

pub mod context;
pub mod loop_runner;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use context::{ContextAssembler, DEFAULT_INSTRUCTIONS, format_events};
pub use loop_runner::Agent;
pub use stream_event::AgentStreamEvent;
