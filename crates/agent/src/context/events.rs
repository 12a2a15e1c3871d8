//! Rendering of drained events into the `{events}` prompt section.

use vigil_core::Event;

/// Placeholder text when no events were drained for this turn.
pub const NO_EVENTS: &str = "No new events.";

/// One line per event, oldest first: `- [YYYY-MM-DD HH:MM:SS] <content>`.
pub fn format_events(events: &[Event]) -> String {
    if events.is_empty() {
        return NO_EVENTS.to_string();
    }

    events
        .iter()
        .map(|e| format!("- [{}] {}", e.occurred_at.format("%Y-%m-%d %H:%M:%S"), e.content))
        .collect::<Vec<_>>()
        .join("\n")
}
