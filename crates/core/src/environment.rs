//! Environment trait: a textual view of the host the agent runs on.

/// Something that can describe the agent's surroundings for the system prompt.
///
/// Rendered fresh for every turn, so implementations should be cheap and must
/// not fail: problems are reported inline in the returned text.
pub trait Environment: Send + Sync {
    fn overview(&self) -> String;
}

impl<F> Environment for F
where
    F: Fn() -> String + Send + Sync,
{
    fn overview(&self) -> String {
        self()
    }
}
