pub mod agent;
pub mod daemon;
pub mod onboard;
pub mod runtime;
