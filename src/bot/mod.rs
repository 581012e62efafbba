//! Discord transport and the platform-independent message pipeline.

/// Serenity event handler and reaction feedback
pub mod discord;
/// Feedback markers and the sink that applies them
pub mod feedback;
/// Platform-independent per-message pipeline
pub mod handler;
/// Replay guard for duplicate message events
pub mod processed_cache;
/// Process wiring for the `run` and `check` commands
pub mod runner;

pub use discord::DiscordHandler;
pub use feedback::{Feedback, FeedbackSink};
pub use handler::{HandleOutcome, HandlerSettings, MessageHandler};
pub use processed_cache::ProcessedCache;
pub use runner::{check_connection, run_bot};
