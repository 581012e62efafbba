//! Synology Download Station integration
//!
//! The rest of the crate only sees [`DownloadStation`]; session handling,
//! re-authentication and wire details stay inside [`SynologyClient`].

/// HTTP client for the Download Station Web API
pub mod client;
/// Error types
pub mod error;
/// Wire types and error code tables
pub mod models;

pub use client::SynologyClient;
pub use error::SynologyError;

use async_trait::async_trait;

/// Outcome of one download submission
#[derive(Debug, Clone)]
pub enum SubmissionResult {
    /// The NAS accepted the job
    Queued {
        /// Task identifier, when the NAS reports one
        task_id: Option<String>,
    },
    /// The job was not queued
    Failed(SynologyError),
}

impl SubmissionResult {
    /// Whether the job was queued
    #[must_use]
    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

/// Interface for remote download managers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DownloadStation: Send + Sync {
    /// Queue `url` for download into `destination` on the NAS.
    ///
    /// Authenticates lazily. A session-expiry answer triggers exactly one
    /// re-authentication and retry; every other failure is returned as is.
    async fn submit_download(&self, url: &str, destination: &str, filename: &str)
        -> SubmissionResult;
}
