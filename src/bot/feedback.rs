//! Visual feedback applied to a processed message.

use async_trait::async_trait;

/// Terminal outcome of a message that contained media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    /// Every candidate was queued
    Success,
    /// Some candidates were queued, some failed
    Partial,
    /// No candidate was queued
    Failure,
}

impl Feedback {
    /// Pick the marker for a submission pass. `None` when nothing was submitted.
    ///
    /// ```
    /// use showcase_loader::bot::Feedback;
    ///
    /// assert_eq!(Feedback::from_counts(2, 0), Some(Feedback::Success));
    /// assert_eq!(Feedback::from_counts(1, 1), Some(Feedback::Partial));
    /// assert_eq!(Feedback::from_counts(0, 3), Some(Feedback::Failure));
    /// assert_eq!(Feedback::from_counts(0, 0), None);
    /// ```
    #[must_use]
    pub const fn from_counts(queued: usize, failed: usize) -> Option<Self> {
        match (queued, failed) {
            (0, 0) => None,
            (_, 0) => Some(Self::Success),
            (0, _) => Some(Self::Failure),
            _ => Some(Self::Partial),
        }
    }

    /// Reaction emoji for this outcome
    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Partial => "⚠️",
            Self::Failure => "❌",
        }
    }
}

/// Something that can mark the source message with a [`Feedback`]
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    /// Apply the marker. Callers log and drop any error.
    async fn apply(&self, feedback: Feedback) -> anyhow::Result<()>;
}
