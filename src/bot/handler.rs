//! Per-message orchestration: filter, classify, submit, feedback.
//!
//! Independent of the chat platform. Errors are contained per message and
//! surface only as the feedback marker plus log lines.

use super::feedback::{Feedback, FeedbackSink};
use super::processed_cache::ProcessedCache;
use crate::config::{Settings, PROCESSED_CACHE_MAX_SIZE, PROCESSED_CACHE_TTL_SECS};
use crate::media::{self, DownloadCandidate, IncomingMessage, MediaTables};
use crate::synology::{DownloadStation, SubmissionResult};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Static data the handler needs
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Channels whose messages are processed
    pub monitored_channels: BTreeSet<u64>,
    /// Root folder on the NAS
    pub destination_root: String,
    /// Classifier tables
    pub tables: MediaTables,
}

impl From<&Settings> for HandlerSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            monitored_channels: settings.channel_ids.clone(),
            destination_root: settings.download_destination.clone(),
            tables: MediaTables::default(),
        }
    }
}

/// Terminal state reached for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Channel not monitored; nothing done
    UnmonitoredChannel,
    /// Same message id already handled; nothing done
    AlreadyProcessed,
    /// No media found; nothing submitted, no marker
    NoMedia,
    /// Candidates submitted and one marker applied (or attempted)
    Submitted {
        /// Marker chosen for the message
        feedback: Feedback,
        /// Candidates queued on the NAS
        queued: usize,
        /// Candidates that failed
        failed: usize,
    },
}

/// Event callback logic shared by every transport
pub struct MessageHandler {
    station: Arc<dyn DownloadStation>,
    settings: HandlerSettings,
    processed: ProcessedCache,
}

impl MessageHandler {
    /// Create a handler submitting to `station`
    #[must_use]
    pub fn new(station: Arc<dyn DownloadStation>, settings: HandlerSettings) -> Self {
        Self {
            station,
            settings,
            processed: ProcessedCache::new(PROCESSED_CACHE_TTL_SECS, PROCESSED_CACHE_MAX_SIZE),
        }
    }

    /// Whether messages from `channel_id` are processed
    #[must_use]
    pub fn is_monitored(&self, channel_id: u64) -> bool {
        self.settings.monitored_channels.contains(&channel_id)
    }

    /// Whether a raw chat event should be handled at all. Messages written by
    /// bots, this one included, are skipped along with unmonitored channels.
    #[must_use]
    pub fn should_process(&self, author_is_bot: bool, channel_id: u64) -> bool {
        !author_is_bot && self.is_monitored(channel_id)
    }

    /// NAS folder for a candidate: `<destination root>/<channel folder>`
    #[must_use]
    pub fn destination_for(&self, candidate: &DownloadCandidate) -> String {
        format!("{}/{}", self.settings.destination_root, candidate.folder)
    }

    /// Process one incoming message to its terminal state.
    ///
    /// Candidates are submitted sequentially in detection order. Exactly one
    /// marker is applied when at least one candidate was found; a failure to
    /// apply it is logged and otherwise ignored.
    pub async fn handle(&self, message: &IncomingMessage, sink: &dyn FeedbackSink) -> HandleOutcome {
        if !self.is_monitored(message.channel_id) {
            return HandleOutcome::UnmonitoredChannel;
        }
        if !self.processed.first_sighting(message.id).await {
            return HandleOutcome::AlreadyProcessed;
        }

        let candidates = media::classify(message, &self.settings.tables);
        if candidates.is_empty() {
            debug!(message_id = message.id, "No media found in message");
            return HandleOutcome::NoMedia;
        }

        info!(
            message_id = message.id,
            channel = %message.channel_name,
            author = %message.author,
            candidates = candidates.len(),
            "Found media in message"
        );

        let (queued, failed) = self.submit_all(&candidates).await;
        let Some(feedback) = Feedback::from_counts(queued, failed) else {
            return HandleOutcome::NoMedia;
        };

        if let Err(e) = sink.apply(feedback).await {
            warn!(
                message_id = message.id,
                feedback = ?feedback,
                error = %e,
                "Could not apply feedback marker"
            );
        }

        HandleOutcome::Submitted {
            feedback,
            queued,
            failed,
        }
    }

    async fn submit_all(&self, candidates: &[DownloadCandidate]) -> (usize, usize) {
        let mut queued = 0;
        let mut failed = 0;

        for candidate in candidates {
            let destination = self.destination_for(candidate);
            match self
                .station
                .submit_download(&candidate.url, &destination, &candidate.filename)
                .await
            {
                SubmissionResult::Queued { task_id } => {
                    queued += 1;
                    info!(
                        url = %candidate.url,
                        kind = %candidate.kind,
                        destination = %destination,
                        filename = %candidate.filename,
                        task_id = task_id.as_deref().unwrap_or("-"),
                        "Queued download"
                    );
                }
                SubmissionResult::Failed(e) => {
                    failed += 1;
                    warn!(
                        url = %candidate.url,
                        kind = %candidate.kind,
                        destination = %destination,
                        filename = %candidate.filename,
                        error = %e,
                        "Failed to queue download"
                    );
                }
            }
        }

        (queued, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::feedback::MockFeedbackSink;
    use crate::media::Attachment;
    use crate::synology::{MockDownloadStation, SynologyError};
    use chrono::{TimeZone, Utc};
    use mockall::predicate::{always, eq};
    use mockall::Sequence;
    use std::io::{self, Write};
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    const MONITORED: u64 = 100;

    fn handler(station: MockDownloadStation) -> MessageHandler {
        MessageHandler::new(
            Arc::new(station),
            HandlerSettings {
                monitored_channels: BTreeSet::from([MONITORED]),
                destination_root: "downloads/discord-media".to_string(),
                tables: MediaTables::default(),
            },
        )
    }

    fn message(id: u64, channel_id: u64, attachments: &[&str], content: &str) -> IncomingMessage {
        IncomingMessage {
            id,
            channel_id,
            channel_name: "art-showcase".to_string(),
            author: "Jane".to_string(),
            timestamp: Utc
                .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
                .single()
                .expect("valid timestamp"),
            attachments: attachments
                .iter()
                .map(|name| Attachment {
                    url: format!("https://cdn.discordapp.com/attachments/1/2/{name}"),
                    filename: (*name).to_string(),
                })
                .collect(),
            content: content.to_string(),
        }
    }

    /// In-memory log sink for asserting on emitted lines
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn lines_containing(&self, needle: &str) -> Vec<String> {
            let buf = self.0.lock().map(|b| b.clone()).unwrap_or_default();
            String::from_utf8_lossy(&buf)
                .lines()
                .filter(|line| line.contains(needle))
                .map(ToString::to_string)
                .collect()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .map_err(|_| io::Error::other("log buffer poisoned"))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn no_feedback() -> MockFeedbackSink {
        let mut sink = MockFeedbackSink::new();
        sink.expect_apply().never();
        sink
    }

    fn expect_feedback(expected: Feedback) -> MockFeedbackSink {
        let mut sink = MockFeedbackSink::new();
        sink.expect_apply()
            .with(eq(expected))
            .times(1)
            .returning(|_| Ok(()));
        sink
    }

    #[tokio::test]
    async fn test_image_attachment_gets_success_marker() {
        let mut station = MockDownloadStation::new();
        station
            .expect_submit_download()
            .with(
                eq("https://cdn.discordapp.com/attachments/1/2/cat.png"),
                eq("downloads/discord-media/art-showcase"),
                eq("20240506_070809_art-showcase_jane_cat.png"),
            )
            .times(1)
            .returning(|_, _, _| SubmissionResult::Queued { task_id: None });

        let outcome = handler(station)
            .handle(&message(1, MONITORED, &["cat.png"], ""), &expect_feedback(Feedback::Success))
            .await;
        assert_eq!(
            outcome,
            HandleOutcome::Submitted {
                feedback: Feedback::Success,
                queued: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_unmonitored_channel_ignored() {
        let mut station = MockDownloadStation::new();
        station.expect_submit_download().never();

        let outcome = handler(station)
            .handle(&message(1, 999, &["cat.png"], "https://youtu.be/x"), &no_feedback())
            .await;
        assert_eq!(outcome, HandleOutcome::UnmonitoredChannel);
    }

    #[tokio::test]
    async fn test_no_media_no_marker() {
        let mut station = MockDownloadStation::new();
        station.expect_submit_download().never();

        let outcome = handler(station)
            .handle(&message(1, MONITORED, &["archive.zip"], "hello"), &no_feedback())
            .await;
        assert_eq!(outcome, HandleOutcome::NoMedia);
    }

    #[tokio::test]
    async fn test_mixed_outcomes_give_partial_marker_in_order() {
        let mut seq = Sequence::new();
        let mut station = MockDownloadStation::new();
        station
            .expect_submit_download()
            .with(eq("https://youtu.be/first"), always(), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| SubmissionResult::Queued { task_id: None });
        station
            .expect_submit_download()
            .with(eq("https://vimeo.com/2"), always(), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| SubmissionResult::Failed(SynologyError::Timeout(30)));

        let msg = message(1, MONITORED, &[], "https://youtu.be/first https://vimeo.com/2");
        let outcome = handler(station)
            .handle(&msg, &expect_feedback(Feedback::Partial))
            .await;
        assert_eq!(
            outcome,
            HandleOutcome::Submitted {
                feedback: Feedback::Partial,
                queued: 1,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_partial_outcome_logs_one_success_and_one_failure() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut station = MockDownloadStation::new();
        station
            .expect_submit_download()
            .with(eq("https://youtu.be/ok"), always(), always())
            .returning(|_, _, _| SubmissionResult::Queued {
                task_id: Some("dbid_1".to_string()),
            });
        station
            .expect_submit_download()
            .with(eq("https://vimeo.com/9"), always(), always())
            .returning(|_, _, _| SubmissionResult::Failed(SynologyError::HttpStatus(502)));

        let msg = message(7, MONITORED, &[], "https://youtu.be/ok https://vimeo.com/9");
        handler(station)
            .handle(&msg, &expect_feedback(Feedback::Partial))
            .await;

        let queued = logs.lines_containing("Queued download");
        let failed = logs.lines_containing("Failed to queue download");
        assert_eq!(queued.len(), 1, "queued lines: {queued:?}");
        assert_eq!(failed.len(), 1, "failed lines: {failed:?}");
        assert!(queued[0].contains("INFO") && queued[0].contains("https://youtu.be/ok"));
        assert!(failed[0].contains("WARN") && failed[0].contains("https://vimeo.com/9"));
        assert!(failed[0].contains("502"));
    }

    #[test]
    fn test_bot_authors_and_unmonitored_channels_skipped() {
        let handler = handler(MockDownloadStation::new());
        assert!(handler.should_process(false, MONITORED));
        assert!(!handler.should_process(true, MONITORED));
        assert!(!handler.should_process(false, 999));
        assert!(!handler.should_process(true, 999));
    }

    #[tokio::test]
    async fn test_auth_failure_gives_failure_marker() {
        let mut station = MockDownloadStation::new();
        station.expect_submit_download().times(2).returning(|_, _, _| {
            SubmissionResult::Failed(SynologyError::Auth {
                host: "nas".to_string(),
                port: 5000,
                reason: "no such account or incorrect password".to_string(),
            })
        });

        let outcome = handler(station)
            .handle(
                &message(1, MONITORED, &["a.png", "b.mov"], ""),
                &expect_feedback(Feedback::Failure),
            )
            .await;
        assert!(matches!(
            outcome,
            HandleOutcome::Submitted {
                feedback: Feedback::Failure,
                queued: 0,
                failed: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_feedback_error_is_swallowed() {
        let mut station = MockDownloadStation::new();
        station
            .expect_submit_download()
            .returning(|_, _, _| SubmissionResult::Queued { task_id: None });
        let mut sink = MockFeedbackSink::new();
        sink.expect_apply()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("Missing Permissions")));

        let outcome = handler(station)
            .handle(&message(1, MONITORED, &["cat.png"], ""), &sink)
            .await;
        assert!(matches!(
            outcome,
            HandleOutcome::Submitted {
                feedback: Feedback::Success,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_replayed_message_processed_once() {
        let mut station = MockDownloadStation::new();
        station
            .expect_submit_download()
            .times(1)
            .returning(|_, _, _| SubmissionResult::Queued { task_id: None });

        let handler = handler(station);
        let msg = message(42, MONITORED, &["cat.png"], "");
        let sink = expect_feedback(Feedback::Success);

        handler.handle(&msg, &sink).await;
        assert_eq!(handler.handle(&msg, &sink).await, HandleOutcome::AlreadyProcessed);
    }
}
