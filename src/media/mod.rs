//! Media classifier.
//!
//! Turns one chat message into an ordered list of [`DownloadCandidate`]s.
//! Attachments come first in their posted order, followed by recognised
//! links in the order they appear in the text. Nothing is deduplicated.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

/// Folder and filename derivation
pub mod naming;
/// Extension sets and host allow-list
pub mod tables;

pub use tables::MediaTables;

use chrono::{DateTime, Utc};
use lazy_regex::lazy_regex;
use std::fmt;
use tracing::{debug, trace};
use url::Url;

/// Match `http(s)://` tokens up to whitespace or characters Discord uses to wrap links
static RE_URL: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"(?i)https?://[^\s<>"'{}|\\^`\[\]]+"#);

/// Broad class of a detected media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Image file or image-hosting link
    Image,
    /// Video file or video-sharing link
    Video,
    /// Other allow-listed media link
    Link,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Link => "link",
        })
    }
}

/// A file attached to a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Download URL served by the chat platform
    pub url: String,
    /// Original file name
    pub filename: String,
}

/// Platform-independent view of an incoming chat message
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Message identifier
    pub id: u64,
    /// Channel identifier
    pub channel_id: u64,
    /// Human-readable channel name
    pub channel_name: String,
    /// Author display name
    pub author: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Attached files in posted order
    pub attachments: Vec<Attachment>,
    /// Raw text body
    pub content: String,
}

/// A classified, submission-ready media item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadCandidate {
    /// Source URL handed to the NAS
    pub url: String,
    /// Inferred media kind
    pub kind: MediaKind,
    /// Sanitised destination subfolder (derived from the channel name)
    pub folder: String,
    /// Deterministic target filename
    pub filename: String,
}

/// Classify a message against the given tables.
///
/// Unsupported extensions, unknown hosts and malformed URLs are skipped
/// silently. No network access is performed.
#[must_use]
pub fn classify(message: &IncomingMessage, tables: &MediaTables) -> Vec<DownloadCandidate> {
    let folder = naming::destination_folder(&message.channel_name);
    let candidate = |url: String, kind: MediaKind, basename: &str| DownloadCandidate {
        url,
        kind,
        folder: folder.clone(),
        filename: naming::build_filename(
            message.timestamp,
            &message.channel_name,
            &message.author,
            basename,
        ),
    };

    let mut candidates = Vec::new();

    for attachment in &message.attachments {
        let Some(kind) = naming::extension_of(&attachment.filename)
            .and_then(|ext| tables.kind_for_extension(&ext))
        else {
            trace!(filename = %attachment.filename, "Skipping non-media attachment");
            continue;
        };
        let basename = naming::attachment_basename(&attachment.filename);
        candidates.push(candidate(attachment.url.clone(), kind, &basename));
    }

    for raw in extract_urls(&message.content) {
        let Ok(url) = Url::parse(raw) else {
            trace!(url = raw, "Skipping malformed URL");
            continue;
        };
        let Some(kind) = classify_url(&url, tables) else {
            trace!(url = raw, "Skipping URL outside the media allow-list");
            continue;
        };
        let basename = naming::url_basename(&url, tables);
        candidates.push(candidate(raw.to_string(), kind, &basename));
    }

    debug!(
        message_id = message.id,
        candidates = candidates.len(),
        "Classified message"
    );
    candidates
}

/// Media kind of a URL: by path extension first, then by allow-listed host
#[must_use]
pub fn classify_url(url: &Url, tables: &MediaTables) -> Option<MediaKind> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let by_extension = naming::last_segment(url)
        .and_then(naming::extension_of)
        .and_then(|ext| tables.kind_for_extension(&ext));

    by_extension.or_else(|| url.host_str().and_then(|host| tables.kind_for_host(host)))
}

/// All `http(s)` URL tokens in a text, in order of appearance, with trailing
/// sentence punctuation removed.
///
/// A link wrapped in Discord markdown (`**url**`, `_url_`, `~~url~~`) loses
/// the closing marker run when the same run opens right before the scheme.
pub fn extract_urls(text: &str) -> impl Iterator<Item = &str> {
    RE_URL.find_iter(text).map(move |m| {
        let token = trim_punctuation(m.as_str());
        let opening = markdown_run_before(&text[..m.start()]);
        if opening.is_empty() {
            return token;
        }
        token.strip_suffix(opening).map_or(token, trim_punctuation)
    })
}

fn trim_punctuation(token: &str) -> &str {
    token.trim_end_matches(['.', ',', ';', ':', '!', '?', ')'])
}

/// Trailing run of `*`, `_` or `~` at the end of `prefix`
fn markdown_run_before(prefix: &str) -> &str {
    let trimmed = prefix.trim_end_matches(['*', '_', '~']);
    &prefix[trimmed.len()..]
}
