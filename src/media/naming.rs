//! Folder and filename derivation.
//!
//! Every function here is pure: identical inputs always yield identical names.
//! Uniqueness assumes one channel/author pair never posts two files with the
//! same original name within the same second; that is not enforced.

use super::tables::MediaTables;
use chrono::{DateTime, Utc};
use std::path::Path;
use url::Url;

/// Timestamp prefix format, UTC with second precision
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Token used when sanitisation leaves nothing behind
pub const EMPTY_TOKEN: &str = "unknown";

/// Reduce arbitrary text to a filesystem-safe token.
///
/// Lowercases, collapses each run of non-alphanumeric characters into a
/// single `-` and drops separators at either end.
///
/// ```
/// use showcase_loader::media::naming::sanitize_token;
///
/// assert_eq!(sanitize_token("Art  Showcase!!"), "art-showcase");
/// assert_eq!(sanitize_token("art-showcase"), "art-showcase");
/// assert_eq!(sanitize_token("***"), "unknown");
/// ```
#[must_use]
pub fn sanitize_token(input: &str) -> String {
    let mut token = String::with_capacity(input.len());
    let mut pending_separator = false;

    for c in input.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !token.is_empty() {
                token.push('-');
            }
            pending_separator = false;
            token.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if token.is_empty() {
        EMPTY_TOKEN.to_string()
    } else {
        token
    }
}

/// Destination subfolder for a channel
#[must_use]
pub fn destination_folder(channel_name: &str) -> String {
    sanitize_token(channel_name)
}

/// `<timestamp>_<channel>_<author>_<basename>`
#[must_use]
pub fn build_filename(
    timestamp: DateTime<Utc>,
    channel_name: &str,
    author: &str,
    basename: &str,
) -> String {
    format!(
        "{}_{}_{}_{}",
        timestamp.format(TIMESTAMP_FORMAT),
        sanitize_token(channel_name),
        sanitize_token(author),
        basename
    )
}

/// Filesystem-safe basename for an attachment's original filename.
///
/// The stem is sanitised and the extension lowercased, so `My Cat.PNG`
/// becomes `my-cat.png`.
#[must_use]
pub fn attachment_basename(filename: &str) -> String {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    match extension_of(filename) {
        Some(ext) => format!("{}.{ext}", sanitize_token(stem)),
        None => sanitize_token(filename),
    }
}

/// Basename for a linked URL: the original name when the last path segment
/// carries an image or video extension, otherwise a token inferred from host
/// and path.
#[must_use]
pub fn url_basename(url: &Url, tables: &MediaTables) -> String {
    let segment = last_segment(url);

    let is_media = |s: &&str| {
        extension_of(s).is_some_and(|ext| tables.kind_for_extension(&ext).is_some())
    };
    if let Some(segment) = segment.filter(is_media) {
        return attachment_basename(segment);
    }

    let host = url.host_str().unwrap_or_default();
    let video_id = url
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned());

    let inferred = [Some(host.to_string()), segment.map(ToString::to_string), video_id]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("-");
    sanitize_token(&inferred)
}

/// Last non-empty path segment of a URL
#[must_use]
pub fn last_segment(url: &Url) -> Option<&str> {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
}

/// Lowercased extension of a file name, if it has a non-empty stem and an
/// alphanumeric extension.
#[must_use]
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
