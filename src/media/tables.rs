//! Static lookup tables used by the classifier.

use super::MediaKind;
use std::collections::HashSet;

/// File extensions recognised as images
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "tiff", "ico",
];

/// File extensions recognised as videos
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "wmv", "flv", "webm", "mkv", "m4v", "3gp", "ogv",
];

/// Media-hosting domains and the kind assumed for links without a media extension
pub const MEDIA_HOSTS: &[(&str, MediaKind)] = &[
    ("youtube.com", MediaKind::Video),
    ("youtu.be", MediaKind::Video),
    ("vimeo.com", MediaKind::Video),
    ("twitch.tv", MediaKind::Video),
    ("streamable.com", MediaKind::Video),
    ("tiktok.com", MediaKind::Video),
    ("v.redd.it", MediaKind::Video),
    ("imgur.com", MediaKind::Image),
    ("i.redd.it", MediaKind::Image),
    ("reddit.com", MediaKind::Link),
    ("cdn.discordapp.com", MediaKind::Link),
    ("media.discordapp.net", MediaKind::Link),
    ("twitter.com", MediaKind::Link),
    ("x.com", MediaKind::Link),
    ("instagram.com", MediaKind::Link),
];

/// Extension sets and host allow-list consulted by [`super::classify`].
///
/// Kept as data rather than literals so tests can run the classifier
/// against synthetic tables.
#[derive(Debug, Clone)]
pub struct MediaTables {
    image_extensions: HashSet<String>,
    video_extensions: HashSet<String>,
    hosts: Vec<(String, MediaKind)>,
}

impl MediaTables {
    /// Build tables from explicit lists. Extensions are matched without the
    /// leading dot and case-insensitively.
    #[must_use]
    pub fn new<I, V, H>(images: I, videos: V, hosts: H) -> Self
    where
        I: IntoIterator<Item = &'static str>,
        V: IntoIterator<Item = &'static str>,
        H: IntoIterator<Item = (&'static str, MediaKind)>,
    {
        let normalize = |ext: &str| ext.trim_start_matches('.').to_ascii_lowercase();
        Self {
            image_extensions: images.into_iter().map(normalize).collect(),
            video_extensions: videos.into_iter().map(normalize).collect(),
            hosts: hosts
                .into_iter()
                .map(|(host, kind)| (host.to_ascii_lowercase(), kind))
                .collect(),
        }
    }

    /// Media kind for a file extension, if it is an image or a video
    #[must_use]
    pub fn kind_for_extension(&self, extension: &str) -> Option<MediaKind> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if self.image_extensions.contains(&extension) {
            Some(MediaKind::Image)
        } else if self.video_extensions.contains(&extension) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Media kind for an allow-listed host. Subdomains of a listed domain match.
    #[must_use]
    pub fn kind_for_host(&self, host: &str) -> Option<MediaKind> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.hosts
            .iter()
            .find(|(domain, _)| {
                host == *domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .map(|(_, kind)| *kind)
    }
}

impl Default for MediaTables {
    fn default() -> Self {
        Self::new(
            IMAGE_EXTENSIONS.iter().copied(),
            VIDEO_EXTENSIONS.iter().copied(),
            MEDIA_HOSTS.iter().copied(),
        )
    }
}
