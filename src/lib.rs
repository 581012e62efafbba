#![deny(missing_docs)]
//! Showcase loader library.
//!
//! Watches Discord channels for media and queues every discovered item as a
//! Synology Download Station task.

/// Discord transport and the per-message orchestration.
pub mod bot;
/// Configuration management.
pub mod config;
/// Media detection and classification.
pub mod media;
/// Synology Download Station client.
pub mod synology;
