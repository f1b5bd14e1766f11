//! Job-status client for the audio generation server.
//!
//! Provides the REST status fetcher, a Server-Sent Events decoder and
//! stream subscriber, a polling fallback, and the [`JobTracker`] that
//! arbitrates between them for one job.
//!
//! [`JobTracker`]: tracker::JobTracker

pub mod api;
pub mod config;
pub mod delivery;
pub mod events;
pub mod latch;
pub mod poller;
pub mod sse;
pub mod stream;
pub mod tracker;
