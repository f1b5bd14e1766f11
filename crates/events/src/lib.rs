//! Client-side publish/subscribe infrastructure.
//!
//! - [`EventBus`]: in-process fan-out hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ClientEvent`]: topic-tagged event envelope.
//! - [`HistoryEntry`]: payload of the [`HISTORY_UPDATED`] topic,
//!   published once per completed generation.

pub mod bus;
pub mod history;

pub use bus::{ClientEvent, EventBus};
pub use history::{HistoryEntry, HISTORY_UPDATED};
