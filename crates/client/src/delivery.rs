//! What a delivery strategy hands to the tracker, and which strategy
//! is currently active.

use audiogen_core::status::StatusSnapshot;

use crate::api::TransportError;
use crate::poller::PollHandle;
use crate::stream::{ChannelError, StreamHandle};

/// Capacity of each strategy's delivery channel. Deliveries are never
/// dropped; a full channel back-pressures the strategy task.
pub const DELIVERY_CHANNEL_CAPACITY: usize = 32;

/// One item produced by a delivery strategy.
#[derive(Debug)]
pub enum Delivery {
    /// A snapshot received from the stream or a poll.
    Snapshot(StatusSnapshot),
    /// The push channel is unusable. Sent at most once per stream.
    ChannelFailure(ChannelError),
    /// A single poll failed. Polling continues.
    FetchError(TransportError),
}

/// Which delivery path the tracker is currently observing through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Stream,
    Poll,
}

/// The live delivery strategy owned by a tracker session.
pub enum ActiveStrategy {
    Stream(StreamHandle),
    Poll(PollHandle),
}

impl ActiveStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Stream(_) => StrategyKind::Stream,
            Self::Poll(_) => StrategyKind::Poll,
        }
    }

    /// Close the channel or stop the timer. Idempotent.
    pub fn close(&self) {
        match self {
            Self::Stream(handle) => handle.close(),
            Self::Poll(handle) => handle.stop(),
        }
    }
}
