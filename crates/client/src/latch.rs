use std::sync::atomic::{AtomicBool, Ordering};

/// One-shot guard for a tracker session's terminal action.
///
/// Exactly one [`trip`](Self::trip) call returns `true`; completion,
/// failure and cancellation all race through the same latch.
#[derive(Debug, Default)]
pub struct TerminalLatch {
    tripped: AtomicBool,
}

impl TerminalLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the latch. Returns `true` only for the first caller.
    pub fn trip(&self) -> bool {
        self.tripped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }
}
