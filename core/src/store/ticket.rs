use std::sync::atomic::{AtomicU8, Ordering};

const PENDING: u8 = 0;
const CLAIMED: u8 = 1;
const ABANDONED: u8 = 2;

/// Decides, exactly once, whether an insert commits or is abandoned.
///
/// A store claims the ticket under its write lock right before mutating;
/// a caller that gives up waiting abandons it. Whichever happens first wins,
/// so an abandoned insert never lands and a claimed one is always awaited.
#[derive(Debug, Default)]
pub struct InsertTicket {
    state: AtomicU8,
}

impl InsertTicket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the caller already abandoned the insert.
    pub fn claim(&self) -> bool {
        self.transition(CLAIMED)
    }

    /// Returns `false` if a store already claimed the insert.
    pub fn abandon(&self) -> bool {
        self.transition(ABANDONED)
    }

    fn transition(&self, to: u8) -> bool {
        match self
            .state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == to,
        }
    }
}
