//! Controller readiness.
//!
//! The three-state guard that serializes use of the half-duplex link:
//! commands are accepted only in `Idle`; a deferred command moves the
//! controller to `Busy` and hands the read side to the completion
//! worker; only the worker (or teardown) moves it back.
//!
//! The caller publishes `Busy` with a release store after writing the
//! deferred-command record, and the worker reads the record only after
//! an acquire load observes `Busy`, so the record is never seen
//! half-written without any further locking.

use std::sync::atomic::{AtomicU8, Ordering};

/// Readiness of a display controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Readiness {
    /// No port open.
    Inactive = 0,
    /// Port open, no command in flight.
    Idle = 1,
    /// A deferred-response command is in flight.
    Busy = 2,
}

/// Atomic cell holding a [`Readiness`].
pub(crate) struct ReadinessCell(AtomicU8);

impl ReadinessCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(Readiness::Inactive as u8))
    }

    pub fn get(&self) -> Readiness {
        match self.0.load(Ordering::Acquire) {
            0 => Readiness::Inactive,
            1 => Readiness::Idle,
            _ => Readiness::Busy,
        }
    }

    pub fn set(&self, readiness: Readiness) {
        self.0.store(readiness as u8, Ordering::Release);
    }
}

/// Which deferred command is outstanding while `Busy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredCommand {
    /// Suspend with wake bits set; the device ACKs on wake-up.
    Sleep,
    /// Wait-for-touch; the device ACKs when the panel is pressed.
    TouchWait,
    /// Touch coordinate request; the device sends 4 bytes when ready.
    TouchData,
}

/// The deferred-command record. Only one is ever outstanding.
#[derive(Debug)]
pub(crate) struct Pending {
    pub command: DeferredCommand,
    /// Reply bytes accumulated so far (TouchData only).
    pub raw: [u8; 4],
    pub received: usize,
}

impl Pending {
    pub fn new(command: DeferredCommand) -> Self {
        Self {
            command,
            raw: [0; 4],
            received: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_roundtrip() {
        let cell = ReadinessCell::new();
        assert_eq!(cell.get(), Readiness::Inactive);
        cell.set(Readiness::Idle);
        assert_eq!(cell.get(), Readiness::Idle);
        cell.set(Readiness::Busy);
        assert_eq!(cell.get(), Readiness::Busy);
        cell.set(Readiness::Inactive);
        assert_eq!(cell.get(), Readiness::Inactive);
    }

    #[test]
    fn test_pending_starts_empty() {
        let pending = Pending::new(DeferredCommand::TouchData);
        assert_eq!(pending.received, 0);
        assert_eq!(pending.command, DeferredCommand::TouchData);
    }
}
