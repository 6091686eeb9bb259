//! Driver-level errors.
//!
//! The taxonomy, in order of precedence: state violations and argument
//! violations are reported synchronously with no bytes sent; serial
//! faults carry the transport error as their source; a NACK is distinct
//! from a timeout so callers can tell "rejected" from "broken"; and
//! [`DeviceError::BaudDesync`] flags the one unrecoverable case, where
//! the device switched rates but the host could not follow.

use std::time::Duration;

use picaso_protocol::EncodeError;
use picaso_serial::SerialError;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// No port is open (never connected, or already closed).
    #[error("display inactive")]
    NotConnected,
    /// A deferred command is in flight; wait for its completion.
    #[error("display busy")]
    Busy,
    /// An argument failed codec validation; nothing was sent.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// The serial transport failed.
    #[error(transparent)]
    Serial(#[from] SerialError),
    /// The device answered NACK.
    #[error("device rejected the command (NACK)")]
    Nack,
    /// No response at all within the command's budget.
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// A fixed-width reply arrived with fewer bytes than it must have.
    #[error("incomplete response packet ({got} bytes, {expected} expected)")]
    ShortResponse { expected: usize, got: usize },
    /// The OS accepted only part of the command frame.
    #[error("write incomplete (sent {sent} of {len} bytes)")]
    PartialWrite { sent: usize, len: usize },
    /// The device switched to a new bit rate but the host could not.
    /// Power-cycle the display to recover.
    #[error("bit rates out of step after a baud switch; the display needs a manual reset")]
    BaudDesync,
    /// The device broke the rules of a multi-step exchange.
    #[error("{0}")]
    Protocol(String),
}
