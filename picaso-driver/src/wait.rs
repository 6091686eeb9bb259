//! Acknowledgement scanning.
//!
//! The device interleaves ACK/NACK bytes with occasional garbage (the
//! SetBaud reply is famously 0xFF), so these waits read small gulps and
//! scan each byte, ignoring everything that is neither ACK nor NACK.

use std::time::{Duration, Instant};

use picaso_protocol::{ACK, NACK};
use picaso_serial::{SerialChannel, SerialError, SerialLink};

/// One bounded read per scan iteration.
const READ_SLICE: Duration = Duration::from_millis(10);

/// Outcome of an ACK/NACK wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckPoll {
    Ack,
    Nack,
    Timeout,
}

/// Scan for ACK or NACK until `budget` expires, consuming up to four
/// bytes at a time and discarding everything else.
pub(crate) fn await_ack_nack<L: SerialLink>(
    ch: &mut SerialChannel<L>,
    budget: Duration,
) -> Result<AckPoll, SerialError> {
    let deadline = Instant::now() + budget;
    let mut buf = [0u8; 4];
    while Instant::now() < deadline {
        let n = ch.read(&mut buf, READ_SLICE, None)?;
        for &b in &buf[..n] {
            if b == ACK {
                return Ok(AckPoll::Ack);
            }
            if b == NACK {
                return Ok(AckPoll::Nack);
            }
        }
    }
    Ok(AckPoll::Timeout)
}

/// Scan for an ACK only; anything else is discarded. Returns whether
/// one arrived in time.
pub(crate) fn await_ack<L: SerialLink>(
    ch: &mut SerialChannel<L>,
    budget: Duration,
) -> Result<bool, SerialError> {
    let deadline = Instant::now() + budget.max(Duration::from_millis(2));
    let mut buf = [0u8; 64];
    while Instant::now() < deadline {
        let n = ch.read(&mut buf, READ_SLICE, None)?;
        if buf[..n].contains(&ACK) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Scan for a NACK only. Returns whether one arrived; a quiet line is
/// success for the commands that use this (script launch reports
/// nothing unless it fails).
pub(crate) fn await_nack<L: SerialLink>(
    ch: &mut SerialChannel<L>,
    budget: Duration,
) -> Result<bool, SerialError> {
    let deadline = Instant::now() + budget.max(Duration::from_millis(2));
    let mut buf = [0u8; 64];
    while Instant::now() < deadline {
        let n = ch.read(&mut buf, READ_SLICE, None)?;
        if buf[..n].contains(&NACK) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use picaso_serial::mock::MockLink;

    fn channel_with(bytes: &[u8]) -> SerialChannel<MockLink> {
        let link = MockLink::new();
        link.handle().push(bytes);
        SerialChannel::new(link)
    }

    #[test]
    fn test_ack_found_among_garbage() {
        let mut ch = channel_with(&[0xFF, 0x00, ACK]);
        let poll = await_ack_nack(&mut ch, Duration::from_millis(100)).unwrap();
        assert_eq!(poll, AckPoll::Ack);
    }

    #[test]
    fn test_nack_detected() {
        let mut ch = channel_with(&[NACK]);
        let poll = await_ack_nack(&mut ch, Duration::from_millis(100)).unwrap();
        assert_eq!(poll, AckPoll::Nack);
    }

    #[test]
    fn test_timeout_on_silence() {
        let mut ch = SerialChannel::new(MockLink::new());
        let poll = await_ack_nack(&mut ch, Duration::from_millis(30)).unwrap();
        assert_eq!(poll, AckPoll::Timeout);
    }

    #[test]
    fn test_zero_budget_times_out_immediately() {
        let mut ch = channel_with(&[ACK]);
        let poll = await_ack_nack(&mut ch, Duration::ZERO).unwrap();
        assert_eq!(poll, AckPoll::Timeout);
    }

    #[test]
    fn test_await_ack_ignores_nack() {
        let mut ch = channel_with(&[NACK, ACK]);
        assert!(await_ack(&mut ch, Duration::from_millis(100)).unwrap());
    }

    #[test]
    fn test_await_nack_quiet_line() {
        let mut ch = channel_with(&[0x00, 0x01]);
        assert!(!await_nack(&mut ch, Duration::from_millis(30)).unwrap());
        let mut ch = channel_with(&[NACK]);
        assert!(await_nack(&mut ch, Duration::from_millis(30)).unwrap());
    }
}
