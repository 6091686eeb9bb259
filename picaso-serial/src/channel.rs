//! Buffered serial channel.
//!
//! [`SerialChannel`] layers protocol-friendly reads over a raw
//! [`SerialLink`]: every read computes a wall-clock deadline and loops
//! on short reads until the deadline expires, returning whatever
//! accumulated. Delimiter-terminated reads go through the internal ring
//! buffer so bytes after the delimiter are kept for the next read.

use std::time::{Duration, Instant};

use crate::link::{SerialError, SerialLink};
use crate::ring::RingBuffer;

/// Scratch size for pulling OS bytes toward the ring.
const CHUNK: usize = 512;

pub struct SerialChannel<L> {
    link: Option<L>,
    ring: RingBuffer,
}

impl<L: SerialLink> SerialChannel<L> {
    /// Wrap an opened link.
    pub fn new(link: L) -> Self {
        Self {
            link: Some(link),
            ring: RingBuffer::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Drop the link. Closing an already-closed channel is an error the
    /// caller is free to ignore.
    pub fn close(&mut self) -> Result<(), SerialError> {
        if self.link.take().is_none() {
            return Err(SerialError::NotOpen);
        }
        self.ring.clear();
        Ok(())
    }

    /// Close and reopen with the same parameters, for recovery after a
    /// fault that left the device mid-frame.
    pub fn reopen(&mut self) -> Result<(), SerialError> {
        self.ring.clear();
        self.link_mut()?.reopen()
    }

    fn link_mut(&mut self) -> Result<&mut L, SerialError> {
        self.link.as_mut().ok_or(SerialError::NotOpen)
    }

    /// Queue `bytes` for transmission, draining the OS transmit queue
    /// after each chunk. Returns the number of bytes actually sent,
    /// which is less than `bytes.len()` if the OS reported transient
    /// back-pressure.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<usize, SerialError> {
        let link = self.link_mut()?;
        let mut sent = 0;
        while sent < bytes.len() {
            let n = link.write(&bytes[sent..])?;
            if n == 0 {
                break;
            }
            sent += n;
            link.drain()?;
        }
        Ok(sent)
    }

    /// Read up to `buf.len()` bytes within `timeout`.
    ///
    /// With `delim` set, the read returns early as soon as the
    /// delimiter byte has been copied out (inclusive); bytes already
    /// pulled from the OS stay in the ring for the next call. Without a
    /// delimiter the read fills `buf` directly.
    ///
    /// Returns the bytes accumulated when the deadline expires; `Ok(0)`
    /// means a clean timeout with no data.
    pub fn read(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
        delim: Option<u8>,
    ) -> Result<usize, SerialError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + timeout;
        let mut idx = 0;

        // A previous delimited read may have left bytes behind; hand
        // those out first so FIFO order holds across calls.
        while idx < buf.len() {
            match self.ring.pop() {
                Some(b) => {
                    buf[idx] = b;
                    idx += 1;
                    if Some(b) == delim {
                        return Ok(idx);
                    }
                }
                None => break,
            }
        }

        while idx < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match delim {
                None => {
                    let n = self.link_mut()?.read(&mut buf[idx..], remaining)?;
                    idx += n;
                }
                Some(d) => {
                    let mut tmp = [0u8; CHUNK];
                    let want = self.ring.free().min(CHUNK);
                    let n = self.link_mut()?.read(&mut tmp[..want], remaining)?;
                    self.ring.push_slice(&tmp[..n]);
                    while idx < buf.len() {
                        match self.ring.pop() {
                            Some(b) => {
                                buf[idx] = b;
                                idx += 1;
                                if b == d {
                                    return Ok(idx);
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        }
        Ok(idx)
    }

    /// Wait for outbound data to hit the wire, then discard everything
    /// inbound, the OS queue and the ring alike.
    pub fn flush(&mut self) -> Result<(), SerialError> {
        let link = self.link_mut()?;
        link.drain()?;
        link.clear_input()?;
        self.ring.clear();
        Ok(())
    }

    /// Wait for outbound data to hit the wire; inbound is preserved.
    pub fn drain(&mut self) -> Result<(), SerialError> {
        self.link_mut()?.drain()
    }

    /// Switch the bit rate in place. The link discards both OS queues
    /// to drop any garbage generated by the transient; the ring goes
    /// with them.
    pub fn set_baud(&mut self, baud: u32) -> Result<(), SerialError> {
        self.link_mut()?.set_baud(baud)?;
        self.ring.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLink;

    fn channel_with(bytes: &[u8]) -> SerialChannel<MockLink> {
        let link = MockLink::new();
        link.handle().push(bytes);
        SerialChannel::new(link)
    }

    #[test]
    fn test_raw_read_fills_buffer() {
        let mut ch = channel_with(&[1, 2, 3, 4, 5]);
        let mut buf = [0u8; 4];
        let n = ch.read(&mut buf, Duration::from_millis(100), None).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_raw_read_timeout_returns_partial() {
        let mut ch = channel_with(&[9, 9]);
        let mut buf = [0u8; 8];
        let n = ch.read(&mut buf, Duration::from_millis(50), None).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_delimited_read_stops_at_delimiter() {
        let mut ch = channel_with(b"abc\ndef\n");
        let mut buf = [0u8; 32];
        let n = ch
            .read(&mut buf, Duration::from_millis(100), Some(b'\n'))
            .unwrap();
        assert_eq!(&buf[..n], b"abc\n");
        // the remainder is still queued
        let n = ch
            .read(&mut buf, Duration::from_millis(100), Some(b'\n'))
            .unwrap();
        assert_eq!(&buf[..n], b"def\n");
    }

    #[test]
    fn test_raw_read_consumes_ring_residue() {
        let mut ch = channel_with(b"x\nleftover");
        let mut buf = [0u8; 32];
        let n = ch
            .read(&mut buf, Duration::from_millis(100), Some(b'\n'))
            .unwrap();
        assert_eq!(&buf[..n], b"x\n");
        // A raw read must pick up where the delimited read stopped.
        let n = ch.read(&mut buf, Duration::from_millis(100), None).unwrap();
        assert_eq!(&buf[..n], b"leftover");
    }

    #[test]
    fn test_silent_timeout_accounting() {
        let mut ch = SerialChannel::new(MockLink::new());
        let mut buf = [0u8; 16];
        let start = Instant::now();
        let n = ch
            .read(&mut buf, Duration::from_millis(500), Some(b'\n'))
            .unwrap();
        let elapsed = start.elapsed();
        assert_eq!(n, 0);
        assert!(
            elapsed >= Duration::from_millis(480) && elapsed <= Duration::from_millis(560),
            "elapsed {elapsed:?}"
        );
    }

    #[test]
    fn test_flush_discards_inbound() {
        let mut ch = channel_with(&[1, 2, 3]);
        ch.flush().unwrap();
        let mut buf = [0u8; 4];
        let n = ch.read(&mut buf, Duration::from_millis(20), None).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_write_records_bytes() {
        let link = MockLink::new();
        let handle = link.handle();
        let mut ch = SerialChannel::new(link);
        assert_eq!(ch.write_all(b"hello").unwrap(), 5);
        assert_eq!(handle.written(), b"hello");
    }

    #[test]
    fn test_close_is_terminal() {
        let mut ch = channel_with(&[1]);
        ch.close().unwrap();
        assert!(!ch.is_open());
        assert!(ch.close().is_err());
        let mut buf = [0u8; 1];
        assert!(ch.read(&mut buf, Duration::from_millis(10), None).is_err());
        assert!(ch.write_all(&[0]).is_err());
    }
}
