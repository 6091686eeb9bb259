//! Scripted in-memory link for tests.
//!
//! `MockLink` plays the device side of the wire: tests (or a responder
//! closure) feed the inbound queue, and every byte the driver writes is
//! recorded. Reads poll the queue with the same bounded-wait contract a
//! real port has, so timeout behavior is exercised for real.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::link::{SerialError, SerialLink};

type Responder = Box<dyn FnMut(&[u8], &mut VecDeque<u8>) + Send>;

/// Rates the default mock hardware claims to support.
const DEFAULT_RATES: [u32; 5] = [9_600, 19_200, 38_400, 57_600, 115_200];

pub struct MockLink {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    written: Arc<Mutex<Vec<u8>>>,
    baud: Arc<Mutex<u32>>,
    supported: Vec<u32>,
    responder: Option<Responder>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            written: Arc::new(Mutex::new(Vec::new())),
            baud: Arc::new(Mutex::new(9_600)),
            supported: DEFAULT_RATES.to_vec(),
            responder: None,
        }
    }

    /// Install a device script: called with every written chunk and a
    /// handle to the inbound queue to push replies into.
    pub fn respond_with(
        mut self,
        responder: impl FnMut(&[u8], &mut VecDeque<u8>) + Send + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Restrict which bit rates `set_baud` accepts.
    pub fn supported_rates(mut self, rates: &[u32]) -> Self {
        self.supported = rates.to_vec();
        self
    }

    /// A handle for driving the mock from the test thread after the
    /// link has been handed to the driver.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            inbound: Arc::clone(&self.inbound),
            written: Arc::clone(&self.written),
            baud: Arc::clone(&self.baud),
        }
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialLink for MockLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, SerialError> {
        self.written.lock().unwrap().extend_from_slice(buf);
        if let Some(responder) = self.responder.as_mut() {
            let mut queue = self.inbound.lock().unwrap();
            responder(buf, &mut queue);
        }
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SerialError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut queue = self.inbound.lock().unwrap();
                if !queue.is_empty() {
                    let n = buf.len().min(queue.len());
                    for slot in &mut buf[..n] {
                        *slot = queue.pop_front().unwrap();
                    }
                    return Ok(n);
                }
            }
            if Instant::now() >= deadline {
                return Ok(0);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn set_baud(&mut self, baud: u32) -> Result<(), SerialError> {
        if !self.supported.contains(&baud) {
            return Err(SerialError::SpeedNotSupported(baud));
        }
        *self.baud.lock().unwrap() = baud;
        Ok(())
    }

    fn baud(&mut self) -> Result<u32, SerialError> {
        Ok(*self.baud.lock().unwrap())
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.inbound.lock().unwrap().clear();
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SerialError> {
        Ok(())
    }

    fn reopen(&mut self) -> Result<(), SerialError> {
        self.inbound.lock().unwrap().clear();
        Ok(())
    }
}

/// Test-side view of a [`MockLink`].
#[derive(Clone)]
pub struct MockHandle {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    written: Arc<Mutex<Vec<u8>>>,
    baud: Arc<Mutex<u32>>,
}

impl MockHandle {
    /// Queue bytes for the driver to read.
    pub fn push(&self, bytes: &[u8]) {
        self.inbound.lock().unwrap().extend(bytes.iter().copied());
    }

    /// Everything the driver has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    /// Forget recorded writes.
    pub fn clear_written(&self) {
        self.written.lock().unwrap().clear();
    }

    /// The rate the link currently runs at.
    pub fn baud(&self) -> u32 {
        *self.baud.lock().unwrap()
    }
}
