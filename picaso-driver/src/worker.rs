//! Completion worker.
//!
//! One background thread per controller. It owns the read side of the
//! link while the controller is `Busy`, consuming the eventual device
//! response for a deferred command and delivering it to the registered
//! completion handler. Each wait uses a short budget so the thread
//! notices the halt flag quickly during teardown.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use picaso_protocol::TouchPoint;
use picaso_serial::SerialLink;

use crate::device::{lock, Shared};
use crate::state::{DeferredCommand, Readiness};
use crate::wait::{self, AckPoll};

/// Sleep between polls while the controller is not `Busy`.
const IDLE_SLEEP: Duration = Duration::from_millis(100);

/// Per-iteration wait for a deferred ACK/NACK (sleep wake, touch press).
const ACK_SLICE: Duration = Duration::from_millis(200);

/// Per-iteration wait while accumulating touch coordinate bytes.
const TOUCH_SLICE: Duration = Duration::from_millis(100);

/// Delivered to the completion handler when a deferred command ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Which deferred command completed.
    pub command: DeferredCommand,
    /// True iff the device answered ACK (or, for touch data, sent the
    /// full coordinate packet). On failure the controller's last-error
    /// record says why.
    pub success: bool,
    /// Decoded coordinates, for [`DeferredCommand::TouchData`].
    pub touch: Option<TouchPoint>,
}

/// Completion callback. Invoked on the worker thread with the
/// controller already back in `Idle`, so the handler is free to issue
/// the next command (but must not re-register itself from inside).
pub type CompletionHandler = Box<dyn FnMut(&Completion) + Send>;

pub(crate) fn spawn<L: SerialLink + 'static>(
    shared: Arc<Shared<L>>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("picaso-completion".into())
        .spawn(move || run(shared))
}

fn run<L: SerialLink>(shared: Arc<Shared<L>>) {
    log::debug!("completion worker started");
    loop {
        if shared.halt.load(Ordering::Acquire) {
            log::debug!("completion worker halting");
            return;
        }
        if shared.readiness.get() != Readiness::Busy {
            thread::sleep(IDLE_SLEEP);
            continue;
        }
        let command = match lock(&shared.pending).as_ref().map(|p| p.command) {
            Some(command) => command,
            None => {
                // Busy without a record should be impossible; recover
                // rather than spin.
                log::error!("busy with no deferred command recorded");
                shared.set_error("busy with no deferred command recorded");
                shared.readiness.set(Readiness::Idle);
                continue;
            }
        };
        match command {
            DeferredCommand::Sleep | DeferredCommand::TouchWait => poll_ack(&shared),
            DeferredCommand::TouchData => poll_touch(&shared),
        }
    }
}

/// One bounded ACK/NACK poll for sleep wake-up or touch-press waits.
fn poll_ack<L: SerialLink>(shared: &Arc<Shared<L>>) {
    let outcome = {
        let mut ch = lock(&shared.channel);
        wait::await_ack_nack(&mut ch, ACK_SLICE)
    };
    match outcome {
        Ok(AckPoll::Ack) => finish(shared, true, None),
        Ok(AckPoll::Nack) => {
            shared.set_error("NACK");
            finish(shared, false, None);
        }
        Ok(AckPoll::Timeout) => {} // nothing yet; poll again
        Err(e) => {
            shared.set_error(&format!("communications fault: {e}"));
            finish(shared, false, None);
        }
    }
}

/// Top up the touch coordinate packet; completes at four bytes.
fn poll_touch<L: SerialLink>(shared: &Arc<Shared<L>>) {
    let (mut raw, received) = match lock(&shared.pending).as_ref() {
        Some(p) => (p.raw, p.received),
        None => return, // cancelled under us
    };
    let outcome = {
        let mut ch = lock(&shared.channel);
        ch.read(&mut raw[received..], TOUCH_SLICE, None)
    };
    match outcome {
        Err(e) => {
            shared.set_error(&format!("communications fault: {e}"));
            finish(shared, false, None);
        }
        Ok(0) => {}
        Ok(n) => {
            let total = received + n;
            if total == 4 {
                finish(shared, true, Some(TouchPoint::parse(&raw)));
            } else if let Some(p) = lock(&shared.pending).as_mut() {
                p.raw = raw;
                p.received = total;
            }
        }
    }
}

/// Clear the deferred record, publish `Idle`, then notify. The order
/// matters: the handler must be able to dispatch from the callback.
fn finish<L: SerialLink>(shared: &Arc<Shared<L>>, success: bool, touch: Option<TouchPoint>) {
    let pending = match lock(&shared.pending).take() {
        Some(pending) => pending,
        None => return, // teardown already reported it
    };
    shared.readiness.set(Readiness::Idle);
    shared.notify(Completion {
        command: pending.command,
        success,
        touch,
    });
}
