//! The display controller.
//!
//! Owns the serial channel, drives the connect handshake (power-up
//! wait, auto-baud, baud raise), enforces the readiness guard, and
//! dispatches every command: frame the bytes, send, await the ACK/NACK
//! or reply packet within that command's budget. Deferred-response
//! commands (sleep with wake bits, touch waits) hand the read side to
//! the completion worker and return immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use picaso_protocol::{BaudCode, Command, TouchPoint, VersionInfo};
use picaso_serial::{SerialChannel, SerialConfig, SerialError, SerialLink, SystemPort};

use crate::error::DeviceError;
use crate::state::{DeferredCommand, Pending, Readiness, ReadinessCell};
use crate::wait::{self, AckPoll};
use crate::worker::{self, Completion, CompletionHandler};

/// The manual requires half a second of silence after power-up before
/// the host sends its first byte.
const POWER_UP_DELAY: Duration = Duration::from_millis(500);

/// Auto-baud probe attempts before giving up on the device.
const AUTOBAUD_ATTEMPTS: u32 = 4;

/// Per-attempt wait for the auto-baud ACK.
const AUTOBAUD_BUDGET: Duration = Duration::from_millis(20);

/// Wait for the (old-rate) reply to a `Q` baud-switch command.
const SETBAUD_REPLY_BUDGET: Duration = Duration::from_millis(100);

/// Settle time between host-side rate switches during the pre-flight
/// probe.
const SWITCH_SETTLE: Duration = Duration::from_micros(50);

pub(crate) const fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Lock a mutex, surviving a poisoned lock from a panicked peer.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the caller and the completion worker.
pub(crate) struct Shared<L> {
    pub channel: Mutex<SerialChannel<L>>,
    pub readiness: ReadinessCell,
    pub pending: Mutex<Option<Pending>>,
    pub handler: Mutex<Option<CompletionHandler>>,
    pub last_error: Mutex<Option<String>>,
    pub baud: Mutex<BaudCode>,
    pub halt: AtomicBool,
}

impl<L: SerialLink> Shared<L> {
    pub fn check_idle(&self) -> Result<(), DeviceError> {
        match self.readiness.get() {
            Readiness::Inactive => Err(DeviceError::NotConnected),
            Readiness::Busy => Err(DeviceError::Busy),
            Readiness::Idle => Ok(()),
        }
    }

    /// Gate for command dispatch: only `Idle` may touch the channel.
    pub fn begin(&self) -> Result<MutexGuard<'_, SerialChannel<L>>, DeviceError> {
        self.check_idle()?;
        Ok(lock(&self.channel))
    }

    pub fn set_error(&self, message: &str) {
        *lock(&self.last_error) = Some(message.to_owned());
    }

    pub fn notify(&self, completion: Completion) {
        if let Some(handler) = lock(&self.handler).as_mut() {
            handler(&completion);
        }
    }

    /// Record the deferred command, then publish `Busy`. The store
    /// order is what lets the worker read the record lock-free of the
    /// caller.
    fn go_busy(&self, command: DeferredCommand) {
        *lock(&self.pending) = Some(Pending::new(command));
        self.readiness.set(Readiness::Busy);
    }

    /// Negotiate a new bit rate with the device.
    ///
    /// The host is probed first (switch to the target and back) so an
    /// unsupported rate fails before the device has moved. After the
    /// `Q` command the device replies at the old rate (the PICASO
    /// firmware sends 0xFF rather than an ACK, so anything that is not
    /// a NACK counts as acceptance) and then both sides switch. If
    /// the device switched but the host cannot, the link is beyond
    /// recovery and the caller is told to reset the display.
    fn set_baud_code(&self, code: BaudCode) -> Result<(), DeviceError> {
        let mut current = lock(&self.baud);
        if *current == code {
            return Ok(());
        }
        if !code.host_supported() {
            return Err(SerialError::SpeedNotSupported(code.bits_per_second()).into());
        }

        let mut ch = lock(&self.channel);
        let target = code.bits_per_second();
        let old = current.bits_per_second();

        ch.set_baud(target)?;
        thread::sleep(SWITCH_SETTLE);
        ch.set_baud(old)?;
        thread::sleep(SWITCH_SETTLE);

        let bytes = Command::SetBaud(code).encode()?;
        ch.flush()?;
        send(&mut ch, &bytes)?;

        if let AckPoll::Nack = wait::await_ack_nack(&mut ch, SETBAUD_REPLY_BUDGET)? {
            return Err(DeviceError::Nack);
        }

        if let Err(e) = ch.set_baud(target) {
            log::error!("host could not follow the display to {target} baud: {e}");
            return Err(DeviceError::BaudDesync);
        }
        *current = code;
        log::debug!("link now at {target} baud");
        Ok(())
    }
}

/// Write a full command frame; anything less is an error.
pub(crate) fn send<L: SerialLink>(ch: &mut SerialChannel<L>, bytes: &[u8]) -> Result<(), DeviceError> {
    let sent = ch.write_all(bytes)?;
    if sent != bytes.len() {
        return Err(DeviceError::PartialWrite {
            sent,
            len: bytes.len(),
        });
    }
    Ok(())
}

/// Read a fixed-width reply in full within `budget`.
pub(crate) fn read_reply<L: SerialLink>(
    ch: &mut SerialChannel<L>,
    buf: &mut [u8],
    budget: Duration,
) -> Result<(), DeviceError> {
    let n = ch.read(buf, budget, None)?;
    if n == 0 {
        return Err(DeviceError::Timeout(budget));
    }
    if n < buf.len() {
        return Err(DeviceError::ShortResponse {
            expected: buf.len(),
            got: n,
        });
    }
    Ok(())
}

pub(crate) fn expect_ack<L: SerialLink>(
    ch: &mut SerialChannel<L>,
    budget: Duration,
) -> Result<(), DeviceError> {
    match wait::await_ack_nack(ch, budget)? {
        AckPoll::Ack => Ok(()),
        AckPoll::Nack => Err(DeviceError::Nack),
        AckPoll::Timeout => Err(DeviceError::Timeout(budget)),
    }
}

/// Outcome of a command that may complete later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The device already acknowledged.
    Done,
    /// The controller is `Busy`; the completion handler will be told
    /// when the device answers.
    Pending,
}

/// Outcome of a touch coordinate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchRead {
    /// Deferred mode: coordinates arrive through the completion
    /// handler once the panel is touched.
    Pending,
    /// Immediate mode: the decoded reply.
    Point(TouchPoint),
}

/// Driver for one display module.
///
/// Created connected; dropped (or [`close`](Self::close)d) to release
/// the port. All commands are rejected unless the controller is idle.
pub struct DisplayController<L: SerialLink> {
    shared: Arc<Shared<L>>,
    worker: Option<JoinHandle<()>>,
}

impl DisplayController<SystemPort> {
    /// Open `path` at the device's power-up rate and run the connect
    /// handshake.
    pub fn connect(path: &str) -> Result<Self, DeviceError> {
        let link = SystemPort::open(path, &SerialConfig::default())?;
        Self::connect_link(link)
    }
}

impl<L: SerialLink + 'static> DisplayController<L> {
    /// Run the connect handshake over an already-opened link.
    ///
    /// Waits out the power-up window, synchronizes with up to four
    /// auto-baud probes, raises the link to the fastest host rate
    /// (staying at 9600 if that fails), and starts the completion
    /// worker.
    pub fn connect_link(link: L) -> Result<Self, DeviceError> {
        let shared = Arc::new(Shared {
            channel: Mutex::new(SerialChannel::new(link)),
            readiness: ReadinessCell::new(),
            pending: Mutex::new(None),
            handler: Mutex::new(None),
            last_error: Mutex::new(None),
            baud: Mutex::new(BaudCode::B9600),
            halt: AtomicBool::new(false),
        });

        thread::sleep(POWER_UP_DELAY);

        {
            let mut ch = lock(&shared.channel);
            autobaud(&mut ch)?;
        }
        shared.readiness.set(Readiness::Idle);

        if let Err(e) = shared.set_baud_code(BaudCode::MAX_HOST) {
            log::warn!("could not raise bit rate, staying at 9600: {e}");
        }

        let worker = worker::spawn(Arc::clone(&shared)).map_err(SerialError::from)?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }
}

impl<L: SerialLink> DisplayController<L> {
    /// Tear down: cancel any deferred command (its handler fires with
    /// `success = false`), put the device back at 9600 so the next
    /// session can auto-baud, close the port, and join the worker.
    pub fn close(&mut self) {
        if self.worker.is_none() && self.shared.readiness.get() == Readiness::Inactive {
            return;
        }
        self.shared.halt.store(true, Ordering::Release);

        if self.shared.readiness.get() == Readiness::Busy {
            let pending = lock(&self.shared.pending).take();
            self.shared.readiness.set(Readiness::Idle);
            if let Some(p) = pending {
                self.shared.set_error("port is closing");
                self.shared.notify(Completion {
                    command: p.command,
                    success: false,
                    touch: None,
                });
            }
        }

        if self.shared.readiness.get() != Readiness::Inactive {
            if let Err(e) = self.shared.set_baud_code(BaudCode::B9600) {
                log::warn!(
                    "cannot restore default bit rate; the display will need a manual reset: {e}"
                );
            }
        }

        let _ = lock(&self.shared.channel).close();
        self.shared.readiness.set(Readiness::Inactive);

        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    /// Register the completion handler for deferred commands. Rejected
    /// while a deferred command is in flight.
    pub fn on_completion(
        &self,
        handler: impl FnMut(&Completion) + Send + 'static,
    ) -> Result<(), DeviceError> {
        if self.shared.readiness.get() == Readiness::Busy {
            return Err(DeviceError::Busy);
        }
        *lock(&self.shared.handler) = Some(Box::new(handler));
        Ok(())
    }

    pub fn readiness(&self) -> Readiness {
        self.shared.readiness.get()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.readiness.get() != Readiness::Inactive
    }

    /// The stored message from the most recent failure. Successful
    /// operations do not clear it; [`clear_error`](Self::clear_error)
    /// does.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).clone()
    }

    pub fn clear_error(&self) {
        *lock(&self.shared.last_error) = None;
    }

    /// Switch the link to a new bit rate (see the connect handshake
    /// for the protocol). [`DeviceError::BaudDesync`] means the device
    /// moved but the host could not; power-cycle the display.
    pub fn set_baud(&self, code: BaudCode) -> Result<(), DeviceError> {
        let result = self
            .shared
            .check_idle()
            .and_then(|()| self.shared.set_baud_code(code));
        self.finish_op("set baud", result)
    }

    /// Query device kind, hardware/firmware revisions, and resolution.
    /// With `on_screen` the device also renders the version on the
    /// panel, which takes it a while.
    pub fn version(&self, on_screen: bool) -> Result<VersionInfo, DeviceError> {
        let result = (|| {
            let mut ch = self.shared.begin()?;
            let bytes = Command::Version { on_screen }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            let mut raw = [0u8; 5];
            read_reply(&mut ch, &mut raw, if on_screen { ms(500) } else { ms(50) })?;
            Ok(VersionInfo::parse(&raw))
        })();
        self.finish_op("version", result)
    }

    pub fn clear(&self) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::Clear, ms(100));
        self.finish_op("clear", result)
    }

    pub fn replace_background(&self, color: u16) -> Result<(), DeviceError> {
        // Repainting every pixel is the slowest thing the device does
        // short of a color replace.
        let result = self.send_for_ack(&Command::ReplaceBackground { color }, ms(2500));
        self.finish_op("replace background", result)
    }

    /// Display control: mode 0 backlight, 1 display on/off, 2 contrast,
    /// 3 power-up/shutdown, 4 orientation, 5 touch control, 6 image
    /// format, 8 FAT protect. There is no mode 7.
    pub fn control(&self, mode: u8, value: u8) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::Control { mode, value }, ms(100));
        self.finish_op("control", result)
    }

    pub fn set_volume(&self, value: u8) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::SetVolume { value }, ms(100));
        self.finish_op("set volume", result)
    }

    /// Suspend the display. With wake-condition bits in `options` the
    /// device holds its ACK until wake-up: the call returns
    /// [`CommandStatus::Pending`] and the completion handler fires on
    /// wake. With no wake bits the device ACKs immediately.
    pub fn suspend(&self, options: u8, duration: u8) -> Result<CommandStatus, DeviceError> {
        let result = (|| {
            let mut ch = self.shared.begin()?;
            let bytes = Command::Suspend { options, duration }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            match wait::await_ack_nack(&mut ch, ms(100))? {
                AckPoll::Ack => Ok(CommandStatus::Done),
                AckPoll::Nack => Err(DeviceError::Nack),
                AckPoll::Timeout => {
                    if options & 0x0F != 0 {
                        drop(ch);
                        self.shared.go_busy(DeferredCommand::Sleep);
                        Ok(CommandStatus::Pending)
                    } else {
                        Err(DeviceError::Timeout(ms(100)))
                    }
                }
            }
        })();
        self.finish_op("suspend", result)
    }

    pub fn read_pin(&self, pin: u8) -> Result<u8, DeviceError> {
        let result = (|| {
            let mut ch = self.shared.begin()?;
            let bytes = Command::ReadPin { pin }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            let mut raw = [0u8; 1];
            read_reply(&mut ch, &mut raw, ms(100))?;
            Ok(raw[0])
        })();
        self.finish_op("read pin", result)
    }

    pub fn write_pin(&self, pin: u8, value: u8) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::WritePin { pin, value }, ms(100));
        self.finish_op("write pin", result)
    }

    pub fn read_bus(&self) -> Result<u8, DeviceError> {
        let result = (|| {
            let mut ch = self.shared.begin()?;
            let bytes = Command::ReadBus.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            let mut raw = [0u8; 1];
            read_reply(&mut ch, &mut raw, ms(100))?;
            Ok(raw[0])
        })();
        self.finish_op("read bus", result)
    }

    pub fn write_bus(&self, value: u8) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::WriteBus { value }, ms(100));
        self.finish_op("write bus", result)
    }

    /// Store a user bitmap. Group 0 is 8x8 (8 bytes, index 0..=63),
    /// group 1 is 16x16 (32 bytes, 0..=15), group 2 is 32x32 (128
    /// bytes, 0..=7).
    pub fn add_bitmap(&self, group: u8, index: u8, data: &[u8]) -> Result<(), DeviceError> {
        let result = (|| {
            let mut ch = self.shared.begin()?;
            let bytes = Command::AddBitmap { group, index, data }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            ch.drain()?;
            expect_ack(&mut ch, ms(200))
        })();
        self.finish_op("add bitmap", result)
    }

    pub fn draw_bitmap(
        &self,
        group: u8,
        index: u8,
        x: u16,
        y: u16,
        color: u16,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::DrawBitmap {
                group,
                index,
                x,
                y,
                color,
            },
            ms(100),
        );
        self.finish_op("draw bitmap", result)
    }

    pub fn circle(&self, x: u16, y: u16, radius: u16, color: u16) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::Circle {
                x,
                y,
                radius,
                color,
            },
            ms(100),
        );
        self.finish_op("circle", result)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn triangle(
        &self,
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
        x3: u16,
        y3: u16,
        color: u16,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::Triangle {
                x1,
                y1,
                x2,
                y2,
                x3,
                y3,
                color,
            },
            ms(200),
        );
        self.finish_op("triangle", result)
    }

    /// Blit raw pixel data. `color_mode` 0x08 sends one byte per pixel,
    /// 0x10 two (RGB565, big-endian).
    pub fn draw_icon(
        &self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        color_mode: u8,
        pixels: &[u8],
    ) -> Result<(), DeviceError> {
        let result = (|| {
            let mut ch = self.shared.begin()?;
            let bytes = Command::DrawIcon {
                x,
                y,
                width,
                height,
                color_mode,
                pixels,
            }
            .encode()?;
            send(&mut ch, &bytes)?;
            expect_ack(&mut ch, ms(400))
        })();
        self.finish_op("draw icon", result)
    }

    pub fn set_background(&self, color: u16) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::SetBackground { color }, ms(100));
        self.finish_op("set background", result)
    }

    pub fn line(&self, x1: u16, y1: u16, x2: u16, y2: u16, color: u16) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::Line { x1, y1, x2, y2, color }, ms(100));
        self.finish_op("line", result)
    }

    /// Draw a polygon from parallel x/y vertex lists (3 to 7 vertices).
    pub fn polygon(&self, xs: &[u16], ys: &[u16], color: u16) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::Polygon { xs, ys, color }, ms(100));
        self.finish_op("polygon", result)
    }

    pub fn rectangle(
        &self,
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
        color: u16,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::Rectangle { x1, y1, x2, y2, color }, ms(100));
        self.finish_op("rectangle", result)
    }

    pub fn ellipse(&self, x: u16, y: u16, rx: u16, ry: u16, color: u16) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::Ellipse { x, y, rx, ry, color }, ms(200));
        self.finish_op("ellipse", result)
    }

    pub fn write_pixel(&self, x: u16, y: u16, color: u16) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::WritePixel { x, y, color }, ms(200));
        self.finish_op("write pixel", result)
    }

    /// Read back one pixel as RGB565.
    pub fn read_pixel(&self, x: u16, y: u16) -> Result<u16, DeviceError> {
        let result = (|| {
            let mut ch = self.shared.begin()?;
            let bytes = Command::ReadPixel { x, y }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            let mut raw = [0u8; 2];
            read_reply(&mut ch, &mut raw, ms(200))?;
            Ok(u16::from_be_bytes(raw))
        })();
        self.finish_op("read pixel", result)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn copy_paste(
        &self,
        x_src: u16,
        y_src: u16,
        x_dst: u16,
        y_dst: u16,
        width: u16,
        height: u16,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::CopyPaste {
                x_src,
                y_src,
                x_dst,
                y_dst,
                width,
                height,
            },
            ms(2000),
        );
        self.finish_op("copy paste", result)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn replace_color(
        &self,
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
        old: u16,
        new: u16,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::ReplaceColor {
                x1,
                y1,
                x2,
                y2,
                old,
                new,
            },
            ms(5000),
        );
        self.finish_op("replace color", result)
    }

    /// Pen size: 0 draws filled shapes, 1 wireframe.
    pub fn pen_size(&self, size: u8) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::PenSize { size }, ms(100));
        self.finish_op("pen size", result)
    }

    pub fn set_font(&self, font: u8) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::SetFont { font }, ms(100));
        self.finish_op("set font", result)
    }

    pub fn set_opacity(&self, mode: u8) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::SetOpacity { mode }, ms(100));
        self.finish_op("set opacity", result)
    }

    pub fn show_char(&self, glyph: u8, col: u8, row: u8, color: u16) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::ShowChar {
                glyph,
                col,
                row,
                color,
            },
            ms(100),
        );
        self.finish_op("show char", result)
    }

    pub fn scale_char(
        &self,
        glyph: u8,
        x: u16,
        y: u16,
        color: u16,
        x_mul: u8,
        y_mul: u8,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::ScaleChar {
                glyph,
                x,
                y,
                color,
                x_mul,
                y_mul,
            },
            ms(5000),
        );
        self.finish_op("scale char", result)
    }

    /// Draw `text` at a text grid position. An empty string is a no-op.
    pub fn show_string(
        &self,
        col: u8,
        row: u8,
        font: u8,
        color: u16,
        text: &str,
    ) -> Result<(), DeviceError> {
        let result = if text.is_empty() {
            self.shared.check_idle()
        } else {
            self.send_for_ack(
                &Command::ShowString {
                    col,
                    row,
                    font,
                    color,
                    text,
                },
                ms(400),
            )
        };
        self.finish_op("show string", result)
    }

    /// Draw magnified `text` at a pixel position. An empty string is a
    /// no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn scale_string(
        &self,
        x: u16,
        y: u16,
        font: u8,
        color: u16,
        x_mul: u8,
        y_mul: u8,
        text: &str,
    ) -> Result<(), DeviceError> {
        let result = if text.is_empty() {
            self.shared.check_idle()
        } else {
            self.send_for_ack(
                &Command::ScaleString {
                    x,
                    y,
                    font,
                    color,
                    x_mul,
                    y_mul,
                    text,
                },
                ms(5000),
            )
        };
        self.finish_op("scale string", result)
    }

    /// Draw a labelled button. An empty label is a no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn button(
        &self,
        pressed: bool,
        x: u16,
        y: u16,
        button_color: u16,
        font: u8,
        text_color: u16,
        x_mul: u8,
        y_mul: u8,
        text: &str,
    ) -> Result<(), DeviceError> {
        let result = if text.is_empty() {
            self.shared.check_idle()
        } else {
            self.send_for_ack(
                &Command::Button {
                    pressed,
                    x,
                    y,
                    button_color,
                    font,
                    text_color,
                    x_mul,
                    y_mul,
                    text,
                },
                ms(2000),
            )
        };
        self.finish_op("button", result)
    }

    /// Request touch activity. Modes 0..=3 defer: the controller goes
    /// `Busy` and the coordinates arrive through the completion
    /// handler. Modes 4 and up reply immediately.
    pub fn get_touch(&self, mode: u8) -> Result<TouchRead, DeviceError> {
        let result = (|| {
            let mut ch = self.shared.begin()?;
            let bytes = Command::GetTouch { mode }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            if mode <= 3 {
                drop(ch);
                self.shared.go_busy(DeferredCommand::TouchData);
                return Ok(TouchRead::Pending);
            }
            let mut raw = [0u8; 4];
            read_reply(&mut ch, &mut raw, ms(100))?;
            Ok(TouchRead::Point(TouchPoint::parse(&raw)))
        })();
        self.finish_op("get touch", result)
    }

    /// Ask the device to wait for a touch press (device-side timeout in
    /// milliseconds). Always defers; the completion handler fires with
    /// success when the panel is pressed, failure on the device-side
    /// timeout (NACK).
    pub fn wait_touch(&self, timeout_ms: u16) -> Result<CommandStatus, DeviceError> {
        let result = (|| {
            let mut ch = self.shared.begin()?;
            let bytes = Command::WaitTouch { timeout_ms }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            match wait::await_ack_nack(&mut ch, Duration::ZERO)? {
                AckPoll::Ack => Ok(CommandStatus::Done),
                AckPoll::Nack => Err(DeviceError::Nack),
                AckPoll::Timeout => {
                    drop(ch);
                    self.shared.go_busy(DeferredCommand::TouchWait);
                    Ok(CommandStatus::Pending)
                }
            }
        })();
        self.finish_op("wait touch", result)
    }

    /// Restrict touch reporting to a screen region.
    pub fn set_region(&self, x1: u16, y1: u16, x2: u16, y2: u16) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::SetRegion { x1, y1, x2, y2 }, ms(200));
        self.finish_op("set region", result)
    }

    /// Flush, frame, send, and wait for the acknowledgement: the
    /// shape of every simple command.
    pub(crate) fn send_for_ack(
        &self,
        command: &Command<'_>,
        budget: Duration,
    ) -> Result<(), DeviceError> {
        let mut ch = self.shared.begin()?;
        let bytes = command.encode()?;
        ch.flush()?;
        send(&mut ch, &bytes)?;
        expect_ack(&mut ch, budget)
    }

    /// Record the operation name and message of a failure in the
    /// last-error slot; successes leave it untouched.
    pub(crate) fn finish_op<T>(
        &self,
        op: &'static str,
        result: Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        if let Err(e) = &result {
            self.shared.set_error(&format!("{op}: {e}"));
        }
        result
    }

    pub(crate) fn shared(&self) -> &Shared<L> {
        &self.shared
    }
}

impl<L: SerialLink> Drop for DisplayController<L> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Synchronize bit rates with a freshly powered device: flush, probe
/// with `U`, and wait briefly for the ACK, up to four times. This is
/// the only retried exchange in the protocol; nothing else runs
/// before the link is known good.
fn autobaud<L: SerialLink>(ch: &mut SerialChannel<L>) -> Result<(), DeviceError> {
    let probe = Command::AutoBaud.encode()?;
    for attempt in 1..=AUTOBAUD_ATTEMPTS {
        let _ = ch.flush();
        match ch.write_all(&probe) {
            Ok(n) if n == probe.len() => match wait::await_ack(ch, AUTOBAUD_BUDGET) {
                Ok(true) => {
                    log::debug!("auto-baud locked on attempt {attempt}");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => log::debug!("auto-baud attempt {attempt}: {e}"),
            },
            _ => thread::sleep(Duration::from_micros(20)),
        }
    }
    log::warn!("auto-baud timed out, no ACK received");
    Err(DeviceError::Timeout(AUTOBAUD_BUDGET))
}
