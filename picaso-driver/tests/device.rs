//! End-to-end driver scenarios against a scripted mock device.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use picaso_driver::{
    BaudCode, CommandStatus, DeferredCommand, DeviceError, DisplayController, DisplayKind,
    Readiness, SerialError, SerialLink, TouchPoint, TouchRead, ACK, NACK,
};
use picaso_serial::mock::{MockHandle, MockLink};

/// A mock that handles the connect handshake (ACK to the auto-baud
/// probe, the firmware's usual 0xFF to a baud switch) and defers the
/// rest to a per-test script.
fn standard_link(
    mut script: impl FnMut(&[u8], &mut VecDeque<u8>) + Send + 'static,
) -> (MockLink, MockHandle) {
    let link = MockLink::new().respond_with(move |bytes, queue| match bytes {
        [b'U'] => queue.push_back(ACK),
        [b'Q', _] => queue.push_back(0xFF),
        _ => script(bytes, queue),
    });
    let handle = link.handle();
    (link, handle)
}

fn ack_everything(_: &[u8], queue: &mut VecDeque<u8>) {
    queue.push_back(ACK);
}

#[test]
fn test_connect_then_version_roundtrip() {
    let (link, handle) = standard_link(|bytes, queue| {
        if let [b'V', _] = bytes {
            queue.extend([0x02, 0x0A, 0x01, 0x22, 0x28]);
        }
    });
    let mut display = DisplayController::connect_link(link).unwrap();
    assert_eq!(display.readiness(), Readiness::Idle);
    assert_eq!(handle.baud(), 115_200);

    let version = display.version(false).unwrap();
    assert_eq!(version.kind, DisplayKind::Vga);
    assert_eq!(version.hardware_rev, 10);
    assert_eq!(version.firmware_rev, 1);
    assert_eq!(version.horizontal_res, 220);
    assert_eq!(version.vertical_res, 128);

    display.close();
    assert_eq!(display.readiness(), Readiness::Inactive);
    // close put the device back at its power-up rate
    assert_eq!(handle.baud(), 9_600);
}

#[test]
fn test_clear_and_rectangle_byte_exact() {
    let (link, handle) = standard_link(ack_everything);
    let display = DisplayController::connect_link(link).unwrap();
    handle.clear_written();

    display.clear().unwrap();
    display.rectangle(0, 0, 0x10, 0x10, 0xF800).unwrap();

    assert_eq!(
        handle.written(),
        [
            0x45, // 'E'
            0x72, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x10, 0xF8, 0x00,
        ]
    );
}

#[test]
fn test_deferred_touch_data() {
    let (link, handle) = standard_link(|_, _| {});
    let display = DisplayController::connect_link(link).unwrap();

    let (tx, rx) = mpsc::channel();
    let context = String::from("touch context");
    display
        .on_completion(move |completion| {
            tx.send((context.clone(), *completion)).unwrap();
        })
        .unwrap();

    assert_eq!(display.get_touch(0).unwrap(), TouchRead::Pending);
    assert_eq!(display.readiness(), Readiness::Busy);
    // commands are rejected while the touch request is in flight
    assert!(matches!(display.clear(), Err(DeviceError::Busy)));

    thread::sleep(Duration::from_millis(200));
    handle.push(&[0x00, 0x50, 0x00, 0x80]);

    let (context, completion) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(context, "touch context");
    assert_eq!(completion.command, DeferredCommand::TouchData);
    assert!(completion.success);
    assert_eq!(completion.touch, Some(TouchPoint { x: 0x50, y: 0x80 }));
    assert_eq!(display.readiness(), Readiness::Idle);
}

#[test]
fn test_invalid_volume_sends_nothing() {
    let (link, handle) = standard_link(ack_everything);
    let display = DisplayController::connect_link(link).unwrap();
    handle.clear_written();

    let err = display.set_volume(5).unwrap_err();
    assert!(matches!(err, DeviceError::Encode(_)));
    assert!(handle.written().is_empty());
    let message = display.last_error().unwrap();
    assert!(message.contains("0..3, 8..127, 253..255"), "{message}");

    display.clear_error();
    assert!(display.last_error().is_none());
}

#[test]
fn test_read_file_streams_blocks() {
    let payload: Vec<u8> = (0..100u8).collect();
    let mut blocks: VecDeque<Vec<u8>> = payload.chunks(50).map(|c| c.to_vec()).collect();
    let (link, _handle) = standard_link(move |bytes, queue| match bytes {
        [b'@', b'a', 50, rest @ ..] => {
            assert_eq!(rest, &b"TEST.TXT\0"[..]);
            queue.extend(100u32.to_be_bytes());
        }
        [ACK] => {
            if let Some(block) = blocks.pop_front() {
                queue.extend(block.iter().copied());
                if blocks.is_empty() {
                    queue.push_back(ACK);
                }
            }
        }
        _ => {}
    });
    let display = DisplayController::connect_link(link).unwrap();

    let data = display.read_file("TEST.TXT").unwrap();
    assert_eq!(data, (0..100u8).collect::<Vec<_>>());
}

#[test]
fn test_read_file_missing() {
    let (link, _handle) = standard_link(|bytes, queue| {
        if let [b'@', b'a', ..] = bytes {
            queue.push_back(NACK);
        }
    });
    let display = DisplayController::connect_link(link).unwrap();
    assert!(matches!(
        display.read_file("NOPE.TXT"),
        Err(DeviceError::Nack)
    ));
}

#[test]
fn test_close_cancels_deferred_command() {
    let (link, _handle) = standard_link(|_, _| {});
    let mut display = DisplayController::connect_link(link).unwrap();

    let (tx, rx) = mpsc::channel();
    display
        .on_completion(move |completion| {
            tx.send(*completion).unwrap();
        })
        .unwrap();

    assert_eq!(display.wait_touch(5000).unwrap(), CommandStatus::Pending);
    assert_eq!(display.readiness(), Readiness::Busy);

    display.close();

    let completion = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(completion.command, DeferredCommand::TouchWait);
    assert!(!completion.success);
    assert_eq!(display.readiness(), Readiness::Inactive);
    assert_eq!(display.last_error().as_deref(), Some("port is closing"));
}

#[test]
fn test_completion_fires_exactly_once() {
    let (link, handle) = standard_link(|_, _| {});
    let mut display = DisplayController::connect_link(link).unwrap();

    let (tx, rx) = mpsc::channel();
    display
        .on_completion(move |completion| {
            tx.send(*completion).unwrap();
        })
        .unwrap();

    // No wake bits acked within the budget: suspend defers.
    assert_eq!(display.suspend(0x02, 0).unwrap(), CommandStatus::Pending);
    handle.push(&[ACK]);

    let completion = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(completion.command, DeferredCommand::Sleep);
    assert!(completion.success);
    assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());

    display.close();
    // the cancelled-command path must not fire for an idle controller
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_deferred_nack_reports_failure() {
    let (link, handle) = standard_link(|_, _| {});
    let display = DisplayController::connect_link(link).unwrap();

    let (tx, rx) = mpsc::channel();
    display
        .on_completion(move |completion| {
            tx.send(*completion).unwrap();
        })
        .unwrap();

    assert_eq!(display.wait_touch(100).unwrap(), CommandStatus::Pending);
    handle.push(&[NACK]);

    let completion = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(completion.command, DeferredCommand::TouchWait);
    assert!(!completion.success);
    assert_eq!(display.last_error().as_deref(), Some("NACK"));
}

#[test]
fn test_commands_rejected_when_inactive() {
    let (link, _handle) = standard_link(ack_everything);
    let mut display = DisplayController::connect_link(link).unwrap();
    display.close();

    assert!(matches!(display.clear(), Err(DeviceError::NotConnected)));
    assert!(matches!(
        display.version(false),
        Err(DeviceError::NotConnected)
    ));
    assert!(matches!(
        display.get_touch(0),
        Err(DeviceError::NotConnected)
    ));
}

#[test]
fn test_immediate_touch_modes() {
    let (link, _handle) = standard_link(|bytes, queue| {
        if let [b'o', mode] = bytes {
            assert!(*mode >= 4);
            queue.extend([0x01, 0x02, 0x03, 0x04]);
        }
    });
    let display = DisplayController::connect_link(link).unwrap();

    match display.get_touch(4).unwrap() {
        TouchRead::Point(point) => {
            assert_eq!(point, TouchPoint { x: 0x0102, y: 0x0304 });
        }
        TouchRead::Pending => panic!("mode 4 must reply immediately"),
    }
    assert_eq!(display.readiness(), Readiness::Idle);
}

#[test]
fn test_nack_is_distinct_from_timeout() {
    let (link, _handle) = standard_link(|bytes, queue| {
        if bytes == [b'E'] {
            queue.push_back(NACK);
        }
        // rectangles get no reply at all
    });
    let display = DisplayController::connect_link(link).unwrap();

    assert!(matches!(display.clear(), Err(DeviceError::Nack)));
    assert!(matches!(
        display.rectangle(0, 0, 1, 1, 0),
        Err(DeviceError::Timeout(_))
    ));
}

#[test]
fn test_list_dir_entries() {
    let (link, _handle) = standard_link(|bytes, queue| {
        if let [b'@', b'd', ..] = bytes {
            queue.extend(b"ALPHA.TXT\nBETA.BIN\n".iter().copied());
            queue.push_back(ACK);
        }
    });
    let display = DisplayController::connect_link(link).unwrap();

    let entries = display.list_dir("*.*").unwrap();
    assert_eq!(entries, ["ALPHA.TXT", "BETA.BIN"]);
}

#[test]
fn test_list_dir_nack_aborts() {
    let (link, _handle) = standard_link(|bytes, queue| {
        if let [b'@', b'd', ..] = bytes {
            queue.extend(b"ALPHA.TXT\n".iter().copied());
            queue.push_back(NACK);
        }
    });
    let display = DisplayController::connect_link(link).unwrap();
    assert!(matches!(
        display.list_dir("*.*"),
        Err(DeviceError::Protocol(_))
    ));
}

#[test]
fn test_write_file_handshaked_blocks() {
    // 120 bytes: header, then ACK-gated 50/50/20 blocks, then the
    // closing ACK.
    let (link, handle) = standard_link(|bytes, queue| {
        if let [b'@', b't', ..] = bytes {
            queue.push_back(ACK); // ready for block 0
        }
    });
    let display = DisplayController::connect_link(link).unwrap();
    let handle2 = handle.clone();

    let data: Vec<u8> = (0..120u8).collect();
    let feeder = thread::spawn(move || {
        // ACK each subsequent block as it lands, then the final one.
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(50));
            handle2.push(&[ACK]);
        }
    });
    display.write_file("LOG.BIN", &data, false).unwrap();
    feeder.join().unwrap();

    let written = handle.written();
    let tail = &written[written.len() - 120..];
    assert_eq!(tail, &data[..]);
}

#[test]
fn test_write_file_rejected_on_first_block() {
    let (link, _handle) = standard_link(|bytes, queue| {
        if let [b'@', b't', ..] = bytes {
            queue.push_back(NACK); // cannot open file
        }
    });
    let display = DisplayController::connect_link(link).unwrap();
    assert!(matches!(
        display.write_file("RO.BIN", &[0u8; 200], false),
        Err(DeviceError::Nack)
    ));
}

/// Delegates to a MockLink but fails the Nth rate switch, to exercise
/// the one unrecoverable path: device switched, host could not.
struct DesyncLink {
    inner: MockLink,
    switches: usize,
    fail_at: usize,
}

impl SerialLink for DesyncLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, SerialError> {
        self.inner.write(buf)
    }
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SerialError> {
        self.inner.read(buf, timeout)
    }
    fn set_baud(&mut self, baud: u32) -> Result<(), SerialError> {
        self.switches += 1;
        if self.switches == self.fail_at {
            return Err(SerialError::SpeedNotSupported(baud));
        }
        self.inner.set_baud(baud)
    }
    fn baud(&mut self) -> Result<u32, SerialError> {
        self.inner.baud()
    }
    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.inner.clear_input()
    }
    fn drain(&mut self) -> Result<(), SerialError> {
        self.inner.drain()
    }
    fn reopen(&mut self) -> Result<(), SerialError> {
        self.inner.reopen()
    }
}

#[test]
fn test_baud_desync_reported() {
    let (link, _handle) = standard_link(ack_everything);
    // Connect raises the rate with switches 1..=3 (probe, revert,
    // commit); the next commit is switch 6.
    let link = DesyncLink {
        inner: link,
        switches: 0,
        fail_at: 6,
    };
    let display = DisplayController::connect_link(link).unwrap();

    assert!(matches!(
        display.set_baud(BaudCode::B57600),
        Err(DeviceError::BaudDesync)
    ));
}

#[test]
fn test_windows_only_rates_rejected() {
    let (link, handle) = standard_link(ack_everything);
    let display = DisplayController::connect_link(link).unwrap();
    handle.clear_written();

    assert!(matches!(
        display.set_baud(BaudCode::B128000),
        Err(DeviceError::Serial(SerialError::SpeedNotSupported(_)))
    ));
    // rejected host-side: the device never saw a Q command
    assert!(handle.written().is_empty());
}
