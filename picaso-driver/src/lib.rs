//! Driver for 4D Systems PICASO-class serial graphics displays.
//!
//! Connect over a serial device, draw, and handle deferred events:
//!
//! ```no_run
//! use picaso_driver::DisplayController;
//!
//! # fn main() -> Result<(), picaso_driver::DeviceError> {
//! let display = DisplayController::connect("/dev/ttyUSB0")?;
//! let version = display.version(false)?;
//! println!("{:?} {}x{}", version.kind, version.horizontal_res, version.vertical_res);
//!
//! display.clear()?;
//! display.rectangle(10, 10, 100, 100, 0xF800)?;
//! # Ok(()) }
//! ```
//!
//! Commands that block on an external event (sleep with wake
//! conditions, touch waits) return immediately with the controller
//! `Busy`; a background worker consumes the eventual device response
//! and delivers a [`Completion`] to the registered handler. Closing the
//! controller during a deferred command cancels it (the handler fires
//! with `success = false`) and always restores the device to its 9600
//! baud power-up rate first.

#![deny(unsafe_code)]

pub mod device;
pub mod error;
pub mod state;
pub mod worker;

mod sd;
mod wait;

pub use device::{CommandStatus, DisplayController, TouchRead};
pub use error::DeviceError;
pub use state::{DeferredCommand, Readiness};
pub use worker::{Completion, CompletionHandler};

pub use picaso_protocol::{
    BaudCode, Command, DisplayKind, EncodeError, TouchPoint, VersionInfo, ACK, NACK,
};
pub use picaso_serial::{SerialConfig, SerialError, SerialLink, SystemPort};
