//! Host-side serial transport for PICASO-class display modules.
//!
//! The device end is a three-wire link (TX, RX, GND) with no flow
//! control. This crate provides:
//!
//! - [`SerialLink`]: the transport seam. [`SystemPort`] implements it on
//!   top of the `serialport` crate; tests implement it with a scripted
//!   mock.
//! - [`SerialChannel`]: buffered reads on top of a link: deadline-bound
//!   raw reads, delimiter-terminated reads through an internal ring
//!   buffer, and the flush/drain semantics the command protocol needs.
//! - [`SerialConfig`] and friends: the port parameter vocabulary.
//!
//! Writes never block on the host side beyond what the OS requires to
//! queue the bytes; the command protocol relies on device-side framing
//! rather than host write timeouts.

#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod link;
pub mod ring;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use channel::SerialChannel;
pub use config::{DataBits, Parity, SerialConfig, StopBits};
pub use link::{SerialError, SerialLink, SystemPort};
