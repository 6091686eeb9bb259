//! Serial command protocol for the PICASO family of graphics processors
//! (4D Systems uOLED / uLCD / uVGA panels, 220x220 through 320x240).
//!
//! The device speaks a compact binary protocol over a three-wire serial
//! link. Every command is one or two ASCII opcode bytes followed by
//! fixed-width arguments and an optional inline payload:
//!
//! ```text
//! ┌─────────┬──────────────────────┬──────────────┐
//! │ OPCODE  │ ARGUMENTS            │ PAYLOAD      │
//! │ 1–2B    │ u8 as-is, u16/u24/   │ bitmap data, │
//! │         │ u32 big-endian       │ text, pixels │
//! └─────────┴──────────────────────┴──────────────┘
//! ```
//!
//! The device answers with a single-byte acknowledgement (`ACK` = 0x06,
//! `NACK` = 0x15) or a fixed-width reply packet (version info, pixel
//! color, touch coordinates, sector data).
//!
//! This crate is pure: it turns typed commands into their exact byte
//! image and reply packets into typed values, and performs all argument
//! validation so that an invalid command never produces bytes at all.
//! It does no I/O; the serial transport and the command/response state
//! machine live in `picaso-serial` and `picaso-driver`.

#![deny(unsafe_code)]

pub mod baud;
pub mod command;
pub mod response;

pub use baud::BaudCode;
pub use command::{Command, EncodeError, FILENAME_MAX, TEXT_MAX};
pub use response::{resolution, DisplayKind, TouchPoint, VersionInfo, ACK, NACK};
