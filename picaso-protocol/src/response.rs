//! Reply packet decoding.
//!
//! The device answers most commands with a single acknowledgement byte;
//! a handful reply with fixed-width packets decoded here.

/// Positive acknowledgement.
pub const ACK: u8 = 0x06;

/// Negative acknowledgement.
pub const NACK: u8 = 0x15;

/// Display technology reported in the version packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    Oled,
    Lcd,
    Vga,
    Unknown(u8),
}

impl From<u8> for DisplayKind {
    fn from(byte: u8) -> Self {
        match byte {
            0 => DisplayKind::Oled,
            1 => DisplayKind::Lcd,
            2 => DisplayKind::Vga,
            other => DisplayKind::Unknown(other),
        }
    }
}

/// Decoded `V` (version) reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub kind: DisplayKind,
    pub hardware_rev: u8,
    pub firmware_rev: u8,
    /// Horizontal resolution in pixels; 0 if the code is unrecognized.
    pub horizontal_res: u32,
    /// Vertical resolution in pixels; 0 if the code is unrecognized.
    pub vertical_res: u32,
}

impl VersionInfo {
    /// Decode the 5-byte version packet.
    pub fn parse(raw: &[u8; 5]) -> Self {
        VersionInfo {
            kind: raw[0].into(),
            hardware_rev: raw[1],
            firmware_rev: raw[2],
            horizontal_res: resolution(raw[3]),
            vertical_res: resolution(raw[4]),
        }
    }
}

/// Map a resolution code byte to a pixel count.
///
/// The table is sparse and the codes read like decimal numbers written
/// in hex (0x32 means 320). Unknown codes map to 0.
pub fn resolution(code: u8) -> u32 {
    match code {
        0x22 => 220,
        0x24 => 240,
        0x28 => 128,
        0x32 => 320,
        0x60 => 160,
        0x64 => 64,
        0x76 => 176,
        0x96 => 96,
        _ => 0,
    }
}

/// A touch coordinate pair, or the status/coordinate words of the
/// status-reporting touch modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    pub x: u16,
    pub y: u16,
}

impl TouchPoint {
    /// Decode the 4-byte touch reply (two big-endian u16 words).
    pub fn parse(raw: &[u8; 4]) -> Self {
        TouchPoint {
            x: u16::from_be_bytes([raw[0], raw[1]]),
            y: u16::from_be_bytes([raw[2], raw[3]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_decode() {
        let info = VersionInfo::parse(&[0x00, 0x05, 0x03, 0x32, 0x24]);
        assert_eq!(info.kind, DisplayKind::Oled);
        assert_eq!(info.hardware_rev, 5);
        assert_eq!(info.firmware_rev, 3);
        assert_eq!(info.horizontal_res, 320);
        assert_eq!(info.vertical_res, 240);
    }

    #[test]
    fn test_version_unknown_kind() {
        let info = VersionInfo::parse(&[0x07, 0x00, 0x00, 0x22, 0x28]);
        assert_eq!(info.kind, DisplayKind::Unknown(7));
        assert_eq!(info.horizontal_res, 220);
        assert_eq!(info.vertical_res, 128);
    }

    #[test]
    fn test_resolution_table() {
        let documented = [
            (0x22, 220),
            (0x24, 240),
            (0x28, 128),
            (0x32, 320),
            (0x60, 160),
            (0x64, 64),
            (0x76, 176),
            (0x96, 96),
        ];
        for (code, pixels) in documented {
            assert_eq!(resolution(code), pixels);
        }
        for code in 0..=255u8 {
            if !documented.iter().any(|&(c, _)| c == code) {
                assert_eq!(resolution(code), 0, "code {code:#04x}");
            }
        }
    }

    #[test]
    fn test_touch_decode() {
        let point = TouchPoint::parse(&[0x00, 0x50, 0x00, 0x80]);
        assert_eq!(point.x, 0x0050);
        assert_eq!(point.y, 0x0080);
        let point = TouchPoint::parse(&[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(point.x, 0x0102);
        assert_eq!(point.y, 0x0304);
    }
}
