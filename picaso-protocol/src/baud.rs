//! Bit-rate codes for the `Q` (set baud) command.

/// Bit rates the device accepts, with their single-byte wire codes.
///
/// The device boots at 9600 baud and switches when it receives a `Q`
/// command; the reply to `Q` is still transmitted at the old rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudCode {
    B9600,
    B57600,
    B115200,
    B128000,
    B256000,
}

impl BaudCode {
    /// The byte sent as the `Q` command argument.
    pub fn wire(self) -> u8 {
        match self {
            BaudCode::B9600 => 0x06,
            BaudCode::B57600 => 0x0C,
            BaudCode::B115200 => 0x0D,
            BaudCode::B128000 => 0x0E,
            BaudCode::B256000 => 0x0F,
        }
    }

    /// The rate in bits per second.
    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudCode::B9600 => 9_600,
            BaudCode::B57600 => 57_600,
            BaudCode::B115200 => 115_200,
            BaudCode::B128000 => 128_000,
            BaudCode::B256000 => 256_000,
        }
    }

    /// Whether a POSIX host can actually run at this rate.
    ///
    /// 128000 and 256000 are Windows-only line speeds; they must be
    /// rejected on the host side before any bytes reach the device,
    /// otherwise the device would switch and the host could not follow.
    pub fn host_supported(self) -> bool {
        !matches!(self, BaudCode::B128000 | BaudCode::B256000)
    }

    /// The fastest rate usable on this host. The connect handshake
    /// raises the link to this after auto-baud at 9600 succeeds.
    pub const MAX_HOST: BaudCode = BaudCode::B115200;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(BaudCode::B9600.wire(), 0x06);
        assert_eq!(BaudCode::B57600.wire(), 0x0C);
        assert_eq!(BaudCode::B115200.wire(), 0x0D);
        assert_eq!(BaudCode::B128000.wire(), 0x0E);
        assert_eq!(BaudCode::B256000.wire(), 0x0F);
    }

    #[test]
    fn test_host_support() {
        assert!(BaudCode::B9600.host_supported());
        assert!(BaudCode::B115200.host_supported());
        assert!(!BaudCode::B128000.host_supported());
        assert!(!BaudCode::B256000.host_supported());
    }
}
