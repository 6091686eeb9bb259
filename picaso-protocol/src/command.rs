//! Command encoding.
//!
//! Each variant of [`Command`] corresponds to one wire command. `encode`
//! validates every argument and produces the exact byte image; a command
//! that fails validation emits nothing.
//!
//! Multi-byte arguments are big-endian. Filenames travel as up to 12
//! bytes followed by a terminating NUL (the device exposes an 8.3 FAT
//! filesystem; only the length is validated here, the character set is
//! the device's problem). Text payloads are NUL-terminated and silently
//! truncated to [`TEXT_MAX`] bytes, which is all the device will accept.

use crate::baud::BaudCode;

/// Longest filename the FAT command family accepts, in bytes.
pub const FILENAME_MAX: usize = 12;

/// Longest text payload for string/button commands, in bytes.
pub const TEXT_MAX: usize = 256;

/// An argument failed validation; no bytes were produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("invalid {what} ({value}); valid values are {valid}")]
    Argument {
        what: &'static str,
        value: u32,
        valid: &'static str,
    },
    #[error("invalid data length for bitmap group {group}; length must be {expected}, got {got}")]
    BitmapLength {
        group: u8,
        expected: usize,
        got: usize,
    },
    #[error("invalid data length for color mode {mode:#04x} (got {got}, expected {expected})")]
    IconLength {
        mode: u8,
        expected: usize,
        got: usize,
    },
    #[error("invalid number of vertices ({0}); valid range is 3..7")]
    VertexCount(usize),
    #[error("polygon x and y lists differ in length ({x} vs {y})")]
    VertexMismatch { x: usize, y: usize },
    #[error("invalid filename length ({0}); must be 1..12 characters")]
    FilenameLength(usize),
    #[error("invalid sector address ({0:#010x}); must be <= 0x00ffffff")]
    SectorAddress(u32),
    #[error("sector data must be exactly 512 bytes, got {0}")]
    SectorLength(usize),
}

/// A command ready to be framed for the wire.
///
/// Payload-carrying variants borrow their data; nothing is copied until
/// `encode` builds the final byte image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `U`: auto-baud synchronization probe.
    AutoBaud,
    /// `Q`: switch the device bit rate. The reply arrives at the old rate.
    SetBaud(BaudCode),
    /// `V`: query device version; `on_screen` also renders it on the panel.
    Version { on_screen: bool },
    /// `E`: clear the screen.
    Clear,
    /// `B`: replace the background color on the entire screen.
    ReplaceBackground { color: u16 },
    /// `Y`: display control (backlight, on/off, contrast, orientation,
    /// touch control, image format, FAT protect).
    Control { mode: u8, value: u8 },
    /// `v`: set audio volume.
    SetVolume { value: u8 },
    /// `Z`: suspend (sleep). Wake conditions are encoded in `options`.
    Suspend { options: u8, duration: u8 },
    /// `i`: read a GPIO pin.
    ReadPin { pin: u8 },
    /// `y`: write a GPIO pin.
    WritePin { pin: u8, value: u8 },
    /// `a`: read the 8-bit bus.
    ReadBus,
    /// `W`: write the 8-bit bus.
    WriteBus { value: u8 },
    /// `A`: store a user bitmap (group 0: 8x8, 1: 16x16, 2: 32x32).
    AddBitmap { group: u8, index: u8, data: &'a [u8] },
    /// `D`: draw a stored user bitmap.
    DrawBitmap {
        group: u8,
        index: u8,
        x: u16,
        y: u16,
        color: u16,
    },
    /// `C`: draw a circle.
    Circle {
        x: u16,
        y: u16,
        radius: u16,
        color: u16,
    },
    /// `G`: draw a triangle.
    Triangle {
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
        x3: u16,
        y3: u16,
        color: u16,
    },
    /// `I`: blit an image; `color_mode` is 0x08 (8-bit) or 0x10 (16-bit).
    DrawIcon {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        color_mode: u8,
        pixels: &'a [u8],
    },
    /// `K`: set the background color for subsequent drawing.
    SetBackground { color: u16 },
    /// `L`: draw a line.
    Line {
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
        color: u16,
    },
    /// `g`: draw a polygon with 3..=7 vertices.
    Polygon {
        xs: &'a [u16],
        ys: &'a [u16],
        color: u16,
    },
    /// `r`: draw a rectangle.
    Rectangle {
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
        color: u16,
    },
    /// `e`: draw an ellipse.
    Ellipse {
        x: u16,
        y: u16,
        rx: u16,
        ry: u16,
        color: u16,
    },
    /// `P`: set a single pixel.
    WritePixel { x: u16, y: u16, color: u16 },
    /// `R`: read a single pixel; replies with a big-endian u16 color.
    ReadPixel { x: u16, y: u16 },
    /// `c`: copy a screen region onto another.
    CopyPaste {
        x_src: u16,
        y_src: u16,
        x_dst: u16,
        y_dst: u16,
        width: u16,
        height: u16,
    },
    /// `k`: replace one color with another inside a region.
    ReplaceColor {
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
        old: u16,
        new: u16,
    },
    /// `p`: pen size: 0 solid, 1 wireframe.
    PenSize { size: u8 },
    /// `F`: select the built-in font (0..=3).
    SetFont { font: u8 },
    /// `O`: text opacity: 0 transparent, 1 opaque.
    SetOpacity { mode: u8 },
    /// `T`: draw a character at a text grid position.
    ShowChar {
        glyph: u8,
        col: u8,
        row: u8,
        color: u16,
    },
    /// `t`: draw a magnified character at a pixel position.
    ScaleChar {
        glyph: u8,
        x: u16,
        y: u16,
        color: u16,
        x_mul: u8,
        y_mul: u8,
    },
    /// `s`: draw a string at a text grid position.
    ShowString {
        col: u8,
        row: u8,
        font: u8,
        color: u16,
        text: &'a str,
    },
    /// `S`: draw a magnified string at a pixel position.
    ScaleString {
        x: u16,
        y: u16,
        font: u8,
        color: u16,
        x_mul: u8,
        y_mul: u8,
        text: &'a str,
    },
    /// `b`: draw a button (pressed or released) with a text label.
    Button {
        pressed: bool,
        x: u16,
        y: u16,
        button_color: u16,
        font: u8,
        text_color: u16,
        x_mul: u8,
        y_mul: u8,
        text: &'a str,
    },
    /// `o`: request touch activity. Modes 0..=3 defer the 4-byte reply
    /// until a touch occurs; modes 4 and up reply immediately.
    GetTouch { mode: u8 },
    /// `w`: wait for a touch press, with a device-side timeout in ms.
    WaitTouch { timeout_ms: u16 },
    /// `u`: restrict touch detection to a region.
    SetRegion {
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
    },

    // Memory-card commands, raw (sector-addressed) family.
    /// `@i`: initialize the memory card.
    SdInit,
    /// `@A`: set the card byte-address pointer.
    SdSetAddress { addr: u32 },
    /// `@r`: read one byte at the address pointer.
    SdReadByte,
    /// `@w`: write one byte at the address pointer.
    SdWriteByte { value: u8 },
    /// `@R`: read a 512-byte sector.
    SdReadSector { sector: u32 },
    /// `@W`: write a 512-byte sector.
    SdWriteSector { sector: u32, data: &'a [u8] },
    /// `@C`: copy a screen region to the card.
    SdScreenCopy {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        sector: u32,
    },
    /// `@I`: display an image stored on the card.
    SdShowImage {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        color_mode: u8,
        sector: u32,
    },
    /// `@O`: display an object stored at a byte address.
    SdShowObject { addr: u32 },
    /// `@V`: play a video stored on the card (new-format image data).
    SdShowVideo {
        x: u16,
        y: u16,
        delay: u8,
        sector: u32,
    },
    /// `@V`: play a video stored on the card (old-format image data).
    SdShowVideoLegacy {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        color_mode: u8,
        delay: u8,
        frames: u16,
        sector: u32,
    },
    /// `@P`: run a 4DSL script at a byte address.
    SdRunScript { addr: u32 },

    // Memory-card commands, FAT16 (filename-addressed) family.
    /// `@a`: stream a file from the card to the host.
    FatReadFile { name: &'a str },
    /// `@t`: stream a file from the host to the card.
    FatWriteFile {
        name: &'a str,
        size: u32,
        append: bool,
    },
    /// `@e`: erase a file.
    FatEraseFile { name: &'a str },
    /// `@d`: list directory entries matching a pattern.
    FatListDir { pattern: &'a str },
    /// `@c`: copy a screen region to a file.
    FatScreenCopy {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        name: &'a str,
    },
    /// `@m`: display an image from a file.
    FatShowImage {
        name: &'a str,
        x: u16,
        y: u16,
        addr: u32,
    },
    /// `@l`: play a WAV file.
    FatPlayAudio { name: &'a str, option: u8 },
    /// `@p`: run a 4DSL script from a file.
    FatRunScript { name: &'a str },
}

/// Block granularity for FAT file reads, and for writes above
/// [`FAT_WRITE_UNCHUNKED_MAX`] bytes.
pub const FAT_BLOCK_SIZE: usize = 50;

/// Largest file the write command sends as a single unhandshaked block.
pub const FAT_WRITE_UNCHUNKED_MAX: usize = 100;

impl<'a> Command<'a> {
    /// Validate the arguments and build the exact wire image.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        match *self {
            Command::AutoBaud => out.push(b'U'),
            Command::SetBaud(code) => {
                out.push(b'Q');
                out.push(code.wire());
            }
            Command::Version { on_screen } => {
                out.push(b'V');
                out.push(on_screen as u8);
            }
            Command::Clear => out.push(b'E'),
            Command::ReplaceBackground { color } => {
                out.push(b'B');
                put_u16(&mut out, color);
            }
            Command::Control { mode, value } => {
                check_control(mode, value)?;
                out.push(b'Y');
                out.push(mode);
                out.push(value);
            }
            Command::SetVolume { value } => {
                // The volume register has holes: 4..=7 and 128..=252 are
                // not accepted by the firmware.
                if (value > 3 && value < 8) || (value > 127 && value < 0xFD) {
                    return Err(EncodeError::Argument {
                        what: "value for Volume Control",
                        value: value.into(),
                        valid: "0..3, 8..127, 253..255",
                    });
                }
                out.push(b'v');
                out.push(value);
            }
            Command::Suspend { options, duration } => {
                if options & 0x10 != 0 {
                    return Err(EncodeError::Argument {
                        what: "options for Suspend (Sleep)",
                        value: options.into(),
                        valid: "bit 4 (0x10) must not be set",
                    });
                }
                // Wake-on-touch combined with touch-off can never wake.
                if options & 0x2F == 0x22 {
                    return Err(EncodeError::Argument {
                        what: "options for Suspend (Sleep)",
                        value: options.into(),
                        valid: "wake on touch requires touch enabled",
                    });
                }
                out.push(b'Z');
                out.push(options);
                out.push(duration);
            }
            Command::ReadPin { pin } => {
                check_pin(pin)?;
                out.push(b'i');
                out.push(pin);
            }
            Command::WritePin { pin, value } => {
                check_pin(pin)?;
                if value > 1 {
                    return Err(EncodeError::Argument {
                        what: "pin value",
                        value: value.into(),
                        valid: "0,1",
                    });
                }
                out.push(b'y');
                out.push(pin);
                out.push(value);
            }
            Command::ReadBus => out.push(b'a'),
            Command::WriteBus { value } => {
                out.push(b'W');
                out.push(value);
            }
            Command::AddBitmap { group, index, data } => {
                check_bitmap_index(group, index)?;
                let expected = bitmap_len(group);
                if data.len() != expected {
                    return Err(EncodeError::BitmapLength {
                        group,
                        expected,
                        got: data.len(),
                    });
                }
                out.push(b'A');
                out.push(group);
                out.push(index);
                out.extend_from_slice(data);
            }
            Command::DrawBitmap {
                group,
                index,
                x,
                y,
                color,
            } => {
                check_bitmap_index(group, index)?;
                out.push(b'D');
                out.push(group);
                out.push(index);
                put_u16(&mut out, x);
                put_u16(&mut out, y);
                put_u16(&mut out, color);
            }
            Command::Circle {
                x,
                y,
                radius,
                color,
            } => {
                out.push(b'C');
                put_u16(&mut out, x);
                put_u16(&mut out, y);
                put_u16(&mut out, radius);
                put_u16(&mut out, color);
            }
            Command::Triangle {
                x1,
                y1,
                x2,
                y2,
                x3,
                y3,
                color,
            } => {
                out.push(b'G');
                for v in [x1, y1, x2, y2, x3, y3, color] {
                    put_u16(&mut out, v);
                }
            }
            Command::DrawIcon {
                x,
                y,
                width,
                height,
                color_mode,
                pixels,
            } => {
                check_color_mode(color_mode)?;
                let expected =
                    width as usize * height as usize * if color_mode == 0x10 { 2 } else { 1 };
                if pixels.len() != expected {
                    return Err(EncodeError::IconLength {
                        mode: color_mode,
                        expected,
                        got: pixels.len(),
                    });
                }
                out.push(b'I');
                put_u16(&mut out, x);
                put_u16(&mut out, y);
                put_u16(&mut out, width);
                put_u16(&mut out, height);
                out.push(color_mode);
                out.extend_from_slice(pixels);
            }
            Command::SetBackground { color } => {
                out.push(b'K');
                put_u16(&mut out, color);
            }
            Command::Line {
                x1,
                y1,
                x2,
                y2,
                color,
            } => {
                out.push(b'L');
                for v in [x1, y1, x2, y2, color] {
                    put_u16(&mut out, v);
                }
            }
            Command::Polygon { xs, ys, color } => {
                if xs.len() != ys.len() {
                    return Err(EncodeError::VertexMismatch {
                        x: xs.len(),
                        y: ys.len(),
                    });
                }
                if xs.len() < 3 || xs.len() > 7 {
                    return Err(EncodeError::VertexCount(xs.len()));
                }
                out.push(b'g');
                out.push(xs.len() as u8);
                for (&x, &y) in xs.iter().zip(ys) {
                    put_u16(&mut out, x);
                    put_u16(&mut out, y);
                }
                put_u16(&mut out, color);
            }
            Command::Rectangle {
                x1,
                y1,
                x2,
                y2,
                color,
            } => {
                out.push(b'r');
                for v in [x1, y1, x2, y2, color] {
                    put_u16(&mut out, v);
                }
            }
            Command::Ellipse { x, y, rx, ry, color } => {
                out.push(b'e');
                for v in [x, y, rx, ry, color] {
                    put_u16(&mut out, v);
                }
            }
            Command::WritePixel { x, y, color } => {
                out.push(b'P');
                put_u16(&mut out, x);
                put_u16(&mut out, y);
                put_u16(&mut out, color);
            }
            Command::ReadPixel { x, y } => {
                out.push(b'R');
                put_u16(&mut out, x);
                put_u16(&mut out, y);
            }
            Command::CopyPaste {
                x_src,
                y_src,
                x_dst,
                y_dst,
                width,
                height,
            } => {
                out.push(b'c');
                for v in [x_src, y_src, x_dst, y_dst, width, height] {
                    put_u16(&mut out, v);
                }
            }
            Command::ReplaceColor {
                x1,
                y1,
                x2,
                y2,
                old,
                new,
            } => {
                out.push(b'k');
                for v in [x1, y1, x2, y2, old, new] {
                    put_u16(&mut out, v);
                }
            }
            Command::PenSize { size } => {
                if size > 1 {
                    return Err(EncodeError::Argument {
                        what: "pen size",
                        value: size.into(),
                        valid: "0,1",
                    });
                }
                out.push(b'p');
                out.push(size);
            }
            Command::SetFont { font } => {
                if font > 3 {
                    return Err(EncodeError::Argument {
                        what: "font size",
                        value: font.into(),
                        valid: "0..3",
                    });
                }
                out.push(b'F');
                out.push(font);
            }
            Command::SetOpacity { mode } => {
                if mode > 1 {
                    return Err(EncodeError::Argument {
                        what: "text opacity mode",
                        value: mode.into(),
                        valid: "0,1",
                    });
                }
                out.push(b'O');
                out.push(mode);
            }
            Command::ShowChar {
                glyph,
                col,
                row,
                color,
            } => {
                out.push(b'T');
                out.push(glyph);
                out.push(col);
                out.push(row);
                put_u16(&mut out, color);
            }
            Command::ScaleChar {
                glyph,
                x,
                y,
                color,
                x_mul,
                y_mul,
            } => {
                out.push(b't');
                out.push(glyph);
                put_u16(&mut out, x);
                put_u16(&mut out, y);
                put_u16(&mut out, color);
                out.push(x_mul);
                out.push(y_mul);
            }
            Command::ShowString {
                col,
                row,
                font,
                color,
                text,
            } => {
                out.push(b's');
                out.push(col);
                out.push(row);
                out.push(font);
                put_u16(&mut out, color);
                put_text(&mut out, text);
            }
            Command::ScaleString {
                x,
                y,
                font,
                color,
                x_mul,
                y_mul,
                text,
            } => {
                out.push(b'S');
                put_u16(&mut out, x);
                put_u16(&mut out, y);
                out.push(font);
                put_u16(&mut out, color);
                out.push(x_mul);
                out.push(y_mul);
                put_text(&mut out, text);
            }
            Command::Button {
                pressed,
                x,
                y,
                button_color,
                font,
                text_color,
                x_mul,
                y_mul,
                text,
            } => {
                out.push(b'b');
                out.push(pressed as u8);
                put_u16(&mut out, x);
                put_u16(&mut out, y);
                put_u16(&mut out, button_color);
                out.push(font);
                put_u16(&mut out, text_color);
                out.push(x_mul);
                out.push(y_mul);
                put_text(&mut out, text);
            }
            Command::GetTouch { mode } => {
                out.push(b'o');
                out.push(mode);
            }
            Command::WaitTouch { timeout_ms } => {
                out.push(b'w');
                put_u16(&mut out, timeout_ms);
            }
            Command::SetRegion { x1, y1, x2, y2 } => {
                out.push(b'u');
                for v in [x1, y1, x2, y2] {
                    put_u16(&mut out, v);
                }
            }

            Command::SdInit => out.extend_from_slice(b"@i"),
            Command::SdSetAddress { addr } => {
                out.extend_from_slice(b"@A");
                put_u32(&mut out, addr);
            }
            Command::SdReadByte => out.extend_from_slice(b"@r"),
            Command::SdWriteByte { value } => {
                out.extend_from_slice(b"@w");
                out.push(value);
            }
            Command::SdReadSector { sector } => {
                check_sector(sector)?;
                out.extend_from_slice(b"@R");
                put_u24(&mut out, sector);
            }
            Command::SdWriteSector { sector, data } => {
                check_sector(sector)?;
                if data.len() != 512 {
                    return Err(EncodeError::SectorLength(data.len()));
                }
                out.extend_from_slice(b"@W");
                put_u24(&mut out, sector);
                out.extend_from_slice(data);
            }
            Command::SdScreenCopy {
                x,
                y,
                width,
                height,
                sector,
            } => {
                check_sector(sector)?;
                out.extend_from_slice(b"@C");
                for v in [x, y, width, height] {
                    put_u16(&mut out, v);
                }
                put_u24(&mut out, sector);
            }
            Command::SdShowImage {
                x,
                y,
                width,
                height,
                color_mode,
                sector,
            } => {
                check_sector(sector)?;
                check_color_mode(color_mode)?;
                out.extend_from_slice(b"@I");
                for v in [x, y, width, height] {
                    put_u16(&mut out, v);
                }
                out.push(color_mode);
                put_u24(&mut out, sector);
            }
            Command::SdShowObject { addr } => {
                out.extend_from_slice(b"@O");
                put_u32(&mut out, addr);
            }
            Command::SdShowVideo {
                x,
                y,
                delay,
                sector,
            } => {
                check_sector(sector)?;
                out.extend_from_slice(b"@V");
                put_u16(&mut out, x);
                put_u16(&mut out, y);
                out.push(delay);
                put_u24(&mut out, sector);
            }
            Command::SdShowVideoLegacy {
                x,
                y,
                width,
                height,
                color_mode,
                delay,
                frames,
                sector,
            } => {
                check_sector(sector)?;
                check_color_mode(color_mode)?;
                out.extend_from_slice(b"@V");
                for v in [x, y, width, height] {
                    put_u16(&mut out, v);
                }
                out.push(color_mode);
                out.push(delay);
                put_u16(&mut out, frames);
                put_u24(&mut out, sector);
            }
            Command::SdRunScript { addr } => {
                out.extend_from_slice(b"@P");
                put_u32(&mut out, addr);
            }

            Command::FatReadFile { name } => {
                out.extend_from_slice(b"@a");
                out.push(FAT_BLOCK_SIZE as u8);
                put_name(&mut out, name)?;
            }
            Command::FatWriteFile { name, size, append } => {
                // Small files go down in a single unhandshaked block;
                // anything larger is ACK-gated every 50 bytes.
                let mut handshake = if size as usize <= FAT_WRITE_UNCHUNKED_MAX {
                    0
                } else {
                    FAT_BLOCK_SIZE as u8
                };
                if append {
                    handshake |= 0x80;
                }
                out.extend_from_slice(b"@t");
                out.push(handshake);
                put_name(&mut out, name)?;
                put_u32(&mut out, size);
            }
            Command::FatEraseFile { name } => {
                out.extend_from_slice(b"@e");
                put_name(&mut out, name)?;
            }
            Command::FatListDir { pattern } => {
                out.extend_from_slice(b"@d");
                put_name(&mut out, pattern)?;
            }
            Command::FatScreenCopy {
                x,
                y,
                width,
                height,
                name,
            } => {
                out.extend_from_slice(b"@c");
                for v in [x, y, width, height] {
                    put_u16(&mut out, v);
                }
                put_name(&mut out, name)?;
            }
            Command::FatShowImage { name, x, y, addr } => {
                check_sector(addr)?;
                out.extend_from_slice(b"@m");
                put_name(&mut out, name)?;
                put_u16(&mut out, x);
                put_u16(&mut out, y);
                put_u24(&mut out, addr);
            }
            Command::FatPlayAudio { name, option } => {
                if option > 5 {
                    return Err(EncodeError::Argument {
                        what: "audio option",
                        value: option.into(),
                        valid: "0..5",
                    });
                }
                out.extend_from_slice(b"@l");
                out.push(option);
                put_name(&mut out, name)?;
            }
            Command::FatRunScript { name } => {
                out.extend_from_slice(b"@p");
                put_name(&mut out, name)?;
            }
        }
        Ok(out)
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u24(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes()[1..]);
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Append text truncated to [`TEXT_MAX`] bytes plus the terminating NUL.
fn put_text(out: &mut Vec<u8>, text: &str) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(TEXT_MAX);
    out.extend_from_slice(&bytes[..len]);
    out.push(0);
}

/// Append a validated filename plus the terminating NUL.
fn put_name(out: &mut Vec<u8>, name: &str) -> Result<(), EncodeError> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > FILENAME_MAX {
        return Err(EncodeError::FilenameLength(bytes.len()));
    }
    out.extend_from_slice(bytes);
    out.push(0);
    Ok(())
}

fn check_sector(addr: u32) -> Result<(), EncodeError> {
    if addr > 0x00FF_FFFF {
        return Err(EncodeError::SectorAddress(addr));
    }
    Ok(())
}

fn check_color_mode(mode: u8) -> Result<(), EncodeError> {
    if mode != 0x08 && mode != 0x10 {
        return Err(EncodeError::Argument {
            what: "color mode",
            value: mode.into(),
            valid: "0x08 and 0x10 only",
        });
    }
    Ok(())
}

fn check_pin(pin: u8) -> Result<(), EncodeError> {
    if pin > 15 {
        return Err(EncodeError::Argument {
            what: "pin",
            value: pin.into(),
            valid: "0..15",
        });
    }
    Ok(())
}

fn bitmap_len(group: u8) -> usize {
    match group {
        0 => 8,   // 8x8
        1 => 32,  // 16x16
        _ => 128, // 32x32
    }
}

fn check_bitmap_index(group: u8, index: u8) -> Result<(), EncodeError> {
    let max = match group {
        0 => 63,
        1 => 15,
        2 => 7,
        _ => {
            return Err(EncodeError::Argument {
                what: "group",
                value: group.into(),
                valid: "0..2",
            })
        }
    };
    if index > max {
        return Err(EncodeError::Argument {
            what: "bitmap index",
            value: index.into(),
            valid: match group {
                0 => "0..63",
                1 => "0..15",
                _ => "0..7",
            },
        });
    }
    Ok(())
}

/// The firmware accepts a sparse set of control modes. Mode 7 does not
/// exist; the valid set is 0..=6 plus 8.
fn check_control(mode: u8, value: u8) -> Result<(), EncodeError> {
    let err = |what, valid| {
        Err(EncodeError::Argument {
            what,
            value: value.into(),
            valid,
        })
    };
    match mode {
        0 => {
            if value > 1 {
                return err("value for Backlight Control", "0,1");
            }
        }
        1 => {
            if value > 1 {
                return err("value for Display ON/OFF", "0,1");
            }
        }
        2 => {} // contrast: full byte range
        3 => {
            if value > 1 {
                return err("value for Display Powerup/Shutdown", "0,1");
            }
        }
        4 => {
            if !(1..=4).contains(&value) {
                return err("value for Display Orientation", "1..4");
            }
        }
        5 => {
            if value > 2 {
                return err("value for Touch Control", "0..2");
            }
        }
        6 => {
            if value > 1 {
                return err("value for Image Format", "0,1");
            }
        }
        8 => {
            if value != 0 && value != 2 {
                return err("value for Protect FAT", "0,2");
            }
        }
        _ => {
            return Err(EncodeError::Argument {
                what: "Control Mode",
                value: mode.into(),
                valid: "0..6,8",
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_framing() {
        let bytes = Command::Rectangle {
            x1: 10,
            y1: 20,
            x2: 100,
            y2: 200,
            color: 0xF800,
        }
        .encode()
        .unwrap();
        assert_eq!(
            bytes,
            [0x72, 0x00, 0x0A, 0x00, 0x14, 0x00, 0x64, 0x00, 0xC8, 0xF8, 0x00]
        );
    }

    #[test]
    fn test_single_byte_commands() {
        assert_eq!(Command::AutoBaud.encode().unwrap(), b"U");
        assert_eq!(Command::Clear.encode().unwrap(), b"E");
        assert_eq!(Command::ReadBus.encode().unwrap(), b"a");
    }

    #[test]
    fn test_set_baud() {
        use crate::baud::BaudCode;
        let bytes = Command::SetBaud(BaudCode::B115200).encode().unwrap();
        assert_eq!(bytes, [b'Q', 0x0D]);
    }

    #[test]
    fn test_version_flag() {
        assert_eq!(
            Command::Version { on_screen: false }.encode().unwrap(),
            [b'V', 0x00]
        );
        assert_eq!(
            Command::Version { on_screen: true }.encode().unwrap(),
            [b'V', 0x01]
        );
    }

    #[test]
    fn test_circle_framing() {
        let bytes = Command::Circle {
            x: 0x0102,
            y: 0x0304,
            radius: 0x0506,
            color: 0x0708,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes, [b'C', 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    }

    #[test]
    fn test_triangle_framing() {
        let bytes = Command::Triangle {
            x1: 1,
            y1: 2,
            x2: 3,
            y2: 4,
            x3: 5,
            y3: 6,
            color: 7,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes.len(), 15);
        assert_eq!(bytes[0], b'G');
        assert_eq!(bytes[13..], [0x00, 0x07]);
    }

    #[test]
    fn test_polygon_framing() {
        let xs = [1u16, 2, 3];
        let ys = [4u16, 5, 6];
        let bytes = Command::Polygon {
            xs: &xs,
            ys: &ys,
            color: 0xFFFF,
        }
        .encode()
        .unwrap();
        // opcode + count + 3 vertex pairs + color
        assert_eq!(bytes.len(), 2 + 3 * 4 + 2);
        assert_eq!(bytes[0], b'g');
        assert_eq!(bytes[1], 3);
        assert_eq!(bytes[2..6], [0x00, 0x01, 0x00, 0x04]);
    }

    #[test]
    fn test_polygon_vertex_count() {
        let xs = [0u16; 8];
        let ys = [0u16; 8];
        assert_eq!(
            Command::Polygon {
                xs: &xs[..2],
                ys: &ys[..2],
                color: 0
            }
            .encode(),
            Err(EncodeError::VertexCount(2))
        );
        assert_eq!(
            Command::Polygon {
                xs: &xs,
                ys: &ys,
                color: 0
            }
            .encode(),
            Err(EncodeError::VertexCount(8))
        );
        assert!(matches!(
            Command::Polygon {
                xs: &xs[..3],
                ys: &ys[..4],
                color: 0
            }
            .encode(),
            Err(EncodeError::VertexMismatch { x: 3, y: 4 })
        ));
    }

    #[test]
    fn test_show_string_framing() {
        let bytes = Command::ShowString {
            col: 1,
            row: 2,
            font: 0,
            color: 0xFFFF,
            text: "Hi",
        }
        .encode()
        .unwrap();
        assert_eq!(bytes, [b's', 1, 2, 0, 0xFF, 0xFF, b'H', b'i', 0x00]);
    }

    #[test]
    fn test_text_truncation() {
        let long = "x".repeat(300);
        let bytes = Command::ShowString {
            col: 0,
            row: 0,
            font: 0,
            color: 0,
            text: &long,
        }
        .encode()
        .unwrap();
        // header (6) + 256 bytes of text + NUL
        assert_eq!(bytes.len(), 6 + TEXT_MAX + 1);
        assert_eq!(*bytes.last().unwrap(), 0x00);
    }

    #[test]
    fn test_button_framing() {
        let bytes = Command::Button {
            pressed: true,
            x: 0x0010,
            y: 0x0020,
            button_color: 0x1234,
            font: 2,
            text_color: 0x5678,
            x_mul: 1,
            y_mul: 1,
            text: "OK",
        }
        .encode()
        .unwrap();
        assert_eq!(
            bytes,
            [
                b'b', 1, 0x00, 0x10, 0x00, 0x20, 0x12, 0x34, 2, 0x56, 0x78, 1, 1, b'O', b'K', 0x00
            ]
        );
    }

    #[test]
    fn test_volume_gaps() {
        for value in [0, 3, 8, 127, 253, 255] {
            assert!(Command::SetVolume { value }.encode().is_ok(), "{value}");
        }
        for value in [4, 5, 7, 128, 200, 252] {
            assert!(Command::SetVolume { value }.encode().is_err(), "{value}");
        }
    }

    #[test]
    fn test_control_mode_seven_rejected() {
        // The firmware's mode table has a hole at 7.
        assert!(Command::Control { mode: 7, value: 0 }.encode().is_err());
        for mode in [0, 1, 2, 3, 4, 5, 6, 8] {
            let value = if mode == 4 { 1 } else { 0 };
            assert!(
                Command::Control { mode, value }.encode().is_ok(),
                "mode {mode}"
            );
        }
        assert!(Command::Control { mode: 8, value: 1 }.encode().is_err());
    }

    #[test]
    fn test_suspend_validation() {
        assert!(Command::Suspend {
            options: 0x10,
            duration: 0
        }
        .encode()
        .is_err());
        // wake-on-touch with touch-off
        assert!(Command::Suspend {
            options: 0x22,
            duration: 0
        }
        .encode()
        .is_err());
        assert!(Command::Suspend {
            options: 0x02,
            duration: 10
        }
        .encode()
        .is_ok());
    }

    #[test]
    fn test_pin_validation() {
        assert!(Command::ReadPin { pin: 15 }.encode().is_ok());
        assert!(Command::ReadPin { pin: 16 }.encode().is_err());
        assert!(Command::WritePin { pin: 0, value: 2 }.encode().is_err());
    }

    #[test]
    fn test_bitmap_groups() {
        let data8 = [0u8; 8];
        let data32 = [0u8; 32];
        let data128 = [0u8; 128];
        assert!(Command::AddBitmap {
            group: 0,
            index: 63,
            data: &data8
        }
        .encode()
        .is_ok());
        assert!(Command::AddBitmap {
            group: 0,
            index: 64,
            data: &data8
        }
        .encode()
        .is_err());
        assert!(Command::AddBitmap {
            group: 1,
            index: 15,
            data: &data32
        }
        .encode()
        .is_ok());
        assert!(Command::AddBitmap {
            group: 2,
            index: 7,
            data: &data128
        }
        .encode()
        .is_ok());
        assert!(Command::AddBitmap {
            group: 2,
            index: 8,
            data: &data128
        }
        .encode()
        .is_err());
        assert!(Command::AddBitmap {
            group: 3,
            index: 0,
            data: &data8
        }
        .encode()
        .is_err());
        // wrong payload length for the group
        assert!(Command::AddBitmap {
            group: 1,
            index: 0,
            data: &data8
        }
        .encode()
        .is_err());
    }

    #[test]
    fn test_draw_icon_length() {
        let pixels = [0u8; 8];
        assert!(Command::DrawIcon {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
            color_mode: 0x10,
            pixels: &pixels
        }
        .encode()
        .is_ok());
        assert!(Command::DrawIcon {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
            color_mode: 0x08,
            pixels: &pixels
        }
        .encode()
        .is_err());
        assert!(Command::DrawIcon {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
            color_mode: 0x09,
            pixels: &pixels
        }
        .encode()
        .is_err());
    }

    #[test]
    fn test_sd_framing() {
        assert_eq!(
            Command::SdSetAddress { addr: 0x01020304 }.encode().unwrap(),
            [b'@', b'A', 0x01, 0x02, 0x03, 0x04]
        );
        assert_eq!(
            Command::SdReadSector { sector: 0x010203 }.encode().unwrap(),
            [b'@', b'R', 0x01, 0x02, 0x03]
        );
        assert!(Command::SdReadSector { sector: 0x0100_0000 }.encode().is_err());
        let sector = [0xABu8; 512];
        let bytes = Command::SdWriteSector {
            sector: 1,
            data: &sector,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes.len(), 5 + 512);
        assert!(Command::SdWriteSector {
            sector: 1,
            data: &sector[..100]
        }
        .encode()
        .is_err());
    }

    #[test]
    fn test_fat_read_file_framing() {
        let bytes = Command::FatReadFile { name: "TEST.TXT" }.encode().unwrap();
        let mut expected = vec![b'@', b'a', 50];
        expected.extend_from_slice(b"TEST.TXT\0");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_fat_write_file_handshake() {
        let bytes = Command::FatWriteFile {
            name: "A.BIN",
            size: 100,
            append: false,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes[2], 0); // small file: unhandshaked
        let bytes = Command::FatWriteFile {
            name: "A.BIN",
            size: 101,
            append: false,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes[2], 50);
        let bytes = Command::FatWriteFile {
            name: "A.BIN",
            size: 101,
            append: true,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes[2], 50 | 0x80);
        // trailing size field, big-endian
        assert_eq!(bytes[bytes.len() - 4..], [0, 0, 0, 101]);
    }

    #[test]
    fn test_filename_length() {
        for cmd in [
            Command::FatReadFile { name: "" },
            Command::FatEraseFile { name: "" },
            Command::FatListDir { pattern: "" },
            Command::FatRunScript { name: "" },
            Command::FatReadFile {
                name: "LONGFILENAME1",
            },
        ] {
            assert!(matches!(cmd.encode(), Err(EncodeError::FilenameLength(_))));
        }
        assert!(Command::FatReadFile { name: "TWELVECHARSX" }.encode().is_ok());
    }

    #[test]
    fn test_fat_show_image_framing() {
        let bytes = Command::FatShowImage {
            name: "IMG.RAW",
            x: 1,
            y: 2,
            addr: 0x030405,
        }
        .encode()
        .unwrap();
        let mut expected = vec![b'@', b'm'];
        expected.extend_from_slice(b"IMG.RAW\0");
        expected.extend_from_slice(&[0x00, 0x01, 0x00, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_play_audio_option() {
        assert!(Command::FatPlayAudio {
            name: "S.WAV",
            option: 5
        }
        .encode()
        .is_ok());
        assert!(Command::FatPlayAudio {
            name: "S.WAV",
            option: 6
        }
        .encode()
        .is_err());
    }

    #[test]
    fn test_show_video_legacy_framing() {
        let bytes = Command::SdShowVideoLegacy {
            x: 1,
            y: 2,
            width: 3,
            height: 4,
            color_mode: 0x08,
            delay: 5,
            frames: 6,
            sector: 7,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[..2], [b'@', b'V']);
        assert_eq!(bytes[10], 0x08);
        assert_eq!(bytes[11], 5);
        assert_eq!(bytes[12..14], [0, 6]);
    }
}
