//! Memory-card operations.
//!
//! Two families: raw commands address the card by sector or byte
//! address; FAT commands address it by 8.3 filename. The file transfer
//! commands are the only multi-step exchanges in the protocol; the
//! payload moves in 50-byte blocks gated by ACKs, in whichever
//! direction the file is going.

use picaso_protocol::command::{FAT_BLOCK_SIZE, FAT_WRITE_UNCHUNKED_MAX};
use picaso_protocol::{Command, ACK, NACK};
use picaso_serial::SerialLink;

use crate::device::{expect_ack, ms, read_reply, send, DisplayController};
use crate::error::DeviceError;
use crate::wait::{self, AckPoll};

impl<L: SerialLink> DisplayController<L> {
    /// Initialize the memory card. NACK usually means no card.
    pub fn sd_init(&self) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::SdInit, ms(200));
        self.finish_op("sd init", result)
    }

    /// Set the card's byte-address pointer for raw byte access.
    pub fn sd_set_address(&self, addr: u32) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::SdSetAddress { addr }, ms(200));
        self.finish_op("sd set address", result)
    }

    /// Read one byte at the address pointer (the pointer advances).
    pub fn sd_read_byte(&self) -> Result<u8, DeviceError> {
        let result = (|| {
            let mut ch = self.shared().begin()?;
            let bytes = Command::SdReadByte.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            let mut raw = [0u8; 1];
            read_reply(&mut ch, &mut raw, ms(200))?;
            Ok(raw[0])
        })();
        self.finish_op("sd read byte", result)
    }

    /// Write one byte at the address pointer (the pointer advances).
    pub fn sd_write_byte(&self, value: u8) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::SdWriteByte { value }, ms(200));
        self.finish_op("sd write byte", result)
    }

    /// Read a full 512-byte sector.
    pub fn sd_read_sector(&self, sector: u32) -> Result<Box<[u8; 512]>, DeviceError> {
        let result = (|| {
            let mut ch = self.shared().begin()?;
            let bytes = Command::SdReadSector { sector }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            let mut data = Box::new([0u8; 512]);
            read_reply(&mut ch, data.as_mut_slice(), ms(500))?;
            Ok(data)
        })();
        self.finish_op("sd read sector", result)
    }

    /// Write a full 512-byte sector.
    pub fn sd_write_sector(&self, sector: u32, data: &[u8]) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::SdWriteSector { sector, data }, ms(200));
        self.finish_op("sd write sector", result)
    }

    /// Copy a screen region to the card at a sector address.
    pub fn sd_screen_copy(
        &self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        sector: u32,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::SdScreenCopy {
                x,
                y,
                width,
                height,
                sector,
            },
            ms(200),
        );
        self.finish_op("sd screen copy", result)
    }

    /// Display an image stored at a sector address.
    #[allow(clippy::too_many_arguments)]
    pub fn sd_show_image(
        &self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        color_mode: u8,
        sector: u32,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::SdShowImage {
                x,
                y,
                width,
                height,
                color_mode,
                sector,
            },
            ms(200),
        );
        self.finish_op("sd show image", result)
    }

    /// Display an object stored at a byte address.
    pub fn sd_show_object(&self, addr: u32) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::SdShowObject { addr }, ms(200));
        self.finish_op("sd show object", result)
    }

    /// Play a video stored at a sector address (new-format image data).
    pub fn sd_show_video(
        &self,
        x: u16,
        y: u16,
        delay: u8,
        sector: u32,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::SdShowVideo {
                x,
                y,
                delay,
                sector,
            },
            ms(200),
        );
        self.finish_op("sd show video", result)
    }

    /// Play a video stored at a sector address (old-format image data,
    /// which needs the geometry spelled out).
    #[allow(clippy::too_many_arguments)]
    pub fn sd_show_video_legacy(
        &self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        color_mode: u8,
        delay: u8,
        frames: u16,
        sector: u32,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::SdShowVideoLegacy {
                x,
                y,
                width,
                height,
                color_mode,
                delay,
                frames,
                sector,
            },
            ms(200),
        );
        self.finish_op("sd show video", result)
    }

    /// Launch a 4DSL script stored at a byte address. The device only
    /// speaks up if the launch fails, so success is a quiet line.
    pub fn sd_run_script(&self, addr: u32) -> Result<(), DeviceError> {
        let result = (|| {
            let mut ch = self.shared().begin()?;
            let bytes = Command::SdRunScript { addr }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;
            if wait::await_nack(&mut ch, ms(200))? {
                return Err(DeviceError::Nack);
            }
            Ok(())
        })();
        self.finish_op("sd run script", result)
    }

    /// Read a whole file from the card.
    ///
    /// The device answers with the 4-byte file size (or a bare NACK if
    /// there is no such file), then streams 50-byte blocks, each
    /// requested by a host-sent ACK, and closes with a final ACK. Any
    /// timeout mid-stream aborts the transfer.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>, DeviceError> {
        let result = (|| {
            let mut ch = self.shared().begin()?;
            let bytes = Command::FatReadFile { name }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;

            let mut head = [0u8; 4];
            let n = ch.read(&mut head, ms(500), None)?;
            if n == 0 {
                // Cancel the transaction so the device is not left
                // waiting for block requests.
                let _ = ch.write_all(&[NACK]);
                return Err(DeviceError::Timeout(ms(500)));
            }
            if n == 1 && head[0] == NACK {
                return Err(DeviceError::Nack); // no such file
            }
            if n != 4 {
                let _ = ch.write_all(&[NACK]);
                return Err(DeviceError::ShortResponse {
                    expected: 4,
                    got: n,
                });
            }

            let size = u32::from_be_bytes(head) as usize;
            if size == 0 {
                let _ = ch.write_all(&[NACK]);
                return Ok(Vec::new());
            }

            let mut data = vec![0u8; size];
            let mut offset = 0;
            while offset < size {
                let block = (size - offset).min(FAT_BLOCK_SIZE);
                send(&mut ch, &[ACK])?;
                let mut got = 0;
                while got < block {
                    let n = ch.read(&mut data[offset + got..offset + block], ms(500), None)?;
                    if n == 0 {
                        return Err(DeviceError::Timeout(ms(500)));
                    }
                    got += n;
                }
                offset += block;
            }

            if !wait::await_ack(&mut ch, ms(100))? {
                return Err(DeviceError::Timeout(ms(100)));
            }
            Ok(data)
        })();
        self.finish_op("read file", result)
    }

    /// Write (or append to) a file on the card.
    ///
    /// Files up to 100 bytes go down in one unhandshaked block; larger
    /// ones move in 50-byte blocks, each preceded by a device ACK. A
    /// NACK before the first block means the file could not be opened;
    /// a NACK mid-stream is a protocol fault.
    pub fn write_file(&self, name: &str, data: &[u8], append: bool) -> Result<(), DeviceError> {
        let result = (|| {
            let mut ch = self.shared().begin()?;
            let bytes = Command::FatWriteFile {
                name,
                size: data.len() as u32,
                append,
            }
            .encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;

            let block = if data.len() <= FAT_WRITE_UNCHUNKED_MAX {
                data.len().max(1)
            } else {
                FAT_BLOCK_SIZE
            };
            for (i, chunk) in data.chunks(block).enumerate() {
                match wait::await_ack_nack(&mut ch, ms(1000))? {
                    AckPoll::Ack => {}
                    AckPoll::Nack if i == 0 => return Err(DeviceError::Nack),
                    AckPoll::Nack => {
                        return Err(DeviceError::Protocol(format!("NACK after block {}", i + 1)))
                    }
                    AckPoll::Timeout => return Err(DeviceError::Timeout(ms(1000))),
                }
                send(&mut ch, chunk)?;
            }
            expect_ack(&mut ch, ms(1000))
        })();
        self.finish_op("write file", result)
    }

    /// Erase a file from the card.
    pub fn erase_file(&self, name: &str) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::FatEraseFile { name }, ms(200));
        self.finish_op("erase file", result)
    }

    /// List directory entries matching `pattern` (wildcards per the
    /// device's FAT implementation).
    ///
    /// Entries stream back separated by LF; an ACK ends the listing
    /// and a NACK aborts it.
    pub fn list_dir(&self, pattern: &str) -> Result<Vec<String>, DeviceError> {
        let result = (|| {
            let mut ch = self.shared().begin()?;
            let bytes = Command::FatListDir { pattern }.encode()?;
            ch.flush()?;
            send(&mut ch, &bytes)?;

            let mut entries = Vec::new();
            let mut current = Vec::new();
            let mut buf = [0u8; 512];
            loop {
                let n = ch.read(&mut buf, ms(500), None)?;
                if n == 0 {
                    return Err(DeviceError::Timeout(ms(500)));
                }
                for &b in &buf[..n] {
                    match b {
                        b'\n' => {
                            if !current.is_empty() {
                                entries.push(String::from_utf8_lossy(&current).into_owned());
                                current.clear();
                            }
                        }
                        ACK => {
                            if !current.is_empty() {
                                entries.push(String::from_utf8_lossy(&current).into_owned());
                            }
                            return Ok(entries);
                        }
                        NACK => {
                            return Err(DeviceError::Protocol(format!(
                                "listing aborted after {} entries (NACK)",
                                entries.len()
                            )));
                        }
                        _ => current.push(b),
                    }
                }
            }
        })();
        self.finish_op("list dir", result)
    }

    /// Copy a screen region to a file.
    pub fn screen_copy_to_file(
        &self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        name: &str,
    ) -> Result<(), DeviceError> {
        let result = self.send_for_ack(
            &Command::FatScreenCopy {
                x,
                y,
                width,
                height,
                name,
            },
            ms(200),
        );
        self.finish_op("screen copy", result)
    }

    /// Display an image from a file; `addr` selects a frame within
    /// multi-image files.
    pub fn show_image(&self, name: &str, x: u16, y: u16, addr: u32) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::FatShowImage { name, x, y, addr }, ms(200));
        self.finish_op("show image", result)
    }

    /// Play a WAV file. Options 0..=5 select play/pause/loop behavior.
    pub fn play_audio(&self, name: &str, option: u8) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::FatPlayAudio { name, option }, ms(200));
        self.finish_op("play audio", result)
    }

    /// Run a 4DSL script from a file.
    pub fn run_script(&self, name: &str) -> Result<(), DeviceError> {
        let result = self.send_for_ack(&Command::FatRunScript { name }, ms(200));
        self.finish_op("run script", result)
    }
}
