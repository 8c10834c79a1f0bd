//! WAL image builder for tests and benchmarks.
//!
//! Produces byte-exact SQLite WAL files with correct cumulative checksums, and
//! lets individual frames be damaged in the ways recovery has to cope with.

use crate::checksum::WalChecksum;
use crate::frame::{FrameHeader, WalHeader, WalSalt, WAL_FORMAT_VERSION, WAL_MAGIC_BE, WAL_MAGIC_LE};
use crate::{FRAME_HEADER_SIZE, WAL_HEADER_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use std::path::Path;

#[derive(Debug, Clone)]
enum Damage {
    None,
    Checksum,
    Salt(WalSalt),
}

#[derive(Debug, Clone)]
struct PendingFrame {
    page_number: u32,
    commit_size: u32,
    page: Vec<u8>,
    damage: Damage,
}

/// Builds WAL file images.
#[derive(Debug, Clone)]
pub struct WalBuilder {
    page_size: u32,
    big_endian: bool,
    salt: WalSalt,
    checkpoint_sequence: u32,
    frames: Vec<PendingFrame>,
}

impl WalBuilder {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            big_endian: false,
            salt: WalSalt::new(0x5a17_0001, 0x5a17_0002),
            checkpoint_sequence: 0,
            frames: Vec::new(),
        }
    }

    pub fn with_big_endian_checksum(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    pub fn with_salt(mut self, salt: WalSalt) -> Self {
        self.salt = salt;
        self
    }

    pub fn with_checkpoint_sequence(mut self, sequence: u32) -> Self {
        self.checkpoint_sequence = sequence;
        self
    }

    /// Returns a page image filled with `fill`.
    pub fn page_image(&self, fill: u8) -> Vec<u8> {
        vec![fill; self.page_size as usize]
    }

    fn push(mut self, page_number: u32, commit_size: u32, page: Vec<u8>, damage: Damage) -> Self {
        assert_eq!(page.len(), self.page_size as usize, "page image size");
        self.frames.push(PendingFrame {
            page_number,
            commit_size,
            page,
            damage,
        });
        self
    }

    /// Appends a non-commit frame.
    pub fn frame(self, page_number: u32, page: Vec<u8>) -> Self {
        self.push(page_number, 0, page, Damage::None)
    }

    /// Appends a commit frame recording a database size of `db_size` pages.
    pub fn commit_frame(self, page_number: u32, db_size: u32, page: Vec<u8>) -> Self {
        self.push(page_number, db_size, page, Damage::None)
    }

    /// Appends a frame whose stored checksum is wrong.
    pub fn corrupt_frame(self, page_number: u32, page: Vec<u8>) -> Self {
        self.push(page_number, 0, page, Damage::Checksum)
    }

    /// Appends a frame carrying a different salt pair.
    pub fn stale_frame(self, page_number: u32, salt: WalSalt, page: Vec<u8>) -> Self {
        self.push(page_number, 0, page, Damage::Salt(salt))
    }

    pub fn frame_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.page_size as usize
    }

    /// Byte offset of frame `frameno` (1-based).
    pub fn frame_offset(&self, frameno: u32) -> u64 {
        WAL_HEADER_SIZE as u64 + (frameno as u64 - 1) * self.frame_size() as u64
    }

    /// Encodes the header and all frames.
    pub fn build(&self) -> Bytes {
        let header = WalHeader {
            magic: if self.big_endian {
                WAL_MAGIC_BE
            } else {
                WAL_MAGIC_LE
            },
            format_version: WAL_FORMAT_VERSION,
            page_size: self.page_size,
            checkpoint_sequence: self.checkpoint_sequence,
            salt: self.salt,
            checksum: WalChecksum::default(),
        };
        let encoded = header.encode();
        let mut checksum = WalHeader::decode(&encoded)
            .map(|h| h.checksum)
            .unwrap_or_default();

        let mut buf = BytesMut::with_capacity(WAL_HEADER_SIZE + self.frames.len() * self.frame_size());
        buf.put_slice(&encoded);

        for pending in &self.frames {
            let salt = match pending.damage {
                Damage::Salt(salt) => salt,
                _ => self.salt,
            };
            let (mut frame, next) = FrameHeader::encode_frame(
                pending.page_number,
                pending.commit_size,
                salt,
                &pending.page,
                checksum,
                self.big_endian,
            );
            if let Damage::Checksum = pending.damage {
                frame[23] ^= 0xff;
            }
            checksum = next;
            buf.put_slice(&frame);
        }

        buf.freeze()
    }

    /// Writes the image to `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.build())
    }
}
