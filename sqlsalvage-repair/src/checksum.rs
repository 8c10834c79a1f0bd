//! SQLite WAL cumulative checksum.
//!
//! The checksum runs over 8-byte chunks. Each chunk is read as two u32 words
//! in the byte order selected by the WAL magic:
//!
//! ```text
//! s1 += w0 + s2
//! s2 += w1 + s1
//! ```
//!
//! The header checksum seeds the first frame, and every frame's checksum
//! seeds the next one.

use serde::Serialize;

/// A running checksum pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WalChecksum {
    pub s1: u32,
    pub s2: u32,
}

impl WalChecksum {
    pub const fn new(s1: u32, s2: u32) -> Self {
        Self { s1, s2 }
    }

    /// Folds `data` into this checksum and returns the result.
    ///
    /// Trailing bytes that do not fill a whole 8-byte chunk are ignored; every
    /// input the WAL format feeds in is a multiple of 8.
    pub fn update(self, data: &[u8], big_endian: bool) -> Self {
        let mut s1 = self.s1;
        let mut s2 = self.s2;

        for chunk in data.chunks_exact(8) {
            let (w0, w1) = if big_endian {
                (
                    u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                    u32::from_be_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
                )
            } else {
                (
                    u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                    u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
                )
            };
            s1 = s1.wrapping_add(w0).wrapping_add(s2);
            s2 = s2.wrapping_add(w1).wrapping_add(s1);
        }

        Self { s1, s2 }
    }
}

/// Whether the host reads checksum words in the given order natively.
pub fn is_native_order(big_endian: bool) -> bool {
    big_endian == cfg!(target_endian = "big")
}
