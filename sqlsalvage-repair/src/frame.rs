//! WAL header and frame header codecs.
//!
//! A WAL file starts with a 32-byte header followed by frames. All fields are
//! big-endian regardless of the checksum byte order:
//!
//! ```text
//! WAL header
//! +----------+----------+-----------+------------+---------+---------+---------+---------+
//! | magic    | version  | page size | checkpoint | salt1   | salt2   | cksum1  | cksum2  |
//! | 4 bytes  | 4 bytes  | 4 bytes   | 4 bytes    | 4 bytes | 4 bytes | 4 bytes | 4 bytes |
//! +----------+----------+-----------+------------+---------+---------+---------+---------+
//!
//! Frame header (followed by page-size bytes of page data)
//! +----------+-------------+---------+---------+---------+---------+
//! | page no  | commit size | salt1   | salt2   | cksum1  | cksum2  |
//! | 4 bytes  | 4 bytes     | 4 bytes | 4 bytes | 4 bytes | 4 bytes |
//! +----------+-------------+---------+---------+---------+---------+
//! ```

use crate::checksum::WalChecksum;
use crate::{FRAME_HEADER_SIZE, WAL_HEADER_SIZE};
use bytes::{BufMut, BytesMut};
use serde::Serialize;

/// Magic for a WAL whose checksum words are little-endian.
pub const WAL_MAGIC_LE: u32 = 0x377f_0682;

/// Magic for a WAL whose checksum words are big-endian.
pub const WAL_MAGIC_BE: u32 = 0x377f_0683;

/// WAL format version written by SQLite 3.7.0 and later.
pub const WAL_FORMAT_VERSION: u32 = 3_007_000;

/// Bytes of the frame header covered by the frame checksum.
pub const FRAME_CHECKSUM_PREFIX: usize = 8;

/// Bytes of the WAL header covered by the header checksum.
pub const HEADER_CHECKSUM_PREFIX: usize = 24;

/// Salt pair copied from the WAL header into every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WalSalt {
    pub salt1: u32,
    pub salt2: u32,
}

impl WalSalt {
    pub const fn new(salt1: u32, salt2: u32) -> Self {
        Self { salt1, salt2 }
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// A parsed WAL header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalHeader {
    pub magic: u32,
    pub format_version: u32,
    pub page_size: u32,
    pub checkpoint_sequence: u32,
    pub salt: WalSalt,
    pub checksum: WalChecksum,
}

impl WalHeader {
    /// Decodes a header. Returns `None` if `buf` is shorter than a header.
    ///
    /// The magic is not validated here; see [`WalHeader::big_endian_checksum`].
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < WAL_HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: read_u32(buf, 0),
            format_version: read_u32(buf, 4),
            page_size: read_u32(buf, 8),
            checkpoint_sequence: read_u32(buf, 12),
            salt: WalSalt::new(read_u32(buf, 16), read_u32(buf, 20)),
            checksum: WalChecksum::new(read_u32(buf, 24), read_u32(buf, 28)),
        })
    }

    /// Returns the checksum byte order selected by the magic, or `None` if the
    /// magic is not a WAL magic.
    pub fn big_endian_checksum(&self) -> Option<bool> {
        match self.magic {
            WAL_MAGIC_LE => Some(false),
            WAL_MAGIC_BE => Some(true),
            _ => None,
        }
    }

    /// Encodes the header, computing its checksum from the other fields.
    ///
    /// The stored `checksum` is ignored; the returned header bytes carry the
    /// computed one. `magic` must be one of the two WAL magics.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(WAL_HEADER_SIZE);
        buf.put_u32(self.magic);
        buf.put_u32(self.format_version);
        buf.put_u32(self.page_size);
        buf.put_u32(self.checkpoint_sequence);
        buf.put_u32(self.salt.salt1);
        buf.put_u32(self.salt.salt2);

        let big_endian = self.magic == WAL_MAGIC_BE;
        let checksum = WalChecksum::default().update(&buf[..HEADER_CHECKSUM_PREFIX], big_endian);
        buf.put_u32(checksum.s1);
        buf.put_u32(checksum.s2);
        buf
    }
}

/// A parsed WAL frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub page_number: u32,
    /// Database size in pages after this commit; zero for non-commit frames.
    pub commit_size: u32,
    pub salt: WalSalt,
    pub checksum: WalChecksum,
}

impl FrameHeader {
    /// Decodes a frame header. Returns `None` if `buf` is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        Some(Self {
            page_number: read_u32(buf, 0),
            commit_size: read_u32(buf, 4),
            salt: WalSalt::new(read_u32(buf, 8), read_u32(buf, 12)),
            checksum: WalChecksum::new(read_u32(buf, 16), read_u32(buf, 20)),
        })
    }

    pub fn is_commit(&self) -> bool {
        self.commit_size != 0
    }

    /// Computes the checksum of a frame given the previous running checksum.
    ///
    /// `frame` is the full frame: header followed by the page.
    pub fn compute_checksum(frame: &[u8], previous: WalChecksum, big_endian: bool) -> WalChecksum {
        previous
            .update(&frame[..FRAME_CHECKSUM_PREFIX], big_endian)
            .update(&frame[FRAME_HEADER_SIZE..], big_endian)
    }

    /// Encodes a full frame (header + page), returning it together with the
    /// new running checksum.
    pub fn encode_frame(
        page_number: u32,
        commit_size: u32,
        salt: WalSalt,
        page: &[u8],
        previous: WalChecksum,
        big_endian: bool,
    ) -> (BytesMut, WalChecksum) {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + page.len());
        buf.put_u32(page_number);
        buf.put_u32(commit_size);
        buf.put_u32(salt.salt1);
        buf.put_u32(salt.salt2);
        buf.put_u64(0);
        buf.put_slice(page);

        let checksum = Self::compute_checksum(&buf, previous, big_endian);
        buf[16..20].copy_from_slice(&checksum.s1.to_be_bytes());
        buf[20..24].copy_from_slice(&checksum.s2.to_be_bytes());
        (buf, checksum)
    }
}
