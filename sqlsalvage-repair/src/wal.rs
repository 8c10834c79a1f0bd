//! WAL recovery reader.
//!
//! [`WalReader`] validates the WAL header, then walks frames in order while
//! re-computing the cumulative checksum. Every valid frame updates the
//! recovery index (page number to the latest frame holding it). The first
//! frame that fails any check is the end of the log: nothing after it is
//! trusted, even if it looks valid.

use crate::checksum::{is_native_order, WalChecksum};
use crate::error::{ErrorRecord, RepairError};
use crate::frame::{FrameHeader, WalHeader, WalSalt, HEADER_CHECKSUM_PREFIX};
use crate::pager::{wal_path_for, PageOwner, PagerRelated};
use crate::recovery::{StopReason, WalSummary};
use crate::{FRAME_HEADER_SIZE, WAL_HEADER_SIZE};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Uninitialized,
    Initialized,
    Failed,
}

/// Reads one WAL file for a single recovery pass.
///
/// The reader borrows its page owner, owns its file handle and is not
/// `Clone`. The handle is closed when the reader is dropped, or right away if
/// initialization fails.
#[derive(Debug)]
pub struct WalReader<'p> {
    related: PagerRelated<'p>,
    state: InitState,
    path: PathBuf,
    file: Option<File>,
    file_size: u64,

    max_frame: Option<u32>,
    frames: u32,
    /// pageno -> frameno
    frame_pages: BTreeMap<u32, u32>,

    page_size: u32,
    big_endian: bool,
    salt: WalSalt,
    checksum: WalChecksum,
    checkpoint_sequence: u32,
    format_version: u32,
    last_commit_frame: u32,
    database_page_count: u32,
    stop_reason: StopReason,
}

impl<'p> WalReader<'p> {
    /// Creates a reader for the WAL belonging to `pager`. Nothing is read
    /// until [`WalReader::initialize`].
    pub fn new(pager: &'p dyn PageOwner) -> Self {
        Self {
            path: wal_path_for(pager.path()),
            page_size: pager.page_size(),
            related: PagerRelated::new(pager),
            state: InitState::Uninitialized,
            file: None,
            file_size: 0,
            max_frame: None,
            frames: 0,
            frame_pages: BTreeMap::new(),
            big_endian: false,
            salt: WalSalt::default(),
            checksum: WalChecksum::default(),
            checkpoint_sequence: 0,
            format_version: 0,
            last_commit_frame: 0,
            database_page_count: 0,
            stop_reason: StopReason::NotScanned,
        }
    }

    /// Path of the WAL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the owning database, for diagnostics.
    pub fn pager_path(&self) -> &Path {
        self.related.pager_path()
    }

    /// Limits the scan to the first `max_frame` frames.
    ///
    /// Must be called before [`WalReader::initialize`].
    pub fn set_max_frame(&mut self, max_frame: u32) -> Result<(), RepairError> {
        if self.state != InitState::Uninitialized {
            return Err(RepairError::InvalidState(
                "frame cap must be set before initialization".to_string(),
            ));
        }
        self.max_frame = Some(max_frame);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state == InitState::Initialized
    }

    /// Reads the header and scans frames.
    ///
    /// Fails only when the WAL cannot be used at all: unreadable file, bad
    /// magic, page size mismatch or bad header checksum. A WAL with no valid
    /// frames initializes successfully with an empty index.
    pub fn initialize(&mut self) -> Result<(), RepairError> {
        match self.state {
            InitState::Initialized => return Ok(()),
            InitState::Failed => {
                return Err(RepairError::InvalidState(format!(
                    "{}: initialization already failed",
                    self.path.display()
                )))
            }
            InitState::Uninitialized => {}
        }

        match self.do_initialize() {
            Ok(()) => {
                self.state = InitState::Initialized;
                tracing::info!(
                    "WAL recovered: {} frames, {} pages, stopped at {:?} ({})",
                    self.frames,
                    self.frame_pages.len(),
                    self.stop_reason,
                    self.path.display()
                );
                Ok(())
            }
            Err(e) => {
                self.state = InitState::Failed;
                self.file = None;
                self.frames = 0;
                self.frame_pages.clear();
                self.last_commit_frame = 0;
                self.database_page_count = 0;
                self.related.set_error(&e);
                Err(e)
            }
        }
    }

    fn do_initialize(&mut self) -> Result<(), RepairError> {
        let (path, file) = self.related.pager().open_wal_handle()?;
        self.path = path;

        self.file_size = file.metadata()?.len();
        if self.file_size < WAL_HEADER_SIZE as u64 {
            return Err(RepairError::ShortRead {
                offset: 0,
                expected: WAL_HEADER_SIZE,
                actual: self.file_size as usize,
            });
        }

        let mut reader = BufReader::new(&file);
        let mut buf = [0u8; WAL_HEADER_SIZE];
        reader.read_exact(&mut buf)?;

        let header = WalHeader::decode(&buf)
            .ok_or_else(|| RepairError::Corrupted("truncated WAL header".to_string()))?;
        let big_endian = header
            .big_endian_checksum()
            .ok_or_else(|| RepairError::NotAWal {
                path: self.path.clone(),
                magic: header.magic,
            })?;

        let pager_page_size = self.related.pager().page_size();
        if header.page_size != pager_page_size {
            return Err(RepairError::PageSizeMismatch {
                wal: header.page_size,
                pager: pager_page_size,
            });
        }

        let computed = WalChecksum::default().update(&buf[..HEADER_CHECKSUM_PREFIX], big_endian);
        if computed != header.checksum {
            return Err(RepairError::HeaderChecksumMismatch {
                expected: header.checksum.s1,
                expected2: header.checksum.s2,
                actual: computed.s1,
                actual2: computed.s2,
            });
        }

        self.big_endian = big_endian;
        self.page_size = header.page_size;
        self.salt = header.salt;
        self.checksum = header.checksum;
        self.checkpoint_sequence = header.checkpoint_sequence;
        self.format_version = header.format_version;

        self.stop_reason = self.scan_frames(&mut reader)?;
        drop(reader);

        self.file = Some(file);
        Ok(())
    }

    /// Walks frames from frame 1 until one fails validation, the file ends or
    /// the frame cap is reached.
    fn scan_frames(&mut self, reader: &mut impl Read) -> Result<StopReason, RepairError> {
        let frame_size = self.frame_size() as u64;
        let mut buf = vec![0u8; frame_size as usize];
        let mut offset = WAL_HEADER_SIZE as u64;
        let mut checksum = self.checksum;

        let reason = loop {
            if let Some(max) = self.max_frame {
                if self.frames >= max {
                    break StopReason::FrameLimit;
                }
            }

            let remaining = self.file_size.saturating_sub(offset);
            if remaining == 0 {
                break StopReason::EndOfFile;
            }
            if remaining < frame_size {
                break StopReason::TruncatedFrame;
            }

            match reader.read_exact(&mut buf) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    break StopReason::TruncatedFrame;
                }
                Err(e) => return Err(e.into()),
            }

            let frameno = self.frames + 1;
            let Some(header) = FrameHeader::decode(&buf) else {
                break StopReason::TruncatedFrame;
            };
            if header.salt != self.salt {
                break StopReason::SaltMismatch;
            }
            if header.page_number == 0 {
                break StopReason::InvalidPageNumber;
            }
            let computed = FrameHeader::compute_checksum(&buf, checksum, self.big_endian);
            if computed != header.checksum {
                break StopReason::ChecksumMismatch;
            }

            checksum = computed;
            self.frame_pages.insert(header.page_number, frameno);
            self.frames = frameno;
            if header.is_commit() {
                self.last_commit_frame = frameno;
                self.database_page_count = header.commit_size;
            }
            offset += frame_size;
        };

        if !reason.is_clean() {
            tracing::debug!(
                "WAL scan of {} ended before frame {}: {:?}",
                self.path.display(),
                self.frames + 1,
                reason
            );
        }

        self.checksum = checksum;
        Ok(reason)
    }

    // Page

    /// Whether the recovery index holds an image of `page`.
    pub fn contains_page(&self, page: u32) -> bool {
        self.frame_pages.contains_key(&page)
    }

    /// Frame number holding the latest valid image of `page`.
    pub fn frame_for_page(&self, page: u32) -> Option<u32> {
        self.frame_pages.get(&page).copied()
    }

    /// Page numbers present in the recovery index, ascending.
    pub fn page_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.frame_pages.keys().copied()
    }

    /// Highest page number in the recovery index, or 0 if it is empty.
    pub fn max_page_number(&self) -> u32 {
        self.frame_pages.keys().next_back().copied().unwrap_or(0)
    }

    /// Reads the latest valid image of `page`.
    ///
    /// If the read fails the page is reported corrupted to the owner and
    /// dropped from the index; other pages are unaffected.
    pub fn acquire_page_data(&mut self, page: u32) -> Result<Bytes, RepairError> {
        let frameno = self
            .frame_for_page(page)
            .ok_or(RepairError::PageNotFound(page))?;
        let offset = self.frame_offset(frameno) + FRAME_HEADER_SIZE as u64;

        match self.read_at(offset, self.page_size as usize) {
            Ok(data) => Ok(data),
            Err(e) => {
                self.frame_pages.remove(&page);
                self.related
                    .mark_page_as_corrupted(page, &format!("frame {}: {}", frameno, e));
                Err(e)
            }
        }
    }

    // Wal

    /// Number of valid frames.
    pub fn frame_count(&self) -> u32 {
        self.frames
    }

    /// Whether checksum words are stored in host byte order.
    pub fn is_native_checksum(&self) -> bool {
        is_native_order(self.big_endian)
    }

    pub fn salt(&self) -> WalSalt {
        self.salt
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn checkpoint_sequence(&self) -> u32 {
        self.checkpoint_sequence
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Running checksum after the last valid frame.
    pub fn checksum(&self) -> WalChecksum {
        self.checksum
    }

    /// Last valid commit frame, 0 if none.
    pub fn last_commit_frame(&self) -> u32 {
        self.last_commit_frame
    }

    /// Database size in pages recorded by the last valid commit frame.
    pub fn database_page_count(&self) -> u32 {
        self.database_page_count
    }

    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    /// The error most recently set or adopted by this reader.
    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.related.last_error()
    }

    /// Pulls the owner's last recorded error into this reader.
    pub fn adopt_shared_error(&mut self) {
        self.related.adopt_shared_error();
    }

    pub fn summary(&self) -> WalSummary {
        let valid_end = self.frame_offset(self.frames + 1);
        WalSummary {
            path: self.path.clone(),
            initialized: self.is_initialized(),
            page_size: self.page_size,
            checkpoint_sequence: self.checkpoint_sequence,
            salt: self.salt,
            native_checksum: self.is_native_checksum(),
            frame_count: self.frames,
            page_count: self.frame_pages.len(),
            max_page_number: self.max_page_number(),
            last_commit_frame: self.last_commit_frame,
            database_page_count: self.database_page_count,
            checksum: self.checksum,
            stop_reason: self.stop_reason,
            trailing_bytes: if self.is_initialized() {
                self.file_size.saturating_sub(valid_end)
            } else {
                0
            },
        }
    }

    // Frame

    pub fn frame_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.page_size as usize
    }

    fn frame_offset(&self, frameno: u32) -> u64 {
        WAL_HEADER_SIZE as u64 + (frameno as u64).saturating_sub(1) * self.frame_size() as u64
    }

    /// Reads back the header of valid frame `frameno`.
    pub fn frame_header(&mut self, frameno: u32) -> Result<FrameHeader, RepairError> {
        let data = self.acquire_frame_data(frameno)?;
        FrameHeader::decode(&data).ok_or_else(|| {
            RepairError::Corrupted(format!("frame {} header is truncated", frameno))
        })
    }

    /// Reads frame `frameno` (header and page).
    pub(crate) fn acquire_frame_data(&mut self, frameno: u32) -> Result<Bytes, RepairError> {
        if frameno == 0 || frameno > self.frames {
            return Err(RepairError::InvalidState(format!(
                "frame {} is outside the valid range 1..={}",
                frameno, self.frames
            )));
        }
        self.acquire_data(self.frame_offset(frameno), self.frame_size())
    }

    /// Reads `size` bytes at `offset`, recording any failure with the owner.
    pub(crate) fn acquire_data(&mut self, offset: u64, size: usize) -> Result<Bytes, RepairError> {
        let result = self.read_at(offset, size);
        if let Err(e) = &result {
            self.related.set_error(e);
        }
        result
    }

    fn read_at(&self, offset: u64, size: usize) -> Result<Bytes, RepairError> {
        let mut file = self
            .file
            .as_ref()
            .ok_or_else(|| RepairError::InvalidState("WAL is not initialized".to_string()))?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = BytesMut::zeroed(size);
        let mut filled = 0;
        while filled < size {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled < size {
            return Err(RepairError::ShortRead {
                offset,
                expected: size,
                actual: filled,
            });
        }

        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind as RecordKind;
    use crate::pager::Pager;
    use crate::testing::WalBuilder;
    use proptest::prelude::*;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    const PAGE_SIZE: u32 = 512;

    fn setup(builder: &WalBuilder) -> (TempDir, Pager) {
        let dir = TempDir::new().unwrap();
        let pager = Pager::new(dir.path().join("test.db"), PAGE_SIZE).unwrap();
        builder.write_to(pager.wal_path()).unwrap();
        (dir, pager)
    }

    fn setup_bytes(bytes: &[u8]) -> (TempDir, Pager) {
        let dir = TempDir::new().unwrap();
        let pager = Pager::new(dir.path().join("test.db"), PAGE_SIZE).unwrap();
        std::fs::write(pager.wal_path(), bytes).unwrap();
        (dir, pager)
    }

    #[test]
    fn test_empty_but_valid() {
        let (_dir, pager) = setup(&WalBuilder::new(PAGE_SIZE));
        let mut wal = WalReader::new(&pager);

        wal.initialize().unwrap();
        assert!(wal.is_initialized());
        assert_eq!(wal.frame_count(), 0);
        assert_eq!(wal.max_page_number(), 0);
        assert_eq!(wal.page_numbers().count(), 0);
        assert_eq!(wal.stop_reason(), StopReason::EndOfFile);
        assert!(pager.last_error().is_none());
    }

    #[test]
    fn test_later_frames_supersede_earlier() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder
            .clone()
            .frame(1, builder.page_image(0x11))
            .frame(2, builder.page_image(0x21))
            .frame(1, builder.page_image(0x12))
            .commit_frame(3, 3, builder.page_image(0x31))
            .frame(2, builder.page_image(0x22));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        assert_eq!(wal.frame_count(), 5);
        assert_eq!(wal.frame_for_page(1), Some(3));
        assert_eq!(wal.frame_for_page(2), Some(5));
        assert_eq!(wal.frame_for_page(3), Some(4));
        assert_eq!(wal.max_page_number(), 3);
        assert_eq!(wal.page_numbers().collect::<Vec<_>>(), vec![1, 2, 3]);

        assert_eq!(wal.acquire_page_data(1).unwrap(), builder.page_image(0x12));
        assert_eq!(wal.acquire_page_data(2).unwrap(), builder.page_image(0x22));
    }

    #[test]
    fn test_stops_at_first_bad_checksum() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder
            .clone()
            .frame(1, builder.page_image(1))
            .frame(2, builder.page_image(2))
            .frame(3, builder.page_image(3))
            .corrupt_frame(4, builder.page_image(4))
            .frame(5, builder.page_image(5))
            .frame(1, builder.page_image(6));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        assert_eq!(wal.frame_count(), 3);
        assert_eq!(wal.stop_reason(), StopReason::ChecksumMismatch);
        assert!(!wal.contains_page(4));
        assert!(!wal.contains_page(5));
        assert_eq!(wal.frame_for_page(1), Some(1));
        assert_eq!(wal.summary().trailing_bytes, 3 * builder.frame_size() as u64);
        // Not an error: the log simply ends there.
        assert!(pager.last_error().is_none());
    }

    #[test]
    fn test_header_checksum_gate() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder.clone().frame(1, builder.page_image(1));
        let mut bytes = builder.build().to_vec();
        bytes[31] ^= 0x01;
        let (_dir, pager) = setup_bytes(&bytes);
        let mut wal = WalReader::new(&pager);

        let err = wal.initialize().unwrap_err();
        assert!(matches!(err, RepairError::HeaderChecksumMismatch { .. }));
        assert_eq!(wal.frame_count(), 0);
        assert!(!wal.contains_page(1));
        assert_eq!(wal.stop_reason(), StopReason::NotScanned);
        assert_eq!(pager.last_error().unwrap().kind, RecordKind::Corrupted);
    }

    #[test]
    fn test_header_field_damage_fails_checksum() {
        let builder = WalBuilder::new(PAGE_SIZE).with_checkpoint_sequence(4);
        let mut bytes = builder.build().to_vec();
        bytes[15] ^= 0x01;
        let (_dir, pager) = setup_bytes(&bytes);
        let mut wal = WalReader::new(&pager);

        assert!(matches!(
            wal.initialize(),
            Err(RepairError::HeaderChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_page_size_mismatch_gate() {
        let builder = WalBuilder::new(1024);
        let builder = builder.clone().frame(1, builder.page_image(1));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);

        let err = wal.initialize().unwrap_err();
        assert!(matches!(
            err,
            RepairError::PageSizeMismatch {
                wal: 1024,
                pager: PAGE_SIZE
            }
        ));
        assert_eq!(err.kind(), RecordKind::Corrupted);
        assert_eq!(wal.frame_count(), 0);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = WalBuilder::new(PAGE_SIZE).build().to_vec();
        bytes[0..4].copy_from_slice(&0x1234_5678u32.to_be_bytes());
        let (_dir, pager) = setup_bytes(&bytes);
        let mut wal = WalReader::new(&pager);

        let err = wal.initialize().unwrap_err();
        assert!(matches!(
            err,
            RepairError::NotAWal {
                magic: 0x1234_5678,
                ..
            }
        ));
        assert_eq!(pager.last_error().unwrap().kind, RecordKind::NotADatabase);
        assert_eq!(wal.last_error().unwrap().kind, RecordKind::NotADatabase);
    }

    #[test]
    fn test_missing_wal() {
        let dir = TempDir::new().unwrap();
        let pager = Pager::new(dir.path().join("absent.db"), PAGE_SIZE).unwrap();
        let mut wal = WalReader::new(&pager);

        let err = wal.initialize().unwrap_err();
        assert!(matches!(err, RepairError::Io(_)));
        assert_eq!(pager.last_error().unwrap().kind, RecordKind::Io);
    }

    #[test]
    fn test_short_header() {
        let bytes = WalBuilder::new(PAGE_SIZE).build();
        let (_dir, pager) = setup_bytes(&bytes[..20]);
        let mut wal = WalReader::new(&pager);

        assert!(matches!(
            wal.initialize(),
            Err(RepairError::ShortRead {
                expected: 32,
                actual: 20,
                ..
            })
        ));
    }

    #[test]
    fn test_page_data_read_at_frame_offset() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let mut page = builder.page_image(0);
        for (i, byte) in page.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let builder = builder
            .clone()
            .frame(7, builder.page_image(0xaa))
            .frame(9, page.clone());
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        let raw = std::fs::read(pager.wal_path()).unwrap();
        let offset = (32 + (2 - 1) * (24 + PAGE_SIZE as usize)) + 24;
        let data = wal.acquire_page_data(9).unwrap();
        assert_eq!(&data[..], &raw[offset..offset + PAGE_SIZE as usize]);
        assert_eq!(&data[..], &page[..]);
        assert_eq!(wal.frame_size(), 24 + PAGE_SIZE as usize);
    }

    #[test]
    fn test_frame_cap_respected() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder
            .clone()
            .frame(1, builder.page_image(1))
            .frame(2, builder.page_image(2))
            .frame(1, builder.page_image(3))
            .frame(4, builder.page_image(4));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.set_max_frame(2).unwrap();
        wal.initialize().unwrap();

        assert_eq!(wal.frame_count(), 2);
        assert_eq!(wal.stop_reason(), StopReason::FrameLimit);
        assert_eq!(wal.frame_for_page(1), Some(1));
        assert!(!wal.contains_page(4));
    }

    #[test]
    fn test_frame_after_cap_is_never_read() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder
            .clone()
            .frame(1, builder.page_image(1))
            .corrupt_frame(2, builder.page_image(2));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.set_max_frame(1).unwrap();
        wal.initialize().unwrap();

        // Frame 2 is damaged, but the cap stops the scan first.
        assert_eq!(wal.stop_reason(), StopReason::FrameLimit);
        assert_eq!(wal.frame_count(), 1);
    }

    #[test]
    fn test_set_max_frame_after_initialize() {
        let (_dir, pager) = setup(&WalBuilder::new(PAGE_SIZE));
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();
        assert!(matches!(
            wal.set_max_frame(1),
            Err(RepairError::InvalidState(_))
        ));
    }

    #[test]
    fn test_salt_mismatch_ends_scan() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder
            .clone()
            .commit_frame(1, 1, builder.page_image(1))
            .stale_frame(2, WalSalt::new(9, 9), builder.page_image(2))
            .frame(3, builder.page_image(3));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        assert_eq!(wal.frame_count(), 1);
        assert_eq!(wal.stop_reason(), StopReason::SaltMismatch);
        assert!(!wal.contains_page(2));
        assert!(!wal.contains_page(3));
    }

    #[test]
    fn test_truncated_tail() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder
            .clone()
            .frame(1, builder.page_image(1))
            .frame(2, builder.page_image(2));
        let bytes = builder.build();
        let (_dir, pager) = setup_bytes(&bytes[..bytes.len() - 100]);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        assert_eq!(wal.frame_count(), 1);
        assert_eq!(wal.stop_reason(), StopReason::TruncatedFrame);
        assert!(wal.contains_page(1));
        assert!(!wal.contains_page(2));
    }

    #[test]
    fn test_zero_page_number_ends_scan() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder
            .clone()
            .frame(1, builder.page_image(1))
            .frame(0, builder.page_image(2));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        assert_eq!(wal.frame_count(), 1);
        assert_eq!(wal.stop_reason(), StopReason::InvalidPageNumber);
    }

    #[test]
    fn test_big_endian_checksum() {
        let builder = WalBuilder::new(PAGE_SIZE).with_big_endian_checksum(true);
        let builder = builder
            .clone()
            .frame(1, builder.page_image(1))
            .commit_frame(2, 2, builder.page_image(2));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        assert_eq!(wal.frame_count(), 2);
        assert_eq!(wal.is_native_checksum(), cfg!(target_endian = "big"));
    }

    #[test]
    fn test_little_endian_checksum() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder.clone().frame(1, builder.page_image(1));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        assert_eq!(wal.frame_count(), 1);
        assert_eq!(wal.is_native_checksum(), cfg!(target_endian = "little"));
    }

    #[test]
    fn test_header_accessors() {
        let salt = WalSalt::new(0xcafe, 0xbabe);
        let builder = WalBuilder::new(PAGE_SIZE)
            .with_salt(salt)
            .with_checkpoint_sequence(42);
        let builder = builder
            .clone()
            .frame(3, builder.page_image(1))
            .commit_frame(5, 5, builder.page_image(2))
            .frame(6, builder.page_image(3));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        assert_eq!(wal.salt(), salt);
        assert_eq!(wal.checkpoint_sequence(), 42);
        assert_eq!(wal.format_version(), crate::frame::WAL_FORMAT_VERSION);
        assert_eq!(wal.page_size(), PAGE_SIZE);
        assert_eq!(wal.last_commit_frame(), 2);
        assert_eq!(wal.database_page_count(), 5);
        assert_eq!(wal.path(), pager.wal_path());

        let summary = wal.summary();
        assert!(summary.initialized);
        assert_eq!(summary.frame_count, 3);
        assert_eq!(summary.page_count, 3);
        assert_eq!(summary.max_page_number, 6);
        assert_eq!(summary.trailing_bytes, 0);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder.clone().frame(1, builder.page_image(1));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();
        wal.initialize().unwrap();
        assert_eq!(wal.frame_count(), 1);
    }

    #[test]
    fn test_failed_initialize_is_sticky() {
        let (_dir, pager) = setup(&WalBuilder::new(1024));
        let mut wal = WalReader::new(&pager);
        assert!(wal.initialize().is_err());
        assert!(matches!(
            wal.initialize(),
            Err(RepairError::InvalidState(_))
        ));
        assert!(!wal.is_initialized());
    }

    #[test]
    fn test_shrunk_file_marks_page_corrupted() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder
            .clone()
            .frame(1, builder.page_image(1))
            .frame(2, builder.page_image(2))
            .frame(3, builder.page_image(3));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        // Cut the file in the middle of frame 3.
        let file = OpenOptions::new()
            .write(true)
            .open(pager.wal_path())
            .unwrap();
        file.set_len(builder.frame_offset(3) + 100).unwrap();

        let err = wal.acquire_page_data(3).unwrap_err();
        assert!(matches!(err, RepairError::ShortRead { .. }));
        assert!(pager.is_page_corrupted(3));
        assert!(!wal.contains_page(3));
        assert_eq!(pager.last_error().unwrap().page, Some(3));

        assert!(wal.contains_page(1));
        assert_eq!(wal.acquire_page_data(2).unwrap(), builder.page_image(2));
    }

    #[test]
    fn test_missing_page() {
        let (_dir, pager) = setup(&WalBuilder::new(PAGE_SIZE));
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();
        assert!(matches!(
            wal.acquire_page_data(1),
            Err(RepairError::PageNotFound(1))
        ));
        assert!(!pager.is_page_corrupted(1));
    }

    #[test]
    fn test_acquire_frame_data() {
        let builder = WalBuilder::new(PAGE_SIZE);
        let builder = builder
            .clone()
            .frame(4, builder.page_image(4))
            .frame(8, builder.page_image(8));
        let (_dir, pager) = setup(&builder);
        let mut wal = WalReader::new(&pager);
        wal.initialize().unwrap();

        let frame = wal.acquire_frame_data(2).unwrap();
        assert_eq!(frame.len(), wal.frame_size());
        let header = FrameHeader::decode(&frame).unwrap();
        assert_eq!(header.page_number, 8);
        assert_eq!(&frame[FRAME_HEADER_SIZE..], &builder.page_image(8)[..]);

        let header = wal.frame_header(1).unwrap();
        assert_eq!(header.page_number, 4);
        assert_eq!(header.salt, wal.salt());

        assert!(wal.acquire_frame_data(0).is_err());
        assert!(wal.acquire_frame_data(3).is_err());

        let header = wal.acquire_data(0, WAL_HEADER_SIZE).unwrap();
        assert_eq!(WalHeader::decode(&header).unwrap().page_size, PAGE_SIZE);
        assert!(matches!(
            wal.acquire_data(builder.frame_offset(3), 8),
            Err(RepairError::ShortRead { actual: 0, .. })
        ));
        assert_eq!(pager.last_error().unwrap().kind, RecordKind::Io);
    }

    #[test]
    fn test_readers_share_owner_errors() {
        let (_dir, pager) = setup(&WalBuilder::new(PAGE_SIZE));
        let mut first = WalReader::new(&pager);
        first.initialize().unwrap();
        assert!(first.last_error().is_none());

        // A failure reported by another reader of the same owner.
        let mut second = WalReader::new(&pager);
        second.initialize().unwrap();
        assert!(second.acquire_data(1 << 20, 8).is_err());
        first.adopt_shared_error();
        assert_eq!(first.last_error().unwrap().kind, RecordKind::Io);

        pager.report_corruption(2, "from elsewhere");
        first.adopt_shared_error();
        assert_eq!(first.last_error().unwrap().page, Some(2));
        assert_eq!(second.pager_path(), pager.path());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_index_maps_to_latest_frame(pages in prop::collection::vec(1u32..16, 0..40)) {
            let mut builder = WalBuilder::new(PAGE_SIZE);
            for (i, &page) in pages.iter().enumerate() {
                let image = builder.page_image(i as u8);
                builder = builder.frame(page, image);
            }
            let (_dir, pager) = setup(&builder);
            let mut wal = WalReader::new(&pager);
            wal.initialize().unwrap();

            prop_assert_eq!(wal.frame_count() as usize, pages.len());
            for (i, &page) in pages.iter().enumerate() {
                let latest = pages.iter().rposition(|&p| p == page).unwrap() as u32 + 1;
                prop_assert_eq!(wal.frame_for_page(page), Some(latest));
                prop_assert!(latest >= i as u32 + 1);
            }
            prop_assert_eq!(wal.max_page_number(), pages.iter().copied().max().unwrap_or(0));
        }
    }
}
