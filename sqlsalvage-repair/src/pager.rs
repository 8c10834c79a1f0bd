//! Page owner and the capability readers use to report against it.
//!
//! A [`PageOwner`] owns the identity of one database file set: its path, page
//! size, a shared last-error slot and the set of pages known to be corrupted.
//! Readers such as [`crate::WalReader`] hold a [`PagerRelated`], a borrowed
//! back-reference that routes their error reports to the owner.

use crate::error::{ErrorKind, ErrorRecord, RepairError};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Smallest page size SQLite supports.
pub const MIN_PAGE_SIZE: u32 = 512;

/// Largest page size SQLite supports.
pub const MAX_PAGE_SIZE: u32 = 65536;

/// Suffix SQLite appends to the database path to name its WAL.
pub const WAL_SUFFIX: &str = "-wal";

/// Returns the WAL path for a database path.
pub fn wal_path_for(database: &Path) -> PathBuf {
    let mut name = database.as_os_str().to_owned();
    name.push(WAL_SUFFIX);
    PathBuf::from(name)
}

/// Services a recovery reader consumes from the component owning the file set.
pub trait PageOwner {
    /// Path of the main database file.
    fn path(&self) -> &Path;

    /// Page size in bytes, fixed for the recovery pass.
    fn page_size(&self) -> u32;

    /// Opens the WAL belonging to this database for reading.
    fn open_wal_handle(&self) -> Result<(PathBuf, File), RepairError>;

    /// Stores `record` in the shared last-error slot.
    fn report_error(&self, record: ErrorRecord);

    /// Marks `page` as unusable and records a corruption error.
    fn report_corruption(&self, page: u32, message: &str);

    /// Returns the last recorded error, if any.
    fn shared_error(&self) -> Option<ErrorRecord>;
}

/// Last-error slot shared by every reader of one database.
///
/// Writes are serialized; the last writer wins.
#[derive(Debug, Default)]
pub struct SharedError {
    slot: Mutex<Option<ErrorRecord>>,
}

impl SharedError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, record: ErrorRecord) {
        *self.slot.lock() = Some(record);
    }

    pub fn get(&self) -> Option<ErrorRecord> {
        self.slot.lock().clone()
    }

    pub fn take(&self) -> Option<ErrorRecord> {
        self.slot.lock().take()
    }
}

/// Minimal page owner: identity, page geometry and shared error state.
///
/// The main file's page cache lives elsewhere; this type only provides what
/// recovery readers need.
#[derive(Debug)]
pub struct Pager {
    path: PathBuf,
    page_size: u32,
    error: SharedError,
    corrupted_pages: Mutex<BTreeSet<u32>>,
}

impl Pager {
    /// Creates a pager for the database at `path`.
    ///
    /// `page_size` must be a power of two between 512 and 65536.
    pub fn new(path: impl Into<PathBuf>, page_size: u32) -> Result<Self, RepairError> {
        if !page_size.is_power_of_two() || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(RepairError::InvalidPageSize(page_size));
        }
        Ok(Self {
            path: path.into(),
            page_size,
            error: SharedError::new(),
            corrupted_pages: Mutex::new(BTreeSet::new()),
        })
    }

    /// Path of the WAL belonging to this database.
    pub fn wal_path(&self) -> PathBuf {
        wal_path_for(&self.path)
    }

    /// Returns the last recorded error without clearing it.
    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.error.get()
    }

    /// Returns and clears the last recorded error.
    pub fn take_error(&self) -> Option<ErrorRecord> {
        self.error.take()
    }

    pub fn is_page_corrupted(&self, page: u32) -> bool {
        self.corrupted_pages.lock().contains(&page)
    }

    /// Pages reported corrupted so far, ascending.
    pub fn corrupted_pages(&self) -> Vec<u32> {
        self.corrupted_pages.lock().iter().copied().collect()
    }
}

impl PageOwner for Pager {
    fn path(&self) -> &Path {
        &self.path
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn open_wal_handle(&self) -> Result<(PathBuf, File), RepairError> {
        let path = self.wal_path();
        let file = OpenOptions::new().read(true).open(&path)?;
        Ok((path, file))
    }

    fn report_error(&self, record: ErrorRecord) {
        self.error.set(record);
    }

    fn report_corruption(&self, page: u32, message: &str) {
        self.corrupted_pages.lock().insert(page);
        self.error.set(
            ErrorRecord::new(ErrorKind::Corrupted, message)
                .with_path(&self.path)
                .with_page(page),
        );
    }

    fn shared_error(&self) -> Option<ErrorRecord> {
        self.error.get()
    }
}

/// Non-owning link from a recovery reader to its page owner.
///
/// Not `Clone`: a reader's back-reference moves with the reader.
pub struct PagerRelated<'p> {
    pager: &'p dyn PageOwner,
    last_error: Option<ErrorRecord>,
}

impl<'p> PagerRelated<'p> {
    pub fn new(pager: &'p dyn PageOwner) -> Self {
        Self {
            pager,
            last_error: None,
        }
    }

    /// Identity path of the owning pager, for diagnostics.
    pub fn pager_path(&self) -> &'p Path {
        self.pager.path()
    }

    pub fn pager(&self) -> &'p dyn PageOwner {
        self.pager
    }

    /// The error most recently set or adopted by this reader.
    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.last_error.as_ref()
    }

    /// Records that `page` cannot be recovered. The caller keeps going.
    pub fn mark_page_as_corrupted(&mut self, page: u32, message: &str) {
        tracing::warn!(
            "{}: page {} marked as corrupted: {}",
            self.pager.path().display(),
            page,
            message
        );
        self.pager.report_corruption(page, message);
        self.last_error = self.pager.shared_error();
    }

    /// Records a structural error locally and in the owner's shared slot.
    pub fn set_error(&mut self, error: &RepairError) {
        let record = error.to_record().with_path(self.pager.path());
        tracing::warn!("{}", record);
        self.pager.report_error(record.clone());
        self.last_error = Some(record);
    }

    /// Pulls whatever the owner last recorded into this reader's context.
    pub fn adopt_shared_error(&mut self) {
        if let Some(record) = self.pager.shared_error() {
            self.last_error = Some(record);
        }
    }
}

impl std::fmt::Debug for PagerRelated<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagerRelated")
            .field("pager", &self.pager.path())
            .field("last_error", &self.last_error)
            .finish()
    }
}
