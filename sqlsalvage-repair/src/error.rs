//! Repair error types.
//!
//! `RepairError` is what operations return. `ErrorRecord` is the clonable,
//! tagged description that gets stored in a pager's shared last-error slot.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading a database's file set for recovery.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("{path}: not a WAL file (magic {magic:#010x})")]
    NotAWal { path: PathBuf, magic: u32 },

    #[error("page size mismatch: WAL declares {wal}, pager uses {pager}")]
    PageSizeMismatch { wal: u32, pager: u32 },

    #[error("WAL header checksum mismatch (expected {expected:08x}{expected2:08x}, got {actual:08x}{actual2:08x})")]
    HeaderChecksumMismatch {
        expected: u32,
        expected2: u32,
        actual: u32,
        actual2: u32,
    },

    #[error("invalid page size: {0}")]
    InvalidPageSize(u32),

    #[error("data corruption: {0}")]
    Corrupted(String),

    #[error("page {0} is not present in the WAL")]
    PageNotFound(u32),

    #[error("invalid reader state: {0}")]
    InvalidState(String),
}

impl RepairError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepairError::Io(_))
    }

    /// Returns the severity class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepairError::Io(_) | RepairError::ShortRead { .. } => ErrorKind::Io,
            RepairError::NotAWal { .. } => ErrorKind::NotADatabase,
            RepairError::PageSizeMismatch { .. }
            | RepairError::HeaderChecksumMismatch { .. }
            | RepairError::InvalidPageSize(_)
            | RepairError::Corrupted(_) => ErrorKind::Corrupted,
            RepairError::PageNotFound(_) | RepairError::InvalidState(_) => ErrorKind::Misuse,
        }
    }

    /// Builds the record stored in a pager's last-error slot.
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord::new(self.kind(), self.to_string())
    }
}

/// Severity class of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The file could not be opened or read.
    Io,
    /// The file is not in the expected format at all.
    NotADatabase,
    /// The file or a page in it is damaged.
    Corrupted,
    /// The caller asked for something the reader cannot provide.
    Misuse,
}

/// A tagged failure description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            page: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn is_corruption(&self) -> bool {
        self.kind == ErrorKind::Corrupted
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(page) = self.page {
            write!(f, " (page {})", page)?;
        }
        if let Some(path) = &self.path {
            write!(f, " [{}]", path.display())?;
        }
        Ok(())
    }
}
