//! WAL scan results.
//!
//! A scan ends at the first frame that cannot be trusted. Why it ended is kept
//! as a [`StopReason`] so callers can tell a clean end of log from a torn tail
//! or leftovers of an earlier checkpoint cycle.

use crate::checksum::WalChecksum;
use crate::frame::WalSalt;
use serde::Serialize;
use std::path::PathBuf;

/// Why a frame scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The scan has not run.
    #[default]
    NotScanned,
    /// The file ended exactly on a frame boundary.
    EndOfFile,
    /// The file ended inside a frame.
    TruncatedFrame,
    /// A frame carried salts from another WAL incarnation.
    SaltMismatch,
    /// A frame failed checksum verification.
    ChecksumMismatch,
    /// A frame named page 0.
    InvalidPageNumber,
    /// The caller's frame cap was reached.
    FrameLimit,
}

impl StopReason {
    /// Whether the scan reached the physical end of the valid log.
    pub fn is_clean(&self) -> bool {
        matches!(self, StopReason::EndOfFile | StopReason::FrameLimit)
    }
}

/// Result of one WAL recovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WalSummary {
    /// Path of the WAL file.
    pub path: PathBuf,
    /// Whether the header was valid and frames were scanned.
    pub initialized: bool,
    /// Page size declared by the WAL.
    pub page_size: u32,
    pub checkpoint_sequence: u32,
    pub salt: WalSalt,
    pub native_checksum: bool,
    /// Number of valid frames.
    pub frame_count: u32,
    /// Number of distinct pages recoverable from the WAL.
    pub page_count: usize,
    /// Highest page number present, 0 if none.
    pub max_page_number: u32,
    /// Last valid commit frame, 0 if none.
    pub last_commit_frame: u32,
    /// Database size in pages recorded by the last valid commit frame.
    pub database_page_count: u32,
    /// Running checksum after the last valid frame.
    pub checksum: WalChecksum,
    pub stop_reason: StopReason,
    /// Bytes in the file past the last valid frame.
    pub trailing_bytes: u64,
}
