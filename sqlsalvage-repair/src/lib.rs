//! # sqlsalvage-repair
//!
//! Recovery-oriented readers for SQLite database files.
//!
//! This crate provides:
//! - A WAL reader that rebuilds the page-to-frame index with checksum checks
//! - Scanning that stops cleanly at the first untrusted frame
//! - A shared error slot so readers report damage without aborting a pass

pub mod checksum;
pub mod error;
pub mod frame;
pub mod pager;
pub mod recovery;
pub mod wal;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use checksum::WalChecksum;
pub use error::{ErrorKind, ErrorRecord, RepairError};
pub use frame::{FrameHeader, WalHeader, WalSalt};
pub use pager::{PageOwner, Pager, PagerRelated, SharedError};
pub use recovery::{StopReason, WalSummary};
pub use wal::WalReader;

/// WAL header size in bytes.
pub const WAL_HEADER_SIZE: usize = 32;

/// WAL frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 24;
