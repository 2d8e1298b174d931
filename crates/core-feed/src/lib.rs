//! Lazily demand-paged byte store backing one document.
//!
//! A document's bytes live in fixed-size [`Block`]s read on demand from a
//! [`FeedSource`]. Blocks are never evicted and never reorder, so the store
//! addresses them by `pos / blksize` instead of rotating a ring. A
//! [`LineIndex`] of physical-line start offsets grows as bytes stream in.

use std::io::Read;

use thiserror::Error;

mod block;
mod lines;
mod source;

pub use block::{Block, BlockStore, DEFAULT_BLKSIZE};
pub use lines::LineIndex;
pub use source::{BufferSource, FeedSource, FileSource, StdinSource, preferred_blksize};

/// Errors surfaced by the byte store. `Io` is fatal for the owning
/// document; everything else is an internal invariant violation.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("tee write failed: {0}")]
    Tee(std::io::Error),
    #[error("block store inconsistent at pos {pos}: {reason}")]
    Invariant { pos: u64, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, FeedError>;

/// True when `err` is the `EIO` a PTY master raises once the child side
/// hangs up. Treated as end-of-stream, not as a failure.
pub(crate) fn is_pty_hangup(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::EIO)
}

/// Read once into `buf`, retrying on `Interrupted`.
pub(crate) fn read_retrying(src: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        match src.read(buf) {
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
