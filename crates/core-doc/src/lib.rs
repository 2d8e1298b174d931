//! Documents and the ring of open documents.
//!
//! A [`Document`] couples a lazily-paged byte store with paging state:
//! the reader position, the byte range of the last rendered page, the
//! mode bitset, the active match, and the folding table of contents.
//! The [`DocumentRing`] owns every open document and tracks which one is
//! current; switching, killing and opening are ring operations.

mod document;
mod mode;
mod ring;
mod toc;

pub use document::Document;
pub use mode::{Ftype, Match, Mode};
pub use ring::DocumentRing;
pub use toc::{Toc, TocEntry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocError {
    #[error(transparent)]
    Feed(#[from] core_feed::FeedError),
    #[error("table of contents entries out of order at {pos}")]
    TocOrder { pos: u64 },
}

pub type Result<T> = std::result::Result<T, DocError>;
