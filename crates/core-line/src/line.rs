//! Materialized view of one physical line.

use crate::norm::normalize;
use crate::wrap::{LayoutOpts, wlines};

/// One physical line pulled out of a document. `raw` runs from `pos` up
/// to and including the terminating `\n` (or EOF); `normalized` is the
/// payload-only view. Neither is NUL-terminated — both may contain
/// embedded NUL bytes.
#[derive(Debug, Clone)]
pub struct Line {
    pub pos: u64,
    pub raw: Vec<u8>,
    pub normalized: Vec<u8>,
    /// Raw offsets of each window-line start; `wlines[0] == 0`. Valid for
    /// the width last passed to [`Line::layout`].
    pub wlines: Vec<usize>,
}

impl Line {
    pub fn new(pos: u64, raw: Vec<u8>) -> Self {
        let normalized = normalize(&raw);
        Self {
            pos,
            raw,
            normalized,
            wlines: vec![0],
        }
    }

    /// Recompute window-line boundaries for `opts`.
    pub fn layout(&mut self, opts: &LayoutOpts) {
        self.wlines = wlines(&self.raw, opts);
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn nlen(&self) -> usize {
        self.normalized.len()
    }

    /// Absolute offset one past the last raw byte.
    pub fn end(&self) -> u64 {
        self.pos + self.raw.len() as u64
    }

    pub fn ends_with_newline(&self) -> bool {
        self.raw.last() == Some(&b'\n')
    }

    /// True when the payload is empty or a bare newline.
    pub fn is_blank(&self) -> bool {
        self.normalized.is_empty() || self.normalized == b"\n"
    }

    pub fn wline_count(&self) -> usize {
        self.wlines.len()
    }

    /// Absolute offset of window line `idx` within this line.
    pub fn wline_pos(&self, idx: usize) -> Option<u64> {
        self.wlines.get(idx).map(|&off| self.pos + off as u64)
    }

    /// Index of the window line containing the absolute offset `pos`.
    pub fn wline_of(&self, pos: u64) -> usize {
        if pos <= self.pos {
            return 0;
        }
        let off = (pos - self.pos) as usize;
        match self.wlines.binary_search(&off) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        }
    }
}
