//! Append-only index of physical-line start offsets.

/// Ordered byte offsets marking the start of each physical line seen so
/// far. `offsets[0] == 0` once the first byte has streamed in; every later
/// entry is the position immediately following a `\n`. Offsets are
/// strictly ascending; an empty stream has no entries at all.
#[derive(Debug, Default)]
pub struct LineIndex {
    offsets: Vec<u64>,
    at_line_start: bool,
}

impl LineIndex {
    pub fn new() -> Self {
        Self {
            offsets: Vec::new(),
            at_line_start: true,
        }
    }

    /// Account for `chunk` arriving at absolute offset `start`. Chunks must
    /// be fed in stream order with no gaps.
    pub fn feed(&mut self, start: u64, chunk: &[u8]) {
        for (i, &b) in chunk.iter().enumerate() {
            if self.at_line_start {
                let off = start + i as u64;
                debug_assert!(
                    self.offsets.last().is_none_or(|&last| last < off),
                    "line offsets must ascend"
                );
                self.offsets.push(off);
            }
            self.at_line_start = b == b'\n';
        }
    }

    /// Number of physical lines whose start has been seen.
    pub fn count(&self) -> usize {
        self.offsets.len()
    }

    /// Start offset of line `idx`.
    pub fn offset(&self, idx: usize) -> Option<u64> {
        self.offsets.get(idx).copied()
    }

    /// Index of the line containing `pos`: the greatest entry `<= pos`.
    /// Only meaningful for positions inside the already-streamed prefix.
    pub fn line_of(&self, pos: u64) -> Option<usize> {
        if self.offsets.is_empty() {
            return None;
        }
        match self.offsets.binary_search(&pos) {
            Ok(i) => Some(i),
            Err(0) => None,
            Err(i) => Some(i - 1),
        }
    }

    /// Start offset of the line containing `pos`.
    pub fn line_start(&self, pos: u64) -> Option<u64> {
        self.line_of(pos).and_then(|i| self.offset(i))
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
        self.at_line_start = true;
    }
}
