//! Fixed-size block cache over a [`FeedSource`].

use std::fs::File;
use std::io::Write;

use tracing::{debug, trace};

use crate::lines::LineIndex;
use crate::source::FeedSource;
use crate::{FeedError, Result, is_pty_hangup, read_retrying};

pub const DEFAULT_BLKSIZE: usize = 4096;

/// One cached slice of the input. Block `i` covers
/// `[i * blksize, i * blksize + bytes.len())`; only the newest block may be
/// partially filled.
#[derive(Debug)]
pub struct Block {
    seek: u64,
    bytes: Vec<u8>,
}

impl Block {
    pub fn seek(&self) -> u64 {
        self.seek
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Demand-paged byte store. Bytes are pulled from the source in
/// block-sized chunks the first time a position at or past `seek` is
/// asked for; nothing is ever evicted.
pub struct BlockStore {
    blksize: usize,
    blocks: Vec<Block>,
    /// Bytes read from the source so far.
    seek: u64,
    /// Known total length. `None` until an unbounded source hits EOF.
    size: Option<u64>,
    source: Option<Box<dyn FeedSource>>,
    /// One-byte lookahead consumed before the first source read.
    pre_read: Option<u8>,
    /// Optional duplicate of everything read, for `--output-file`.
    tee: Option<File>,
    lines: LineIndex,
}

impl BlockStore {
    pub fn new(source: Box<dyn FeedSource>, blksize: usize, size_hint: Option<u64>) -> Self {
        debug_assert!(blksize > 0);
        Self {
            blksize,
            blocks: Vec::new(),
            seek: 0,
            size: size_hint,
            source: Some(source),
            pre_read: None,
            tee: None,
            lines: LineIndex::new(),
        }
    }

    /// Store over an in-memory buffer: fully populated, size known, no
    /// source left to drain.
    pub fn from_bytes(bytes: Vec<u8>, blksize: usize) -> Self {
        debug_assert!(blksize > 0);
        let mut lines = LineIndex::new();
        lines.feed(0, &bytes);
        let mut blocks = Vec::new();
        let mut at = 0usize;
        while at < bytes.len() {
            let end = (at + blksize).min(bytes.len());
            blocks.push(Block {
                seek: at as u64,
                bytes: bytes[at..end].to_vec(),
            });
            at = end;
        }
        let len = bytes.len() as u64;
        Self {
            blksize,
            blocks,
            seek: len,
            size: Some(len),
            source: None,
            pre_read: None,
            tee: None,
            lines,
        }
    }

    pub fn set_pre_read(&mut self, byte: u8) {
        debug_assert_eq!(self.seek, 0, "pre-read only before the first read");
        self.pre_read = Some(byte);
    }

    pub fn set_tee(&mut self, file: File) {
        self.tee = Some(file);
    }

    pub fn blksize(&self) -> usize {
        self.blksize
    }

    pub fn seek_pos(&self) -> u64 {
        self.seek
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn lines(&self) -> &LineIndex {
        &self.lines
    }

    /// True once the source is drained (or there never was one).
    pub fn exhausted(&self) -> bool {
        self.source.is_none()
    }

    /// Byte at `pos`, reading blocks on demand. `None` means end of data.
    pub fn get(&mut self, pos: u64) -> Result<Option<u8>> {
        if let Some(size) = self.size
            && pos >= size
            && self.source.is_none()
        {
            return Ok(None);
        }
        while pos >= self.seek {
            if self.source.is_none() {
                return Ok(None);
            }
            if self.read_block()? == 0 && pos >= self.seek {
                return Ok(None);
            }
        }
        let idx = (pos / self.blksize as u64) as usize;
        let block = self.blocks.get(idx).ok_or(FeedError::Invariant {
            pos,
            reason: "no block covers a position below seek",
        })?;
        let within = (pos - block.seek) as usize;
        block
            .bytes
            .get(within)
            .copied()
            .map(Some)
            .ok_or(FeedError::Invariant {
                pos,
                reason: "position falls in a block's unfilled tail",
            })
    }

    /// Pull one chunk from the source. Fills the partially-filled newest
    /// block before allocating another. Returns the number of bytes
    /// appended; 0 means the source just hit EOF and has been closed.
    pub fn read_block(&mut self) -> Result<usize> {
        let Some(source) = self.source.as_mut() else {
            return Ok(0);
        };

        let tail_free = self
            .blocks
            .last()
            .map(|b| self.blksize - b.len())
            .unwrap_or(0);
        let free = if tail_free > 0 {
            tail_free
        } else {
            self.blocks.push(Block {
                seek: self.seek,
                bytes: Vec::with_capacity(self.blksize),
            });
            self.blksize
        };

        let mut chunk = Vec::with_capacity(free);
        if let Some(b) = self.pre_read.take() {
            chunk.push(b);
        }
        let mut buf = vec![0u8; free - chunk.len()];
        let (n, eof) = if buf.is_empty() {
            (0, false)
        } else {
            match read_retrying(source.as_mut(), &mut buf) {
                Ok(0) => (0, true),
                Ok(n) => (n, false),
                Err(e) if source.is_pty() && is_pty_hangup(&e) => {
                    trace!(target: "feed", "pty hangup read as eof");
                    (0, true)
                }
                Err(e) => return Err(e.into()),
            }
        };
        chunk.extend_from_slice(&buf[..n]);

        if !chunk.is_empty() {
            if let Some(tee) = self.tee.as_mut() {
                tee.write_all(&chunk).map_err(FeedError::Tee)?;
            }
            self.lines.feed(self.seek, &chunk);
            let block = self.blocks.last_mut().expect("tail block exists");
            block.bytes.extend_from_slice(&chunk);
            self.seek += chunk.len() as u64;
            if n < buf.len() && !eof {
                trace!(target: "feed", want = buf.len(), got = n, "short read");
            }
        }

        if eof {
            self.mark_eof();
        }
        Ok(chunk.len())
    }

    /// Drain the source completely.
    pub fn read_all(&mut self) -> Result<()> {
        while self.source.is_some() {
            if self.read_block()? == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Ensure bytes up to and including `pos` are cached (or EOF reached).
    pub fn read_to(&mut self, pos: u64) -> Result<()> {
        while self.seek <= pos && self.source.is_some() {
            if self.read_block()? == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Drop the source without waiting for EOF (document kill / reload).
    pub fn close_source(&mut self) {
        if let Some(mut src) = self.source.take()
            && let Err(e) = src.close()
        {
            debug!(target: "feed", error = %e, "source close failed");
        }
    }

    /// Forget all cached data and start over on a fresh source.
    pub fn reset(&mut self, source: Box<dyn FeedSource>, size_hint: Option<u64>) {
        self.close_source();
        self.blocks.clear();
        self.lines.clear();
        self.seek = 0;
        self.size = size_hint;
        self.pre_read = None;
        self.source = Some(source);
    }

    fn mark_eof(&mut self) {
        self.close_source();
        if self.size != Some(self.seek) {
            debug!(target: "feed", size = self.seek, "eof; size now known");
        }
        self.size = Some(self.seek);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BufferSource;

    fn store_over(bytes: &[u8], blksize: usize) -> BlockStore {
        BlockStore::new(Box::new(BufferSource::new(bytes.to_vec())), blksize, None)
    }

    #[test]
    fn get_reads_on_demand() {
        let mut s = store_over(b"hello world", 4);
        assert_eq!(s.get(6).unwrap(), Some(b'w'));
        assert!(s.seek_pos() >= 7);
        assert_eq!(s.get(0).unwrap(), Some(b'h'));
        assert_eq!(s.get(10).unwrap(), Some(b'd'));
        assert_eq!(s.get(11).unwrap(), None);
        assert_eq!(s.size(), Some(11));
    }

    #[test]
    fn blocks_cover_disjoint_ascending_ranges() {
        let mut s = store_over(b"0123456789abcdef", 4);
        s.read_all().unwrap();
        let mut expect = 0;
        for b in &s.blocks {
            assert_eq!(b.seek(), expect);
            assert!(b.len() <= 4);
            expect += b.len() as u64;
        }
        assert_eq!(expect, 16);
    }

    #[test]
    fn only_last_block_partial() {
        let mut s = store_over(b"0123456789", 4);
        s.read_all().unwrap();
        let n = s.blocks.len();
        for (i, b) in s.blocks.iter().enumerate() {
            if i + 1 < n {
                assert_eq!(b.len(), 4);
            }
        }
        assert_eq!(s.blocks[n - 1].len(), 2);
    }

    #[test]
    fn empty_source_sets_zero_size_and_no_lines() {
        let mut s = store_over(b"", 4);
        assert_eq!(s.get(0).unwrap(), None);
        assert_eq!(s.size(), Some(0));
        assert_eq!(s.lines().count(), 0);
    }

    #[test]
    fn pre_read_byte_comes_first() {
        let mut s = store_over(b"bc", 4);
        s.set_pre_read(b'a');
        assert_eq!(s.get(0).unwrap(), Some(b'a'));
        assert_eq!(s.get(1).unwrap(), Some(b'b'));
        assert_eq!(s.get(2).unwrap(), Some(b'c'));
        assert_eq!(s.get(3).unwrap(), None);
        assert_eq!(s.size(), Some(3));
    }

    #[test]
    fn line_index_grows_with_reads() {
        let mut s = store_over(b"a\nb\nc\n", 2);
        s.read_all().unwrap();
        assert_eq!(s.lines().count(), 3);
        assert_eq!(s.lines().offset(2), Some(4));
    }

    #[test]
    fn from_bytes_is_fully_resident() {
        let mut s = BlockStore::from_bytes(b"one\ntwo\n".to_vec(), 4);
        assert!(s.exhausted());
        assert_eq!(s.size(), Some(8));
        assert_eq!(s.get(4).unwrap(), Some(b't'));
        assert_eq!(s.get(8).unwrap(), None);
        assert_eq!(s.lines().count(), 2);
    }

    #[test]
    fn tee_duplicates_reads() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut s = store_over(b"copy me", 4);
        s.set_tee(tmp.reopen().unwrap());
        s.read_all().unwrap();
        let teed = std::fs::read(tmp.path()).unwrap();
        assert_eq!(teed, b"copy me");
    }

    #[test]
    fn reset_discards_and_rereads() {
        let mut s = store_over(b"first", 4);
        s.read_all().unwrap();
        assert_eq!(s.size(), Some(5));
        s.reset(Box::new(BufferSource::new(b"second\n".to_vec())), None);
        assert_eq!(s.seek_pos(), 0);
        assert_eq!(s.get(0).unwrap(), Some(b's'));
        s.read_all().unwrap();
        assert_eq!(s.size(), Some(7));
        assert_eq!(s.lines().count(), 1);
    }
}
