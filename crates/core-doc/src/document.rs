//! One open document: byte store plus paging state.

use std::path::Path;

use core_feed::{BlockStore, DEFAULT_BLKSIZE, FeedSource, FileSource, preferred_blksize};
use core_line::{LayoutOpts, Line};
use regex::bytes::Regex;
use tracing::trace;

use crate::mode::{Ftype, Match, Mode};
use crate::toc::Toc;
use crate::Result;

pub struct Document {
    /// Unique within the ring; what the status line and file list show.
    pub name: String,
    /// Preprocessor-supplied replacement path, kept for reloads.
    pub replacement_name: Option<String>,
    store: BlockStore,
    /// The reader's current byte offset ("getch position").
    pub pos: u64,
    /// Byte range of the most recently rendered page.
    pub page_first: u64,
    pub page_last: u64,
    pub mode: Mode,
    pub ftype: Ftype,
    pub current_match: Option<Match>,
    /// Window cell just past the current match, set by the renderer.
    pub match_cell: Option<(u16, u16)>,
    /// Compiled expression currently driving highlighting.
    pub regex: Option<Regex>,
    pub toc: Option<Toc>,
    pub toc_level_visible: u8,
    /// Deferred reload requested by the resize handler.
    pub do_reload: bool,
}

impl Document {
    pub fn new(name: impl Into<String>, store: BlockStore, ftype: Ftype) -> Self {
        Self {
            name: name.into(),
            replacement_name: None,
            store,
            pos: 0,
            page_first: 0,
            page_last: 0,
            mode: Mode::empty(),
            ftype,
            current_match: None,
            match_cell: None,
            regex: None,
            toc: None,
            toc_level_visible: 0,
            do_reload: false,
        }
    }

    /// Open a regular file for paging.
    pub fn open_file(path: &Path) -> std::io::Result<Self> {
        let (source, len) = FileSource::open(path)?;
        let blksize = preferred_blksize(path);
        let store = BlockStore::new(Box::new(source), blksize, Some(len));
        Ok(Self::new(
            path.to_string_lossy(),
            store,
            Ftype::REGULAR,
        ))
    }

    /// Document over an arbitrary source of unknown length (pipes, PTYs).
    pub fn from_source(
        name: impl Into<String>,
        source: Box<dyn FeedSource>,
        ftype: Ftype,
    ) -> Self {
        let store = BlockStore::new(source, DEFAULT_BLKSIZE, None);
        Self::new(name, store, ftype)
    }

    /// Injected pseudo-document over an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>, ftype: Ftype) -> Self {
        Self::new(
            name,
            BlockStore::from_bytes(bytes, DEFAULT_BLKSIZE),
            ftype,
        )
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut BlockStore {
        &mut self.store
    }

    pub fn size(&self) -> Option<u64> {
        self.store.size()
    }

    pub fn lines_count(&self) -> usize {
        self.store.lines().count()
    }

    /// True once the source hit EOF with zero bytes.
    pub fn is_known_empty(&self) -> bool {
        self.store.size() == Some(0)
    }

    /// A man page whose width-sensitive formatting this process can
    /// regenerate by re-invoking the loader.
    pub fn auto_reloadable(&self) -> bool {
        self.ftype
            .intersects(Ftype::LSP_LOADED_MANPAGE)
            || (self.ftype.contains(Ftype::MANPAGE) && self.ftype.contains(Ftype::STDIN))
    }

    /// Byte at `pos`, faulting blocks in as needed. `None` is EOF.
    pub fn byte_at(&mut self, pos: u64) -> Result<Option<u8>> {
        Ok(self.store.get(pos)?)
    }

    /// Materialize the physical line containing `at`. `None` when `at`
    /// is at or past end of data.
    pub fn line_at(&mut self, at: u64) -> Result<Option<Line>> {
        if self.store.get(at)?.is_none() {
            return Ok(None);
        }
        let start = self.store.lines().line_start(at).unwrap_or(0);
        let mut raw = Vec::new();
        let mut p = start;
        while let Some(b) = self.store.get(p)? {
            raw.push(b);
            p += 1;
            if b == b'\n' {
                break;
            }
        }
        Ok(Some(Line::new(start, raw)))
    }

    /// Line at the reader position.
    pub fn get_line_here(&mut self) -> Result<Option<Line>> {
        self.line_at(self.pos)
    }

    /// Line preceding the one that starts at `start`, if any.
    pub fn prev_line(&mut self, start: u64) -> Result<Option<Line>> {
        if start == 0 {
            return Ok(None);
        }
        self.line_at(start - 1)
    }

    /// Advance `from` forward by `n` window lines. The result is a
    /// window-line start, or end-of-data when the motion runs out.
    pub fn wline_fw(&mut self, from: u64, n: usize, opts: &LayoutOpts) -> Result<u64> {
        let mut pos = from;
        let mut left = n;
        loop {
            let Some(mut line) = self.line_at(pos)? else {
                return Ok(pos);
            };
            line.layout(opts);
            let k = line.wline_of(pos);
            let rest = line.wline_count() - k;
            if left < rest {
                return Ok(line.wline_pos(k + left).expect("index in range"));
            }
            left -= rest;
            pos = line.end();
        }
    }

    /// Step `from` backward by `n` window lines, crossing physical lines
    /// as needed; clamps at offset 0. When `from` equals end-of-data the
    /// walk starts on the last window line without consuming a step.
    pub fn wline_bw(&mut self, from: u64, n: usize, opts: &LayoutOpts) -> Result<u64> {
        if from == 0 {
            return Ok(0);
        }
        let look = if self.size() == Some(from) { from - 1 } else { from };
        let Some(mut line) = self.line_at(look)? else {
            return Ok(0);
        };
        line.layout(opts);
        let mut k = if from >= line.end() {
            line.wline_count() - 1
        } else {
            line.wline_of(from)
        };
        let mut left = n;
        while left > 0 {
            if k > 0 {
                k -= 1;
                left -= 1;
                continue;
            }
            if line.pos == 0 {
                break;
            }
            let prev = self
                .line_at(line.pos - 1)?
                .expect("line before a known start");
            line = prev;
            line.layout(opts);
            k = line.wline_count() - 1;
            left -= 1;
        }
        Ok(line.wline_pos(k).expect("index in range"))
    }

    /// Top of the last renderable page of `rows` window lines. Reads the
    /// source to EOF first.
    pub fn goto_last_wpage(&mut self, rows: usize, opts: &LayoutOpts) -> Result<u64> {
        self.store.read_all()?;
        let size = self.store.size().unwrap_or(0);
        if size == 0 {
            return Ok(0);
        }
        self.wline_bw(size, rows.saturating_sub(1), opts)
    }

    /// Percentage of the document shown through `page_last`, once the
    /// size is known.
    pub fn percent(&self) -> Option<u8> {
        let size = self.store.size()?;
        if size == 0 {
            return Some(100);
        }
        Some(((self.page_last.min(size) * 100) / size) as u8)
    }

    /// Discard all cached data and restart on a fresh source (reload).
    pub fn reset(&mut self, source: Box<dyn FeedSource>, size_hint: Option<u64>) {
        trace!(target: "doc", name = %self.name, "reset");
        self.store.reset(source, size_hint);
        self.pos = 0;
        self.page_first = 0;
        self.page_last = 0;
        self.current_match = None;
        self.match_cell = None;
        self.toc = None;
        self.do_reload = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(bytes: &[u8]) -> Document {
        Document::from_bytes("test", bytes.to_vec(), Ftype::REGULAR)
    }

    #[test]
    fn line_extraction_basics() {
        let mut d = doc(b"one\ntwo\nthree");
        let l = d.line_at(0).unwrap().unwrap();
        assert_eq!(l.raw, b"one\n");
        let l = d.line_at(5).unwrap().unwrap();
        assert_eq!(l.pos, 4);
        assert_eq!(l.raw, b"two\n");
        // Unterminated final line is still one line.
        let l = d.line_at(8).unwrap().unwrap();
        assert_eq!(l.raw, b"three");
        assert!(d.line_at(13).unwrap().is_none());
    }

    #[test]
    fn empty_document_has_no_lines() {
        let mut d = doc(b"");
        assert!(d.get_line_here().unwrap().is_none());
        assert_eq!(d.lines_count(), 0);
        assert!(d.is_known_empty());
    }

    #[test]
    fn wline_fw_crosses_physical_lines() {
        let opts = LayoutOpts::new(10);
        let mut d = doc(b"abcdefghijklmno\nshort\nlast\n");
        // Line 0 wraps at [0, 10]; fw by 1 lands inside it.
        assert_eq!(d.wline_fw(0, 1, &opts).unwrap(), 10);
        // fw by 2 crosses into line 1.
        assert_eq!(d.wline_fw(0, 2, &opts).unwrap(), 16);
        assert_eq!(d.wline_fw(0, 3, &opts).unwrap(), 22);
        // Running out of lines returns end of data.
        assert_eq!(d.wline_fw(0, 9, &opts).unwrap(), 27);
    }

    #[test]
    fn wline_bw_reverses_fw() {
        let opts = LayoutOpts::new(10);
        let mut d = doc(b"abcdefghijklmno\nshort\nlast\n");
        let fw2 = d.wline_fw(0, 2, &opts).unwrap();
        assert_eq!(d.wline_bw(fw2, 2, &opts).unwrap(), 0);
        let fw3 = d.wline_fw(0, 3, &opts).unwrap();
        assert_eq!(d.wline_bw(fw3, 1, &opts).unwrap(), 16);
        // Clamp at the top.
        assert_eq!(d.wline_bw(10, 5, &opts).unwrap(), 0);
    }

    #[test]
    fn fw_then_bw_round_trips() {
        let opts = LayoutOpts::new(8);
        let mut d = doc(b"a long first line here\nsecond\nthird line wraps too\nx\n");
        for n in 1..6 {
            let there = d.wline_fw(0, n, &opts).unwrap();
            let back = d.wline_bw(there, n, &opts).unwrap();
            assert_eq!(back, 0, "round trip by {n}");
        }
    }

    #[test]
    fn last_wpage_top() {
        let opts = LayoutOpts::new(10);
        let mut d = doc(b"1\n2\n3\n4\n5\n");
        // 3 text rows: last page shows lines 3,4,5 -> top at "3\n" (offset 4).
        assert_eq!(d.goto_last_wpage(3, &opts).unwrap(), 4);
        // More rows than content: top clamps to 0.
        assert_eq!(d.goto_last_wpage(20, &opts).unwrap(), 0);
    }

    #[test]
    fn last_wpage_counts_window_lines() {
        let opts = LayoutOpts::new(10);
        let mut d = doc(b"abcdefghijklmno\nend\n");
        // Window lines: [0], [10], [16]. Two rows -> top at 10.
        assert_eq!(d.goto_last_wpage(2, &opts).unwrap(), 10);
    }

    #[test]
    fn empty_goto_end_is_noop() {
        let opts = LayoutOpts::new(10);
        let mut d = doc(b"");
        assert_eq!(d.goto_last_wpage(10, &opts).unwrap(), 0);
    }

    #[test]
    fn percent_tracks_page_last() {
        let mut d = doc(b"0123456789");
        d.page_last = 5;
        assert_eq!(d.percent(), Some(50));
        d.page_last = 10;
        assert_eq!(d.percent(), Some(100));
    }
}
