//! Folding table of contents built from indentation heuristics.

use tracing::debug;

use crate::document::Document;
use crate::{DocError, Result};

/// One TOC entry: the line-start offset of a heading and its fold level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocEntry {
    pub pos: u64,
    pub level: u8,
}

/// Table of contents over one document. Entries are strictly ascending
/// by `pos`. `first` is the entry at the top of the TOC page, `cursor`
/// the entry the TOC cursor rests on; both always name visible entries.
#[derive(Debug, Default)]
pub struct Toc {
    entries: Vec<TocEntry>,
    pub first: usize,
    pub cursor: usize,
}

/// Heading classification of a normalized line, ignoring the level-2
/// lookahead: 0 for column-0 content, 1 for exactly three spaces of
/// indent, `Some(2)` only tentatively (caller must confirm the successor
/// line is indented at least eleven spaces).
fn classify(norm: &[u8]) -> Option<u8> {
    let first = *norm.first()?;
    if !matches!(first, b' ' | b'\t' | b'{' | b'}' | b'\n') {
        return Some(0);
    }
    let heading_char =
        |b: &u8| !matches!(*b, b' ' | b'\t' | b'\n');
    if norm.starts_with(b"   ") && norm.get(3).is_some_and(heading_char) {
        return Some(1);
    }
    if norm.starts_with(b"       ") && norm.get(7).is_some_and(heading_char) {
        return Some(2);
    }
    None
}

fn indented_at_least(norm: &[u8], n: usize) -> bool {
    norm.len() >= n && norm[..n].iter().all(|&b| b == b' ')
}

impl Toc {
    /// Scan `doc` from offset 0 and build the entry list. Level-2
    /// candidates peek one line ahead; a candidate whose successor is
    /// missing (EOF) or not indented eleven spaces is dropped.
    pub fn build(doc: &mut Document) -> Result<Toc> {
        let mut entries: Vec<TocEntry> = Vec::new();
        let mut line = doc.line_at(0)?;
        while let Some(cur) = line {
            let next = doc.line_at(cur.end())?;
            let level = match classify(&cur.normalized) {
                Some(2) => next
                    .as_ref()
                    .is_some_and(|nx| indented_at_least(&nx.normalized, 11))
                    .then_some(2),
                other => other,
            };
            if let Some(level) = level {
                if entries.last().is_some_and(|last| last.pos >= cur.pos) {
                    return Err(DocError::TocOrder { pos: cur.pos });
                }
                entries.push(TocEntry {
                    pos: cur.pos,
                    level,
                });
            }
            line = next;
        }
        debug!(target: "toc", entries = entries.len(), "built");
        Ok(Toc {
            entries,
            first: 0,
            cursor: 0,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, idx: usize) -> Option<TocEntry> {
        self.entries.get(idx).copied()
    }

    /// First entry visible at `level`, scanning from index 0.
    pub fn first_visible(&self, level: u8) -> Option<usize> {
        self.entries.iter().position(|e| e.level <= level)
    }

    pub fn last_visible(&self, level: u8) -> Option<usize> {
        self.entries.iter().rposition(|e| e.level <= level)
    }

    /// Next visible entry strictly after `from`.
    pub fn next_visible(&self, from: usize, level: u8) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .skip(from + 1)
            .find(|(_, e)| e.level <= level)
            .map(|(i, _)| i)
    }

    /// Previous visible entry strictly before `from`.
    pub fn prev_visible(&self, from: usize, level: u8) -> Option<usize> {
        self.entries[..from]
            .iter()
            .rposition(|e| e.level <= level)
    }

    /// Step a visible index forward by `n`, saturating at the last
    /// visible entry.
    pub fn fw(&self, from: usize, n: usize, level: u8) -> usize {
        let mut at = from;
        for _ in 0..n {
            match self.next_visible(at, level) {
                Some(nx) => at = nx,
                None => break,
            }
        }
        at
    }

    /// Step a visible index backward by `n`, saturating at the first
    /// visible entry.
    pub fn bw(&self, from: usize, n: usize, level: u8) -> usize {
        let mut at = from;
        for _ in 0..n {
            match self.prev_visible(at, level) {
                Some(pv) => at = pv,
                None => break,
            }
        }
        at
    }

    /// Entry whose `pos` equals `line_start` and is visible at `level`.
    pub fn entry_at_pos(&self, line_start: u64, level: u8) -> Option<usize> {
        let idx = self
            .entries
            .binary_search_by_key(&line_start, |e| e.pos)
            .ok()?;
        (self.entries[idx].level <= level).then_some(idx)
    }

    /// Greatest visible entry at or before `pos` (the section the
    /// position falls in).
    pub fn entry_before(&self, pos: u64, level: u8) -> Option<usize> {
        let upper = match self.entries.binary_search_by_key(&pos, |e| e.pos) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        self.entries[..upper]
            .iter()
            .rposition(|e| e.level <= level)
    }

    /// Position the cursor on the entry at `pos`, or on the last entry
    /// when `pos` is `None`.
    pub fn rewind(&mut self, pos: Option<u64>) {
        self.cursor = match pos {
            Some(p) => self
                .entries
                .binary_search_by_key(&p, |e| e.pos)
                .unwrap_or_else(|i| i.min(self.entries.len().saturating_sub(1))),
            None => self.entries.len().saturating_sub(1),
        };
    }

    /// Visible entries starting at `from`, for drawing one TOC page.
    pub fn visible_from<'a>(
        &'a self,
        from: usize,
        level: u8,
    ) -> impl Iterator<Item = (usize, TocEntry)> + 'a {
        self.entries
            .iter()
            .enumerate()
            .skip(from)
            .filter(move |(_, e)| e.level <= level)
            .map(|(i, e)| (i, *e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Ftype;

    fn doc(bytes: &[u8]) -> Document {
        Document::from_bytes("toc-test", bytes.to_vec(), Ftype::REGULAR)
    }

    const MANISH: &[u8] = b"NAME\n   lsp - pager\nSYNOPSIS\n   lsp [opts]\n";

    #[test]
    fn two_level_man_page() {
        let mut d = doc(MANISH);
        let toc = Toc::build(&mut d).unwrap();
        let got: Vec<(u64, u8)> = (0..toc.len())
            .map(|i| {
                let e = toc.entry(i).unwrap();
                (e.pos, e.level)
            })
            .collect();
        assert_eq!(got, vec![(0, 0), (5, 1), (20, 0), (29, 1)]);
    }

    #[test]
    fn level_visibility_filters() {
        let mut d = doc(MANISH);
        let toc = Toc::build(&mut d).unwrap();
        let l0: Vec<usize> = toc.visible_from(0, 0).map(|(i, _)| i).collect();
        assert_eq!(l0, vec![0, 2]);
        let l1: Vec<usize> = toc.visible_from(0, 1).map(|(i, _)| i).collect();
        assert_eq!(l1, vec![0, 1, 2, 3]);
    }

    #[test]
    fn level_two_needs_deep_successor() {
        let text = b"TOP\n       deep\n           continuation\n       alone\nnext\n";
        let mut d = doc(text);
        let toc = Toc::build(&mut d).unwrap();
        let levels: Vec<u8> = (0..toc.len()).map(|i| toc.entry(i).unwrap().level).collect();
        // "deep" qualifies (successor has 11 spaces); "alone" does not
        // (successor "next" is level 0).
        assert_eq!(levels, vec![0, 2, 0]);
    }

    #[test]
    fn level_two_at_eof_is_dropped() {
        let mut d = doc(b"TOP\n       tail");
        let toc = Toc::build(&mut d).unwrap();
        assert_eq!(toc.len(), 1);
        assert_eq!(toc.entry(0).unwrap().level, 0);
    }

    #[test]
    fn braces_and_blank_lines_are_not_headings() {
        let mut d = doc(b"{\n}\n\nreal\n    four spaces\n");
        let toc = Toc::build(&mut d).unwrap();
        assert_eq!(toc.len(), 1);
        assert_eq!(toc.entry(0).unwrap().pos, 5);
    }

    #[test]
    fn empty_document_yields_empty_toc() {
        let mut d = doc(b"");
        let toc = Toc::build(&mut d).unwrap();
        assert!(toc.is_empty());
    }

    #[test]
    fn navigation_skips_invisible() {
        let mut d = doc(MANISH);
        let toc = Toc::build(&mut d).unwrap();
        assert_eq!(toc.next_visible(0, 0), Some(2));
        assert_eq!(toc.next_visible(0, 1), Some(1));
        assert_eq!(toc.prev_visible(2, 0), Some(0));
        assert_eq!(toc.fw(0, 5, 0), 2);
        assert_eq!(toc.bw(2, 5, 1), 0);
    }

    #[test]
    fn pos_mapping_respects_visibility() {
        let mut d = doc(MANISH);
        let toc = Toc::build(&mut d).unwrap();
        assert_eq!(toc.entry_at_pos(20, 0), Some(2));
        // Entry at 5 is level 1: hidden at level 0.
        assert_eq!(toc.entry_at_pos(5, 0), None);
        assert_eq!(toc.entry_at_pos(5, 1), Some(1));
        assert_eq!(toc.entry_at_pos(7, 1), None);
    }

    #[test]
    fn entry_round_trip_through_pos() {
        let mut d = doc(MANISH);
        let toc = Toc::build(&mut d).unwrap();
        for level in 0..=2u8 {
            for (i, e) in toc.visible_from(0, level).collect::<Vec<_>>() {
                assert_eq!(toc.entry_at_pos(e.pos, level), Some(i));
            }
        }
    }

    #[test]
    fn entry_before_finds_section() {
        let mut d = doc(MANISH);
        let toc = Toc::build(&mut d).unwrap();
        assert_eq!(toc.entry_before(0, 0), Some(0));
        assert_eq!(toc.entry_before(12, 0), Some(0));
        assert_eq!(toc.entry_before(25, 0), Some(2));
        assert_eq!(toc.entry_before(12, 1), Some(1));
    }

    #[test]
    fn rewind_to_pos_and_end() {
        let mut d = doc(MANISH);
        let mut toc = Toc::build(&mut d).unwrap();
        toc.rewind(Some(20));
        assert_eq!(toc.cursor, 2);
        toc.rewind(None);
        assert_eq!(toc.cursor, 3);
    }
}
