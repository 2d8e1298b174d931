//! Regex search over documents.
//!
//! Matches are computed against the normalized view of each physical
//! line and translated back to absolute raw offsets through
//! `normalize_count`. The byte-mode engine keeps offset semantics exact
//! even for content that is not valid UTF-8; anchors only match at true
//! line boundaries, so a search starting mid-line behaves like
//! `REG_NOTBOL`.

use std::sync::OnceLock;

use core_doc::{DocError, Document, Match, Toc};
use core_line::{Line, ctrl_run_len, normalize_count, normalized_prefix_len, payload_at};
use core_refs::{Resolver, Verifier};
use regex::bytes::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::trace;

mod align;

pub use align::{AlignRequest, align_page, align_toc};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid pattern: {0}")]
    BadPattern(#[from] regex::Error),
    #[error(transparent)]
    Doc(#[from] DocError),
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// Compile a user search pattern. Case folding is ASCII-only to preserve
/// byte-offset semantics.
pub fn compile_user(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .unicode(false)
        .build()?)
}

/// The fixed reference pattern: `name(section…)` tokens like
/// `printf(3)`, `lsp(1)`, `foo(3posix)`.
pub fn refs_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new(r"[A-Za-z0-9.:_+-]+\((n|[0-9])[^)]{0,8}\)")
            .unicode(false)
            .build()
            .expect("refs pattern compiles")
    })
}

/// Search haystack of a line: the normalized payload without the
/// terminating newline, so `$` anchors at the visible end of line.
fn haystack(line: &Line) -> &[u8] {
    let n = &line.normalized;
    match n.last() {
        Some(b'\n') => &n[..n.len() - 1],
        _ => n,
    }
}

/// Translate normalized offsets to an absolute raw [`Match`].
fn to_raw(line: &Line, start: usize, end: usize) -> Match {
    let so = line.pos + normalize_count(&line.raw, start) as u64;
    let eo = line.pos + normalize_count(&line.raw, end) as u64;
    Match::new(so, eo)
}

/// Normalized offset within `line` of the absolute position `pos`.
fn norm_offset(line: &Line, pos: u64) -> usize {
    if pos <= line.pos {
        0
    } else {
        normalized_prefix_len(&line.raw, (pos - line.pos) as usize)
    }
}

/// Forward search: first match at or after `from`. Anchors respect the
/// real line start even when `from` points mid-line.
pub fn search_fw(doc: &mut Document, re: &Regex, from: u64) -> Result<Option<Match>> {
    let mut pos = from;
    loop {
        let Some(line) = doc.line_at(pos)? else {
            return Ok(None);
        };
        let start = norm_offset(&line, pos);
        if let Some(m) = re.find_at(haystack(&line), start) {
            trace!(target: "search", so = m.start(), eo = m.end(), line = line.pos, "fw hit");
            return Ok(Some(to_raw(&line, m.start(), m.end())));
        }
        pos = line.end();
    }
}

/// Backward search: last match strictly before `before`. The line
/// containing `before` is tail-cut at that offset; earlier lines are
/// scanned whole, last match per line wins.
pub fn search_bw(doc: &mut Document, re: &Regex, before: u64) -> Result<Option<Match>> {
    if before == 0 {
        return Ok(None);
    }
    let mut cur = doc.line_at(before - 1)?;
    let mut limit = Some(before);
    while let Some(line) = cur {
        let hay = haystack(&line);
        let cut = match limit.take() {
            Some(b) if b > line.pos => norm_offset(&line, b).min(hay.len()),
            _ => hay.len(),
        };
        if let Some(m) = re.find_iter(&hay[..cut]).last() {
            return Ok(Some(to_raw(&line, m.start(), m.end())));
        }
        cur = doc.prev_line(line.pos)?;
    }
    Ok(None)
}

/// Advance `pos` past one control run plus one payload character, for
/// stepping off a match without stalling on zero-length hits.
pub fn advance_one(doc: &mut Document, pos: u64) -> Result<u64> {
    let Some(line) = doc.line_at(pos)? else {
        return Ok(pos);
    };
    let mut off = (pos - line.pos) as usize;
    off += ctrl_run_len(&line.raw, off);
    if off < line.raw.len() {
        off += payload_at(&line.raw, off).1;
    }
    Ok(line.pos + (off as u64).min(line.raw.len() as u64))
}

/// Widen a zero-length match so the stored range spans one payload
/// character; `n`/`p` stepping then always makes progress.
pub fn widen_empty(doc: &mut Document, m: Match) -> Result<Match> {
    if !m.is_empty() {
        return Ok(m);
    }
    let eo = advance_one(doc, m.eo)?;
    Ok(Match::new(m.so, eo))
}

/// Forward refs search: the next reference token at or after `from`
/// whose spelling validates. Invalid candidates are skipped and the scan
/// resumes at their end offset.
pub fn refs_fw(
    doc: &mut Document,
    from: u64,
    resolver: &mut Resolver,
    verifier: &mut dyn Verifier,
) -> Result<Option<Match>> {
    let re = refs_regex();
    let mut pos = from;
    loop {
        let Some(line) = doc.line_at(pos)? else {
            return Ok(None);
        };
        let hay = haystack(&line);
        let mut start = norm_offset(&line, pos);
        while let Some(m) = re.find_at(hay, start) {
            if resolver.is_valid(&hay[m.start()..m.end()], verifier) {
                return Ok(Some(to_raw(&line, m.start(), m.end())));
            }
            start = m.end();
        }
        pos = line.end();
    }
}

/// Backward refs search: last valid reference strictly before `before`.
pub fn refs_bw(
    doc: &mut Document,
    before: u64,
    resolver: &mut Resolver,
    verifier: &mut dyn Verifier,
) -> Result<Option<Match>> {
    if before == 0 {
        return Ok(None);
    }
    let re = refs_regex();
    let mut cur = doc.line_at(before - 1)?;
    let mut limit = Some(before);
    while let Some(line) = cur {
        let hay = haystack(&line);
        let cut = match limit.take() {
            Some(b) if b > line.pos => norm_offset(&line, b).min(hay.len()),
            _ => hay.len(),
        };
        let hit = re
            .find_iter(&hay[..cut])
            .filter(|m| resolver.is_valid(&hay[m.start()..m.end()], verifier))
            .last();
        if let Some(m) = hit {
            return Ok(Some(to_raw(&line, m.start(), m.end())));
        }
        cur = doc.prev_line(line.pos)?;
    }
    Ok(None)
}

/// Forward search over TOC-visible heading lines only. Returns the
/// matched entry index alongside the match.
pub fn toc_search_fw(
    doc: &mut Document,
    toc: &Toc,
    level: u8,
    from_entry: usize,
    re: &Regex,
) -> Result<Option<(usize, Match)>> {
    let candidates: Vec<(usize, u64)> = toc
        .visible_from(from_entry, level)
        .map(|(i, e)| (i, e.pos))
        .collect();
    for (idx, pos) in candidates {
        let Some(line) = doc.line_at(pos)? else {
            break;
        };
        if let Some(m) = re.find(haystack(&line)) {
            return Ok(Some((idx, to_raw(&line, m.start(), m.end()))));
        }
    }
    Ok(None)
}

/// Backward search over TOC-visible heading lines, from `before_entry`
/// exclusive down to the first entry.
pub fn toc_search_bw(
    doc: &mut Document,
    toc: &Toc,
    level: u8,
    before_entry: usize,
    re: &Regex,
) -> Result<Option<(usize, Match)>> {
    let candidates: Vec<(usize, u64)> = toc
        .visible_from(0, level)
        .take_while(|(i, _)| *i < before_entry)
        .map(|(i, e)| (i, e.pos))
        .collect();
    for (idx, pos) in candidates.into_iter().rev() {
        let Some(line) = doc.line_at(pos)? else {
            continue;
        };
        if let Some(m) = re.find_iter(haystack(&line)).last() {
            return Ok(Some((idx, to_raw(&line, m.start(), m.end()))));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_doc::Ftype;
    use core_refs::ValidationMode;

    fn doc(bytes: &[u8]) -> Document {
        Document::from_bytes("search-test", bytes.to_vec(), Ftype::REGULAR)
    }

    struct NoExec;
    impl Verifier for NoExec {
        fn verify(&mut self, _: &str, _: &str) -> std::io::Result<bool> {
            panic!("verifier must not run");
        }
    }

    #[test]
    fn forward_search_over_sgr_line() {
        // S1: match offsets translate through the SGR run.
        let mut d = doc(b"Hello \x1b[1mworld\x1b[m\n");
        let re = compile_user("orl", false).unwrap();
        let m = search_fw(&mut d, &re, 0).unwrap().unwrap();
        assert_eq!((m.so, m.eo), (11, 14));
        // No later match; no earlier match.
        let next = advance_one(&mut d, m.so).unwrap();
        assert!(search_fw(&mut d, &re, next).unwrap().is_none());
        assert!(search_bw(&mut d, &re, m.so).unwrap().is_none());
    }

    #[test]
    fn search_spans_overstruck_bold() {
        // S2: "bold" assembled from overstrikes.
        let raw = b"b\x08bo\x08ol\x08ld\x08d\n";
        let mut d = doc(raw);
        let re = compile_user("bold", false).unwrap();
        let m = search_fw(&mut d, &re, 0).unwrap().unwrap();
        assert_eq!(m.so, 0);
        assert_eq!(core_line::normalize(&raw[..m.eo as usize]), b"bold");
    }

    #[test]
    fn forward_first_hit_wins_across_lines() {
        let mut d = doc(b"nothing here\nneedle one\nneedle two\n");
        let re = compile_user("needle", false).unwrap();
        let m = search_fw(&mut d, &re, 0).unwrap().unwrap();
        assert_eq!(m.so, 13);
        // Starting past it finds the second.
        let m2 = search_fw(&mut d, &re, m.eo).unwrap().unwrap();
        assert_eq!(m2.so, 24);
    }

    #[test]
    fn caret_respects_mid_line_start() {
        let mut d = doc(b"abc abc\n");
        let re = compile_user("^abc", false).unwrap();
        assert!(search_fw(&mut d, &re, 0).unwrap().is_some());
        // From offset 1 the anchor cannot match.
        assert!(search_fw(&mut d, &re, 1).unwrap().is_none());
    }

    #[test]
    fn dollar_anchors_before_newline() {
        let mut d = doc(b"tail\nnot tai here\n");
        let re = compile_user("tail$", false).unwrap();
        let m = search_fw(&mut d, &re, 0).unwrap().unwrap();
        assert_eq!((m.so, m.eo), (0, 4));
    }

    #[test]
    fn backward_takes_last_match() {
        let mut d = doc(b"x x x\nx\n");
        let re = compile_user("x", false).unwrap();
        let m = search_bw(&mut d, &re, 8).unwrap().unwrap();
        assert_eq!(m.so, 6);
        let m = search_bw(&mut d, &re, 6).unwrap().unwrap();
        assert_eq!(m.so, 4);
        let m = search_bw(&mut d, &re, 1).unwrap().unwrap();
        assert_eq!(m.so, 0);
        assert!(search_bw(&mut d, &re, 0).unwrap().is_none());
    }

    #[test]
    fn backward_then_forward_round_trips() {
        let mut d = doc(b"alpha beta\ngamma beta\n");
        let re = compile_user("beta", false).unwrap();
        let m = search_fw(&mut d, &re, 0).unwrap().unwrap();
        let back = search_bw(&mut d, &re, m.eo).unwrap().unwrap();
        assert_eq!((back.so, back.eo), (m.so, m.eo));
    }

    #[test]
    fn case_insensitive_compile() {
        let mut d = doc(b"Needle\n");
        let re = compile_user("needle", true).unwrap();
        assert!(search_fw(&mut d, &re, 0).unwrap().is_some());
        let re = compile_user("needle", false).unwrap();
        assert!(search_fw(&mut d, &re, 0).unwrap().is_none());
    }

    #[test]
    fn zero_length_match_widens() {
        let mut d = doc(b"ab\n");
        let re = compile_user("x*", false).unwrap();
        let m = search_fw(&mut d, &re, 0).unwrap().unwrap();
        assert!(m.is_empty());
        let w = widen_empty(&mut d, m).unwrap();
        assert_eq!((w.so, w.eo), (0, 1));
        // Stepping from the widened end makes progress.
        let next = search_fw(&mut d, &re, w.eo).unwrap().unwrap();
        assert!(next.so > m.so);
    }

    #[test]
    fn refs_pattern_shape() {
        let re = refs_regex();
        for ok in ["lsp(1)", "printf(3)", "foo(3posix)", "a.b:c+d-e(n)"] {
            assert!(re.is_match(ok.as_bytes()), "{ok} should match");
        }
        for bad in ["lsp()", "lsp(x)", "(1)", "lsp(3waytoolongsec)"] {
            assert!(!re.is_match(bad.as_bytes()), "{bad} must not match");
        }
    }

    #[test]
    fn refs_search_skips_invalid_candidates() {
        // S3: only lsp(1) is known to apropos.
        let mut d = doc(b"See lsp(1) and printf(3).\n");
        let mut resolver = Resolver::new(ValidationMode::Apropos, false);
        resolver.cache.load_snapshot(b"lsp (1) - pager\n", false);
        let m = refs_fw(&mut d, 0, &mut resolver, &mut NoExec)
            .unwrap()
            .unwrap();
        assert_eq!((m.so, m.eo), (4, 10));
        // Continuing past it skips printf(3) and finds nothing.
        assert!(
            refs_fw(&mut d, m.eo, &mut resolver, &mut NoExec)
                .unwrap()
                .is_none()
        );
        // Backward from the end lands on lsp(1) again.
        let b = refs_bw(&mut d, 26, &mut resolver, &mut NoExec)
            .unwrap()
            .unwrap();
        assert_eq!((b.so, b.eo), (4, 10));
    }

    #[test]
    fn refs_candidates_both_found_when_unvalidated() {
        let mut d = doc(b"See lsp(1) and printf(3).\n");
        let mut resolver = Resolver::new(ValidationMode::Off, false);
        let m1 = refs_fw(&mut d, 0, &mut resolver, &mut NoExec)
            .unwrap()
            .unwrap();
        assert_eq!((m1.so, m1.eo), (4, 10));
        let m2 = refs_fw(&mut d, m1.eo, &mut resolver, &mut NoExec)
            .unwrap()
            .unwrap();
        assert_eq!((m2.so, m2.eo), (15, 24));
    }

    #[test]
    fn toc_search_visits_visible_headings_only() {
        let mut d = doc(b"NAME\n   lsp - pager\nSYNOPSIS\n   lsp [opts]\n");
        let toc = Toc::build(&mut d).unwrap();
        let re = compile_user("lsp", false).unwrap();
        // Level 0: only NAME and SYNOPSIS lines are candidates; neither
        // contains "lsp".
        assert!(
            toc_search_fw(&mut d, &toc, 0, 0, &re).unwrap().is_none()
        );
        // Level 1 exposes the body headings.
        let (idx, m) = toc_search_fw(&mut d, &toc, 1, 0, &re).unwrap().unwrap();
        assert_eq!(idx, 1);
        assert_eq!(m.so, 8);
        // Backward from past the last entry finds the later heading.
        let (idx, _) = toc_search_bw(&mut d, &toc, 1, 4, &re).unwrap().unwrap();
        assert_eq!(idx, 3);
    }
}
