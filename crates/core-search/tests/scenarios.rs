//! End-to-end search scenarios over in-memory documents.

use core_doc::{Document, Ftype, Mode, Toc};
use core_line::normalize;
use core_refs::{Resolver, ValidationMode, Verifier};
use core_search::{
    AlignRequest, align_page, advance_one, compile_user, refs_bw, refs_fw, search_bw, search_fw,
    widen_empty,
};

fn doc(bytes: &[u8]) -> Document {
    Document::from_bytes("scenario", bytes.to_vec(), Ftype::REGULAR)
}

struct NeverRun;
impl Verifier for NeverRun {
    fn verify(&mut self, _: &str, _: &str) -> std::io::Result<bool> {
        panic!("no command may run in these scenarios");
    }
}

/// A found match always denotes a substring whose normalization the
/// active pattern accepts.
#[test]
fn match_substring_normalizes_to_a_regex_hit() {
    let raw = b"plain \x1b[31mc\x08co\x08ol\x08lo\x08or\x08red\x1b[m text\n";
    let mut d = doc(raw);
    let re = compile_user("colo?red", false).unwrap();
    let m = search_fw(&mut d, &re, 0).unwrap().unwrap();
    assert!(m.so < m.eo);
    let norm = normalize(&raw[m.so as usize..m.eo as usize]);
    assert!(re.is_match(&norm), "normalized match text re-matches");
}

#[test]
fn fw_then_bw_is_stable_across_many_lines() {
    let mut text = Vec::new();
    for i in 0..25 {
        text.extend_from_slice(format!("row {i} has needle inside\n").as_bytes());
    }
    let mut d = doc(&text);
    let re = compile_user("needle", false).unwrap();
    let mut from = 0;
    let mut hits = Vec::new();
    while let Some(m) = search_fw(&mut d, &re, from).unwrap() {
        hits.push(m);
        from = advance_one(&mut d, m.so).unwrap();
    }
    assert_eq!(hits.len(), 25);
    // Walking backward yields the same matches in reverse.
    let mut back = Vec::new();
    let mut before = d.size().unwrap();
    while let Some(m) = search_bw(&mut d, &re, before).unwrap() {
        back.push(m);
        before = m.so;
    }
    back.reverse();
    assert_eq!(hits, back);
}

#[test]
fn zero_length_pattern_never_stalls() {
    let mut d = doc(b"ab\ncd\n");
    let re = compile_user("x*", false).unwrap();
    let mut from = 0;
    let mut seen = Vec::new();
    for _ in 0..20 {
        let Some(m) = search_fw(&mut d, &re, from).unwrap() else {
            break;
        };
        let m = widen_empty(&mut d, m).unwrap();
        seen.push(m.so);
        let next = advance_one(&mut d, m.so).unwrap();
        assert!(next > m.so || next as usize >= 6, "progress from {}", m.so);
        from = next;
    }
    assert!(!seen.is_empty());
    let mut sorted = seen.clone();
    sorted.dedup();
    assert_eq!(sorted, seen, "positions strictly advance");
}

/// Reference navigation with apropos-backed validation.
#[test]
fn reference_navigation_with_apropos_snapshot() {
    let mut d = doc(b"See lsp(1) and printf(3).\nAlso ls(1) helps.\n");
    let mut resolver = Resolver::new(ValidationMode::Apropos, false);
    resolver
        .cache
        .load_snapshot(b"lsp (1) - pager\nls (1) - lister\n", false);

    let first = refs_fw(&mut d, 0, &mut resolver, &mut NeverRun)
        .unwrap()
        .unwrap();
    assert_eq!((first.so, first.eo), (4, 10));
    // printf(3) is skipped; ls(1) on the next line is the next stop.
    let second = refs_fw(&mut d, first.eo, &mut resolver, &mut NeverRun)
        .unwrap()
        .unwrap();
    assert_eq!(&b"Also ls(1) helps.\n"[5..10], b"ls(1)");
    assert_eq!((second.so, second.eo), (31, 36));
    // And backward returns to lsp(1).
    let back = refs_bw(&mut d, second.so, &mut resolver, &mut NeverRun)
        .unwrap()
        .unwrap();
    assert_eq!((back.so, back.eo), (4, 10));
}

#[test]
fn repeated_validation_hits_the_cache() {
    struct Counting(usize);
    impl Verifier for Counting {
        fn verify(&mut self, _: &str, _: &str) -> std::io::Result<bool> {
            self.0 += 1;
            Ok(true)
        }
    }
    let mut d = doc(b"dup(2) here\ndup(2) there\ndup(2) everywhere\n");
    let mut resolver = Resolver::new(ValidationMode::Command, false);
    let mut v = Counting(0);
    let mut from = 0;
    let mut found = 0;
    while let Some(m) = refs_fw(&mut d, from, &mut resolver, &mut v).unwrap() {
        found += 1;
        from = m.eo;
    }
    assert_eq!(found, 3);
    assert_eq!(v.0, 1, "one exec, two cache hits");
}

#[test]
fn search_then_align_keeps_match_visible() {
    let mut text = Vec::new();
    for i in 0..60 {
        let word = if i == 45 { "target" } else { "filler" };
        text.extend_from_slice(format!("{word} line {i}\n").as_bytes());
    }
    let mut d = doc(&text);
    let opts = core_line::LayoutOpts::new(80);
    let re = compile_user("target", false).unwrap();
    let m = search_fw(&mut d, &re, 0).unwrap().unwrap();
    d.current_match = Some(m);
    d.mode.insert(Mode::HIGHLIGHT);
    let req = AlignRequest {
        rows: 20,
        match_top: false,
        invert_once: false,
    };
    let top = align_page(&mut d, m, &req, &opts).unwrap();
    // The match sits half a window below the computed top.
    let half_down = d.wline_fw(top, 10, &opts).unwrap();
    let match_line = d.store().lines().line_start(m.so).unwrap();
    assert_eq!(half_down, match_line);
}

#[test]
fn toc_search_maps_back_to_document_offsets() {
    let mut d = doc(b"INTRO\n   about things\nUSAGE\n   run the tool\n");
    let toc = Toc::build(&mut d).unwrap();
    let re = compile_user("run", false).unwrap();
    let (idx, m) = core_search::toc_search_fw(&mut d, &toc, 1, 0, &re)
        .unwrap()
        .unwrap();
    let entry = toc.entry(idx).unwrap();
    assert_eq!(entry.level, 1);
    assert!(m.so >= entry.pos);
    let line = d.line_at(entry.pos).unwrap().unwrap();
    assert!(m.eo <= line.end());
}
