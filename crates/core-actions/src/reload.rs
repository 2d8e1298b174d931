//! Resize-driven and explicit reloads.
//!
//! Man pages are width-sensitive: after a width change the loader is
//! re-invoked through a PTY at the new size and the view is repositioned
//! near the previously shown spot using a section-name + empty-line +
//! word-count heuristic.

use std::path::Path;

use anyhow::{Context, Result, bail};
use core_doc::{Document, DocumentRing, Ftype};
use core_feed::FileSource;
use core_line::LayoutOpts;
use core_refs::parse_reference;
use core_search::refs_regex;
use core_spawn::{CommandTemplate, load_man_page};
use tracing::{debug, info};

/// Name used for a position anchored before the first section header.
const START_OF_PAGE: &[u8] = b"_start_of_manual_page_";

/// Where the view sat relative to the enclosing section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionAnchor {
    /// Normalized text of the header line (without newline).
    pub header: Vec<u8>,
    /// Empty lines between the header and the viewed position.
    pub empties: usize,
    /// Words between the last of those empty lines and the viewed
    /// position.
    pub words: usize,
}

fn words_of(normalized: &[u8]) -> usize {
    normalized
        .split(|b| b.is_ascii_whitespace())
        .filter(|w| !w.is_empty())
        .count()
}

fn header_text(normalized: &[u8]) -> Vec<u8> {
    let mut t = normalized.to_vec();
    while matches!(t.last(), Some(b'\n') | Some(b'\r')) {
        t.pop();
    }
    t
}

/// Record the section header above `doc.page_first` and the view's
/// distance below it.
pub fn save_anchor(doc: &mut Document) -> Result<SectionAnchor> {
    let target = doc.page_first;
    let mut header_pos = 0u64;
    let mut header = START_OF_PAGE.to_vec();

    // Walk backward to the nearest line starting in column 0.
    let mut cur = doc.line_at(target)?;
    while let Some(line) = cur {
        let first = line.normalized.first().copied();
        if line.pos == 0
            || first.is_some_and(|b| !matches!(b, b' ' | b'\t' | b'\n'))
        {
            if first.is_some_and(|b| !matches!(b, b' ' | b'\t' | b'\n')) {
                header = header_text(&line.normalized);
            }
            header_pos = line.pos;
            break;
        }
        cur = doc.prev_line(line.pos)?;
    }

    // Count forward from the header to the viewed position. With no
    // real header the count starts at the very first line.
    let mut empties = 0usize;
    let mut words = 0usize;
    let mut pos = if header == START_OF_PAGE {
        header_pos
    } else {
        match doc.line_at(header_pos)? {
            Some(h) => h.end(),
            None => 0,
        }
    };
    while pos < target {
        let Some(line) = doc.line_at(pos)? else {
            break;
        };
        if line.pos >= target {
            break;
        }
        if line.is_blank() {
            empties += 1;
            words = 0;
        } else {
            words += words_of(&line.normalized);
        }
        pos = line.end();
    }

    let anchor = SectionAnchor {
        header,
        empties,
        words,
    };
    debug!(target: "reload", ?anchor, "anchor saved");
    Ok(anchor)
}

/// Re-find the anchored position in reloaded content: the identically
/// named header, past the recorded empty lines, then forward until the
/// running word count exceeds the target.
pub fn restore_anchor(doc: &mut Document, anchor: &SectionAnchor) -> Result<u64> {
    let mut pos = 0u64;
    if anchor.header != START_OF_PAGE {
        let mut cur = doc.line_at(0)?;
        while let Some(line) = cur {
            let first = line.normalized.first().copied();
            if first.is_some_and(|b| !matches!(b, b' ' | b'\t' | b'\n'))
                && header_text(&line.normalized) == anchor.header
            {
                pos = line.end();
                break;
            }
            let next = line.end();
            cur = doc.line_at(next)?;
            if cur.is_none() {
                // Header vanished: start from the top.
                return Ok(0);
            }
        }
    } else if let Some(h) = doc.line_at(0)? {
        pos = if anchor.empties > 0 || anchor.words > 0 {
            h.pos
        } else {
            return Ok(0);
        };
    }

    // Skip the recorded number of empty lines.
    let mut left = anchor.empties;
    while left > 0 {
        let Some(line) = doc.line_at(pos)? else {
            return Ok(pos);
        };
        if line.is_blank() {
            left -= 1;
        }
        pos = line.end();
    }

    if anchor.words == 0 {
        return Ok(pos);
    }
    let mut sum = 0usize;
    while let Some(line) = doc.line_at(pos)? {
        sum += words_of(&line.normalized);
        if sum > anchor.words {
            return Ok(line.pos);
        }
        pos = line.end();
    }
    Ok(pos)
}

/// Reload a man-page document through the PTY loader at the new window
/// size, then reposition near the previously viewed section.
pub fn reload_man(
    doc: &mut Document,
    template: &CommandTemplate,
    rows: u16,
    cols: u16,
) -> Result<Option<String>> {
    let anchor = save_anchor(doc)?;
    let spec = parse_reference(&doc.name);
    info!(target: "reload", name = %doc.name, rows, cols, "man reload");
    let man = load_man_page(template, &spec.name, &spec.section, rows, cols)
        .with_context(|| format!("unable to load {}", doc.name))?;
    let page_name = man.page_name.clone();
    doc.reset(Box::new(man.source), None);
    doc.ftype |= Ftype::MANPAGE | Ftype::LSP_LOADED_MANPAGE;
    doc.store_mut().read_all()?;
    doc.page_first = restore_anchor(doc, &anchor)?;
    doc.do_reload = false;
    Ok(page_name)
}

/// Reload a regular file (`r`): discard everything, reopen, refill up to
/// the previously shown page; a file that shrank below it falls back to
/// its last page.
pub fn reload_file(doc: &mut Document, rows: usize, opts: &LayoutOpts) -> Result<()> {
    if !doc.ftype.contains(Ftype::REGULAR) {
        bail!("reload not supported for {}", doc.name);
    }
    let path = doc
        .replacement_name
        .clone()
        .unwrap_or_else(|| doc.name.clone());
    let old_first = doc.page_first;
    let (source, len) = FileSource::open(Path::new(&path))
        .with_context(|| format!("cannot reread {path}"))?;
    doc.reset(Box::new(source), Some(len));
    doc.store_mut().read_to(old_first)?;
    doc.page_first = if doc.store().size().is_some_and(|s| s < old_first) {
        doc.goto_last_wpage(rows, opts)?
    } else {
        old_first
    };
    Ok(())
}

/// After a width change, every auto-reloadable document other than the
/// current one reloads lazily at its next display.
pub fn mark_pending_reloads(ring: &mut DocumentRing) {
    for doc in ring.iter_mut().skip(1) {
        if doc.auto_reloadable() {
            doc.do_reload = true;
        }
    }
}

/// Whether the parent process is `man` (stdin handed to us as a pager):
/// such stdin content is a reloadable man page.
pub fn parent_is_man() -> bool {
    #[cfg(target_os = "linux")]
    {
        let ppid = unsafe { libc::getppid() };
        if let Ok(comm) = std::fs::read_to_string(format!("/proc/{ppid}/comm")) {
            return comm.trim() == "man";
        }
    }
    false
}

/// Fallback page-name detection when the sentinel is missing: a heading
/// line of the shape `NAME(n) ... NAME(n)`.
pub fn detect_heading_name(doc: &mut Document) -> Result<Option<String>> {
    let Some(line) = doc.line_at(0)? else {
        return Ok(None);
    };
    let text = header_text(&line.normalized);
    let mut it = text.split(|b: &u8| b.is_ascii_whitespace()).filter(|w| !w.is_empty());
    let (Some(first), Some(last)) = (it.next(), it.next_back()) else {
        return Ok(None);
    };
    if first == last && refs_regex().is_match(first) {
        return Ok(Some(String::from_utf8_lossy(first).into_owned()));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_doc::Ftype;

    const PAGE: &[u8] = b"NAME\n\
        \x20      lsp - pager\n\
        \n\
        DESCRIPTION\n\
        \x20      one two three\n\
        \x20      four five\n\
        \n\
        \x20      six seven eight nine\n\
        \x20      ten\n\
        OPTIONS\n\
        \x20      tail words here\n";

    fn doc(bytes: &[u8]) -> Document {
        Document::from_bytes("anchor-test", bytes.to_vec(), Ftype::REGULAR)
    }

    fn line_start(d: &mut Document, idx: usize) -> u64 {
        d.store_mut().read_all().unwrap();
        d.store().lines().offset(idx).unwrap()
    }

    #[test]
    fn anchor_records_section_and_distance() {
        let mut d = doc(PAGE);
        // View starts at "ten" (line index 8): inside DESCRIPTION,
        // one empty line above it since the section header, and the
        // paragraph "six seven eight nine" before it.
        d.page_first = line_start(&mut d, 8);
        let a = save_anchor(&mut d).unwrap();
        assert_eq!(a.header, b"DESCRIPTION".to_vec());
        assert_eq!(a.empties, 1);
        assert_eq!(a.words, 4);
    }

    #[test]
    fn anchor_round_trips_on_unchanged_content() {
        let mut d = doc(PAGE);
        for idx in [4, 5, 7, 8, 10] {
            d.page_first = line_start(&mut d, idx);
            let a = save_anchor(&mut d).unwrap();
            let restored = restore_anchor(&mut d, &a).unwrap();
            assert_eq!(
                restored,
                d.page_first,
                "anchor round trip for line {idx}"
            );
        }
    }

    #[test]
    fn anchor_at_header_line_itself() {
        let mut d = doc(PAGE);
        let at = line_start(&mut d, 3);
        d.page_first = at;
        let a = save_anchor(&mut d).unwrap();
        assert_eq!(a.header, b"DESCRIPTION".to_vec());
        assert_eq!(a.empties, 0);
        assert_eq!(a.words, 0);
    }

    #[test]
    fn top_of_page_anchor_restores_to_zero() {
        let mut d = doc(b"   indented preamble\nNAME\n   body\n");
        d.page_first = 0;
        let a = save_anchor(&mut d).unwrap();
        assert_eq!(a.header, START_OF_PAGE.to_vec());
        assert_eq!(restore_anchor(&mut d, &a).unwrap(), 0);
    }

    #[test]
    fn missing_header_falls_back_to_top() {
        let mut d = doc(PAGE);
        d.page_first = line_start(&mut d, 8);
        let a = save_anchor(&mut d).unwrap();
        let mut reloaded = doc(b"NAME\n   other content\n");
        assert_eq!(restore_anchor(&mut reloaded, &a).unwrap(), 0);
    }

    #[test]
    fn reload_file_refills_to_old_page() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"a\nb\nc\nd\ne\n").unwrap();
        let mut d = Document::open_file(tmp.path()).unwrap();
        let opts = LayoutOpts::new(80);
        d.page_first = 4;
        reload_file(&mut d, 10, &opts).unwrap();
        assert_eq!(d.page_first, 4);
        // Shrink below the old page: fall back to the end.
        std::fs::write(tmp.path(), b"a\n").unwrap();
        reload_file(&mut d, 10, &opts).unwrap();
        assert_eq!(d.page_first, 0);
        assert_eq!(d.size(), Some(2));
    }

    #[test]
    fn reload_rejected_for_pseudo_documents() {
        let mut d = Document::from_bytes("*help*", b"x\n".to_vec(), Ftype::empty());
        let opts = LayoutOpts::new(80);
        assert!(reload_file(&mut d, 10, &opts).is_err());
    }

    #[test]
    fn pending_reloads_skip_current() {
        let mut ring = DocumentRing::new();
        let mut man1 = Document::from_bytes("a(1)", b"x\n".to_vec(), Ftype::MANPAGE);
        man1.ftype |= Ftype::LSP_LOADED_MANPAGE;
        let mut man2 = Document::from_bytes("b(1)", b"x\n".to_vec(), Ftype::MANPAGE);
        man2.ftype |= Ftype::LSP_LOADED_MANPAGE;
        let plain = Document::from_bytes("c.txt", b"x\n".to_vec(), Ftype::REGULAR);
        ring.add(man1);
        ring.add(plain);
        ring.add(man2);
        mark_pending_reloads(&mut ring);
        let flags: Vec<(String, bool)> = ring
            .iter()
            .map(|d| (d.name.clone(), d.do_reload))
            .collect();
        assert_eq!(
            flags,
            vec![
                ("b(1)".to_string(), false),
                ("c.txt".to_string(), false),
                ("a(1)".to_string(), true)
            ]
        );
    }

    #[test]
    fn heading_name_detection() {
        let mut d = doc(b"LSP(1)    General Commands    LSP(1)\nbody\n");
        assert_eq!(
            detect_heading_name(&mut d).unwrap().as_deref(),
            Some("LSP(1)")
        );
        let mut d = doc(b"LSP(1)    something else    OTHER(1)\n");
        assert_eq!(detect_heading_name(&mut d).unwrap(), None);
        let mut d = doc(b"not a heading\n");
        assert_eq!(detect_heading_name(&mut d).unwrap(), None);
    }
}
