//! Page and TOC alignment around a fresh match.

use core_doc::{Document, Match, Toc};
use core_line::LayoutOpts;

use crate::Result;

/// How the page should settle around a match.
#[derive(Debug, Clone, Copy)]
pub struct AlignRequest {
    /// Text rows of the window (status line excluded).
    pub rows: usize,
    /// Persistent preference: put the match line at the top.
    pub match_top: bool,
    /// One-shot inversion of the preference (first `CTRL_L` press).
    pub invert_once: bool,
}

impl AlignRequest {
    fn top_aligned(&self) -> bool {
        self.match_top ^ self.invert_once
    }
}

/// Compute the new `page_first` for `m`.
///
/// With top alignment the match's window line becomes the top row.
/// Otherwise: a match on the current page's last row scrolls forward half
/// a window; a match elsewhere on the current page leaves the page
/// alone; a match off-page settles half a window below the top.
pub fn align_page(
    doc: &mut Document,
    m: Match,
    req: &AlignRequest,
    opts: &LayoutOpts,
) -> Result<u64> {
    let Some(mut line) = doc.line_at(m.so)? else {
        return Ok(doc.page_first);
    };
    line.layout(opts);
    let match_wline = line
        .wline_pos(line.wline_of(m.so))
        .expect("window line exists");
    if req.top_aligned() {
        return Ok(match_wline);
    }
    let half = (req.rows / 2).max(1);
    let on_page = m.so >= doc.page_first && m.so < doc.page_last;
    if on_page {
        let last_row = doc.wline_fw(doc.page_first, req.rows.saturating_sub(1), opts)?;
        if match_wline == last_row {
            return Ok(doc.wline_fw(doc.page_first, half, opts)?);
        }
        return Ok(doc.page_first);
    }
    Ok(doc.wline_bw(match_wline, half, opts)?)
}

/// Settle the TOC page around a matched entry: cursor on the entry, the
/// page scrolled so it sits half a window down unless already visible.
pub fn align_toc(toc: &mut Toc, entry: usize, rows: usize, level: u8) {
    toc.cursor = entry;
    let visible_rows = rows.max(1);
    let on_page = toc
        .visible_from(toc.first, level)
        .take(visible_rows)
        .any(|(i, _)| i == entry);
    if !on_page {
        toc.first = toc.bw(entry, visible_rows / 2, level);
    }
}
