//! Motions: window lines, pages, document ends, horizontal shift, and
//! the TOC cursor.

use anyhow::Result;
use core_doc::{Document, Toc};
use core_line::LayoutOpts;

/// Horizontal shift step for one Left/Right press.
pub const SHIFT_STEP: u16 = 8;

/// Scroll forward `n` window lines. A page already showing end-of-data
/// stays put.
pub fn forward(doc: &mut Document, n: usize, rows: usize, opts: &LayoutOpts) -> Result<()> {
    if let Some(size) = doc.size()
        && doc.page_last >= size
    {
        return Ok(());
    }
    let next = doc.wline_fw(doc.page_first, n, opts)?;
    doc.page_first = match doc.size() {
        Some(size) if next >= size => doc.goto_last_wpage(rows, opts)?,
        _ => next,
    };
    Ok(())
}

/// Scroll backward `n` window lines, clamping at the top.
pub fn backward(doc: &mut Document, n: usize, opts: &LayoutOpts) -> Result<()> {
    doc.page_first = doc.wline_bw(doc.page_first, n, opts)?;
    Ok(())
}

/// One page: the window's text rows.
pub fn page(doc: &mut Document, fw: bool, rows: usize, opts: &LayoutOpts) -> Result<()> {
    let n = rows.max(1);
    if fw {
        forward(doc, n, rows, opts)
    } else {
        backward(doc, n, opts)
    }
}

/// Half a page, emacs style.
pub fn half_page(doc: &mut Document, fw: bool, rows: usize, opts: &LayoutOpts) -> Result<()> {
    let n = (rows / 2).max(1);
    if fw {
        forward(doc, n, rows, opts)
    } else {
        backward(doc, n, opts)
    }
}

pub fn goto_top(doc: &mut Document) {
    doc.page_first = 0;
}

/// Jump to the last renderable page (reads to EOF).
pub fn goto_end(doc: &mut Document, rows: usize, opts: &LayoutOpts) -> Result<()> {
    doc.page_first = doc.goto_last_wpage(rows, opts)?;
    Ok(())
}

/// Horizontal shift, saturating on both ends.
pub fn shift_right(shift: u16) -> u16 {
    shift.saturating_add(SHIFT_STEP)
}

pub fn shift_left(shift: u16) -> u16 {
    shift.saturating_sub(SHIFT_STEP)
}

/// Move the TOC cursor down one visible entry. Crossing the page edge
/// scrolls by half a window; on the last page the cursor simply stops
/// at the final entry.
pub fn toc_cursor_down(toc: &mut Toc, rows: usize, level: u8) {
    let Some(next) = toc.next_visible(toc.cursor, level) else {
        return;
    };
    toc.cursor = next;
    ensure_cursor_on_page(toc, rows, level);
}

pub fn toc_cursor_up(toc: &mut Toc, rows: usize, level: u8) {
    let Some(prev) = toc.prev_visible(toc.cursor, level) else {
        return;
    };
    toc.cursor = prev;
    ensure_cursor_on_page(toc, rows, level);
}

fn ensure_cursor_on_page(toc: &mut Toc, rows: usize, level: u8) {
    let rows = rows.max(1);
    let on_page = toc
        .visible_from(toc.first, level)
        .take(rows)
        .any(|(i, _)| i == toc.cursor);
    if !on_page {
        toc.first = toc.bw(toc.cursor, rows / 2, level);
    }
}
