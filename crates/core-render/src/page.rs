//! Drawing one page of a document.

use anyhow::Result;
use core_doc::{Document, Match, Mode};
use core_line::{
    Attr, LayoutOpts, Line, PairTable, Payload, SgrState, normalize_count, overstrike_attr,
    parse_ctrl_run, payload_at, payload_width, sgr_len,
};
use regex::bytes::Regex;
use std::io::{Write, stdout};
use tracing::trace;

use crate::status::{StatusContext, format_status};
use crate::style::StyleSpec;
use crate::writer::BatchWriter;

/// Fixed line-number gutter: `%7ld|`.
pub const GUTTER_WIDTH: u16 = 8;

/// Geometry and display options for one draw.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    pub cols: u16,
    /// Total rows; the last one is the status line.
    pub rows: u16,
    pub shift: u16,
    pub line_numbers: bool,
    pub no_color: bool,
    pub chop: bool,
    pub keep_cr: bool,
    pub tab_width: u16,
}

impl RenderContext {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            shift: 0,
            line_numbers: false,
            no_color: false,
            chop: false,
            keep_cr: false,
            tab_width: 8,
        }
    }

    pub fn text_rows(&self) -> u16 {
        self.rows.saturating_sub(1)
    }

    /// Columns available to content, after the gutter.
    pub fn text_width(&self) -> u16 {
        if self.line_numbers {
            self.cols.saturating_sub(GUTTER_WIDTH)
        } else {
            self.cols
        }
    }

    pub fn layout_opts(&self) -> LayoutOpts {
        LayoutOpts {
            width: self.text_width(),
            tab_width: self.tab_width,
            chop: self.chop,
            keep_cr: self.keep_cr,
        }
    }
}

/// What a draw settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOutcome {
    pub page_first: u64,
    pub page_last: u64,
    pub match_cell: Option<(u16, u16)>,
}

/// Stateful page renderer owning the color-pair table.
pub struct Renderer {
    pairs: PairTable,
    pair_warned: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            pairs: PairTable::default(),
            pair_warned: false,
        }
    }

    /// True exactly once, the first time pair allocation fails; the
    /// caller posts the status message.
    pub fn take_pair_warning(&mut self) -> bool {
        if self.pairs.exhausted() && !self.pair_warned {
            self.pair_warned = true;
            return true;
        }
        false
    }

    /// Draw the page starting at `doc.page_first` to standard output and
    /// update the document's page range, reader position and match cell.
    pub fn draw_page(
        &mut self,
        doc: &mut Document,
        ctx: &RenderContext,
        status: &str,
        ref_valid: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<RenderOutcome> {
        let mut out = stdout();
        self.draw_page_into(doc, ctx, status, ref_valid, &mut out)
    }

    pub fn draw_page_into(
        &mut self,
        doc: &mut Document,
        ctx: &RenderContext,
        status: &str,
        ref_valid: &mut dyn FnMut(&[u8]) -> bool,
        out: &mut impl Write,
    ) -> Result<RenderOutcome> {
        let opts = ctx.layout_opts();
        let text_rows = ctx.text_rows();
        let mode = doc.mode;
        let regex = doc.regex.clone();
        let current = doc.current_match;
        let highlight = mode.contains(Mode::HIGHLIGHT);
        let hl_attr = if mode.contains(Mode::REFS) {
            Attr::UNDERLINE
        } else {
            Attr::STANDOUT
        };

        let mut w = BatchWriter::new(ctx.no_color);
        w.clear_all();
        let mut state = SgrState::default();
        let mut match_cell: Option<(u16, u16)> = None;
        let mut pos = doc.page_first;
        let mut row: u16 = 0;

        let mut line_opt = doc.line_at(pos)?;
        if let Some(line) = &line_opt
            && pos > line.pos
        {
            // Long-line spillover: replay the attribute state the passed
            // prefix established.
            preload_sgr(&line.raw, (pos - line.pos) as usize, &mut state, &mut self.pairs);
        }

        'rows: while row < text_rows {
            let Some(mut line) = line_opt.take() else {
                break;
            };
            line.layout(&opts);
            let ranges = if highlight {
                line_match_ranges(&line, regex.as_ref(), mode, &mut *ref_valid)
            } else {
                Vec::new()
            };
            let number = doc.store().lines().line_of(line.pos).map(|i| i + 1);
            let mut k = line.wline_of(pos);
            loop {
                w.move_to(0, row);
                if ctx.line_numbers {
                    w.set_style(StyleSpec::default());
                    if k == 0 {
                        w.print(&format!("{:7}|", number.unwrap_or(0)));
                    } else {
                        w.print("        ");
                    }
                }
                self.draw_wline(
                    &mut w,
                    &line,
                    k,
                    row,
                    ctx,
                    &opts,
                    &mut state,
                    &ranges,
                    current,
                    hl_attr,
                    &mut match_cell,
                );
                row += 1;
                if k + 1 < line.wline_count() {
                    k += 1;
                    pos = line.wline_pos(k).expect("window line exists");
                    if row >= text_rows {
                        break 'rows;
                    }
                } else {
                    pos = line.end();
                    break;
                }
            }
            if row >= text_rows {
                break;
            }
            line_opt = doc.line_at(pos)?;
        }

        self.paint_status(&mut w, ctx, status);
        if let Some((y, x)) = match_cell {
            w.show_cursor_at(x, y);
        }
        let (cmds, cells) = w.flush_into(out)?;
        trace!(target: "render", cmds, cells, row, "page drawn");

        doc.page_last = pos;
        if !doc.mode.contains(Mode::TOC) {
            doc.pos = pos;
        }
        doc.match_cell = match_cell;
        Ok(RenderOutcome {
            page_first: doc.page_first,
            page_last: pos,
            match_cell,
        })
    }

    /// Draw one TOC page: visible headings from `toc.first`, the cursor
    /// entry in standout.
    pub fn draw_toc(
        &mut self,
        doc: &mut Document,
        ctx: &RenderContext,
        status: &str,
    ) -> Result<()> {
        let mut out = stdout();
        self.draw_toc_into(doc, ctx, status, &mut out)
    }

    pub fn draw_toc_into(
        &mut self,
        doc: &mut Document,
        ctx: &RenderContext,
        status: &str,
        out: &mut impl Write,
    ) -> Result<()> {
        let toc = doc.toc.take().expect("TOC built before TOC draw");
        let level = doc.toc_level_visible;
        let text_rows = ctx.text_rows() as usize;
        let width = ctx.cols as usize;

        let mut w = BatchWriter::new(ctx.no_color);
        w.clear_all();
        let page: Vec<(usize, u64)> = toc
            .visible_from(toc.first, level)
            .take(text_rows)
            .map(|(i, e)| (i, e.pos))
            .collect();
        for (row, (idx, entry_pos)) in page.iter().enumerate() {
            let Some(line) = doc.line_at(*entry_pos)? else {
                continue;
            };
            let mut text = String::from_utf8_lossy(&line.normalized).into_owned();
            while text.ends_with('\n') || text.ends_with('\r') {
                text.pop();
            }
            let text: String = text.chars().take(width).collect();
            w.move_to(0, row as u16);
            let style = if *idx == toc.cursor {
                StyleSpec::new(Attr::STANDOUT, Default::default(), Default::default())
            } else {
                StyleSpec::default()
            };
            w.set_style(style);
            w.print(&text);
        }
        self.paint_status(&mut w, ctx, status);
        w.flush_into(out)?;
        doc.toc = Some(toc);
        Ok(())
    }

    fn paint_status(&mut self, w: &mut BatchWriter, ctx: &RenderContext, status: &str) {
        w.move_to(0, ctx.rows.saturating_sub(1));
        w.set_style(StyleSpec::new(
            Attr::STANDOUT,
            Default::default(),
            Default::default(),
        ));
        w.print(status);
        w.set_style(StyleSpec::default());
    }

    /// Emit the cells of window line `k`, honoring shift, chop, match
    /// highlighting and the layered attribute model.
    #[allow(clippy::too_many_arguments)]
    fn draw_wline(
        &mut self,
        w: &mut BatchWriter,
        line: &Line,
        k: usize,
        row: u16,
        ctx: &RenderContext,
        opts: &LayoutOpts,
        state: &mut SgrState,
        ranges: &[(u64, u64)],
        current: Option<Match>,
        hl_attr: Attr,
        match_cell: &mut Option<(u16, u16)>,
    ) {
        let start = line.wlines[k];
        let end = line
            .wlines
            .get(k + 1)
            .copied()
            .unwrap_or(line.raw.len());
        let gutter = if ctx.line_numbers { GUTTER_WIDTH } else { 0 };
        let width = ctx.text_width();
        let mut at = start;
        let mut col: u32 = 0;
        let mut chopped = false;

        while at < end {
            let run = parse_ctrl_run(&line.raw, at);
            for &(ps, pe) in &run.sgr_params {
                state.apply(&line.raw[ps..pe], &mut self.pairs);
            }
            at += run.len;
            if at >= end {
                break;
            }
            let (payload, plen) = payload_at(&line.raw, at);
            if payload == Payload::Newline {
                break;
            }
            let ov = match payload {
                Payload::Char(ch) => overstrike_attr(&run.prefixes, ch),
                _ => Attr::empty(),
            };
            // Tab stops derive from the running column; chop mode has no
            // right edge to clamp against.
            let cell_w: u32 = match payload {
                Payload::Tab => {
                    let stop = opts.tab_width as u32 - col % opts.tab_width as u32;
                    if ctx.chop {
                        stop
                    } else {
                        stop.min((width as u32).saturating_sub(col))
                    }
                }
                other => payload_width(other, 0, opts) as u32,
            };

            let abs = line.pos + at as u64;
            let mut attrs = state.attrs | ov;
            if ranges.iter().any(|&(so, eo)| abs >= so && abs < eo) {
                attrs |= hl_attr;
            }
            w.set_style(StyleSpec::new(attrs, state.fg, state.bg));

            let shifted = col as i64 - ctx.shift as i64;
            let visible_end = shifted + cell_w as i64;
            if !chopped && visible_end > 0 && shifted < width as i64 {
                if ctx.chop
                    && visible_end > (width as i64 - 1)
                    && !only_newline_left(&line.raw, at + plen, end)
                {
                    // Content continues past the edge: final cell shows a
                    // chop marker.
                    w.print(">");
                    chopped = true;
                } else if shifted < 0 {
                    // Cell straddles the shift boundary; pad its visible
                    // remainder.
                    w.print(&" ".repeat(visible_end as usize));
                } else {
                    w.print(&cell_text(payload, cell_w));
                }
            }

            if let Some(m) = current
                && abs < m.eo
                && abs + plen as u64 >= m.eo
                && visible_end >= 0
            {
                let x = gutter as i64 + visible_end.min(ctx.cols as i64 - 1);
                *match_cell = Some((row, x.max(0) as u16));
            }

            col += cell_w;
            at += plen;
        }
    }
}

/// Printable form of a payload cell.
fn cell_text(payload: Payload, cell_w: u32) -> String {
    match payload {
        Payload::Char(ch) => ch.to_string(),
        Payload::Bad(_) => '\u{fffd}'.to_string(),
        Payload::Tab => " ".repeat(cell_w as usize),
        Payload::CarriageReturn => {
            if cell_w == 0 {
                String::new()
            } else {
                "^M".to_string()
            }
        }
        Payload::Ctrl(b) => format!("^{}", (b ^ 0x40) as char),
        Payload::Newline => String::new(),
    }
}

/// True when nothing but a terminating newline (possibly behind control
/// runs) remains in `raw[from..end)`.
fn only_newline_left(raw: &[u8], from: usize, end: usize) -> bool {
    let mut at = from;
    while at < end {
        at += core_line::ctrl_run_len(raw, at);
        if at >= end {
            return true;
        }
        let (payload, plen) = payload_at(raw, at);
        if payload != Payload::Newline {
            return false;
        }
        at += plen;
    }
    true
}

/// Replay the SGR sequences in `raw[..upto]` into `state`.
fn preload_sgr(raw: &[u8], upto: usize, state: &mut SgrState, pairs: &mut PairTable) {
    let mut at = 0;
    while at < upto.min(raw.len()) {
        if let Some(n) = sgr_len(&raw[at..]) {
            state.apply(&raw[at + 2..at + n - 1], pairs);
            at += n;
        } else {
            at += 1;
        }
    }
}

/// Raw-offset ranges of every highlighted match on `line`. In refs mode
/// the validity filter drops spellings known to be bad.
fn line_match_ranges(
    line: &Line,
    regex: Option<&Regex>,
    mode: Mode,
    ref_valid: &mut dyn FnMut(&[u8]) -> bool,
) -> Vec<(u64, u64)> {
    let Some(re) = regex else {
        return Vec::new();
    };
    let hay: &[u8] = match line.normalized.last() {
        Some(b'\n') => &line.normalized[..line.normalized.len() - 1],
        _ => &line.normalized,
    };
    let refs_mode = mode.contains(Mode::REFS);
    re.find_iter(hay)
        .filter(|m| m.end() > m.start())
        .filter(|m| !refs_mode || ref_valid(&hay[m.start()..m.end()]))
        .map(|m| {
            (
                line.pos + normalize_count(&line.raw, m.start()) as u64,
                line.pos + normalize_count(&line.raw, m.end()) as u64,
            )
        })
        .collect()
}
