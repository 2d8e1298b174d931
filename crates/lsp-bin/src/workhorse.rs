//! The dispatch loop: read a key, run a command, redraw.

use anyhow::Result;
use core_actions as actions;
use core_config::Options;
use core_doc::{Document, DocumentRing, Ftype, Mode, Toc};
use core_feed::StdinSource;
use core_line::LayoutOpts;
use core_refs::{Resolver, ValidationMode, Validity, canonicalize, parse_reference};
use core_render::{RenderContext, Renderer, StatusContext, format_status};
use core_search as search;
use core_search::{AlignRequest, align_page, align_toc};
use core_spawn::{CommandVerifier, Preprocessed, apropos_listing, load_man_page, preprocess};
use core_terminal::{PagerEvent, Terminal};
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::execute;
use regex::bytes::Regex;
use std::io::stdout;
use std::path::Path;
use tracing::{debug, info};

use crate::help::{HELP_NAME, HELP_TEXT};

const FILE_LIST_NAME: &str = "*Documents*";
const APROPOS_NAME: &str = "Apropos";
const STDIN_NAME: &str = "*stdin*";

pub struct App {
    opts: Options,
    ring: DocumentRing,
    resolver: Resolver,
    verifier: CommandVerifier,
    renderer: Renderer,
    terminal: Terminal,
    cols: u16,
    rows: u16,
    shift: u16,
    match_top: bool,
    ctrl_l_primed: bool,
    last_user_regex: Option<Regex>,
    message: Option<String>,
    quit: bool,
}

impl App {
    pub fn new(opts: Options) -> Result<Self> {
        let (cols, rows) = core_terminal::size()?;
        let mode = if !opts.verify {
            ValidationMode::Off
        } else if opts.verify_with_apropos {
            ValidationMode::Apropos
        } else {
            ValidationMode::Command
        };
        let mut app = Self {
            resolver: Resolver::new(mode, opts.man_case_sensitive),
            verifier: CommandVerifier::new(opts.verify_command.clone()),
            renderer: Renderer::new(),
            terminal: Terminal::new(),
            ring: DocumentRing::new(),
            cols,
            rows,
            shift: 0,
            match_top: false,
            ctrl_l_primed: false,
            last_user_regex: None,
            message: None,
            quit: false,
            opts,
        };
        app.bootstrap_documents()?;
        if app.opts.load_apropos {
            app.cmd_apropos()?;
        }
        Ok(app)
    }

    fn bootstrap_documents(&mut self) -> Result<()> {
        if self.opts.files.is_empty() {
            let mut doc = Document::from_source(
                STDIN_NAME,
                Box::new(StdinSource::new()),
                Ftype::STDIN,
            );
            match std::env::var("MAN_PN") {
                Ok(pn) if !pn.is_empty() => {
                    doc.name = pn;
                    doc.ftype |= Ftype::MANPAGE;
                }
                _ => {
                    if actions::parent_is_man() {
                        doc.ftype |= Ftype::MANPAGE;
                        if let Some(name) = actions::detect_heading_name(&mut doc)? {
                            doc.name = name;
                        }
                    }
                }
            }
            self.attach_tee(&mut doc)?;
            self.ring.add(doc);
            return Ok(());
        }
        let files = self.opts.files.clone();
        let mut docs = Vec::with_capacity(files.len());
        for path in &files {
            let doc = self
                .open_path(path)
                .map_err(|e| anyhow::anyhow!("cannot open {}: {e}", path.display()))?;
            docs.push(doc);
        }
        if let Some(first) = docs.first_mut() {
            self.attach_tee(first)?;
        }
        // Added in reverse so the first operand ends up current.
        for doc in docs.into_iter().rev() {
            self.ring.add(doc);
        }
        Ok(())
    }

    fn attach_tee(&self, doc: &mut Document) -> Result<()> {
        if let Some(path) = &self.opts.output_file {
            let file = std::fs::File::create(path)?;
            doc.store_mut().set_tee(file);
        }
        Ok(())
    }

    /// Open one file operand, running any configured preprocessor.
    fn open_path(&self, path: &Path) -> Result<Document> {
        let spec = std::env::var("LSP_OPEN")
            .or_else(|_| std::env::var("LESSOPEN"))
            .ok();
        let display = path.to_string_lossy().into_owned();
        if let Some(spec) = spec.filter(|s| !s.is_empty()) {
            match preprocess(&spec, &display)? {
                Preprocessed::Piped(source) => {
                    let mut doc =
                        Document::from_source(display, Box::new(source), Ftype::REGULAR);
                    doc.replacement_name = None;
                    return Ok(doc);
                }
                Preprocessed::Replacement(replacement) => {
                    let mut doc = Document::open_file(&replacement)?;
                    doc.name = display;
                    doc.replacement_name =
                        Some(replacement.to_string_lossy().into_owned());
                    return Ok(doc);
                }
                Preprocessed::Unchanged => {}
            }
        }
        Ok(Document::open_file(path)?)
    }

    pub fn run(&mut self) -> Result<()> {
        if let Some(pattern) = self.opts.search_string.clone() {
            self.do_search_pattern(&pattern, true)?;
        }
        while !self.quit {
            self.render()?;
            match self.terminal.next_event()? {
                PagerEvent::Key(key) => self.dispatch(key)?,
                PagerEvent::Resize(w, h) => self.cmd_resize(w, h)?,
            }
        }
        info!(target: "runtime", "normal exit");
        Ok(())
    }

    fn render_ctx(&self) -> RenderContext {
        RenderContext {
            cols: self.cols,
            rows: self.rows,
            shift: self.shift,
            line_numbers: self.opts.line_numbers,
            no_color: self.opts.no_color,
            chop: self.opts.chop_lines,
            keep_cr: self.opts.keep_cr,
            tab_width: self.opts.tab_width,
        }
    }

    fn layout_opts(&self) -> LayoutOpts {
        self.render_ctx().layout_opts()
    }

    fn text_rows(&self) -> usize {
        self.rows.saturating_sub(1) as usize
    }

    fn render(&mut self) -> Result<()> {
        if self
            .ring
            .current()
            .is_some_and(|d| d.do_reload && d.auto_reloadable())
        {
            self.reload_current_man();
        }
        let ctx = self.render_ctx();
        let opts = ctx.layout_opts();
        let message = self.message.take();
        let man_case = self.opts.man_case_sensitive;
        if self.renderer.take_pair_warning() {
            self.message = Some("color pairs exhausted; falling back to defaults".into());
        }
        let resolver = &mut self.resolver;
        let Some(doc) = self.ring.current_mut() else {
            self.quit = true;
            return Ok(());
        };
        // Status reflects the page about to be drawn.
        doc.page_last = doc.wline_fw(doc.page_first, ctx.text_rows() as usize, &opts)?;
        let status = format_status(
            &StatusContext {
                name: &doc.name,
                percent: doc.percent(),
                at_end: doc.size().is_some_and(|s| doc.page_last >= s),
                mode: doc.mode,
                message: message.as_deref(),
                prompt: None,
            },
            ctx.cols,
        );
        if doc.mode.contains(Mode::TOC) && doc.toc.is_some() {
            self.renderer.draw_toc(doc, &ctx, &status)?;
        } else {
            let mut ref_valid = |token: &[u8]| -> bool {
                match resolver.mode {
                    ValidationMode::Off => true,
                    _ => match resolver.cache.validity(&canonicalize(token, man_case)) {
                        Validity::Valid => true,
                        Validity::Invalid => false,
                        Validity::Unknown => {
                            !matches!(resolver.mode, ValidationMode::Apropos)
                                || !resolver.cache.snapshot_loaded()
                        }
                    },
                }
            };
            self.renderer.draw_page(doc, &ctx, &status, &mut ref_valid)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, key: KeyEvent) -> Result<()> {
        let was_primed = self.ctrl_l_primed;
        self.ctrl_l_primed = false;
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        // Leaving refs context: any key but TAB / Shift-TAB / ENTER
        // drops refs mode and its highlighting.
        if let Some(doc) = self.ring.current_mut()
            && doc.mode.contains(Mode::REFS)
            && !matches!(key.code, KeyCode::Tab | KeyCode::BackTab | KeyCode::Enter)
        {
            doc.mode.remove(Mode::REFS | Mode::HIGHLIGHT);
            doc.current_match = None;
        }

        match (key.code, ctrl) {
            (KeyCode::Char('l'), true) => self.cmd_ctrl_l(was_primed)?,
            (KeyCode::Char('q'), false) => self.cmd_quit(),
            (KeyCode::Esc, _) => {
                if let Some(doc) = self.ring.current_mut() {
                    doc.mode.remove(Mode::HIGHLIGHT | Mode::SEARCH | Mode::REFS);
                    doc.current_match = None;
                }
            }
            (KeyCode::Char(' '), false)
            | (KeyCode::Char('f'), false)
            | (KeyCode::PageDown, _) => self.move_page(true)?,
            (KeyCode::Char('b'), false) | (KeyCode::PageUp, _) => self.move_page(false)?,
            (KeyCode::Char('d'), false) => self.move_half(true)?,
            (KeyCode::Char('u'), false) => self.move_half(false)?,
            (KeyCode::Enter, _) => self.cmd_enter()?,
            (KeyCode::Char('j'), false) | (KeyCode::Down, _) => self.move_line(true)?,
            (KeyCode::Char('k'), false) | (KeyCode::Up, _) => self.move_line(false)?,
            (KeyCode::Char('g'), false) | (KeyCode::Home, _) => self.cmd_top()?,
            (KeyCode::Char('G'), false) | (KeyCode::End, _) => self.cmd_end()?,
            (KeyCode::Left, _) => self.shift = actions::shift_left(self.shift),
            (KeyCode::Right, _) => self.shift = actions::shift_right(self.shift),
            (KeyCode::Char('/'), false) => self.cmd_search(true)?,
            (KeyCode::Char('?'), false) => self.cmd_search(false)?,
            (KeyCode::Char('n'), false) => self.cmd_repeat(true)?,
            (KeyCode::Char('p'), false) => self.cmd_repeat(false)?,
            (KeyCode::Tab, _) => self.cmd_refs(true)?,
            (KeyCode::BackTab, _) => self.cmd_refs(false)?,
            (KeyCode::Char('T'), false) => self.cmd_toc()?,
            (KeyCode::Char('m'), false) => self.cmd_open_man()?,
            (KeyCode::Char('a'), false) => self.cmd_apropos()?,
            (KeyCode::Char('B'), false) => self.cmd_file_list()?,
            (KeyCode::Char('c'), false) => self.cmd_kill(),
            (KeyCode::Char('r'), false) => self.cmd_reload()?,
            (KeyCode::Char('h'), false) => self.cmd_help(),
            (KeyCode::Char('-'), false) => self.cmd_toggle_option()?,
            _ => {}
        }
        Ok(())
    }

    fn in_toc(&self) -> bool {
        self.ring
            .current()
            .is_some_and(|d| d.mode.contains(Mode::TOC))
    }

    fn move_line(&mut self, fw: bool) -> Result<()> {
        if self.in_toc() {
            return self.toc_cursor(fw);
        }
        let rows = self.text_rows();
        let opts = self.layout_opts();
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        if fw {
            actions::forward(doc, 1, rows, &opts)?;
        } else {
            actions::backward(doc, 1, &opts)?;
        }
        Ok(())
    }

    fn move_page(&mut self, fw: bool) -> Result<()> {
        if self.in_toc() {
            let rows = self.text_rows();
            let Some(doc) = self.ring.current_mut() else {
                return Ok(());
            };
            let level = doc.toc_level_visible;
            if let Some(toc) = &mut doc.toc {
                toc.first = if fw {
                    toc.fw(toc.first, rows.max(1), level)
                } else {
                    toc.bw(toc.first, rows.max(1), level)
                };
                toc.cursor = toc.first;
            }
            return Ok(());
        }
        let rows = self.text_rows();
        let opts = self.layout_opts();
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        actions::page(doc, fw, rows, &opts)?;
        Ok(())
    }

    fn move_half(&mut self, fw: bool) -> Result<()> {
        let rows = self.text_rows();
        let opts = self.layout_opts();
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        actions::half_page(doc, fw, rows, &opts)?;
        Ok(())
    }

    fn toc_cursor(&mut self, down: bool) -> Result<()> {
        let rows = self.text_rows();
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        let level = doc.toc_level_visible;
        if let Some(toc) = &mut doc.toc {
            if down {
                actions::toc_cursor_down(toc, rows, level);
            } else {
                actions::toc_cursor_up(toc, rows, level);
            }
        }
        Ok(())
    }

    fn cmd_top(&mut self) -> Result<()> {
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        if doc.mode.contains(Mode::TOC) {
            let level = doc.toc_level_visible;
            if let Some(toc) = &mut doc.toc {
                let first = toc.first_visible(level).unwrap_or(0);
                toc.first = first;
                toc.cursor = first;
            }
            return Ok(());
        }
        actions::goto_top(doc);
        Ok(())
    }

    fn cmd_end(&mut self) -> Result<()> {
        let rows = self.text_rows();
        let opts = self.layout_opts();
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        if doc.mode.contains(Mode::TOC) {
            let level = doc.toc_level_visible;
            if let Some(toc) = &mut doc.toc {
                let last = toc.last_visible(level).unwrap_or(0);
                toc.cursor = last;
                toc.first = toc.bw(last, rows.saturating_sub(1), level);
            }
            return Ok(());
        }
        actions::goto_end(doc, rows, &opts)?;
        Ok(())
    }

    fn cmd_quit(&mut self) {
        let Some(doc) = self.ring.current_mut() else {
            self.quit = true;
            return;
        };
        if doc.mode.contains(Mode::TOC) {
            doc.mode.remove(Mode::TOC);
            return;
        }
        if doc.name == HELP_NAME {
            self.cmd_kill();
            return;
        }
        self.quit = true;
    }

    fn cmd_kill(&mut self) {
        if let Some(doc) = self.ring.kill_current() {
            debug!(target: "workhorse", name = %doc.name, "document killed");
        }
        if self.ring.is_empty() {
            self.quit = true;
        }
    }

    fn cmd_enter(&mut self) -> Result<()> {
        let Some(doc) = self.ring.current() else {
            return Ok(());
        };
        if doc.mode.contains(Mode::REFS) && doc.mode.contains(Mode::HIGHLIGHT) {
            return self.open_current_ref();
        }
        if doc.mode.contains(Mode::TOC) {
            return self.toc_enter();
        }
        self.move_line(true)
    }

    fn toc_enter(&mut self) -> Result<()> {
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        let Some(entry) = doc.toc.as_ref().and_then(|t| t.entry(t.cursor)) else {
            doc.mode.remove(Mode::TOC);
            return Ok(());
        };
        if doc.name == FILE_LIST_NAME {
            let target = doc
                .line_at(entry.pos)?
                .map(|l| String::from_utf8_lossy(&l.normalized).trim().to_string());
            doc.mode.remove(Mode::TOC);
            if let Some(name) = target
                && let Some(idx) = self.ring.find(&name)
            {
                self.ring.switch_to(idx);
            }
            return Ok(());
        }
        doc.page_first = entry.pos;
        doc.pos = entry.pos;
        doc.mode.remove(Mode::TOC);
        Ok(())
    }

    fn cmd_toc(&mut self) -> Result<()> {
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        if doc.mode.contains(Mode::TOC) {
            doc.toc_level_visible = (doc.toc_level_visible + 1) % 3;
            let level = doc.toc_level_visible;
            if let Some(toc) = &mut doc.toc {
                let visible = |t: &Toc, i: usize| {
                    t.entry(i).is_some_and(|e| e.level <= level)
                };
                if !visible(toc, toc.cursor) {
                    toc.cursor = toc
                        .prev_visible(toc.cursor, level)
                        .or_else(|| toc.first_visible(level))
                        .unwrap_or(0);
                }
                if !visible(toc, toc.first) {
                    toc.first = toc.cursor;
                }
            }
            return Ok(());
        }
        if doc.is_known_empty() {
            self.message = Some("No TOC for empty files".into());
            return Ok(());
        }
        if doc.toc.is_none() {
            let toc = Toc::build(doc)?;
            doc.toc = Some(toc);
        }
        let page_first = doc.page_first;
        let level = doc.toc_level_visible;
        let toc = doc.toc.as_mut().expect("just built");
        if toc.is_empty() {
            self.message = Some("Document has no TOC entries".into());
            return Ok(());
        }
        let cur = toc
            .entry_before(page_first, level)
            .or_else(|| toc.first_visible(level))
            .unwrap_or(0);
        toc.cursor = cur;
        toc.first = cur;
        doc.mode.insert(Mode::TOC);
        Ok(())
    }

    fn cmd_ctrl_l(&mut self, was_primed: bool) -> Result<()> {
        if was_primed {
            self.match_top = !self.match_top;
            self.message = Some(
                if self.match_top {
                    "matches align to the top line"
                } else {
                    "matches align near the middle"
                }
                .into(),
            );
            self.realign_current(false)?;
        } else {
            self.ctrl_l_primed = true;
            self.realign_current(true)?;
        }
        Ok(())
    }

    fn realign_current(&mut self, invert_once: bool) -> Result<()> {
        let req = AlignRequest {
            rows: self.text_rows(),
            match_top: self.match_top,
            invert_once,
        };
        let opts = self.layout_opts();
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        let Some(m) = doc.current_match else {
            return Ok(());
        };
        doc.page_first = align_page(doc, m, &req, &opts)?;
        Ok(())
    }

    fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        let mut input = String::new();
        loop {
            let row = self.rows.saturating_sub(1);
            execute!(
                stdout(),
                MoveTo(0, row),
                Clear(ClearType::CurrentLine),
                Print(format!("{label}{input}")),
                Show
            )?;
            match self.terminal.next_event()? {
                PagerEvent::Key(k) => match k.code {
                    KeyCode::Enter => {
                        execute!(stdout(), Hide)?;
                        return Ok((!input.is_empty()).then_some(input));
                    }
                    KeyCode::Esc => {
                        execute!(stdout(), Hide)?;
                        return Ok(None);
                    }
                    KeyCode::Backspace => {
                        if input.pop().is_none() {
                            execute!(stdout(), Hide)?;
                            return Ok(None);
                        }
                    }
                    KeyCode::Char(c) if !k.modifiers.contains(KeyModifiers::CONTROL) => {
                        input.push(c);
                    }
                    _ => {}
                },
                PagerEvent::Resize(w, h) => {
                    self.cols = w;
                    self.rows = h;
                }
            }
        }
    }

    fn cmd_search(&mut self, fw: bool) -> Result<()> {
        let label = if fw { "/" } else { "?" };
        let Some(pattern) = self.prompt(label)? else {
            return Ok(());
        };
        self.do_search_pattern(&pattern, fw)
    }

    fn do_search_pattern(&mut self, pattern: &str, fw: bool) -> Result<()> {
        let re = match search::compile_user(pattern, self.opts.case_insensitive) {
            Ok(re) => re,
            Err(e) => {
                self.message = Some(e.to_string());
                return Ok(());
            }
        };
        self.last_user_regex = Some(re.clone());
        if self.in_toc() {
            return self.toc_search(&re, fw, true);
        }
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        doc.mode.set_search_or_refs(false);
        doc.regex = Some(re.clone());
        doc.pos = doc.page_first;
        let from = doc.pos;
        let hit = if fw {
            search::search_fw(doc, &re, from)?
        } else {
            search::search_bw(doc, &re, from)?
        };
        self.settle_hit(hit)
    }

    fn cmd_repeat(&mut self, fw: bool) -> Result<()> {
        let Some(re) = self.last_user_regex.clone() else {
            self.message = Some("No previous search pattern".into());
            return Ok(());
        };
        if self.in_toc() {
            return self.toc_search(&re, fw, false);
        }
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        doc.mode.set_search_or_refs(false);
        doc.regex = Some(re.clone());
        let page_first = doc.page_first;
        let hit = match doc.current_match {
            Some(m) if fw => {
                let from = search::advance_one(doc, m.so)?;
                search::search_fw(doc, &re, from)?
            }
            Some(m) => search::search_bw(doc, &re, m.so)?,
            None if fw => search::search_fw(doc, &re, page_first)?,
            None => search::search_bw(doc, &re, page_first)?,
        };
        self.settle_hit(hit)
    }

    /// Record a search outcome: set the current match and align the
    /// page, or report the miss and leave everything as it was.
    fn settle_hit(&mut self, hit: Option<core_doc::Match>) -> Result<()> {
        match hit {
            Some(m) => {
                {
                    let Some(doc) = self.ring.current_mut() else {
                        return Ok(());
                    };
                    let m = search::widen_empty(doc, m)?;
                    doc.current_match = Some(m);
                    doc.mode.insert(Mode::HIGHLIGHT);
                }
                self.realign_current(false)?;
            }
            None => self.message = Some("Pattern not found".into()),
        }
        Ok(())
    }

    fn toc_search(&mut self, re: &Regex, fw: bool, include_cursor: bool) -> Result<()> {
        let rows = self.text_rows();
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        let level = doc.toc_level_visible;
        let Some(toc) = doc.toc.take() else {
            return Ok(());
        };
        let from = if include_cursor {
            toc.cursor
        } else if fw {
            toc.cursor + 1
        } else {
            toc.cursor
        };
        let hit = if fw {
            search::toc_search_fw(doc, &toc, level, from, re)?
        } else {
            search::toc_search_bw(doc, &toc, level, from, re)?
        };
        doc.regex = Some(re.clone());
        doc.mode.set_search_or_refs(false);
        doc.toc = Some(toc);
        match hit {
            Some((idx, m)) => {
                doc.current_match = Some(m);
                doc.mode.insert(Mode::HIGHLIGHT);
                let toc = doc.toc.as_mut().expect("restored above");
                align_toc(toc, idx, rows, level);
            }
            None => self.message = Some("Pattern not found".into()),
        }
        Ok(())
    }

    fn cmd_refs(&mut self, fw: bool) -> Result<()> {
        // Apropos-backed validation needs the snapshot before the first
        // refs query.
        if matches!(self.resolver.mode, ValidationMode::Apropos)
            && !self.resolver.cache.snapshot_loaded()
            && let Ok(listing) = apropos_listing()
        {
            self.resolver
                .cache
                .load_snapshot(&listing, self.opts.man_case_sensitive);
        }
        let resolver = &mut self.resolver;
        let verifier = &mut self.verifier;
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        let was_refs = doc.mode.contains(Mode::REFS);
        doc.mode.set_search_or_refs(true);
        doc.regex = Some(search::refs_regex().clone());
        let page_first = doc.page_first;
        let page_last = doc.page_last;
        let hit = match doc.current_match {
            Some(m) if was_refs && fw => {
                let from = m.eo.max(m.so + 1);
                search::refs_fw(doc, from, resolver, verifier)?
            }
            Some(m) if was_refs => search::refs_bw(doc, m.so, resolver, verifier)?,
            _ if fw => search::refs_fw(doc, page_first, resolver, verifier)?,
            _ => search::refs_bw(doc, page_last, resolver, verifier)?,
        };
        match hit {
            Some(m) => {
                doc.current_match = Some(m);
                doc.mode.insert(Mode::HIGHLIGHT);
                self.realign_current(false)?;
            }
            None => self.message = Some("No more references".into()),
        }
        Ok(())
    }

    fn open_current_ref(&mut self) -> Result<()> {
        let man_case = self.opts.man_case_sensitive;
        let spec = {
            let Some(doc) = self.ring.current_mut() else {
                return Ok(());
            };
            let Some(m) = doc.current_match else {
                return Ok(());
            };
            let Some(line) = doc.line_at(m.so)? else {
                return Ok(());
            };
            let s = (m.so - line.pos) as usize;
            let e = ((m.eo - line.pos) as usize).min(line.raw.len());
            parse_reference(&canonicalize(&line.raw[s..e], man_case))
        };
        self.open_man_doc(&spec.name, &spec.section)
    }

    fn cmd_open_man(&mut self) -> Result<()> {
        let Some(input) = self.prompt("Manual entry: ")? else {
            return Ok(());
        };
        let spec = parse_reference(input.trim());
        if spec.name.is_empty() {
            return Ok(());
        }
        self.open_man_doc(&spec.name, &spec.section)
    }

    fn open_man_doc(&mut self, name: &str, section: &str) -> Result<()> {
        let display = if section.is_empty() {
            name.to_string()
        } else {
            format!("{name}({section})")
        };
        if let Some(idx) = self.ring.find(&display) {
            self.ring.switch_to(idx);
            return Ok(());
        }
        info!(target: "workhorse", name, section, "opening man page");
        let loaded = load_man_page(
            &self.opts.reload_command,
            name,
            section,
            self.rows,
            self.cols,
        );
        let man = match loaded {
            Ok(man) => man,
            Err(e) => {
                self.message = Some(format!("unable to load {display}: {e}"));
                return Ok(());
            }
        };
        let mut doc = Document::from_source(
            display.clone(),
            Box::new(man.source),
            Ftype::MANPAGE | Ftype::LSP_LOADED_MANPAGE,
        );
        if let Err(e) = doc.store_mut().read_all() {
            self.message = Some(format!("unable to load {display}: {e}"));
            return Ok(());
        }
        if doc.is_known_empty() {
            self.message = Some(format!("unable to load {display}"));
            return Ok(());
        }
        match man.page_name.filter(|p| !p.is_empty()) {
            Some(pn) => {
                if let Some(idx) = self.ring.find(&pn) {
                    self.ring.switch_to(idx);
                    return Ok(());
                }
                doc.name = pn;
            }
            None => {
                if let Some(detected) = actions::detect_heading_name(&mut doc)? {
                    if let Some(idx) = self.ring.find(&detected) {
                        self.ring.switch_to(idx);
                        return Ok(());
                    }
                    doc.name = detected;
                }
            }
        }
        self.ring.add(doc);
        Ok(())
    }

    fn cmd_apropos(&mut self) -> Result<()> {
        let listing = match apropos_listing() {
            Ok(l) if !l.is_empty() => l,
            _ => {
                self.message = Some("unable to load the apropos list".into());
                return Ok(());
            }
        };
        self.resolver
            .cache
            .load_snapshot(&listing, self.opts.man_case_sensitive);
        if let Some(idx) = self.ring.find(APROPOS_NAME) {
            self.ring.switch_to(idx);
        } else {
            self.ring
                .add(Document::from_bytes(APROPOS_NAME, listing, Ftype::empty()));
        }
        Ok(())
    }

    fn cmd_file_list(&mut self) -> Result<()> {
        if let Some(idx) = self.ring.find(FILE_LIST_NAME) {
            self.ring.switch_to(idx);
            self.ring.kill_current();
        }
        let mut text = String::new();
        for doc in self.ring.iter() {
            text.push_str(&doc.name);
            text.push('\n');
        }
        let mut doc =
            Document::from_bytes(FILE_LIST_NAME, text.into_bytes(), Ftype::empty());
        let toc = Toc::build(&mut doc)?;
        doc.toc = Some(toc);
        doc.mode.insert(Mode::TOC);
        self.ring.add(doc);
        Ok(())
    }

    fn cmd_help(&mut self) {
        if let Some(idx) = self.ring.find(HELP_NAME) {
            self.ring.switch_to(idx);
            return;
        }
        self.ring.add(Document::from_bytes(
            HELP_NAME,
            HELP_TEXT.as_bytes().to_vec(),
            Ftype::empty(),
        ));
    }

    fn cmd_reload(&mut self) -> Result<()> {
        let rows = self.text_rows();
        let opts = self.layout_opts();
        let Some(doc) = self.ring.current_mut() else {
            return Ok(());
        };
        if doc.auto_reloadable() {
            self.reload_current_man();
            return Ok(());
        }
        if doc.ftype.contains(Ftype::REGULAR) {
            if let Err(e) = actions::reload_file(doc, rows, &opts) {
                self.message = Some(e.to_string());
            }
            return Ok(());
        }
        self.message = Some(format!("Cannot reload {}", doc.name));
        Ok(())
    }

    fn reload_current_man(&mut self) {
        let template = self.opts.reload_command.clone();
        let (rows, cols) = (self.rows, self.cols);
        let Some(doc) = self.ring.current_mut() else {
            return;
        };
        match actions::reload_man(doc, &template, rows, cols) {
            Ok(page_name) => {
                if let Some(pn) = page_name.filter(|p| !p.is_empty())
                    && pn != doc.name
                {
                    doc.name = pn;
                }
            }
            Err(e) => {
                doc.do_reload = false;
                self.message = Some(format!("{e:#}"));
            }
        }
    }

    fn cmd_resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        let width_changed = cols != self.cols;
        self.cols = cols;
        self.rows = rows;
        debug!(target: "workhorse", cols, rows, width_changed, "resize");
        if !width_changed {
            return Ok(());
        }
        actions::mark_pending_reloads(&mut self.ring);
        if self
            .ring
            .current()
            .is_some_and(|d| d.auto_reloadable())
        {
            self.reload_current_man();
        }
        Ok(())
    }

    fn cmd_toggle_option(&mut self) -> Result<()> {
        let key = loop {
            match self.terminal.next_event()? {
                PagerEvent::Key(k) => break k,
                PagerEvent::Resize(w, h) => {
                    self.cols = w;
                    self.rows = h;
                }
            }
        };
        let KeyCode::Char(c) = key.code else {
            return Ok(());
        };
        let msg = match c {
            'i' => {
                self.opts.case_insensitive = !self.opts.case_insensitive;
                format!(
                    "case-insensitive search: {}",
                    on_off(self.opts.case_insensitive)
                )
            }
            'c' => {
                self.opts.chop_lines = !self.opts.chop_lines;
                format!("chop long lines: {}", on_off(self.opts.chop_lines))
            }
            'n' => {
                self.opts.line_numbers = !self.opts.line_numbers;
                format!("line numbers: {}", on_off(self.opts.line_numbers))
            }
            'h' => {
                if let Some(doc) = self.ring.current_mut() {
                    doc.mode.toggle(Mode::HIGHLIGHT);
                    format!(
                        "highlighting: {}",
                        on_off(doc.mode.contains(Mode::HIGHLIGHT))
                    )
                } else {
                    return Ok(());
                }
            }
            'V' => {
                self.opts.verify = !self.opts.verify;
                self.resolver.mode = if !self.opts.verify {
                    ValidationMode::Off
                } else if self.opts.verify_with_apropos {
                    ValidationMode::Apropos
                } else {
                    ValidationMode::Command
                };
                format!("reference validation: {}", on_off(self.opts.verify))
            }
            other => format!("no such option: {other}"),
        };
        self.message = Some(msg);
        Ok(())
    }
}

fn on_off(v: bool) -> &'static str {
    if v { "on" } else { "off" }
}
