//! Batched terminal output.
//!
//! Groups consecutive same-style prints into a single `Print` command so
//! a full page flush issues far fewer commands than cells. Style changes,
//! movement and clears are hard batch boundaries.

use anyhow::Result;
use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Attributes, Print, ResetColor, SetAttribute, SetAttributes, SetColors},
    terminal::{Clear, ClearType},
};
use std::io::{Write, stdout};

use crate::style::StyleSpec;

enum Command {
    MoveTo(u16, u16),
    ClearLine,
    ClearAll,
    Style(StyleSpec),
    Print(String),
    ShowCursorAt(u16, u16),
}

pub struct BatchWriter {
    cmds: Vec<Command>,
    pending: String,
    style: StyleSpec,
    no_color: bool,
    pub print_commands: u64,
    pub cells_printed: u64,
}

impl BatchWriter {
    pub fn new(no_color: bool) -> Self {
        Self {
            cmds: Vec::new(),
            pending: String::new(),
            style: StyleSpec::default(),
            no_color,
            print_commands: 0,
            cells_printed: 0,
        }
    }

    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let s = std::mem::take(&mut self.pending);
        self.cmds.push(Command::Print(s));
        self.print_commands += 1;
    }

    pub fn move_to(&mut self, x: u16, y: u16) {
        self.flush_pending();
        self.cmds.push(Command::MoveTo(x, y));
    }

    pub fn clear_line(&mut self) {
        self.flush_pending();
        self.cmds.push(Command::ClearLine);
    }

    pub fn clear_all(&mut self) {
        self.flush_pending();
        self.cmds.push(Command::ClearAll);
    }

    /// Switch the active style; a no-op when unchanged, a batch boundary
    /// otherwise.
    pub fn set_style(&mut self, style: StyleSpec) {
        if style == self.style {
            return;
        }
        self.flush_pending();
        self.style = style;
        self.cmds.push(Command::Style(style));
    }

    pub fn print(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        self.pending.push_str(s);
        self.cells_printed += 1;
    }

    /// Leave the terminal cursor visible at (x, y) after the flush.
    pub fn show_cursor_at(&mut self, x: u16, y: u16) {
        self.flush_pending();
        self.cmds.push(Command::ShowCursorAt(x, y));
    }

    /// Write all queued commands into `out` and flush it.
    pub fn flush_into(mut self, out: &mut impl Write) -> Result<(u64, u64)> {
        self.flush_pending();
        queue!(out, crossterm::cursor::Hide)?;
        for c in &self.cmds {
            match c {
                Command::MoveTo(x, y) => queue!(out, MoveTo(*x, *y))?,
                Command::ClearLine => queue!(out, Clear(ClearType::CurrentLine))?,
                Command::ClearAll => queue!(out, Clear(ClearType::All))?,
                Command::Style(s) => {
                    queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
                    let attrs = s.attributes();
                    if attrs != Attributes::default() {
                        queue!(out, SetAttributes(attrs))?;
                    }
                    let (fg, bg) = s.colors(self.no_color);
                    queue!(out, SetColors(crossterm::style::Colors::new(fg, bg)))?;
                }
                Command::Print(s) => queue!(out, Print(s))?,
                Command::ShowCursorAt(x, y) => {
                    queue!(out, MoveTo(*x, *y), crossterm::cursor::Show)?
                }
            }
        }
        out.flush()?;
        Ok((self.print_commands, self.cells_printed))
    }

    pub fn flush(self) -> Result<(u64, u64)> {
        let mut out = stdout();
        self.flush_into(&mut out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_line::{Attr, ColorSlot};

    #[test]
    fn batches_same_style_runs() {
        let mut w = BatchWriter::new(false);
        w.move_to(0, 0);
        w.print("a");
        w.print("b");
        w.print("c");
        w.set_style(StyleSpec::new(
            Attr::BOLD,
            ColorSlot::Default,
            ColorSlot::Default,
        ));
        w.print("x");
        let mut buf = Vec::new();
        let (cmds, cells) = w.flush_into(&mut buf).unwrap();
        assert_eq!(cmds, 2, "abc batched, x separate");
        assert_eq!(cells, 4);
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("abc"));
        assert!(text.contains('x'));
    }

    #[test]
    fn redundant_style_is_not_a_boundary() {
        let mut w = BatchWriter::new(false);
        let plain = StyleSpec::default();
        w.print("a");
        w.set_style(plain);
        w.print("b");
        let mut buf = Vec::new();
        let (cmds, _) = w.flush_into(&mut buf).unwrap();
        assert_eq!(cmds, 1);
    }
}
