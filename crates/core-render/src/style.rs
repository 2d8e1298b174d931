//! Attribute mask and color pair to crossterm translation.

use core_line::{Attr, ColorSlot};
use crossterm::style::{Attribute, Attributes, Color};

/// Fully resolved cell style: attribute mask plus concrete colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StyleSpec {
    pub attrs: Attr,
    pub fg: ColorSlot,
    pub bg: ColorSlot,
}

impl StyleSpec {
    pub fn new(attrs: Attr, fg: ColorSlot, bg: ColorSlot) -> Self {
        Self { attrs, fg, bg }
    }

    /// Crossterm attribute set for this mask.
    pub fn attributes(&self) -> Attributes {
        let mut out = Attributes::default();
        let map = [
            (Attr::BOLD, Attribute::Bold),
            (Attr::DIM, Attribute::Dim),
            (Attr::ITALIC, Attribute::Italic),
            (Attr::UNDERLINE, Attribute::Underlined),
            (Attr::BLINK, Attribute::SlowBlink),
            (Attr::REVERSE, Attribute::Reverse),
            (Attr::HIDDEN, Attribute::Hidden),
            (Attr::STANDOUT, Attribute::Reverse),
        ];
        for (flag, attr) in map {
            if self.attrs.contains(flag) {
                out.set(attr);
            }
        }
        out
    }

    pub fn colors(&self, no_color: bool) -> (Color, Color) {
        if no_color {
            return (Color::Reset, Color::Reset);
        }
        (to_color(self.fg), to_color(self.bg))
    }
}

fn to_color(slot: ColorSlot) -> Color {
    match slot {
        ColorSlot::Default => Color::Reset,
        ColorSlot::Indexed(n) => Color::AnsiValue(n),
    }
}
