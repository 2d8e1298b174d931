//! SGR sequence recognition and decoding.

use ahash::AHashMap;
use bitflags::bitflags;
use tracing::debug;

const ESC: u8 = 0x1b;

bitflags! {
    /// Display attribute mask. `STANDOUT` is reserved for match
    /// highlighting layered on by the renderer, never produced by SGR
    /// decoding itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Attr: u16 {
        const BOLD      = 1 << 0;
        const DIM       = 1 << 1;
        const ITALIC    = 1 << 2;
        const UNDERLINE = 1 << 3;
        const BLINK     = 1 << 4;
        const REVERSE   = 1 << 5;
        const HIDDEN    = 1 << 6;
        const STANDOUT  = 1 << 7;
    }
}

/// A foreground or background color as SGR names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSlot {
    #[default]
    Default,
    /// Palette index 0..=255 (standard 0..=7, bright 8..=15, extended up).
    Indexed(u8),
}

pub type PairId = u16;

/// Memoized (fg, bg) combinations. Pair 0 is always (default, default).
/// Allocation past `limit` fails sticky; callers fall back to pair 0 and
/// surface one status message.
#[derive(Debug)]
pub struct PairTable {
    by_colors: AHashMap<(ColorSlot, ColorSlot), PairId>,
    pairs: Vec<(ColorSlot, ColorSlot)>,
    limit: usize,
    exhausted: bool,
}

impl PairTable {
    pub fn new(limit: usize) -> Self {
        let default = (ColorSlot::Default, ColorSlot::Default);
        let mut by_colors = AHashMap::new();
        by_colors.insert(default, 0);
        Self {
            by_colors,
            pairs: vec![default],
            limit: limit.max(1),
            exhausted: false,
        }
    }

    /// Pair id for (fg, bg), allocating on first use. Falls back to the
    /// default pair once the table is full.
    pub fn pair_for(&mut self, fg: ColorSlot, bg: ColorSlot) -> PairId {
        if let Some(&id) = self.by_colors.get(&(fg, bg)) {
            return id;
        }
        if self.pairs.len() >= self.limit {
            if !self.exhausted {
                debug!(target: "sgr", limit = self.limit, "color pairs exhausted");
                self.exhausted = true;
            }
            return 0;
        }
        let id = self.pairs.len() as PairId;
        self.pairs.push((fg, bg));
        self.by_colors.insert((fg, bg), id);
        id
    }

    pub fn colors(&self, id: PairId) -> (ColorSlot, ColorSlot) {
        self.pairs.get(id as usize).copied().unwrap_or_default()
    }

    /// Sticky once allocation has failed; the renderer posts a status
    /// message the first time it observes this.
    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl Default for PairTable {
    fn default() -> Self {
        // Classic terminals advertise 256 pairs; plenty for man pages.
        Self::new(256)
    }
}

/// Length of the SGR sequence at the start of `buf`, or `None` when `buf`
/// does not begin with one. An SGR sequence is `ESC [ (digit|';')* m`;
/// any other byte between the introducer and the final `m` disqualifies
/// the candidate, so non-SGR `ESC [` sequences pass through as payload.
pub fn sgr_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < 3 || buf[0] != ESC || buf[1] != b'[' {
        return None;
    }
    for (i, &b) in buf.iter().enumerate().skip(2) {
        match b {
            b'0'..=b'9' | b';' => continue,
            b'm' => return Some(i + 1),
            _ => return None,
        }
    }
    None
}

/// Running SGR attribute state: mask plus current fg/bg colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SgrState {
    pub attrs: Attr,
    pub fg: ColorSlot,
    pub bg: ColorSlot,
}

impl SgrState {
    /// Apply the parameter bytes of one SGR sequence (the slice between
    /// `ESC [` and the final `m`) and resolve the resulting color pair.
    pub fn apply(&mut self, params: &[u8], pairs: &mut PairTable) -> PairId {
        let values: Vec<u16> = params
            .split(|&b| b == b';')
            .map(|tok| {
                tok.iter()
                    .fold(0u16, |acc, &d| acc.saturating_mul(10) + (d - b'0') as u16)
            })
            .collect();
        let mut i = 0;
        while i < values.len() {
            let v = values[i];
            match v {
                0 => {
                    self.attrs = Attr::empty();
                    self.fg = ColorSlot::Default;
                    self.bg = ColorSlot::Default;
                }
                1 => self.attrs |= Attr::BOLD,
                2 => self.attrs |= Attr::DIM,
                3 => self.attrs |= Attr::ITALIC,
                4 => self.attrs |= Attr::UNDERLINE,
                5 => self.attrs |= Attr::BLINK,
                7 => self.attrs |= Attr::REVERSE,
                8 => self.attrs |= Attr::HIDDEN,
                // Strike-through, shown underlined.
                9 => self.attrs |= Attr::UNDERLINE,
                22 => self.attrs &= !(Attr::BOLD | Attr::DIM),
                24 => self.attrs &= !Attr::UNDERLINE,
                30..=37 => self.fg = ColorSlot::Indexed((v - 30) as u8),
                39 => self.fg = ColorSlot::Default,
                40..=47 => self.bg = ColorSlot::Indexed((v - 40) as u8),
                49 => self.bg = ColorSlot::Default,
                90..=97 => self.fg = ColorSlot::Indexed((v - 90 + 8) as u8),
                100..=107 => self.bg = ColorSlot::Indexed((v - 100 + 8) as u8),
                38 | 48 => {
                    // 256-color selector `38;5;n` / `48;5;n`. Anything else
                    // after the introducer is passed over.
                    if i + 2 < values.len() && values[i + 1] == 5 {
                        let idx = (values[i + 2] & 0xff) as u8;
                        if v == 38 {
                            self.fg = ColorSlot::Indexed(idx);
                        } else {
                            self.bg = ColorSlot::Indexed(idx);
                        }
                        i += 2;
                    } else if i + 4 < values.len() && values[i + 1] == 2 {
                        debug!(target: "sgr", "truecolor parameter ignored");
                        i += 4;
                    } else {
                        debug!(target: "sgr", param = v, "malformed color selector");
                    }
                }
                other => debug!(target: "sgr", param = other, "unknown sgr parameter"),
            }
            i += 1;
        }
        pairs.pair_for(self.fg, self.bg)
    }
}
