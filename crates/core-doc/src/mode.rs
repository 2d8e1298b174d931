//! Mode and file-type bitsets, and the active-match record.

use bitflags::bitflags;

bitflags! {
    /// Per-document display modes. `SEARCH` and `REFS` are mutually
    /// exclusive; `TOC` is orthogonal; `HIGHLIGHT` is set while the
    /// current match should be drawn.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Mode: u8 {
        const SEARCH    = 1 << 0;
        const REFS      = 1 << 1;
        const TOC       = 1 << 2;
        const HIGHLIGHT = 1 << 3;
    }
}

impl Mode {
    /// Enter search mode, displacing refs mode (and vice versa).
    pub fn set_search_or_refs(&mut self, refs: bool) {
        self.remove(Mode::SEARCH | Mode::REFS);
        self.insert(if refs { Mode::REFS } else { Mode::SEARCH });
    }
}

bitflags! {
    /// What kind of input feeds the document.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ftype: u8 {
        const MANPAGE            = 1 << 0;
        /// A man page this process loaded itself (reloadable via PTY).
        const LSP_LOADED_MANPAGE = 1 << 1;
        const STDIN              = 1 << 2;
        const REGULAR            = 1 << 3;
    }
}

/// Absolute raw byte range of the active regex match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub so: u64,
    pub eo: u64,
}

impl Match {
    pub fn new(so: u64, eo: u64) -> Self {
        debug_assert!(so <= eo);
        Self { so, eo }
    }

    pub fn is_empty(&self) -> bool {
        self.so == self.eo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_and_refs_displace_each_other() {
        let mut m = Mode::TOC;
        m.set_search_or_refs(false);
        assert_eq!(m, Mode::TOC | Mode::SEARCH);
        m.set_search_or_refs(true);
        assert_eq!(m, Mode::TOC | Mode::REFS);
        assert!(!m.contains(Mode::SEARCH));
    }
}
