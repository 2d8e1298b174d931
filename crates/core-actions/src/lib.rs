//! User-intent translation: motions over the current document and the
//! resize/reload machinery.

mod navigator;
mod reload;

pub use navigator::{
    backward, forward, goto_end, goto_top, half_page, page, shift_left, shift_right,
    toc_cursor_down, toc_cursor_up,
};
pub use reload::{
    SectionAnchor, detect_heading_name, mark_pending_reloads, parent_is_man, reload_file,
    reload_man, restore_anchor, save_anchor,
};
