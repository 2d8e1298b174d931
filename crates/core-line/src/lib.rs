//! Line extraction and normalization pipeline.
//!
//! A physical line arrives as `raw` bytes: payload characters interleaved
//! with SGR escape sequences and grotty backspace overstrikes. This crate
//! converts between the raw and *normalized* (payload-only) views, decodes
//! SGR parameters into an attribute mask plus a memoized color pair, and
//! partitions a physical line into window lines for a given width.
//!
//! Both views may contain embedded NUL bytes; lengths, not terminators,
//! bound every traversal.

mod line;
mod norm;
mod sgr;
mod wrap;

pub use line::Line;
pub use norm::{
    CtrlRun, ctrl_run_len, normalize, normalize_count, normalized_prefix_len, overstrike_attr,
    parse_ctrl_run,
};
pub use sgr::{Attr, ColorSlot, PairId, PairTable, SgrState, sgr_len};
pub use wrap::{LayoutOpts, Payload, payload_at, payload_width, wlines};
