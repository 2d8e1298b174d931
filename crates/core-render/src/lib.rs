//! Page rendering.
//!
//! One page is drawn per dispatch round: window lines from `page_first`
//! (or the TOC page in TOC mode), one terminal row each, a status line
//! on the final row. Every payload cell carries the layered combination
//! of SGR state, overstrike attribute, match highlight and TOC cursor.

mod page;
mod status;
mod style;
mod writer;

pub use page::{RenderContext, RenderOutcome, Renderer};
pub use status::{StatusContext, format_status};
pub use style::StyleSpec;
pub use writer::BatchWriter;
