//! Status line composition.

use core_doc::Mode;

/// What the bottom row should say.
pub struct StatusContext<'a> {
    pub name: &'a str,
    /// Percentage through a bounded source; `None` while unbounded.
    pub percent: Option<u8>,
    pub at_end: bool,
    pub mode: Mode,
    /// Transient feedback ("Pattern not found", toggle confirmations).
    pub message: Option<&'a str>,
    /// Active prompt text (search pattern, man page name); overrides
    /// everything else.
    pub prompt: Option<&'a str>,
}

/// Render the status row, padded or truncated to `width` columns.
pub fn format_status(ctx: &StatusContext<'_>, width: u16) -> String {
    let mut s = String::with_capacity(width as usize);
    if let Some(prompt) = ctx.prompt {
        s.push_str(prompt);
    } else if let Some(msg) = ctx.message {
        s.push_str(msg);
    } else {
        s.push_str(ctx.name);
        if ctx.at_end {
            s.push_str(" (END)");
        } else if let Some(pct) = ctx.percent {
            s.push_str(&format!(" ({pct}%)"));
        }
        if ctx.mode.contains(Mode::TOC) {
            s.push_str(" [TOC]");
        }
        if ctx.mode.contains(Mode::REFS) {
            s.push_str(" [refs]");
        }
    }
    let mut out: String = s.chars().take(width as usize).collect();
    while out.chars().count() < width as usize {
        out.push(' ');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>() -> StatusContext<'a> {
        StatusContext {
            name: "manual.txt",
            percent: Some(42),
            at_end: false,
            mode: Mode::empty(),
            message: None,
            prompt: None,
        }
    }

    #[test]
    fn shows_name_and_percent() {
        let s = format_status(&ctx(), 40);
        assert!(s.starts_with("manual.txt (42%)"));
        assert_eq!(s.chars().count(), 40);
    }

    #[test]
    fn end_marker_replaces_percent() {
        let mut c = ctx();
        c.at_end = true;
        assert!(format_status(&c, 40).starts_with("manual.txt (END)"));
    }

    #[test]
    fn message_overrides_name() {
        let mut c = ctx();
        c.message = Some("Pattern not found");
        assert!(format_status(&c, 40).starts_with("Pattern not found"));
    }

    #[test]
    fn prompt_overrides_message() {
        let mut c = ctx();
        c.message = Some("hidden");
        c.prompt = Some("/needle");
        assert!(format_status(&c, 40).starts_with("/needle"));
    }

    #[test]
    fn mode_markers_appended() {
        let mut c = ctx();
        c.mode = Mode::TOC | Mode::REFS;
        let s = format_status(&c, 60);
        assert!(s.contains("[TOC]"));
        assert!(s.contains("[refs]"));
    }

    #[test]
    fn truncates_to_width() {
        let s = format_status(&ctx(), 5);
        assert_eq!(s.chars().count(), 5);
    }
}
