//! Raw ↔ normalized view conversion.
//!
//! A *control run* is one or more SGR sequences followed by zero or more
//! grotty overstrike prefixes (`c` then `\b`), in any interleaving. The
//! normalized view is the raw bytes with every control run removed;
//! payload characters (including tabs, carriage returns, NULs and the
//! terminating newline) pass through untouched.

use crate::sgr::{Attr, sgr_len};
use crate::wrap::{Payload, payload_at};

const BS: u8 = 0x08;

/// Whether the payload at `at` may serve as an overstrike prefix when a
/// `\b` follows. Tabs mean binary data, a backspace prefix means the
/// sequence is backspace-in-data, and a newline always ends the line.
fn prefix_candidate(payload: Payload) -> bool {
    !matches!(
        payload,
        Payload::Tab | Payload::Newline | Payload::Ctrl(BS)
    )
}

/// Byte length of the control run starting at `raw[at..]` (0 when the
/// position holds plain payload).
pub fn ctrl_run_len(raw: &[u8], at: usize) -> usize {
    let mut j = at;
    loop {
        if let Some(n) = sgr_len(&raw[j..]) {
            j += n;
            continue;
        }
        if j >= raw.len() {
            break;
        }
        let (payload, len) = payload_at(raw, j);
        if prefix_candidate(payload) && raw.get(j + len) == Some(&BS) {
            j += len + 1;
            continue;
        }
        break;
    }
    j - at
}

/// Parsed form of one control run, for attribute replay in the renderer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CtrlRun {
    pub len: usize,
    /// Parameter slices of each SGR sequence (byte ranges into the raw
    /// line, covering the bytes between `ESC [` and the final `m`).
    pub sgr_params: Vec<(usize, usize)>,
    /// Overstrike prefix characters, in order of appearance.
    pub prefixes: Vec<char>,
}

/// Decompose the control run at `raw[at..]`.
pub fn parse_ctrl_run(raw: &[u8], at: usize) -> CtrlRun {
    let mut run = CtrlRun::default();
    let mut j = at;
    loop {
        if let Some(n) = sgr_len(&raw[j..]) {
            run.sgr_params.push((j + 2, j + n - 1));
            j += n;
            continue;
        }
        if j >= raw.len() {
            break;
        }
        let (payload, len) = payload_at(raw, j);
        if prefix_candidate(payload) && raw.get(j + len) == Some(&BS) {
            run.prefixes.push(match payload {
                Payload::Char(ch) => ch,
                Payload::CarriageReturn => '\r',
                Payload::Ctrl(b) => b as char,
                Payload::Bad(_) => char::REPLACEMENT_CHARACTER,
                Payload::Tab | Payload::Newline => unreachable!("refused above"),
            });
            j += len + 1;
            continue;
        }
        break;
    }
    run.len = j - at;
    run
}

/// Attribute contributed by the overstrike prefixes for the payload
/// character `ch` they strike: `_\bX` italic-underline, `X\bX` bold,
/// `_\bX\bX` bold italic.
pub fn overstrike_attr(prefixes: &[char], ch: char) -> Attr {
    if prefixes.is_empty() {
        return Attr::empty();
    }
    let same = prefixes.contains(&ch);
    let underscore = ch != '_' && prefixes.contains(&'_');
    if same && underscore {
        Attr::BOLD | Attr::ITALIC
    } else if same {
        Attr::BOLD
    } else if underscore {
        Attr::ITALIC | Attr::UNDERLINE
    } else {
        Attr::BOLD
    }
}

/// The payload-only view of `raw`. May contain embedded NULs; the result
/// is bounded by `raw.len()`.
pub fn normalize(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut at = 0;
    while at < raw.len() {
        at += ctrl_run_len(raw, at);
        if at >= raw.len() {
            break;
        }
        let (_, len) = payload_at(raw, at);
        let end = raw.len().min(at + len);
        out.extend_from_slice(&raw[at..end]);
        at = end;
    }
    out
}

/// Inverse mapping: raw prefix length after consuming `payload_len`
/// normalized bytes. Translates match offsets computed against the
/// normalized view back to raw offsets.
pub fn normalize_count(raw: &[u8], payload_len: usize) -> usize {
    let mut at = 0;
    let mut emitted = 0;
    while emitted < payload_len && at < raw.len() {
        at += ctrl_run_len(raw, at);
        if at >= raw.len() {
            break;
        }
        let (_, len) = payload_at(raw, at);
        emitted += len;
        at += len;
    }
    at
}

/// Forward mapping: number of normalized bytes contributed by
/// `raw[..raw_len]`.
pub fn normalized_prefix_len(raw: &[u8], raw_len: usize) -> usize {
    let bound = raw_len.min(raw.len());
    let mut at = 0;
    let mut emitted = 0;
    while at < bound {
        let run = ctrl_run_len(raw, at);
        if run > 0 {
            at += run;
            continue;
        }
        let (_, len) = payload_at(raw, at);
        if at + len > bound {
            break;
        }
        emitted += len;
        at += len;
    }
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sgr_sequences() {
        assert_eq!(
            normalize(b"Hello \x1b[1mworld\x1b[m\n"),
            b"Hello world\n"
        );
    }

    #[test]
    fn strips_grotty_overstrikes() {
        assert_eq!(normalize(b"b\x08bo\x08ol\x08ld\x08d\n"), b"bold\n");
        assert_eq!(normalize(b"_\x08i_\x08t_\x08a\n"), b"ita\n");
    }

    #[test]
    fn bold_italic_double_overstrike() {
        assert_eq!(normalize(b"_\x08x\x08x\n"), b"x\n");
    }

    #[test]
    fn tab_overstrike_is_binary_data() {
        assert_eq!(normalize(b"\t\x08x\n"), b"\t\x08x\n");
    }

    #[test]
    fn double_backspace_is_data() {
        // After `a\b` is skipped the bare `\b` stays payload.
        assert_eq!(normalize(b"a\x08\x08b\n"), b"\x08b\n");
    }

    #[test]
    fn non_sgr_escapes_pass_through() {
        assert_eq!(normalize(b"\x1b[2Jx\n"), b"\x1b[2Jx\n");
    }

    #[test]
    fn nul_bytes_are_payload() {
        assert_eq!(normalize(b"a\x00b\n"), b"a\x00b\n");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            b"Hello \x1b[1mworld\x1b[m\n".as_slice(),
            b"b\x08bo\x08ol\x08ld\x08d\n",
            b"\t\x08x a\x08\x08b \x1b[2J\n",
            b"\xff\xfe plain\n",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn count_maps_normalized_to_raw_offsets() {
        let raw = b"Hello \x1b[1mworld\x1b[m\n";
        // "Hello world\n": 'o' of "orl" is payload byte 7.
        assert_eq!(normalize_count(raw, 7), 11);
        assert_eq!(normalize_count(raw, 10), 14);
        assert_eq!(normalize_count(raw, 0), 0);
    }

    #[test]
    fn count_round_trips_every_prefix() {
        let raw = b"a\x08ab\x1b[31mc_\x08d e\x1b[m\xff!\n";
        let norm = normalize(raw);
        for k in 0..=norm.len() {
            let raw_len = normalize_count(raw, k);
            assert_eq!(
                normalize(&raw[..raw_len]).len(),
                k,
                "prefix mismatch at payload len {k}"
            );
        }
    }

    #[test]
    fn prefix_len_inverts_count() {
        let raw = b"b\x08bo\x08ol\x08ld\x08d\n";
        let norm = normalize(raw);
        for k in 0..=norm.len() {
            let raw_len = normalize_count(raw, k);
            assert_eq!(normalized_prefix_len(raw, raw_len), k);
        }
    }

    #[test]
    fn ctrl_run_spans_mixed_sgr_and_overstrike() {
        let raw = b"\x1b[1m_\x08\x1b[4mx";
        // SGR, prefix `_\b`, SGR; payload `x` at the end.
        assert_eq!(ctrl_run_len(raw, 0), raw.len() - 1);
        let run = parse_ctrl_run(raw, 0);
        assert_eq!(run.prefixes, vec!['_']);
        assert_eq!(run.sgr_params.len(), 2);
    }

    #[test]
    fn overstrike_attr_classification() {
        assert_eq!(overstrike_attr(&[], 'x'), Attr::empty());
        assert_eq!(overstrike_attr(&['x'], 'x'), Attr::BOLD);
        assert_eq!(
            overstrike_attr(&['_'], 'x'),
            Attr::ITALIC | Attr::UNDERLINE
        );
        assert_eq!(
            overstrike_attr(&['_', 'x'], 'x'),
            Attr::BOLD | Attr::ITALIC
        );
        // `_\b_` overstrikes underscore with itself: plain bold.
        assert_eq!(overstrike_attr(&['_'], '_'), Attr::BOLD);
    }

    #[test]
    fn prefix_at_line_end_consumes_silently() {
        // `x\b` with nothing after it: the run swallows both bytes.
        assert_eq!(normalize(b"x\x08"), b"");
    }
}
