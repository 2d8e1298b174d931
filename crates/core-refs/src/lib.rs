//! Man-page references: parsing, canonicalization, and the process-wide
//! validation cache.
//!
//! A reference spelling like `printf(3)` is canonicalized once and
//! interned in a [`RefCache`] shared by every open document; validation
//! outcomes are memoized there for the life of the process. Actually
//! running a verify command is the child-process boundary's job — the
//! [`Verifier`] trait keeps it out of this crate.

use ahash::AHashMap;
use tracing::{debug, trace};

/// Memoized validation state of one canonical reference spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validity {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

/// Name and section extracted from a reference token. The section may be
/// empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpec {
    pub name: String,
    pub section: String,
}

/// Parse a reference in one of the four accepted spellings:
/// `name(section)`, `name.section`, `section name`, `name`.
pub fn parse_reference(s: &str) -> RefSpec {
    let s = s.trim();
    if let Some(open) = s.find('(') {
        let name = s[..open].to_string();
        let section = s[open + 1..].trim_end_matches(')').to_string();
        return RefSpec { name, section };
    }
    if let Some((section, name)) = s.split_once(' ') {
        return RefSpec {
            name: name.trim().to_string(),
            section: section.to_string(),
        };
    }
    if let Some((name, section)) = s.rsplit_once('.')
        && !name.is_empty()
        && !section.is_empty()
    {
        return RefSpec {
            name: name.to_string(),
            section: section.to_string(),
        };
    }
    RefSpec {
        name: s.to_string(),
        section: String::new(),
    }
}

/// Canonical form of a raw reference token: attributes stripped, then
/// case-folded unless man-page names are case sensitive.
pub fn canonicalize(token: &[u8], case_sensitive: bool) -> String {
    let normalized = core_line::normalize(token);
    let s = String::from_utf8_lossy(&normalized);
    let s = s.trim();
    if case_sensitive {
        s.to_string()
    } else {
        s.to_lowercase()
    }
}

/// Runs the external validator for a (name, section) pair.
pub trait Verifier {
    fn verify(&mut self, name: &str, section: &str) -> std::io::Result<bool>;
}

/// How references get validated during refs search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Every candidate is taken at face value.
    Off,
    /// Run the verify command once per unknown spelling.
    #[default]
    Command,
    /// Consult the apropos snapshot only.
    Apropos,
}

/// Process-wide reference cache keyed by canonical spelling.
#[derive(Debug, Default)]
pub struct RefCache {
    map: AHashMap<String, Validity>,
    snapshot_loaded: bool,
}

impl RefCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded validity, `Unknown` for spellings never seen.
    pub fn validity(&self, canonical: &str) -> Validity {
        self.map.get(canonical).copied().unwrap_or_default()
    }

    pub fn record(&mut self, canonical: String, validity: Validity) {
        trace!(target: "refs", name = %canonical, ?validity, "record");
        self.map.insert(canonical, validity);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn snapshot_loaded(&self) -> bool {
        self.snapshot_loaded
    }

    /// Pre-populate from apropos output (`name (section) - description`
    /// per line), marking every enumerated page valid. Returns how many
    /// entries were loaded.
    pub fn load_snapshot(&mut self, listing: &[u8], case_sensitive: bool) -> usize {
        let mut loaded = 0;
        for line in listing.split(|&b| b == b'\n') {
            let Some(spelling) = apropos_spelling(line) else {
                continue;
            };
            let canonical = canonicalize(spelling.as_bytes(), case_sensitive);
            self.map.insert(canonical, Validity::Valid);
            loaded += 1;
        }
        self.snapshot_loaded = true;
        debug!(target: "refs", loaded, "apropos snapshot");
        loaded
    }
}

/// Turn one apropos line into its `name(section)` spelling.
fn apropos_spelling(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    // "name (section) - description" or "name(section) - description".
    let open = text.find('(')?;
    let close = text[open..].find(')')? + open;
    let name = text[..open].trim();
    let section = &text[open + 1..close];
    if name.is_empty() || section.is_empty() {
        return None;
    }
    Some(format!("{name}({section})"))
}

/// Decides whether a reference candidate is worth stopping on,
/// memoizing through the cache.
pub struct Resolver {
    pub cache: RefCache,
    pub case_sensitive: bool,
    pub mode: ValidationMode,
}

impl Resolver {
    pub fn new(mode: ValidationMode, case_sensitive: bool) -> Self {
        Self {
            cache: RefCache::new(),
            case_sensitive,
            mode,
        }
    }

    /// Validate the raw token of one candidate. Verification failures
    /// (the command could not run) leave the spelling unknown and report
    /// the candidate invalid for this query.
    pub fn is_valid(&mut self, token: &[u8], verifier: &mut dyn Verifier) -> bool {
        if matches!(self.mode, ValidationMode::Off) {
            return true;
        }
        let canonical = canonicalize(token, self.case_sensitive);
        match self.cache.validity(&canonical) {
            Validity::Valid => return true,
            Validity::Invalid => return false,
            Validity::Unknown => {}
        }
        if matches!(self.mode, ValidationMode::Apropos) {
            // Snapshot entries were interned valid at load; anything
            // missing from it does not exist.
            let validity = if self.cache.snapshot_loaded() {
                Validity::Invalid
            } else {
                Validity::Unknown
            };
            if validity != Validity::Unknown {
                self.cache.record(canonical, validity);
            }
            return false;
        }
        let spec = parse_reference(&canonical);
        match verifier.verify(&spec.name, &spec.section) {
            Ok(true) => {
                self.cache.record(canonical, Validity::Valid);
                true
            }
            Ok(false) => {
                self.cache.record(canonical, Validity::Invalid);
                false
            }
            Err(e) => {
                debug!(target: "refs", error = %e, "verify command failed");
                false
            }
        }
    }
}
