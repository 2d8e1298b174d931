//! `%n`/`%s` command templates.

use crate::{Result, SpawnError};

/// A loader or verifier command line with one `%n` (page name) slot and
/// one `%s` (section) slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

impl CommandTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        if count_occurrences(raw, "%n") != 1 || count_occurrences(raw, "%s") != 1 {
            return Err(SpawnError::Template(raw.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// Default man loader invocation.
    pub fn default_reload() -> Self {
        Self::parse("man %s %n").expect("builtin template is valid")
    }

    /// Default reference validator, equivalent to
    /// `man -w %s %n > /dev/null 2>&1`.
    pub fn default_verify() -> Self {
        Self::parse("man -w %s %n").expect("builtin template is valid")
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Substitute name and section. An empty section collapses an
    /// adjacent `.` or `(` so `%n.%s` and `%n(%s)` degrade to a bare
    /// name.
    pub fn expand(&self, name: &str, section: &str) -> String {
        let mut tpl = self.raw.clone();
        if section.is_empty()
            && let Some(at) = tpl.find("%s")
        {
            if at > 0 && tpl.as_bytes()[at - 1] == b'.' {
                tpl.remove(at - 1);
            } else if at > 0 && tpl.as_bytes()[at - 1] == b'(' {
                tpl.remove(at - 1);
                if tpl.as_bytes().get(at + 1) == Some(&b')') {
                    tpl.remove(at + 1);
                }
            }
        }
        tpl.replace("%n", name).replace("%s", section)
    }

    /// Expanded argv, empty-token free.
    pub fn argv(&self, name: &str, section: &str) -> Vec<String> {
        split_command(&self.expand(name, section))
    }
}

/// Split a command line into tokens: whitespace separated, with `"..."`
/// quoting. Used for templates and for `LSP_OPTIONS`.
pub fn split_command(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut pending = false;
    for ch in s.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending {
                    out.push(std::mem::take(&mut cur));
                    pending = false;
                }
            }
            c => {
                cur.push(c);
                pending = true;
            }
        }
    }
    if pending {
        out.push(cur);
    }
    out
}
