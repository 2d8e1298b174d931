//! Anonymous-pipe children: apropos enumeration, preprocessors, and the
//! reference verify command.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};

use core_feed::FeedSource;
use core_refs::Verifier;
use tracing::{debug, trace};

use crate::template::CommandTemplate;

/// popen-style source: a child's stdout with an optional pre-read byte
/// in front; the child is reaped on close.
pub struct PipeSource {
    prefix: Vec<u8>,
    at: usize,
    stdout: ChildStdout,
    child: Child,
}

impl Read for PipeSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.at < self.prefix.len() {
            let rest = &self.prefix[self.at..];
            let n = rest.len().min(buf.len());
            buf[..n].copy_from_slice(&rest[..n]);
            self.at += n;
            return Ok(n);
        }
        self.stdout.read(buf)
    }
}

impl FeedSource for PipeSource {
    fn close(&mut self) -> std::io::Result<()> {
        let status = self.child.wait()?;
        trace!(target: "spawn", success = status.success(), "pipe child reaped");
        Ok(())
    }
}

impl Drop for PipeSource {
    fn drop(&mut self) {
        // A child outliving its document gets no say in the matter.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Run `cmdline` through the shell with stdout piped.
pub fn popen(cmdline: &str) -> std::io::Result<PipeSource> {
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmdline)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    let stdout = child.stdout.take().expect("stdout was piped");
    Ok(PipeSource {
        prefix: Vec::new(),
        at: 0,
        stdout,
        child,
    })
}

/// Byte-sort the lines of a listing, dropping empties, with a trailing
/// newline per entry.
pub fn sorted_listing(raw: &[u8]) -> Vec<u8> {
    let mut lines: Vec<&[u8]> = raw
        .split(|&b| b == b'\n')
        .filter(|l| !l.is_empty())
        .collect();
    lines.sort_unstable();
    let mut out = Vec::with_capacity(raw.len());
    for l in lines {
        out.extend_from_slice(l);
        out.push(b'\n');
    }
    out
}

/// Enumerate every system man page: `apropos .`, sorted.
pub fn apropos_listing() -> std::io::Result<Vec<u8>> {
    let output = Command::new("apropos")
        .arg(".")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()?;
    debug!(
        target: "spawn",
        bytes = output.stdout.len(),
        success = output.status.success(),
        "apropos enumerated"
    );
    Ok(sorted_listing(&output.stdout))
}

/// Outcome of running an `LSP_OPEN`/`LESSOPEN` preprocessor.
pub enum Preprocessed {
    /// The preprocessor printed a replacement file to open instead.
    Replacement(PathBuf),
    /// `|`-form: page the preprocessor's stdout directly.
    Piped(PipeSource),
    /// Nothing useful came out; open the original file.
    Unchanged,
}

/// Run the preprocessor spec against `path`. The `|` prefix selects the
/// piped form, where an empty pipe falls back to the original file; the
/// plain form expects a replacement filename on stdout.
pub fn preprocess(spec: &str, path: &str) -> std::io::Result<Preprocessed> {
    let (piped, cmd_spec) = match spec.strip_prefix('|') {
        Some(rest) => (true, rest),
        None => (false, spec),
    };
    let cmdline = if cmd_spec.contains("%s") {
        cmd_spec.replace("%s", path)
    } else {
        format!("{cmd_spec} {path}")
    };

    if piped {
        let mut source = popen(&cmdline)?;
        let mut byte = [0u8; 1];
        return match source.stdout.read(&mut byte) {
            Ok(0) | Err(_) => {
                let _ = source.close();
                Ok(Preprocessed::Unchanged)
            }
            Ok(_) => {
                source.prefix = vec![byte[0]];
                Ok(Preprocessed::Piped(source))
            }
        };
    }

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(&cmdline)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()?;
    let name = String::from_utf8_lossy(&output.stdout);
    let name = name.trim();
    if name.is_empty() {
        Ok(Preprocessed::Unchanged)
    } else {
        Ok(Preprocessed::Replacement(PathBuf::from(name)))
    }
}

/// Validates references by exit status of the templated verify command.
pub struct CommandVerifier {
    template: CommandTemplate,
}

impl CommandVerifier {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

impl Verifier for CommandVerifier {
    fn verify(&mut self, name: &str, section: &str) -> std::io::Result<bool> {
        let argv = self.template.argv(name, section);
        let Some((prog, rest)) = argv.split_first() else {
            return Ok(false);
        };
        let status = Command::new(prog)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        trace!(target: "spawn", name, section, valid = status.success(), "verify");
        Ok(status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_sorts_and_terminates_lines() {
        let raw = b"zeta (1) - z\nalpha (2) - a\n\nmid (3) - m";
        assert_eq!(
            sorted_listing(raw),
            b"alpha (2) - a\nmid (3) - m\nzeta (1) - z\n".to_vec()
        );
    }

    #[test]
    fn popen_drains_child_output() {
        let mut src = popen("printf 'a\\nb\\n'").unwrap();
        let mut out = Vec::new();
        src.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"a\nb\n");
        src.close().unwrap();
    }

    #[test]
    fn piped_preprocessor_keeps_first_byte() {
        let got = preprocess("|printf 'XY'", "/dev/null").unwrap();
        match got {
            Preprocessed::Piped(mut src) => {
                let mut out = Vec::new();
                src.read_to_end(&mut out).unwrap();
                assert_eq!(out, b"XY");
                src.close().unwrap();
            }
            _ => panic!("expected piped form"),
        }
    }

    #[test]
    fn empty_pipe_falls_back() {
        let got = preprocess("|true", "/dev/null").unwrap();
        assert!(matches!(got, Preprocessed::Unchanged));
    }

    #[test]
    fn replacement_form_trims_stdout() {
        let got = preprocess("echo /tmp/replacement.txt ; :", "ignored").unwrap();
        match got {
            Preprocessed::Replacement(p) => {
                assert_eq!(p, PathBuf::from("/tmp/replacement.txt"))
            }
            _ => panic!("expected replacement form"),
        }
    }

    #[test]
    fn silent_replacement_form_is_unchanged() {
        let got = preprocess("true", "/dev/null").unwrap();
        assert!(matches!(got, Preprocessed::Unchanged));
    }
}
