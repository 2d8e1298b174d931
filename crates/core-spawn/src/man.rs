//! Loading a man page through a pseudoterminal.
//!
//! The loader command runs with the pager's window size so the child
//! formats for the real width. `PAGER` (or `MANPAGER` when the user set
//! one) is pointed at `lsp_cat`, a helper that prints a
//! `<lsp-man-pn>NAME</lsp-man-pn>` sentinel line before the payload; the
//! sentinel carries the authoritative page name. When the first line is
//! not a sentinel it is kept as data.

use std::io::Read;

use core_feed::FeedSource;
use portable_pty::{CommandBuilder, PtySize, native_pty_system};
use tracing::{debug, trace};

use crate::template::CommandTemplate;
use crate::{Result, SpawnError};

const SENTINEL_OPEN: &[u8] = b"<lsp-man-pn>";
const SENTINEL_CLOSE: &[u8] = b"</lsp-man-pn>";
const SENTINEL_MAX: usize = 512;

/// PTY-backed input source. Keeps the master side alive for the life of
/// the read and reaps the child on close.
pub struct PtySource {
    prefix: Vec<u8>,
    at: usize,
    reader: Box<dyn Read + Send>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
    _master: Box<dyn portable_pty::MasterPty + Send>,
}

impl Read for PtySource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.at < self.prefix.len() {
            let rest = &self.prefix[self.at..];
            let n = rest.len().min(buf.len());
            buf[..n].copy_from_slice(&rest[..n]);
            self.at += n;
            return Ok(n);
        }
        self.reader.read(buf)
    }
}

impl FeedSource for PtySource {
    fn is_pty(&self) -> bool {
        true
    }

    fn close(&mut self) -> std::io::Result<()> {
        let status = self.child.wait()?;
        trace!(target: "spawn", success = status.success(), "man loader reaped");
        Ok(())
    }
}

impl Drop for PtySource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A freshly loaded man page: its byte source plus the page name the
/// sentinel announced (when present).
pub struct ManPage {
    pub source: PtySource,
    pub page_name: Option<String>,
}

/// Extract the page name from a sentinel line (trailing `\r`/`\n`
/// tolerated).
pub fn parse_sentinel(line: &[u8]) -> Option<String> {
    let mut body = line;
    while matches!(body.last(), Some(b'\n') | Some(b'\r')) {
        body = &body[..body.len() - 1];
    }
    let inner = body
        .strip_prefix(SENTINEL_OPEN)?
        .strip_suffix(SENTINEL_CLOSE)?;
    Some(String::from_utf8_lossy(inner).into_owned())
}

/// Spawn the templated loader for (name, section) on a fresh PTY sized
/// `rows` x `cols` and consume the sentinel line.
pub fn load_man_page(
    template: &CommandTemplate,
    name: &str,
    section: &str,
    rows: u16,
    cols: u16,
) -> Result<ManPage> {
    let argv = template.argv(name, section);
    let Some((prog, rest)) = argv.split_first() else {
        return Err(SpawnError::EmptyCommand);
    };

    let pair = native_pty_system()
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| SpawnError::Pty(e.to_string()))?;

    let mut cmd = CommandBuilder::new(prog);
    cmd.args(rest);
    // The child's pager must be lsp_cat so the sentinel line arrives
    // first. MANPAGER and GIT_PAGER shadow PAGER when the user set them.
    cmd.env("PAGER", "lsp_cat");
    for var in ["MANPAGER", "GIT_PAGER"] {
        if std::env::var_os(var).is_some() {
            cmd.env(var, "lsp_cat");
        }
    }

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| SpawnError::Pty(e.to_string()))?;
    drop(pair.slave);
    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| SpawnError::Pty(e.to_string()))?;

    let first_line = read_first_line(reader.as_mut());
    let page_name = parse_sentinel(&first_line);
    let prefix = if page_name.is_some() {
        Vec::new()
    } else {
        // No sentinel: the line is payload, hand it back as data.
        first_line
    };
    debug!(
        target: "spawn",
        name,
        section,
        sentinel = page_name.is_some(),
        "man page loading"
    );

    Ok(ManPage {
        source: PtySource {
            prefix,
            at: 0,
            reader,
            child,
            _master: pair.master,
        },
        page_name,
    })
}

/// Read up to and including the first `\n` (bounded; a PTY hangup or
/// EOF ends the line early).
fn read_first_line(reader: &mut dyn Read) -> Vec<u8> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    while line.len() < SENTINEL_MAX {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
            Err(_) => break,
        }
    }
    line
}
