//! Option parsing: argv, `LSP_OPTIONS`, and derived settings.
//!
//! Every boolean flag is a *toggle*: repeating it flips the setting
//! again, whether the repeats come from `LSP_OPTIONS`, argv, or both.
//! Environment tokens are parsed first, so argv occurrences win ties.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use core_spawn::{CommandTemplate, SpawnError, split_command};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Usage(#[from] clap::Error),
    #[error(transparent)]
    Template(#[from] SpawnError),
    #[error("log file must end in the mkstemp template XXXXXX: {0}")]
    BadLogTemplate(PathBuf),
    #[error("cannot create log file {0}: {1}")]
    LogCreate(PathBuf, std::io::Error),
}

impl ConfigError {
    /// `--help` and `--version` requests; they exit 0, not 1.
    pub fn is_display_request(&self) -> bool {
        matches!(
            self,
            ConfigError::Usage(e) if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            )
        )
    }

    /// Render a help/version display to the terminal.
    pub fn print_display(&self) {
        if let ConfigError::Usage(e) = self {
            let _ = e.print();
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "lsp",
    version,
    about = "list pages - a pager for byte streams and man pages",
    disable_version_flag = true
)]
struct Cli {
    /// Preload the apropos pseudo-document at startup.
    #[arg(short = 'a', long = "load-apropos", action = ArgAction::Count)]
    load_apropos: u8,

    /// Toggle long-line chopping (truncate with `>`).
    #[arg(short = 'c', long = "chop-lines", action = ArgAction::Count)]
    chop_lines: u8,

    /// Toggle case-insensitive search.
    #[arg(short = 'i', long = "no-case", action = ArgAction::Count)]
    no_case: u8,

    /// Enable case-sensitive man-page names.
    #[arg(short = 'I', long = "man-case", action = ArgAction::Count)]
    man_case: u8,

    /// Do not translate carriage returns to ^M.
    #[arg(long = "keep-cr", action = ArgAction::Count)]
    keep_cr: u8,

    /// Debug log path; must end in the mkstemp template XXXXXX.
    #[arg(short = 'l', long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Toggle the line-number gutter.
    #[arg(short = 'n', long = "line-numbers", action = ArgAction::Count)]
    line_numbers: u8,

    /// Disable all color output.
    #[arg(long = "no-color", action = ArgAction::Count)]
    no_color: u8,

    /// Tee all read input to this path (truncated first).
    #[arg(short = 'o', long = "output-file", value_name = "PATH")]
    output_file: Option<PathBuf>,

    /// Man loader template; exactly one %n and one %s.
    #[arg(long = "reload-command", value_name = "FMT")]
    reload_command: Option<String>,

    /// Initial forward search pattern.
    #[arg(short = 's', long = "search-string", value_name = "S")]
    search_string: Option<String>,

    /// Toggle reference validation.
    #[arg(short = 'V', long = "no-verify", action = ArgAction::Count)]
    no_verify: u8,

    /// Reference validator template; exactly one %n and one %s.
    #[arg(long = "verify-command", value_name = "FMT")]
    verify_command: Option<String>,

    /// Use the apropos snapshot for reference validation.
    #[arg(long = "verify-with-apropos", action = ArgAction::Count)]
    verify_with_apropos: u8,

    /// Print version and exit.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: (),

    /// Files to page; standard input when empty.
    files: Vec<PathBuf>,
}

fn toggled(count: u8) -> bool {
    count % 2 == 1
}

/// Fully resolved runtime options.
#[derive(Debug, Clone)]
pub struct Options {
    pub load_apropos: bool,
    pub chop_lines: bool,
    pub case_insensitive: bool,
    pub man_case_sensitive: bool,
    pub keep_cr: bool,
    /// Log path with the mkstemp suffix already materialized.
    pub log_file: Option<PathBuf>,
    pub line_numbers: bool,
    pub no_color: bool,
    pub output_file: Option<PathBuf>,
    pub reload_command: CommandTemplate,
    pub search_string: Option<String>,
    pub verify: bool,
    pub verify_command: CommandTemplate,
    pub verify_with_apropos: bool,
    pub files: Vec<PathBuf>,
    pub tab_width: u16,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            load_apropos: false,
            chop_lines: false,
            case_insensitive: false,
            man_case_sensitive: false,
            keep_cr: false,
            log_file: None,
            line_numbers: false,
            no_color: false,
            output_file: None,
            reload_command: CommandTemplate::default_reload(),
            search_string: None,
            verify: true,
            verify_command: CommandTemplate::default_verify(),
            verify_with_apropos: false,
            files: Vec::new(),
            tab_width: 8,
        }
    }
}

impl Options {
    /// Parse process argv merged with `LSP_OPTIONS`, and scrub
    /// `COLUMNS` so the child formatter cannot be skewed by it.
    pub fn from_env() -> Result<Self, ConfigError> {
        // The loader child must size itself from the PTY winsize alone.
        unsafe { std::env::remove_var("COLUMNS") };
        let mut argv: Vec<OsString> = std::env::args_os().collect();
        let prog = if argv.is_empty() {
            OsString::from("lsp")
        } else {
            argv.remove(0)
        };
        let mut combined = vec![prog];
        if let Ok(env_opts) = std::env::var("LSP_OPTIONS") {
            combined.extend(
                split_command(env_opts.trim_start())
                    .into_iter()
                    .map(OsString::from),
            );
        }
        combined.extend(argv);
        Self::from_args(combined)
    }

    /// Parse an explicit argv (first element is the program name).
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args)?;
        let reload_command = match &cli.reload_command {
            Some(fmt) => CommandTemplate::parse(fmt)?,
            None => CommandTemplate::default_reload(),
        };
        let verify_command = match &cli.verify_command {
            Some(fmt) => CommandTemplate::parse(fmt)?,
            None => CommandTemplate::default_verify(),
        };
        let log_file = cli.log_file.clone().map(materialize_log_path).transpose()?;
        let opts = Options {
            load_apropos: toggled(cli.load_apropos),
            chop_lines: toggled(cli.chop_lines),
            case_insensitive: toggled(cli.no_case),
            man_case_sensitive: toggled(cli.man_case),
            keep_cr: toggled(cli.keep_cr),
            log_file,
            line_numbers: toggled(cli.line_numbers),
            no_color: toggled(cli.no_color),
            output_file: cli.output_file,
            reload_command,
            search_string: cli.search_string,
            verify: !toggled(cli.no_verify),
            verify_command,
            verify_with_apropos: toggled(cli.verify_with_apropos),
            files: cli.files,
            tab_width: 8,
        };
        debug!(target: "config", ?opts, "options resolved");
        Ok(opts)
    }
}

/// Turn a `...XXXXXX` template into a created unique file, mkstemp
/// style, returning the materialized path.
fn materialize_log_path(template: PathBuf) -> Result<PathBuf, ConfigError> {
    use std::os::unix::ffi::{OsStrExt, OsStringExt};
    if !template.as_os_str().as_bytes().ends_with(b"XXXXXX") {
        return Err(ConfigError::BadLogTemplate(template));
    }
    let mut bytes = template.as_os_str().as_bytes().to_vec();
    bytes.push(0);
    let fd = unsafe { libc::mkstemp(bytes.as_mut_ptr() as *mut libc::c_char) };
    if fd < 0 {
        return Err(ConfigError::LogCreate(
            template,
            std::io::Error::last_os_error(),
        ));
    }
    unsafe { libc::close(fd) };
    bytes.pop();
    Ok(PathBuf::from(OsString::from_vec(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        let mut argv = vec!["lsp"];
        argv.extend_from_slice(args);
        Options::from_args(argv).unwrap()
    }

    #[test]
    fn defaults_without_flags() {
        let o = parse(&[]);
        assert!(!o.chop_lines);
        assert!(!o.case_insensitive);
        assert!(o.verify);
        assert_eq!(o.reload_command.as_str(), "man %s %n");
        assert_eq!(o.verify_command.as_str(), "man -w %s %n");
        assert!(o.files.is_empty());
    }

    #[test]
    fn flags_toggle_on_repeat() {
        assert!(parse(&["-c"]).chop_lines);
        assert!(!parse(&["-c", "-c"]).chop_lines);
        assert!(parse(&["-c", "--chop-lines", "-c"]).chop_lines);
    }

    #[test]
    fn no_verify_inverts_default() {
        assert!(!parse(&["-V"]).verify);
        assert!(parse(&["-V", "-V"]).verify);
    }

    #[test]
    fn files_and_search_string() {
        let o = parse(&["-s", "needle", "a.txt", "b.txt"]);
        assert_eq!(o.search_string.as_deref(), Some("needle"));
        assert_eq!(o.files.len(), 2);
    }

    #[test]
    fn custom_templates_are_validated() {
        let o = parse(&["--reload-command", "mandoc -a %s %n"]);
        assert_eq!(o.reload_command.as_str(), "mandoc -a %s %n");
        let err = Options::from_args(["lsp", "--verify-command", "man %n"]);
        assert!(err.is_err());
    }

    #[test]
    fn log_template_is_enforced() {
        let err = Options::from_args(["lsp", "-l", "/tmp/lsp.log"]);
        assert!(matches!(err, Err(ConfigError::BadLogTemplate(_))));
        let dir = tempfile::tempdir().unwrap();
        let tpl = dir.path().join("lsp-XXXXXX");
        let o = Options::from_args(["lsp".into(), "-l".into(), tpl.clone().into_os_string()])
            .unwrap();
        let got = o.log_file.unwrap();
        assert_ne!(got, tpl);
        assert!(got.exists());
        assert!(
            got.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("lsp-")
        );
    }

    #[test]
    fn version_short_flag_is_v() {
        let err = Options::from_args(["lsp", "-v"]).unwrap_err();
        match err {
            ConfigError::Usage(e) => {
                assert_eq!(e.kind(), clap::error::ErrorKind::DisplayVersion)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
