//! lsp entrypoint: startup, the Workhorse dispatch loop, teardown.

use anyhow::{Context, Result};
use core_config::Options;
use core_terminal::CrosstermBackend;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

mod help;
mod workhorse;

use workhorse::App;

fn main() {
    let opts = match Options::from_env() {
        Ok(opts) => opts,
        Err(e) if e.is_display_request() => {
            e.print_display();
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("lsp: {e}");
            std::process::exit(1);
        }
    };

    // The pager only activates interactively; otherwise behave as cat.
    if !core_terminal::stdout_is_tty() {
        let code = match copy_through(&opts.files) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("lsp: {e}");
                1
            }
        };
        std::process::exit(code);
    }

    let _log_guard = configure_logging(&opts);
    install_panic_hook();

    let mut backend = CrosstermBackend::new();
    let code = {
        let guard = match backend.enter_guard() {
            Ok(g) => g,
            Err(e) => {
                eprintln!("lsp: cannot initialize terminal: {e}");
                std::process::exit(1);
            }
        };
        let result = App::new(opts).and_then(|mut app| app.run());
        drop(guard);
        match result {
            Ok(()) => 0,
            Err(e) => {
                // Screen already restored; the message lands on a sane
                // terminal.
                error!(target: "runtime", error = %e, "fatal");
                eprintln!("lsp: {e:#}");
                1
            }
        }
    };
    std::process::exit(code);
}

/// Non-TTY degradation: copy every input to stdout verbatim.
fn copy_through(files: &[PathBuf]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if files.is_empty() {
        std::io::copy(&mut std::io::stdin().lock(), &mut out)?;
    } else {
        for path in files {
            let mut f = std::fs::File::open(path)
                .with_context(|| format!("cannot open {}", path.display()))?;
            std::io::copy(&mut f, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn configure_logging(opts: &Options) -> Option<WorkerGuard> {
    let path = opts.log_file.as_ref()?;
    let dir = path.parent().unwrap_or(Path::new("."));
    let file = path.file_name()?;
    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let init = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    match init {
        Ok(()) => {
            info!(target: "runtime", log = %path.display(), "logging started");
            Some(guard)
        }
        Err(_) => None,
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            // Best effort: leave the alternate screen so the panic
            // message is readable.
            let _ = crossterm::execute!(
                std::io::stdout(),
                crossterm::terminal::LeaveAlternateScreen,
                crossterm::cursor::Show
            );
            let _ = crossterm::terminal::disable_raw_mode();
            error!(target: "runtime", ?info, "panic");
            default_panic(info);
        }));
    });
}
