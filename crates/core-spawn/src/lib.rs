//! Child-process boundary: the man-page loader (through a PTY, so the
//! child formats for a terminal), the apropos enumerator, input
//! preprocessors, and the reference verify command.

use thiserror::Error;

mod man;
mod pipe;
mod template;

pub use man::{ManPage, PtySource, load_man_page, parse_sentinel};
pub use pipe::{
    CommandVerifier, PipeSource, Preprocessed, apropos_listing, popen, preprocess,
    sorted_listing,
};
pub use template::{CommandTemplate, split_command};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("command template must contain exactly one %n and one %s: {0:?}")]
    Template(String),
    #[error("command expands to nothing")]
    EmptyCommand,
    #[error("pty: {0}")]
    Pty(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SpawnError>;
