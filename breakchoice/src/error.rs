//! Error types
//!
//! Configuration errors are fatal and surface at startup. Everything that can
//! go wrong while a breakpoint is being checked (counter persistence, a
//! collaborator failing, an unknown action) is logged and swallowed by the
//! engine so it never leaks into the program being debugged.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fallible breakchoice operations
pub type Result<T> = std::result::Result<T, BreakchoiceError>;

/// Problems with the rule document or the environment settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A literal that is neither a mode, an action nor an integer count
    #[error("unrecognised rule literal {literal:?} for pattern {pattern:?}")]
    UnknownLiteral { pattern: String, literal: String },

    /// A value that is neither a literal nor a list of literals
    #[error("rule for pattern {pattern:?} must be a literal or a list of literals, got {found}")]
    InvalidValue { pattern: String, found: String },

    /// More than one `null`/`none` key in the same document
    #[error("duplicate default rule")]
    DuplicateDefault,

    /// A counting mode resolved without a count
    #[error("rule for pattern {pattern:?} uses {mode} but has no count")]
    MissingCount { pattern: String, mode: String },

    /// The rule document is not a mapping at its top level
    #[error("rule document must be a mapping of pattern to behaviour")]
    NotAMapping,

    /// The rule document could not be parsed
    #[error("failed to parse rule document {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The rule document could not be read
    #[error("failed to read rule document {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An environment variable carried an unusable value
    #[error("invalid value {value:?} for {variable}")]
    InvalidEnv { variable: String, value: String },

    /// A collaborator command line could not be split into words
    #[error("cannot parse command line {command:?}")]
    InvalidCommand { command: String },
}

/// Failures reading or writing the counter backing store.
#[derive(Error, Debug)]
pub enum CounterError {
    #[error("failed to read counter store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write counter store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while performing a fired action.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// An action value outside the known enumeration
    #[error("unhandled action type {0:?}")]
    UnknownAction(String),

    /// The debugger, dialog or terminal collaborator failed
    #[error("{channel} collaborator failed: {source}")]
    Collaborator {
        channel: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for the crate
#[derive(Error, Debug)]
pub enum BreakchoiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Counter(#[from] CounterError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
