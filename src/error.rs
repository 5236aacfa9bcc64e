//! Error taxonomy for the telemetry library.
//!
//! Every module boundary raises one of these enums; none of them wrap
//! `anyhow` — callers are expected to match on the concrete variant.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`crate::transport::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("authentication failed for {user}@{host}")]
    Authentication { host: String, user: String },

    #[error("connection to {host} lost: {reason}")]
    ConnectionLost { host: String, reason: String },

    #[error("command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: f64 },

    #[error("invalid argument for {operation}: {reason}")]
    ArgumentInvalid { operation: String, reason: String },

    #[error("file transfer integrity error transferring {path}: {reason}")]
    FileIntegrity { path: PathBuf, reason: String },

    #[error("command {command:?} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ssh protocol error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("sftp error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    #[error("adb error: {0}")]
    Adb(String),

    #[error("exceeded {attempts} attempt(s) running {command:?}: {last_error}")]
    RetriesExhausted {
        command: String,
        attempts: u32,
        last_error: String,
    },
}

/// The device lacks a required binary or kernel interface.
#[derive(Debug, Error)]
#[error("required capability missing on target: {0}")]
pub struct CapabilityMissingError(pub String);

/// A parser could not structure the text it was given.
#[derive(Debug, Error)]
#[error("failed to parse {context}: {raw:?}")]
pub struct ParsingError {
    pub context: String,
    pub raw: String,
}

impl ParsingError {
    pub fn new(context: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            raw: raw.into(),
        }
    }
}

/// Errors at the handler boundary: everything that isn't transport,
/// capability, parsing, filesystem or sampler specific.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Capability(#[from] CapabilityMissingError),

    #[error("failed to parse sample: {0}")]
    Parsing(#[from] ParsingError),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error("{0}")]
    Other(String),
}

/// Remote filesystem predicate/unlink failures.
#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("conditional check for {path} returned neither True nor False: {raw:?}")]
    AmbiguousPredicate { path: String, raw: String },

    #[error("failed to remove {path}: {reason}")]
    UnlinkFailed { path: String, reason: String },
}

/// Sampler registry and worker failures.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("measurement of kind {0:?} already in progress")]
    AlreadyRunning(String),

    #[error("no {0:?} measurement in progress")]
    NotRunning(String),

    #[error("sampler worker for {kind:?} terminated with an error: {source}")]
    WorkerFailed {
        kind: String,
        source: Box<HandlerError>,
    },

    #[error("sampler worker for {0:?} panicked")]
    WorkerPanicked(String),

    #[error("sampling interval must be at least {min:?}, got {given:?}")]
    IntervalTooShort { given: Duration, min: Duration },
}
