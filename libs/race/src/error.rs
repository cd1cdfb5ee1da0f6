//! Error types for connection racing and relaying.
//!
//! Per-candidate failures (resolution, socket creation, connect, preamble
//! mismatch) are never returned as errors: the racer logs them and drops the
//! candidate. Only a failing readiness wait escapes as an error.

use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// Host specification parse errors.
#[derive(Debug, Error)]
pub enum HostSpecError {
    /// No host before the port separator.
    #[error("empty host in '{0}'")]
    EmptyHost(String),

    /// Port is missing, not a number, or out of range.
    #[error("invalid port '{port}' in '{spec}'")]
    InvalidPort { spec: String, port: String },
}

/// Endpoint connector errors.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Could not allocate a socket (descriptor or memory exhaustion).
    #[error("socket: {0}")]
    Socket(io::Error),

    /// Could not switch the socket to non-blocking / close-on-exec.
    #[error("socket setup: {0}")]
    Configure(io::Error),
}

/// Readiness wait failure.
///
/// This is the only process-fatal condition: a broken readiness primitive
/// says more about the environment than about any single candidate.
#[derive(Debug, Error)]
#[error("readiness wait failed")]
pub struct MultiplexError(#[from] pub Errno);

/// Connection racer errors.
#[derive(Debug, Error)]
pub enum RaceError {
    #[error(transparent)]
    Multiplex(#[from] MultiplexError),
}

/// Relay engine errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Multiplex(#[from] MultiplexError),

    /// Could not duplicate the remote handle into read and write halves.
    #[error("cannot split remote handle")]
    Handle(#[from] io::Error),
}
