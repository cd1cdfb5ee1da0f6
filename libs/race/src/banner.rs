//! Protocol preamble validation.
//!
//! A candidate qualifies when the first bytes it sends match a fixed
//! preamble (`SSH` for the reference use). Validation is a single bounded
//! read: the preamble is short enough to arrive as one contiguous prefix,
//! so whatever one read returns is authoritative.

use std::io::{self, Read};

/// Leading byte sequence a valid endpoint must send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble(&'static [u8]);

impl Preamble {
    /// Identification string prefix of an SSH server.
    pub const SSH: Preamble = Preamble(b"SSH");

    /// A preamble for another banner-based protocol.
    pub const fn new(bytes: &'static [u8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `received` agrees with the preamble over its own length.
    pub fn matches(&self, received: &[u8]) -> bool {
        !received.is_empty() && self.0.starts_with(received)
    }
}

impl Default for Preamble {
    fn default() -> Self {
        Self::SSH
    }
}

/// Outcome of validating one candidate.
#[derive(Debug)]
pub enum Verdict {
    /// Preamble matched. The consumed bytes are the start of the relay stream.
    Validated(Vec<u8>),
    /// The candidate must be dropped.
    Rejected(Rejection),
}

/// Why a candidate was rejected.
#[derive(Debug)]
pub enum Rejection {
    /// The peer closed before sending anything.
    Closed,
    /// The read failed (typically a refused or reset connect).
    Io(io::Error),
    /// The peer sent something else.
    Mismatch(Vec<u8>),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Closed => f.write_str("closed before preamble"),
            Rejection::Io(e) => write!(f, "read failed: {}", e),
            Rejection::Mismatch(bytes) => {
                write!(f, "preamble mismatch: {:?}", String::from_utf8_lossy(bytes))
            }
        }
    }
}

/// Perform one read of at most `preamble.len()` bytes and judge it.
pub fn validate<R: Read + ?Sized>(source: &mut R, preamble: &Preamble) -> Verdict {
    let mut reply = vec![0u8; preamble.len()];

    match source.read(&mut reply) {
        Ok(0) => Verdict::Rejected(Rejection::Closed),
        Ok(n) => {
            reply.truncate(n);
            if preamble.matches(&reply) {
                Verdict::Validated(reply)
            } else {
                Verdict::Rejected(Rejection::Mismatch(reply))
            }
        }
        Err(e) => Verdict::Rejected(Rejection::Io(e)),
    }
}
