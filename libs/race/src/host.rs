//! Host specifications and name resolution.
//!
//! A host specification is either `host` or `host:port`. The port is split
//! off at the last colon; when absent, [`DEFAULT_PORT`] is used.
//!
//! Resolution is deliberately narrow: one IPv4 address per host.

use std::fmt;
use std::net::{SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::str::FromStr;

use tracing::debug;

use crate::error::HostSpecError;

/// Port used when a host specification carries none.
pub const DEFAULT_PORT: u16 = 22;

/// One entry of the candidate list, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    /// Original text, kept for diagnostics.
    raw: String,
    /// Host name or address literal.
    host: String,
    /// Destination port.
    port: u16,
}

impl HostSpec {
    /// Host part of the specification.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part of the specification (or the default).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The specification exactly as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for HostSpec {
    type Err = HostSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| HostSpecError::InvalidPort {
                    spec: s.to_string(),
                    port: port.to_string(),
                })?;
                (host, port)
            }
            None => (s, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(HostSpecError::EmptyHost(s.to_string()));
        }

        Ok(Self {
            raw: s.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Maps a host specification to a single IPv4 socket address.
///
/// Returning `None` drops the candidate; the race continues with the next one.
pub trait Resolver {
    fn resolve(&self, spec: &HostSpec) -> Option<SocketAddrV4>;
}

impl<F> Resolver for F
where
    F: Fn(&HostSpec) -> Option<SocketAddrV4>,
{
    fn resolve(&self, spec: &HostSpec) -> Option<SocketAddrV4> {
        self(spec)
    }
}

/// Resolver backed by the system's synchronous lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, spec: &HostSpec) -> Option<SocketAddrV4> {
        let addrs = match (spec.host(), spec.port()).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(host = %spec.host(), error = %e, "lookup failed");
                return None;
            }
        };

        addrs.into_iter().find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
    }
}
