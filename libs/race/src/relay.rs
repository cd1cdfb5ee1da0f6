//! Full-duplex byte relay.
//!
//! Two directions, each with its own [`RelayBuffer`]:
//! - upstream: local input -> remote
//! - downstream: remote -> local output
//!
//! Per direction, the source is read while the direction is active and its
//! buffer has room; the sink is written while the buffer holds data. Once the
//! source is finished and the buffer is empty, the sink's write side is shut
//! down and the sink is dropped. The relay ends when neither direction has
//! anything left to read or write.

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;

use nix::errno::Errno;
use socket2::SockRef;
use tracing::{debug, trace};

use crate::buffer::RelayBuffer;
use crate::error::RelayError;
use crate::poller::{self, Event, Interest, Registration, WaitBudget};

/// A readable end of the relay.
pub trait RelaySource: Read + AsFd {}

impl<T: Read + AsFd> RelaySource for T {}

/// A writable end of the relay that can signal end of stream.
pub trait RelaySink: Write + AsFd {
    /// Shut down the write side so the peer observes end of stream.
    fn close_write(&mut self) -> io::Result<()>;
}

impl RelaySink for TcpStream {
    fn close_write(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

impl RelaySink for UnixStream {
    fn close_write(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// Standard output may be a socket, a pipe or a file. Only a socket has a
/// write side to shut down; for anything else dropping the handle is the
/// whole signal.
impl RelaySink for File {
    fn close_write(&mut self) -> io::Result<()> {
        match SockRef::from(&*self).shutdown(Shutdown::Write) {
            Err(e) if e.raw_os_error() == Some(Errno::ENOTSOCK as i32) => Ok(()),
            other => other,
        }
    }
}

/// Lifecycle of one relay direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionState {
    /// Source still being read.
    Active,
    /// Source finished (or sink failed); buffered bytes may still be flushed.
    HalfClosed,
    /// Sink shut down and released.
    Closed,
}

/// Byte totals delivered to each sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes written from local input to the remote.
    pub to_remote: u64,
    /// Bytes written to local output, pending bytes included.
    pub to_local: u64,
}

struct Direction {
    name: &'static str,
    source: Box<dyn RelaySource + Send>,
    sink: Option<Box<dyn RelaySink + Send>>,
    buffer: RelayBuffer,
    active: bool,
    written: u64,
}

impl Direction {
    fn new(
        name: &'static str,
        source: Box<dyn RelaySource + Send>,
        sink: Box<dyn RelaySink + Send>,
    ) -> Self {
        Self {
            name,
            source,
            sink: Some(sink),
            buffer: RelayBuffer::new(),
            active: true,
            written: 0,
        }
    }

    fn state(&self) -> DirectionState {
        match (self.active, &self.sink) {
            (_, None) => DirectionState::Closed,
            (true, Some(_)) => DirectionState::Active,
            (false, Some(_)) => DirectionState::HalfClosed,
        }
    }

    fn wants_read(&self) -> bool {
        self.active && self.buffer.spare() > 0
    }

    fn wants_write(&self) -> bool {
        self.sink.is_some() && !self.buffer.is_empty()
    }

    fn on_writable(&mut self) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        match self.buffer.drain_into(&mut **sink) {
            Ok(0) => {
                debug!(direction = self.name, "sink accepted nothing");
                self.fail_sink();
            }
            Ok(n) => {
                self.written += n as u64;
                trace!(direction = self.name, bytes = n, "flushed");
            }
            Err(e) if is_transient(&e) => {}
            Err(e) => {
                debug!(direction = self.name, error = %e, "sink write failed");
                self.fail_sink();
            }
        }
    }

    fn on_readable(&mut self) {
        match self.buffer.fill_from(&mut *self.source) {
            Ok(0) => {
                debug!(direction = self.name, "source reached end of stream");
                self.active = false;
            }
            Ok(n) => trace!(direction = self.name, bytes = n, "buffered"),
            Err(e) if is_transient(&e) => {}
            Err(e) => {
                debug!(direction = self.name, error = %e, "source read failed");
                self.active = false;
            }
        }
    }

    /// Unsent bytes are lost once the sink fails.
    fn fail_sink(&mut self) {
        self.active = false;
        self.buffer.clear();
    }

    fn propagate_close(&mut self) {
        if self.active || !self.buffer.is_empty() {
            return;
        }

        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close_write() {
                debug!(direction = self.name, error = %e, "shutdown failed");
            }
            debug!(direction = self.name, written = self.written, "direction closed");
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Relay between a local input/output pair and a remote connection.
pub struct Relay {
    directions: [Direction; 2],
}

const UPSTREAM: usize = 0;
const DOWNSTREAM: usize = 1;

impl Relay {
    pub fn new(
        local_in: impl RelaySource + Send + 'static,
        local_out: impl RelaySink + Send + 'static,
        remote_in: impl RelaySource + Send + 'static,
        remote_out: impl RelaySink + Send + 'static,
    ) -> Self {
        Self {
            directions: [
                Direction::new("upstream", Box::new(local_in), Box::new(remote_out)),
                Direction::new("downstream", Box::new(remote_in), Box::new(local_out)),
            ],
        }
    }

    /// Relay over a single remote stream, split into read and write halves.
    pub fn between(
        remote: TcpStream,
        local_in: impl RelaySource + Send + 'static,
        local_out: impl RelaySink + Send + 'static,
    ) -> Result<Self, RelayError> {
        let remote_out = remote.try_clone()?;
        Ok(Self::new(local_in, local_out, remote, remote_out))
    }

    /// Queue bytes for local output ahead of anything read from the remote.
    ///
    /// At most [`RelayBuffer::CAPACITY`] bytes are kept.
    pub fn with_pending(mut self, bytes: &[u8]) -> Self {
        let kept = self.directions[DOWNSTREAM].buffer.push(bytes);
        debug_assert_eq!(kept, bytes.len(), "pending bytes exceed relay buffer");
        self
    }

    pub fn upstream_state(&self) -> DirectionState {
        self.directions[UPSTREAM].state()
    }

    pub fn downstream_state(&self) -> DirectionState {
        self.directions[DOWNSTREAM].state()
    }

    /// Pump bytes until both directions are closed.
    ///
    /// Only a failing readiness wait is an error; I/O failures close the
    /// affected direction.
    pub fn run(&mut self) -> Result<RelayStats, RelayError> {
        let mut events: Vec<Event> = Vec::with_capacity(4);

        loop {
            let registrations = self.registrations();
            if registrations.is_empty() {
                break;
            }
            poller::wait(&registrations, WaitBudget::Unbounded, &mut events)?;
            drop(registrations);

            let mut readable = [false; 2];
            let mut writable = [false; 2];
            for event in &events {
                let index = event.token / 2;
                if event.token % 2 == 0 {
                    readable[index] |= event.readable;
                } else {
                    writable[index] |= event.writable;
                }
            }

            for (index, direction) in self.directions.iter_mut().enumerate() {
                if writable[index] && direction.wants_write() {
                    direction.on_writable();
                }
                if readable[index] && direction.wants_read() {
                    direction.on_readable();
                }
                direction.propagate_close();
            }
        }

        let stats = RelayStats {
            to_remote: self.directions[UPSTREAM].written,
            to_local: self.directions[DOWNSTREAM].written,
        };
        debug!(
            to_remote = stats.to_remote,
            to_local = stats.to_local,
            "relay finished"
        );
        Ok(stats)
    }

    /// Source of direction `i` gets token `2i`, its sink `2i + 1`.
    fn registrations(&self) -> Vec<Registration<'_>> {
        let mut registrations = Vec::with_capacity(4);

        for (index, direction) in self.directions.iter().enumerate() {
            if direction.wants_read() {
                registrations.push(Registration::new(
                    direction.source.as_fd(),
                    index * 2,
                    Interest::READABLE,
                ));
            }
            if let (true, Some(sink)) = (direction.wants_write(), &direction.sink) {
                registrations.push(Registration::new(
                    sink.as_fd(),
                    index * 2 + 1,
                    Interest::WRITABLE,
                ));
            }
        }

        registrations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    struct Ends {
        /// What the local user types into.
        user_in: UnixStream,
        /// Where the local user reads from.
        user_out: UnixStream,
        /// The remote server's end.
        server: UnixStream,
    }

    fn relay() -> (Relay, Ends) {
        let (user_in, local_in) = UnixStream::pair().unwrap();
        let (user_out, local_out) = UnixStream::pair().unwrap();
        let (server, remote) = UnixStream::pair().unwrap();

        for relay_side in [&local_in, &local_out, &remote] {
            relay_side.set_nonblocking(true).unwrap();
        }
        let remote_out = remote.try_clone().unwrap();

        (
            Relay::new(local_in, local_out, remote, remote_out),
            Ends {
                user_in,
                user_out,
                server,
            },
        )
    }

    #[test]
    fn test_pending_bytes_come_first() {
        let (relay, mut ends) = relay();
        let mut relay = relay.with_pending(b"SSH");

        ends.server.write_all(b"-2.0-test\r\n").unwrap();
        drop(ends.server);
        drop(ends.user_in);

        let stats = relay.run().unwrap();

        let mut received = Vec::new();
        ends.user_out.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"SSH-2.0-test\r\n");
        assert_eq!(
            stats,
            RelayStats {
                to_remote: 0,
                to_local: 14,
            }
        );
        assert_eq!(relay.upstream_state(), DirectionState::Closed);
        assert_eq!(relay.downstream_state(), DirectionState::Closed);
    }

    #[test]
    fn test_half_close_propagates_upstream() {
        let (mut relay, mut ends) = relay();

        let pump = thread::spawn(move || relay.run().unwrap());

        ends.user_in.write_all(b"ping").unwrap();
        drop(ends.user_in);

        // The server sees end of stream while its own direction stays open.
        let mut upstream = Vec::new();
        ends.server.read_to_end(&mut upstream).unwrap();
        assert_eq!(upstream, b"ping");

        ends.server.write_all(b"pong").unwrap();
        drop(ends.server);

        let mut downstream = Vec::new();
        ends.user_out.read_to_end(&mut downstream).unwrap();
        assert_eq!(downstream, b"pong");

        let stats = pump.join().unwrap();
        assert_eq!(
            stats,
            RelayStats {
                to_remote: 4,
                to_local: 4,
            }
        );
    }

    #[test]
    fn test_sink_failure_closes_direction() {
        let (mut relay, mut ends) = relay();

        drop(ends.user_out);
        drop(ends.user_in);
        ends.server.write_all(b"lost").unwrap();

        let stats = relay.run().unwrap();

        assert_eq!(stats.to_local, 0);
        assert_eq!(relay.downstream_state(), DirectionState::Closed);
    }

    #[test]
    fn test_file_sink_close_write() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut as_file = File::from(std::os::fd::OwnedFd::from(a));
        assert!(as_file.close_write().is_ok());

        let mut not_socket = File::open("/dev/null").unwrap();
        assert!(not_socket.close_write().is_ok());
    }

    fn chunks() -> impl Strategy<Value = Vec<Vec<u8>>> {
        prop::collection::vec(prop::collection::vec(any::<u8>(), 1..9000), 0..8)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn test_bytes_conserved(up in chunks(), down in chunks()) {
            let (mut relay, ends) = relay();
            let Ends { mut user_in, mut user_out, mut server } = ends;
            let mut server_writer = server.try_clone().unwrap();

            let pump = thread::spawn(move || relay.run().unwrap());

            let up_sent: Vec<u8> = up.concat();
            let down_sent: Vec<u8> = down.concat();

            let typist = thread::spawn(move || {
                for chunk in up {
                    user_in.write_all(&chunk).unwrap();
                }
            });
            let responder = thread::spawn(move || {
                for chunk in down {
                    server_writer.write_all(&chunk).unwrap();
                }
                server_writer.shutdown(Shutdown::Write).unwrap();
            });
            let listener = thread::spawn(move || {
                let mut received = Vec::new();
                user_out.read_to_end(&mut received).unwrap();
                received
            });

            let mut up_received = Vec::new();
            server.read_to_end(&mut up_received).unwrap();

            typist.join().unwrap();
            responder.join().unwrap();
            let down_received = listener.join().unwrap();
            let stats = pump.join().unwrap();

            prop_assert_eq!(&up_received, &up_sent);
            prop_assert_eq!(&down_received, &down_sent);
            prop_assert_eq!(stats.to_remote, up_sent.len() as u64);
            prop_assert_eq!(stats.to_local, down_sent.len() as u64);
        }
    }
}
