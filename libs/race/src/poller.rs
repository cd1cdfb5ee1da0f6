//! Readiness multiplexer.
//!
//! Wraps `poll(2)` behind a small interface shared by the racer and the
//! relay:
//! - callers describe what they care about as a list of [`Registration`]s,
//! - [`wait`] blocks until something is ready or the [`WaitBudget`] runs out,
//! - ready descriptors come back as [`Event`]s, in registration order.
//!
//! This is the single blocking point of the whole engine.

use std::os::fd::BorrowedFd;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::trace;

use crate::error::MultiplexError;

/// Smallest wait ever handed to the readiness primitive.
///
/// A zero or negative remainder is clamped up to this so that a bounded wait
/// is never mistaken for "no timeout". `poll(2)` counts in milliseconds.
pub const MIN_WAIT: Duration = Duration::from_millis(1);

/// Which kinds of readiness a registration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const READABLE: Interest = Interest {
        read: true,
        write: false,
    };

    pub const WRITABLE: Interest = Interest {
        read: false,
        write: true,
    };

    fn flags(self) -> PollFlags {
        let mut flags = PollFlags::empty();
        if self.read {
            flags |= PollFlags::POLLIN;
        }
        if self.write {
            flags |= PollFlags::POLLOUT;
        }
        flags
    }
}

/// A descriptor to watch, tagged with a caller-chosen token.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'fd> {
    fd: BorrowedFd<'fd>,
    token: usize,
    interest: Interest,
}

impl<'fd> Registration<'fd> {
    pub fn new(fd: BorrowedFd<'fd>, token: usize, interest: Interest) -> Self {
        Self {
            fd,
            token,
            interest,
        }
    }
}

/// Readiness reported for one registration.
///
/// Error and hang-up conditions are folded into whichever interest was
/// registered, so the caller's next read or write observes the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub token: usize,
    pub readable: bool,
    pub writable: bool,
}

/// Result of a wait that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Zero or more registrations are ready (zero after an interrupted wait).
    Ready,
    /// The budget ran out with nothing ready.
    TimedOut,
}

/// How long a wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitBudget {
    /// Block until something is ready.
    Unbounded,
    /// Block until `start + duration`, but at least [`MIN_WAIT`].
    Within { start: Instant, duration: Duration },
}

impl WaitBudget {
    /// Budget of `duration` measured from `start`.
    pub fn within(start: Instant, duration: Duration) -> Self {
        Self::Within { start, duration }
    }

    /// Check readiness and return almost immediately.
    pub fn minimal() -> Self {
        Self::Within {
            start: Instant::now(),
            duration: Duration::ZERO,
        }
    }

    /// Remaining wait as of `now`; `None` means unbounded.
    ///
    /// `remaining = duration - (now - start)`, clamped to at least [`MIN_WAIT`].
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match *self {
            WaitBudget::Unbounded => None,
            WaitBudget::Within { start, duration } => {
                let elapsed = now.saturating_duration_since(start);
                Some(duration.saturating_sub(elapsed).max(MIN_WAIT))
            }
        }
    }

    fn poll_timeout(&self, now: Instant) -> PollTimeout {
        match self.remaining(now) {
            None => PollTimeout::NONE,
            Some(remaining) => {
                // Round up so a bounded wait never ends before its deadline.
                let millis = remaining.as_micros().div_ceil(1000);
                let millis = i32::try_from(millis).unwrap_or(i32::MAX);
                PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX)
            }
        }
    }
}

/// Wait for any registration to become ready.
///
/// `events` is cleared and then filled with the ready registrations, in the
/// order they were registered. An interrupted wait reports [`Wait::Ready`]
/// with no events so the caller simply recomputes its budget and retries.
pub fn wait(
    registrations: &[Registration<'_>],
    budget: WaitBudget,
    events: &mut Vec<Event>,
) -> Result<Wait, MultiplexError> {
    events.clear();

    let mut fds: Vec<PollFd<'_>> = registrations
        .iter()
        .map(|r| PollFd::new(r.fd, r.interest.flags()))
        .collect();

    let timeout = budget.poll_timeout(Instant::now());
    trace!(registrations = registrations.len(), ?timeout, "waiting for readiness");

    let ready = match poll(&mut fds, timeout) {
        Ok(n) => n,
        Err(Errno::EINTR) => return Ok(Wait::Ready),
        Err(errno) => return Err(MultiplexError(errno)),
    };

    if ready == 0 {
        return Ok(Wait::TimedOut);
    }

    let failure = PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL;

    for (registration, fd) in registrations.iter().zip(&fds) {
        let Some(revents) = fd.revents() else {
            continue;
        };

        let failed = revents.intersects(failure);
        let readable =
            registration.interest.read && (revents.contains(PollFlags::POLLIN) || failed);
        let writable =
            registration.interest.write && (revents.contains(PollFlags::POLLOUT) || failed);

        if readable || writable {
            events.push(Event {
                token: registration.token,
                readable,
                writable,
            });
        }
    }

    Ok(Wait::Ready)
}
