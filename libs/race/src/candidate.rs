//! Candidate endpoints and pacing state.

use std::net::{SocketAddrV4, TcpStream};
use std::time::{Duration, Instant};

use crate::host::HostSpec;
use crate::poller::WaitBudget;

/// Lifecycle of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    /// Not attempted yet.
    Pending,
    /// Connect issued, waiting for the first readable event.
    InFlight,
    /// Preamble matched; this candidate carries the relay.
    Validated,
    /// Dropped: no address, no socket, failed read or wrong preamble.
    Rejected,
}

/// An attempted candidate whose connect has been issued.
///
/// Dropping it closes the socket.
#[derive(Debug)]
pub(crate) struct Candidate {
    pub(crate) id: usize,
    pub(crate) spec: HostSpec,
    pub(crate) address: SocketAddrV4,
    pub(crate) stream: TcpStream,
}

/// What became of a host from the candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub spec: HostSpec,
    pub address: Option<SocketAddrV4>,
    pub state: CandidateState,
}

/// Timestamp and identity of the most recent connect attempt.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PacingState {
    last: Option<(usize, Instant)>,
}

impl PacingState {
    pub(crate) fn record(&mut self, id: usize, at: Instant) {
        self.last = Some((id, at));
    }

    pub(crate) fn last_attempt(&self) -> Option<Instant> {
        self.last.map(|(_, at)| at)
    }

    /// Budget for the next readiness wait between two attempts.
    ///
    /// While the most recent attempt is still in flight, wait out the rest of
    /// its interval; otherwise only check for readiness and move on.
    pub(crate) fn budget(&self, in_flight: impl Fn(usize) -> bool, interval: Duration) -> WaitBudget {
        match self.last {
            Some((id, at)) if in_flight(id) => WaitBudget::within(at, interval),
            _ => WaitBudget::minimal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::MIN_WAIT;

    #[test]
    fn test_budget_without_attempts() {
        let pacing = PacingState::default();
        let budget = pacing.budget(|_| true, Duration::from_secs(1));
        assert_eq!(budget.remaining(Instant::now()), Some(MIN_WAIT));
    }

    #[test]
    fn test_budget_follows_latest_attempt() {
        let mut pacing = PacingState::default();
        let at = Instant::now();
        pacing.record(4, at);

        let budget = pacing.budget(|id| id == 4, Duration::from_secs(1));
        assert_eq!(budget, WaitBudget::within(at, Duration::from_secs(1)));
        assert_eq!(pacing.last_attempt(), Some(at));
    }

    #[test]
    fn test_budget_collapses_once_latest_is_gone() {
        let mut pacing = PacingState::default();
        pacing.record(4, Instant::now());

        let budget = pacing.budget(|id| id != 4, Duration::from_secs(1));
        assert_eq!(budget.remaining(Instant::now()), Some(MIN_WAIT));
    }
}
