//! Connection racer.
//!
//! Drives the candidate list through the connector, the readiness
//! multiplexer and the banner validator:
//!
//! ```text
//! Racing --(first validated)--> Winner
//!    |
//!    +--(list attempted, none in flight)--> Exhausted
//! ```
//!
//! New candidates are offered at most once per pacing interval while the
//! latest attempt is still in flight. Once the list is used up, an optional
//! fallback gets its turn after a grace window, and any candidate still in
//! flight is waited on without a deadline.

use std::collections::VecDeque;
use std::io;
use std::mem;
use std::net::{SocketAddrV4, TcpStream};
use std::os::fd::AsFd;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::banner::{self, Preamble, Verdict};
use crate::candidate::{AttemptRecord, Candidate, CandidateState, PacingState};
use crate::connector;
use crate::error::RaceError;
use crate::host::{HostSpec, Resolver};
use crate::poller::{self, Event, Interest, Registration, Wait, WaitBudget};

/// How long the latest attempt may hold up the next one.
pub const PACING_INTERVAL: Duration = Duration::from_secs(1);

/// Last chance for late candidates before the fallback runs.
pub const FALLBACK_GRACE: Duration = Duration::from_secs(3);

/// Racer tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceConfig {
    /// Bytes a candidate must lead with.
    pub preamble: Preamble,
    /// Wait granted to the latest attempt before the next is offered.
    pub pacing_interval: Duration,
    /// Wait between exhausting the list and running the fallback.
    pub fallback_grace: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            preamble: Preamble::SSH,
            pacing_interval: PACING_INTERVAL,
            fallback_grace: FALLBACK_GRACE,
        }
    }
}

/// Alternate way out once every candidate has been attempted.
pub trait Fallback {
    /// Human-readable form for diagnostics.
    fn describe(&self) -> String;

    /// Replace the current process. Returns only on failure.
    fn exec(&mut self) -> io::Error;
}

/// The validated candidate. Every other candidate is closed by the time
/// this is handed out.
#[derive(Debug)]
pub struct Winner {
    pub spec: HostSpec,
    pub address: SocketAddrV4,
    pub stream: TcpStream,
    /// Preamble bytes consumed during validation; first bytes of the relay.
    pub banner: Vec<u8>,
}

/// How a race ended.
#[derive(Debug)]
pub enum RaceOutcome {
    Winner(Winner),
    /// Every candidate was rejected (and the fallback, if any, failed).
    Exhausted,
}

/// Result of a single readiness wait.
#[derive(Debug)]
pub enum Step {
    /// Nothing in flight, or the wait timed out.
    Idle,
    /// Some candidates were settled; recompute the budget and wait again.
    Progress,
    Winner(Winner),
}

/// State of one race over an ordered candidate list.
pub struct Racer<R> {
    resolver: R,
    config: RaceConfig,
    /// Indices into `history` not yet attempted, in list order.
    pending: VecDeque<usize>,
    /// Candidates with a connect in flight.
    attempts: Vec<Candidate>,
    pacing: PacingState,
    history: Vec<AttemptRecord>,
}

impl<R: Resolver> Racer<R> {
    pub fn new(hosts: impl IntoIterator<Item = HostSpec>, resolver: R, config: RaceConfig) -> Self {
        let history: Vec<AttemptRecord> = hosts
            .into_iter()
            .map(|spec| AttemptRecord {
                spec,
                address: None,
                state: CandidateState::Pending,
            })
            .collect();

        Self {
            resolver,
            config,
            pending: (0..history.len()).collect(),
            attempts: Vec::new(),
            pacing: PacingState::default(),
            history,
        }
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    /// Number of candidates with a connect in flight.
    pub fn in_flight(&self) -> usize {
        self.attempts.len()
    }

    /// Number of hosts not attempted yet.
    pub fn remaining_hosts(&self) -> usize {
        self.pending.len()
    }

    /// One record per supplied host, in list order.
    pub fn history(&self) -> &[AttemptRecord] {
        &self.history
    }

    /// Resolve and connect the next host in the list.
    ///
    /// A host that cannot be resolved or whose socket cannot be created is
    /// rejected on the spot. Returns `false` once the list is used up.
    pub fn offer_next(&mut self) -> bool {
        let Some(id) = self.pending.pop_front() else {
            return false;
        };

        let spec = self.history[id].spec.clone();
        debug!(candidate = %spec, remaining = self.pending.len(), "trying candidate");

        let Some(address) = self.resolver.resolve(&spec) else {
            warn!(candidate = %spec, "no such host");
            self.history[id].state = CandidateState::Rejected;
            return true;
        };
        self.history[id].address = Some(address);

        match connector::connect(address) {
            Ok(stream) => {
                self.pacing.record(id, Instant::now());
                self.history[id].state = CandidateState::InFlight;
                self.attempts.push(Candidate {
                    id,
                    spec,
                    address,
                    stream,
                });
            }
            Err(e) => {
                warn!(candidate = %spec, address = %address, error = %e, "cannot open socket");
                self.history[id].state = CandidateState::Rejected;
            }
        }

        true
    }

    /// Budget for the wait before the next candidate is offered.
    pub fn pacing_budget(&self) -> WaitBudget {
        self.pacing.budget(
            |id| self.attempts.iter().any(|c| c.id == id),
            self.config.pacing_interval,
        )
    }

    /// Wait once for in-flight candidates and validate every ready one.
    ///
    /// Ready candidates are validated in list order; the first to pass wins
    /// and everything else, in flight or not yet attempted, is dropped.
    pub fn poll_once(&mut self, budget: WaitBudget) -> Result<Step, RaceError> {
        if self.attempts.is_empty() {
            return Ok(Step::Idle);
        }

        let mut events: Vec<Event> = Vec::with_capacity(self.attempts.len());
        let wait = {
            let registrations: Vec<Registration<'_>> = self
                .attempts
                .iter()
                .enumerate()
                .map(|(token, c)| Registration::new(c.stream.as_fd(), token, Interest::READABLE))
                .collect();
            poller::wait(&registrations, budget, &mut events)?
        };

        if wait == Wait::TimedOut {
            return Ok(Step::Idle);
        }

        let mut ready = vec![false; self.attempts.len()];
        for event in events.iter().filter(|e| e.readable) {
            ready[event.token] = true;
        }

        let (ready, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.attempts)
            .into_iter()
            .zip(ready)
            .partition(|(_, is_ready)| *is_ready);
        self.attempts = waiting.into_iter().map(|(c, _)| c).collect();

        let mut ready = ready.into_iter().map(|(c, _)| c);
        while let Some(mut candidate) = ready.next() {
            match banner::validate(&mut candidate.stream, &self.config.preamble) {
                Verdict::Validated(banner) => {
                    self.history[candidate.id].state = CandidateState::Validated;

                    let abandoned: Vec<Candidate> = ready.chain(self.attempts.drain(..)).collect();
                    for other in &abandoned {
                        self.history[other.id].state = CandidateState::Rejected;
                    }
                    debug!(
                        closed = abandoned.len(),
                        never_attempted = self.pending.len(),
                        "dropping remaining candidates"
                    );
                    drop(abandoned);
                    self.pending.clear();

                    return Ok(Step::Winner(Winner {
                        spec: candidate.spec,
                        address: candidate.address,
                        stream: candidate.stream,
                        banner,
                    }));
                }
                Verdict::Rejected(reason) => {
                    debug!(
                        candidate = %candidate.spec,
                        address = %candidate.address,
                        %reason,
                        "candidate rejected"
                    );
                    self.history[candidate.id].state = CandidateState::Rejected;
                }
            }
        }

        Ok(Step::Progress)
    }

    /// Run the race to its end.
    ///
    /// With a fallback, the fallback is executed once the list is used up and
    /// the grace window, measured from the latest attempt, has passed in full. If it returns, the racer keeps waiting on
    /// whatever is still in flight.
    pub fn run(&mut self, fallback: Option<&mut dyn Fallback>) -> Result<RaceOutcome, RaceError> {
        while !self.pending.is_empty() {
            if let Some(winner) = self.settle(Self::pacing_budget)? {
                return Ok(RaceOutcome::Winner(winner));
            }
            self.offer_next();
        }

        if let Some(fallback) = fallback {
            let start = self.pacing.last_attempt().unwrap_or_else(Instant::now);
            let grace = WaitBudget::within(start, self.config.fallback_grace);
            debug!(in_flight = self.in_flight(), "list exhausted, waiting out grace window");

            if let Some(winner) = self.settle(|_| grace)? {
                return Ok(RaceOutcome::Winner(winner));
            }
            if self.attempts.is_empty() {
                sit_out(grace)?;
            }

            let command = fallback.describe();
            info!(%command, "running fallback command");
            let error = fallback.exec();
            warn!(%command, %error, "fallback command failed");
        }

        if let Some(winner) = self.settle(|_| WaitBudget::Unbounded)? {
            return Ok(RaceOutcome::Winner(winner));
        }

        Ok(RaceOutcome::Exhausted)
    }

    /// Poll until a winner appears, the wait times out, or nothing is left
    /// in flight. The budget is recomputed before every wait.
    fn settle(
        &mut self,
        compute: impl Fn(&Self) -> WaitBudget,
    ) -> Result<Option<Winner>, RaceError> {
        loop {
            let budget = compute(&*self);
            match self.poll_once(budget)? {
                Step::Idle => return Ok(None),
                Step::Progress => {}
                Step::Winner(winner) => return Ok(Some(winner)),
            }
        }
    }
}

/// Block for the rest of `budget` with nothing to watch.
fn sit_out(budget: WaitBudget) -> Result<(), RaceError> {
    let mut events = Vec::new();
    while poller::wait(&[], budget, &mut events)? == Wait::Ready {}
    Ok(())
}
