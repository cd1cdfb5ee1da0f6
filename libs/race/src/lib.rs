//! Connection racing for multi-path endpoints.
//!
//! Given an ordered list of candidate endpoints for the same logical
//! destination, this library:
//! - Issues staggered non-blocking connects (one new candidate per pacing interval)
//! - Validates each answering candidate against a fixed protocol preamble
//! - Keeps the first validated candidate and closes every other one
//! - Relays bytes between the winner and a local input/output pair
//!
//! ## Architecture
//!
//! ```text
//! HostSpec -> Resolver -> connector -> Racer --(poller + banner)--> Winner -> Relay
//!                                        |
//!                                   Fallback (when exhausted)
//! ```
//!
//! Everything runs on the calling thread. The only blocking call is the
//! readiness wait in [`poller::wait`]; reads, writes and connects are
//! non-blocking and run to completion between waits.

pub mod banner;
pub mod buffer;
pub mod candidate;
pub mod connector;
pub mod error;
pub mod host;
pub mod poller;
pub mod racer;
pub mod relay;

pub use banner::{Preamble, Rejection, Verdict};
pub use buffer::RelayBuffer;
pub use candidate::{AttemptRecord, CandidateState};
pub use error::{ConnectError, HostSpecError, MultiplexError, RaceError, RelayError};
pub use host::{HostSpec, Resolver, SystemResolver, DEFAULT_PORT};
pub use poller::{WaitBudget, MIN_WAIT};
pub use racer::{Fallback, RaceConfig, RaceOutcome, Racer, Step, Winner};
pub use relay::{DirectionState, Relay, RelaySink, RelaySource, RelayStats};
