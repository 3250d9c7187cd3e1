//! Sharing histogram observations between cooperating walkers.
//!
//! Each walker owns a full copy of the recursion kernel. Every count interval a walker
//! publishes its current `(λ, F_λ)` observation and every walker adds every observation
//! to its own copy, so all copies converge to the same counts.

pub mod local;
pub mod receiver;

pub use local::{LocalEndpoint, LocalWorld};
pub use receiver::AsyncReceiver;

use std::time::Duration;
use thiserror::Error;

/// One walker's `(λ, ∂U/∂λ)` sample, taken without the bias contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub lambda: f64,
    pub flambda: f64,
}

impl Observation {
    pub fn new(lambda: f64, flambda: f64) -> Self {
        Self { lambda, flambda }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommError {
    #[error("Walker {rank} is no longer reachable")]
    Disconnected { rank: usize },
    #[error("Walker rank {rank} is outside a world of {size} walkers")]
    InvalidRank { rank: usize, size: usize },
    #[error("Collective operation failed: {0}")]
    Collective(String),
}

/// Transport between the walkers of one OSRW simulation.
///
/// `all_gather` is collective: every walker must call it the same number of times.
/// `send` and `receive` are point-to-point and never wait for a peer.
pub trait WalkerComm: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Contributes `observation` and returns the observations of all walkers, indexed
    /// by rank.
    fn all_gather(&self, observation: Observation) -> Result<Vec<Observation>, CommError>;

    fn send(&self, to: usize, observation: Observation) -> Result<(), CommError>;

    /// Waits up to `timeout` for the next observation addressed to this walker.
    /// `Ok(None)` means nothing arrived in time.
    fn receive(&self, timeout: Duration) -> Result<Option<Observation>, CommError>;
}
