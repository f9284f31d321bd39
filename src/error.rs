use std::path::PathBuf;

use crate::passengers::Journey;
use crate::timetable::{StationId, TripId};

/// Errors raised anywhere in the simulation pipeline.
///
/// Only `NoRouteFound` is recoverable: the orchestrator drops the affected
/// synthetic passenger. Every other variant fails the whole batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("no route from {origin} to {destination} at or after {earliest_departure_s}s")]
    NoRouteFound {
        origin: StationId,
        destination: StationId,
        earliest_departure_s: u32,
    },

    #[error("arrival process estimation failed for journey {journey}: {reason}")]
    EstimationFailed { journey: Journey, reason: String },

    #[error("no realized composition observed for planned composition {composition}")]
    NoEstimateAvailable { composition: String },

    #[error("counter invariant violated on trip {trip}: {detail}")]
    CounterInvariantViolation { trip: TripId, detail: String },

    #[error("invalid config key {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("could not read {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("replications did not finish within {timeout_s}s ({finished} of {expected} done)")]
    ReplicationTimeout {
        timeout_s: u64,
        finished: usize,
        expected: usize,
    },

    #[error("replication {replication} panicked")]
    ReplicationPanicked { replication: usize },
}

impl SimError {
    /// Whether the orchestrator may absorb this error for a single passenger.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SimError::NoRouteFound { .. })
    }
}
