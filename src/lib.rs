// imports of other modules from this crate
mod error;
pub use error::SimError;

pub mod timetable;
pub use timetable::{ComfortNorm, Composition, DayOfWeek, GeoLocation, RollingStockUnit,
                    ScheduledTrip, Station, StationId, Timetable, TrainService, TripId, TripSpec};

mod passengers;
pub use passengers::{Journey, Passenger};

pub mod graph;
pub use graph::{Edge, EventNode, Path, PathStep, Ride};

pub mod network;
pub use network::{Network, NetworkOptions};

pub mod dijkstra;

pub mod routing;
pub use routing::{EarliestArrival, LeastTransfersLastArrival, LexicographicRouteGeneration,
                  RouteGeneration, RouteSelection};

pub mod convex;
pub use convex::{BarrierNewton, ConvexMinimizer, ConvexProblem, LinearConstraints, SolverError};

pub mod arrival_process;
pub use arrival_process::{estimate_arrival_processes, ArrivalProcess, ArrivalSampler,
                          EstimationSettings, Horizon, JourneyDemand, RateFunction};

mod mismatch;
pub use mismatch::{build_mismatch_sampler, MismatchSampler, MismatchTable, RealizationRecord,
                   RealizedOption};

pub mod engine;
pub use engine::{Counter, CounterSet, Engine, Event, EventKind};

mod kpi;
pub use kpi::{kpi_new, kpi_old, AggregatedReport, KpiEstimate, KpiKind, Report, TripRecord,
              TripSelection};

mod config;
pub use config::{get_num_seconds_from_time_str, ExperimentConfig, RouteSelectionKind};

mod orchestrator;
pub use orchestrator::{build_network, Experiment, LogObserver, ProgressEvent, ProgressObserver};

#[cfg(test)]
mod test_utils;
