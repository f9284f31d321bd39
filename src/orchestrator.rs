use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_isaac::Isaac64Rng;

use super::arrival_process::{estimate_arrival_processes, ArrivalSampler, JourneyDemand};
use super::config::ExperimentConfig;
use super::convex::BarrierNewton;
use super::engine::{CounterSet, Engine};
use super::kpi::{AggregatedReport, Report, TripRecord};
use super::mismatch::{build_mismatch_sampler, MismatchSampler, MismatchTable, RealizationRecord};
use super::network::Network;
use super::passengers::{Journey, Passenger};
use super::routing::{LexicographicRouteGeneration, RouteGeneration, RouteSelection};
use super::timetable::{Timetable, TripId};
use super::SimError;


/// Milestones of an experiment, reported to a `ProgressObserver`.
#[derive(PartialEq, Debug, Clone)]
pub enum ProgressEvent {
    NetworkBuilt { nodes: usize, edges: usize },
    ProcessesFitted { journeys: usize },
    ReplicationFinished { replication: usize, served: usize, dropped: usize },
    BatchFinished { replications: usize },
    BatchFailed { error: SimError },
}

pub trait ProgressObserver: Send + Sync {
    fn notify(&self, event: &ProgressEvent);
}

/// Forwards progress to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn notify(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::NetworkBuilt { nodes, edges } =>
                log::info!("network has {} nodes and {} edges", nodes, edges),
            ProgressEvent::ProcessesFitted { journeys } =>
                log::info!("{} journeys have an arrival process", journeys),
            ProgressEvent::ReplicationFinished { replication, served, dropped } =>
                log::debug!("replication {} done: {} served, {} dropped", replication, served,
                            dropped),
            ProgressEvent::BatchFinished { replications } =>
                log::info!("all {} replications finished", replications),
            ProgressEvent::BatchFailed { error } => log::error!("batch failed: {}", error),
        }
    }
}

/// Build the event-activity network of the timetable for the configured day.
pub fn build_network(timetable: &Timetable, config: &ExperimentConfig)
                     -> Result<Network, SimError> {
    Network::build_with(timetable, config.day_of_week, &config.network_options())
}

// Read-only state shared by every replication.
struct SharedState {
    config: ExperimentConfig,
    timetable: Timetable,
    successors: HashMap<TripId, TripId>,
    network: Network,
    demands: BTreeMap<Journey, JourneyDemand>,
    mismatch: Arc<MismatchTable>,
    generation: Box<dyn RouteGeneration>,
    selection: Box<dyn RouteSelection>,
}

impl SharedState {
    fn run_replication(&self, seed: u64) -> Result<Report, SimError> {
        let day = self.config.day_of_week;
        let mut rng = Isaac64Rng::seed_from_u64(seed);

        // this replication's rolling stock
        let mismatch_seed = rng.gen::<u64>();
        let realized_timetable = if self.config.rolling_stock_mismatch {
            let mut sampler = MismatchSampler::new(self.mismatch.clone(), mismatch_seed);
            let realized = sampler.realize_services(&self.timetable.planned_services(day))?;
            self.timetable.with_realized_compositions(&realized)
        } else {
            self.timetable.clone()
        };

        let mut report = Report::default();
        let mut counters = CounterSet::new(realized_timetable.num_trips(),
                                           self.successors.clone());
        let mut engine = Engine::new();
        let group_size = self.config.group_size;

        for (journey, demand) in &self.demands {
            let mut arrivals = ArrivalSampler::new(demand.process.clone(), rng.gen::<u64>());
            for check_in_s in arrivals.generate_arrivals_from_process() {
                let check_out_s = check_in_s + demand.median_travel_time_s;
                let candidates = match self.generation.generate(
                    &self.network, &journey.origin, &journey.destination, check_in_s) {
                    Ok(candidates) => candidates,
                    Err(err) if err.is_recoverable() => {
                        report.dropped_passengers += group_size as usize;
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                let path = match self.selection.select(&candidates, check_in_s, check_out_s) {
                    Some(path) => path,
                    None => {
                        report.dropped_passengers += group_size as usize;
                        continue;
                    }
                };

                let used = report.journey_trips.entry(journey.clone()).or_default();
                for ride in path.rides() {
                    engine.schedule_ride(&ride, group_size, &counters);
                    used.extend(ride.trips.iter().cloned());
                }
                report.served_passengers += group_size as usize;
            }
        }
        engine.run(&mut counters)?;

        for trip in realized_timetable.trips_on(day) {
            let counter = counters.get(trip.id).cloned().unwrap_or_default();
            report.trips.insert(trip.id, TripRecord {
                train_number: String::from(trip.train_number()),
                counter,
                seat_capacity: trip.seat_capacity(),
                norm_capacity: trip.norm_capacity(),
            });
        }
        Ok(report)
    }
}

/// A fitted experiment, ready to run replications.
pub struct Experiment {
    shared: Arc<SharedState>,
    observer: Box<dyn ProgressObserver>,
}

impl Experiment {
    /// Build the network, fit the arrival processes and the mismatch table.
    pub fn new(config: ExperimentConfig, timetable: Timetable, passengers: &[Passenger],
               realizations: &[RealizationRecord]) -> Result<Experiment, SimError> {
        Experiment::with_observer(config, timetable, passengers, realizations,
                                  Box::new(LogObserver))
    }

    pub fn with_observer(config: ExperimentConfig, timetable: Timetable,
                         passengers: &[Passenger], realizations: &[RealizationRecord],
                         observer: Box<dyn ProgressObserver>) -> Result<Experiment, SimError> {
        let failed = |err: SimError| {
            observer.notify(&ProgressEvent::BatchFailed { error: err.clone() });
            err
        };
        config.validate().map_err(&failed)?;
        log::info!("building network...");
        let network = build_network(&timetable, &config).map_err(&failed)?;
        observer.notify(&ProgressEvent::NetworkBuilt {
            nodes: network.graph().node_count(),
            edges: network.graph().edge_count(),
        });

        let demands = estimate_arrival_processes(passengers, &config.estimation_settings(),
                                                 &BarrierNewton::default())
            .map_err(&failed)?;
        observer.notify(&ProgressEvent::ProcessesFitted { journeys: demands.len() });

        let mismatch = build_mismatch_sampler(&timetable, realizations, config.seed);
        let successors = timetable.service_successors(config.day_of_week);
        let selection = config.route_selection();
        let shared = SharedState {
            config,
            timetable,
            successors,
            network,
            demands,
            mismatch: mismatch.table().clone(),
            generation: Box::new(LexicographicRouteGeneration),
            selection,
        };
        Ok(Experiment {
            shared: Arc::new(shared),
            observer,
        })
    }

    /// Swap the route selection rule. Only possible before any replication shares
    /// the state.
    pub fn set_route_selection(&mut self, selection: Box<dyn RouteSelection>)
                               -> Result<(), SimError> {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => {
                shared.selection = selection;
                Ok(())
            }
            None => Err(SimError::InvalidConfig {
                key: String::from("route_selection"),
                reason: String::from("experiment is already running"),
            }),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.shared.config
    }

    pub fn network(&self) -> &Network {
        &self.shared.network
    }

    pub fn demands(&self) -> &BTreeMap<Journey, JourneyDemand> {
        &self.shared.demands
    }

    /// One replication on the calling thread.
    pub fn run_replication(&self, seed: u64) -> Result<Report, SimError> {
        self.shared.run_replication(seed)
    }

    /// Run the configured number of replications from the configured seed.
    pub fn run(&self) -> Result<AggregatedReport, SimError> {
        self.run_replications(self.shared.config.iterations, self.shared.config.seed)
    }

    /// Run `num_replications` independent replications on a worker pool.
    ///
    /// Each replication gets its own seed drawn from a generator seeded with `seed`, so
    /// the result depends only on `seed`, never on scheduling. Any failing replication
    /// fails the batch.
    pub fn run_replications(&self, num_replications: usize, seed: u64)
                            -> Result<AggregatedReport, SimError> {
        let result = self.collect_replications(num_replications, seed);
        match &result {
            Ok(reports) => self.observer.notify(
                &ProgressEvent::BatchFinished { replications: reports.len() }),
            Err(err) => self.observer.notify(&ProgressEvent::BatchFailed { error: err.clone() }),
        }
        let reports = result?;
        Ok(AggregatedReport::new(reports, self.shared.config.correction_factor))
    }

    fn collect_replications(&self, num_replications: usize, seed: u64)
                            -> Result<Vec<Report>, SimError> {
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..num_replications).map(|_| rng.gen::<u64>()).collect();

        let num_threads = self.shared.config.num_worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|err| SimError::InvalidConfig {
                key: String::from("worker_threads"),
                reason: err.to_string(),
            })?;
        log::info!("running {} replications on {} threads", num_replications, num_threads);

        let (sender, receiver) = mpsc::channel();
        for (ii, child_seed) in seeds.into_iter().enumerate() {
            let shared = self.shared.clone();
            let sender = sender.clone();
            pool.spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(
                    || shared.run_replication(child_seed)))
                    .unwrap_or(Err(SimError::ReplicationPanicked { replication: ii }));
                // the receiver is gone if the batch already failed
                let _ = sender.send((ii, result));
            });
        }
        drop(sender);

        let timeout = Duration::from_secs(self.shared.config.timeout_s);
        let deadline = Instant::now() + timeout;
        let mut reports: Vec<(usize, Report)> = Vec::with_capacity(num_replications);
        while reports.len() < num_replications {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (ii, result) = match receiver.recv_timeout(remaining) {
                Ok(received) => received,
                Err(_) => return Err(SimError::ReplicationTimeout {
                    timeout_s: self.shared.config.timeout_s,
                    finished: reports.len(),
                    expected: num_replications,
                }),
            };
            let report = result?;
            self.observer.notify(&ProgressEvent::ReplicationFinished {
                replication: ii,
                served: report.served_passengers,
                dropped: report.dropped_passengers,
            });
            reports.push((ii, report));
        }

        reports.sort_by_key(|(ii, _)| *ii);
        Ok(reports.into_iter().map(|(_, report)| report).collect())
    }
}
