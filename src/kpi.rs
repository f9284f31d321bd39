use std::collections::{BTreeMap, BTreeSet};

use super::engine::Counter;
use super::passengers::Journey;
use super::timetable::TripId;


/// What one replication leaves behind for a trip.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct TripRecord {
    pub train_number: String,
    pub counter: Counter,
    /// Seats of the composition the trip actually ran with.
    pub seat_capacity: u32,
    pub norm_capacity: u32,
}

/// Immutable result of a single replication.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Report {
    pub trips: BTreeMap<TripId, TripRecord>,
    /// Trips used by the passengers of each journey.
    pub journey_trips: BTreeMap<Journey, BTreeSet<TripId>>,
    pub served_passengers: usize,
    pub dropped_passengers: usize,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum KpiKind {
    /// Share of passengers within the norm capacity.
    Old,
    /// Share of boarding passengers who found a seat.
    New,
}

/// Which trips a KPI is computed over.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum TripSelection {
    All,
    Trips(BTreeSet<TripId>),
    Train(String),
}

impl TripSelection {
    fn contains(&self, trip: TripId, record: &TripRecord) -> bool {
        match self {
            TripSelection::All => true,
            TripSelection::Trips(trips) => trips.contains(&trip),
            TripSelection::Train(number) => record.train_number == *number,
        }
    }
}

/// Mean and sample standard deviation of a KPI across replications.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct KpiEstimate {
    pub mean: f64,
    pub std_dev: f64,
    pub samples: usize,
}

impl KpiEstimate {
    pub fn from_samples(samples: &[f64]) -> KpiEstimate {
        let count = samples.len();
        if count == 0 {
            return KpiEstimate { mean: f64::NAN, std_dev: 0., samples: 0 };
        }
        let mean = samples.iter().sum::<f64>() / count as f64;
        let std_dev = if count > 1 {
            let sq_sum: f64 = samples.iter().map(|ss| (ss - mean).powi(2)).sum();
            (sq_sum / (count - 1) as f64).sqrt()
        } else {
            0.
        };
        KpiEstimate { mean, std_dev, samples: count }
    }
}

/// KPI_old of one replication: sum of min(norm, cN) over sum of cN.
pub fn kpi_old<'a, I>(records: I, correction: f64) -> f64
    where I: IntoIterator<Item = &'a TripRecord>
{
    let mut served = 0.;
    let mut total = 0.;
    for record in records {
        let on_board = correction * record.counter.on_board as f64;
        served += on_board.min(record.norm_capacity as f64);
        total += on_board;
    }
    // nobody aboard means nobody crowded
    if total <= 0. {
        return 1.;
    }
    served / total
}

/// KPI_new of one replication: seated boarders over all boarders. Passengers already
/// aboard from earlier legs take their seats first.
pub fn kpi_new<'a, I>(records: I, correction: f64) -> f64
    where I: IntoIterator<Item = &'a TripRecord>
{
    let mut seated = 0.;
    let mut total = 0.;
    for record in records {
        let boarded = correction * record.counter.boarded as f64;
        let on_board = correction * record.counter.on_board as f64;
        let free_seats = (record.seat_capacity as f64 - (on_board - boarded)).max(0.);
        seated += free_seats.min(boarded);
        total += boarded;
    }
    if total <= 0. {
        return 1.;
    }
    seated / total
}

impl Report {
    pub fn kpi(&self, kind: KpiKind, selection: &TripSelection, correction: f64) -> f64 {
        let selected = self.trips.iter()
            .filter(|(trip, record)| selection.contains(**trip, record))
            .map(|(_, record)| record);
        match kind {
            KpiKind::Old => kpi_old(selected, correction),
            KpiKind::New => kpi_new(selected, correction),
        }
    }
}

/// All replication reports of a batch, with the KPI queries over them.
#[derive(PartialEq, Debug, Clone)]
pub struct AggregatedReport {
    reports: Vec<Report>,
    correction_factor: f64,
}

impl AggregatedReport {
    pub fn new(reports: Vec<Report>, correction_factor: f64) -> AggregatedReport {
        AggregatedReport{reports, correction_factor}
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn num_replications(&self) -> usize {
        self.reports.len()
    }

    pub fn correction_factor(&self) -> f64 {
        self.correction_factor
    }

    pub fn kpi(&self, kind: KpiKind, selection: &TripSelection) -> KpiEstimate {
        let samples: Vec<f64> = self.reports.iter()
            .map(|rr| rr.kpi(kind, selection, self.correction_factor))
            .collect();
        KpiEstimate::from_samples(&samples)
    }

    pub fn kpi_old(&self, selection: &TripSelection) -> KpiEstimate {
        self.kpi(KpiKind::Old, selection)
    }

    pub fn kpi_new(&self, selection: &TripSelection) -> KpiEstimate {
        self.kpi(KpiKind::New, selection)
    }

    /// Mean number of synthetic passengers dropped per replication for lack of a route.
    pub fn dropped_passengers(&self) -> f64 {
        if self.reports.is_empty() {
            return 0.;
        }
        let total: usize = self.reports.iter().map(|rr| rr.dropped_passengers).sum();
        total as f64 / self.reports.len() as f64
    }

    pub fn served_passengers(&self) -> f64 {
        if self.reports.is_empty() {
            return 0.;
        }
        let total: usize = self.reports.iter().map(|rr| rr.served_passengers).sum();
        total as f64 / self.reports.len() as f64
    }

    /// The `kk` train numbers with the lowest mean KPI, ties by train number.
    pub fn worst_trains(&self, kk: usize, kind: KpiKind) -> Vec<(String, KpiEstimate)> {
        let numbers: BTreeSet<&str> = self.reports.iter()
            .flat_map(|rr| rr.trips.values().map(|tr| tr.train_number.as_str()))
            .collect();
        let scored = numbers.into_iter()
            .map(|number| {
                let estimate = self.kpi(kind, &TripSelection::Train(number.to_string()));
                (number.to_string(), estimate)
            })
            .collect();
        worst_k(scored, kk)
    }

    /// The `kk` journeys whose passengers fared worst, judged over the trips they used.
    pub fn worst_journeys(&self, kk: usize, kind: KpiKind) -> Vec<(Journey, KpiEstimate)> {
        let journeys: BTreeSet<&Journey> = self.reports.iter()
            .flat_map(|rr| rr.journey_trips.keys())
            .collect();
        let scored: Vec<(Journey, KpiEstimate)> = journeys.into_iter()
            .map(|journey| {
                let samples: Vec<f64> = self.reports.iter().map(|rr| {
                    match rr.journey_trips.get(journey) {
                        Some(trips) => rr.kpi(kind, &TripSelection::Trips(trips.clone()),
                                              self.correction_factor),
                        None => 1.,
                    }
                }).collect();
                (journey.clone(), KpiEstimate::from_samples(&samples))
            })
            .collect();
        let mut named: Vec<(String, (Journey, KpiEstimate))> = scored.into_iter()
            .map(|(journey, est)| (journey.to_string(), (journey, est)))
            .collect();
        sort_by_mean(&mut named, |(_, (_, est))| est.mean);
        named.into_iter().take(kk).map(|(_, pair)| pair).collect()
    }
}

fn worst_k(mut scored: Vec<(String, KpiEstimate)>, kk: usize) -> Vec<(String, KpiEstimate)> {
    sort_by_mean(&mut scored, |(_, est)| est.mean);
    scored.truncate(kk);
    scored
}

// ascending mean, ties broken by the identifier string in position 0
fn sort_by_mean<T, F>(items: &mut Vec<(String, T)>, mean: F)
    where F: Fn(&(String, T)) -> f64
{
    items.sort_by(|aa, bb| {
        mean(aa).partial_cmp(&mean(bb)).unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| aa.0.cmp(&bb.0))
    });
}
