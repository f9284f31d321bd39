use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_isaac::Isaac64Rng;

use super::timetable::{Composition, DayOfWeek, Timetable};
use super::SimError;


/// One historical observation of the rolling stock a train ran with.
#[derive(PartialEq, Debug, Clone)]
pub struct RealizationRecord {
    pub train_number: String,
    pub day: DayOfWeek,
    pub planned: Composition,
    pub realized: Composition,
}

/// A realized unit set and how often it was seen for a planned unit set.
#[derive(PartialEq, Debug, Clone)]
pub struct RealizedOption {
    pub key: String,
    pub composition: Composition,
    pub probability: f64,
}

/// Empirical distribution of realized compositions per planned unit set. Read-only once
/// built, so replications share it.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct MismatchTable {
    // options sorted by descending probability, then by key
    options: BTreeMap<String, Vec<RealizedOption>>,
}

impl MismatchTable {
    pub fn from_records<'a, I>(records: I) -> MismatchTable
        where I: IntoIterator<Item = &'a RealizationRecord>
    {
        // planned key -> realized key -> (first composition seen, count)
        let mut counts: BTreeMap<String, BTreeMap<String, (Composition, usize)>> = BTreeMap::new();
        for record in records {
            let entry = counts.entry(record.planned.canonical_key()).or_insert_with(BTreeMap::new)
                              .entry(record.realized.canonical_key())
                              .or_insert_with(|| (record.realized.clone(), 0));
            entry.1 += 1;
        }

        let mut options = BTreeMap::new();
        for (planned, realized) in counts {
            let total: usize = realized.values().map(|(_, count)| count).sum();
            let sorted = realized.into_iter()
                .map(|(key, (composition, count))| RealizedOption {
                    key,
                    composition,
                    probability: count as f64 / total as f64,
                })
                .sorted_by(|aa, bb| {
                    bb.probability.partial_cmp(&aa.probability)
                      .unwrap_or(std::cmp::Ordering::Equal)
                      .then_with(|| aa.key.cmp(&bb.key))
                })
                .collect();
            options.insert(planned, sorted);
        }
        MismatchTable{options}
    }

    /// The realized alternatives for a planned composition, most likely first.
    pub fn probabilities(&self, planned: &Composition) -> Option<&[RealizedOption]> {
        self.options.get(&planned.canonical_key()).map(|opts| opts.as_slice())
    }

    pub fn knows(&self, planned: &Composition) -> bool {
        self.options.contains_key(&planned.canonical_key())
    }

    pub fn num_planned(&self) -> usize {
        self.options.len()
    }
}

/// Samples realized compositions from a shared table with its own generator.
pub struct MismatchSampler {
    table: Arc<MismatchTable>,
    rng: Isaac64Rng,
}

impl MismatchSampler {
    pub fn new(table: Arc<MismatchTable>, seed: u64) -> MismatchSampler {
        MismatchSampler {
            table,
            rng: Isaac64Rng::seed_from_u64(seed),
        }
    }

    pub fn table(&self) -> &Arc<MismatchTable> {
        &self.table
    }

    /// Draw a realized composition for `planned`. Unknown planned compositions are an
    /// error rather than a guess.
    pub fn realized_composition(&mut self, planned: &Composition) -> Result<Composition, SimError> {
        let options = match self.table.probabilities(planned) {
            Some(options) if !options.is_empty() => options,
            _ => return Err(SimError::NoEstimateAvailable {
                composition: planned.canonical_key(),
            }),
        };
        let rr: f64 = self.rng.gen();
        let mut cumulative = 0.;
        for option in options {
            cumulative += option.probability;
            if cumulative > rr {
                return Ok(option.composition.clone());
            }
        }
        // rounding left the total just below rr
        Ok(options[options.len() - 1].composition.clone())
    }

    /// Realized composition for every train number, in train number order.
    pub fn realize_services(&mut self, planned: &BTreeMap<String, Composition>)
                            -> Result<BTreeMap<String, Composition>, SimError> {
        let mut realized = BTreeMap::new();
        for (train_number, composition) in planned {
            realized.insert(train_number.clone(), self.realized_composition(composition)?);
        }
        Ok(realized)
    }
}

/// Build the sampler from the records of trains that run in `timetable`.
pub fn build_mismatch_sampler(timetable: &Timetable, records: &[RealizationRecord], seed: u64)
                              -> MismatchSampler {
    let running: HashSet<(&str, DayOfWeek)> = timetable.trips().iter()
        .map(|tt| (tt.train_number(), tt.day))
        .collect();
    let relevant = records.iter()
        .filter(|rec| running.contains(&(rec.train_number.as_str(), rec.day)));
    let table = MismatchTable::from_records(relevant);
    log::info!("mismatch table covers {} planned compositions", table.num_planned());

    for trip in timetable.trips() {
        if !table.knows(&trip.train_service.composition) {
            log::warn!("planned composition {} of train {} was never observed",
                       trip.train_service.composition, trip.train_number());
        }
    }
    MismatchSampler::new(Arc::new(table), seed)
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::test_utils::{build_line_timetable, unit};

    fn comp(types: &[&str]) -> Composition {
        Composition::new(types.iter().map(|tt| unit(tt, 50)).collect())
    }

    fn record(train: &str, planned: &[&str], realized: &[&str]) -> RealizationRecord {
        RealizationRecord {
            train_number: String::from(train),
            day: DayOfWeek::Tuesday,
            planned: comp(planned),
            realized: comp(realized),
        }
    }

    fn sample_records() -> Vec<RealizationRecord> {
        vec![
            record("100", &["VIRM4", "VIRM6"], &["VIRM4", "VIRM6"]),
            record("100", &["VIRM6", "VIRM4"], &["VIRM4"]),
            record("100", &["VIRM4", "VIRM6"], &["VIRM6", "VIRM4"]),
            record("200", &["SLT4"], &["SLT6"]),
            record("200", &["SLT4"], &["SLT4"]),
            record("300", &["VIRM4", "VIRM6"], &["VIRM6"]),
        ]
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let table = MismatchTable::from_records(&sample_records());
        assert_eq!(table.num_planned(), 2);
        for planned in [comp(&["VIRM6", "VIRM4"]), comp(&["SLT4"])] {
            let options = table.probabilities(&planned).unwrap();
            let total: f64 = options.iter().map(|oo| oo.probability).sum();
            assert_abs_diff_eq!(total, 1., epsilon = 1e-9);
        }
    }

    #[test]
    fn test_options_are_ordered() {
        let table = MismatchTable::from_records(&sample_records());
        let keys: Vec<&str> = table.probabilities(&comp(&["VIRM4", "VIRM6"])).unwrap().iter()
                                   .map(|oo| oo.key.as_str()).collect();
        // 2 of 4, then the two singletons by key
        assert_eq!(keys, vec!["VIRM4+VIRM6", "VIRM4", "VIRM6"]);

        let keys: Vec<&str> = table.probabilities(&comp(&["SLT4"])).unwrap().iter()
                                   .map(|oo| oo.key.as_str()).collect();
        assert_eq!(keys, vec!["SLT4", "SLT6"]);
    }

    #[test]
    fn test_unknown_composition() {
        let table = Arc::new(MismatchTable::from_records(&sample_records()));
        let mut sampler = MismatchSampler::new(table, 0);
        match sampler.realized_composition(&comp(&["ICM3"])) {
            Err(SimError::NoEstimateAvailable { composition }) => assert_eq!(composition, "ICM3"),
            other => panic!("expected no estimate, got {:?}", other),
        }
    }

    #[test]
    fn test_sampling_frequencies() {
        let table = Arc::new(MismatchTable::from_records(&sample_records()));
        let mut sampler = MismatchSampler::new(table, 17);
        let planned = comp(&["SLT4"]);
        let trials = 20000;
        let slt6 = (0..trials)
            .filter(|_| sampler.realized_composition(&planned).unwrap().canonical_key() == "SLT6")
            .count();
        let frac = slt6 as f64 / trials as f64;
        assert!((frac - 0.5).abs() < 0.02, "fraction was {}", frac);
    }

    #[test]
    fn test_sampler_is_reproducible() {
        let table = Arc::new(MismatchTable::from_records(&sample_records()));
        let mut s1 = MismatchSampler::new(table.clone(), 5);
        let mut s2 = MismatchSampler::new(table, 5);
        let planned = comp(&["VIRM4", "VIRM6"]);
        for _ in 0..50 {
            assert_eq!(s1.realized_composition(&planned).unwrap(),
                       s2.realized_composition(&planned).unwrap());
        }
    }

    #[test]
    fn test_build_filters_to_timetable() {
        // the line timetable runs trains 100 and 200 with VIRM4
        let timetable = build_line_timetable();
        let records = vec![
            record("100", &["VIRM4"], &["VIRM4", "VIRM4"]),
            record("999", &["VIRM4"], &["SLT4"]),
            RealizationRecord { day: DayOfWeek::Monday, ..record("200", &["VIRM4"], &["SLT6"]) },
        ];
        let mut sampler = build_mismatch_sampler(&timetable, &records, 1);
        let options = sampler.table().probabilities(&comp(&["VIRM4"])).unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].key, "VIRM4+VIRM4");

        let planned = timetable.planned_services(DayOfWeek::Tuesday);
        let realized = sampler.realize_services(&planned).unwrap();
        assert_eq!(realized.len(), 2);
        assert_eq!(realized["200"].seats(), 100);
    }
}
