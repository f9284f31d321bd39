use std::collections::HashMap;
use std::fmt::Debug;

use super::timetable::{ComfortNorm, Composition, DayOfWeek, GeoLocation, RollingStockUnit, Station,
                       Timetable, TrainService, TripSpec};


/// Checks that the contents of two hashmaps are the same.
pub fn compare_hashmaps<KK, VV>(query_map: &HashMap<KK, VV>, true_map: &HashMap<KK, VV>)
    where KK: Debug + Eq + std::hash::Hash,
    VV: Debug + PartialEq,
{
    assert_eq!(query_map.len(), true_map.len());

    for (true_key, true_val) in true_map {
        match query_map.get(true_key) {
            Some(val) => assert_eq!(val, true_val),
            None => assert!(false, "Key {:?} missing!", true_key),
        }
    }
}

pub fn unit(unit_type: &str, seats: u32) -> RollingStockUnit {
    RollingStockUnit::new(unit_type, seats, seats / 2, seats + seats / 4)
}

pub fn trip_spec(train: &str, from: &str, to: &str, dep: u32, arr: u32, composition: Composition)
                 -> TripSpec {
    TripSpec {
        train_service: TrainService::new(train, composition),
        departure_s: dep,
        arrival_s: arr,
        from: String::from(from),
        to: String::from(to),
        comfort_norm: ComfortNorm::Norm,
        day: DayOfWeek::Tuesday,
    }
}

/// A -> B -> C served by train 100 (trips 0 and 1), plus train 200 on B -> C (trip 2).
///
/// Train 100 arrives at B at 8:20 and leaves again at 8:22; train 200 leaves B at 8:30.
pub fn build_line_timetable() -> Timetable {
    let mut timetable = Timetable::new(vec![
        Station::new("A", Some(GeoLocation::new(52.09, 5.11))),
        Station::new("B", None),
        Station::new("C", None),
    ]);
    let comp = Composition::new(vec![unit("VIRM4", 100)]);
    timetable.add_trip(trip_spec("100", "A", "B", 28800, 30000, comp.clone())).unwrap();
    timetable.add_trip(trip_spec("100", "B", "C", 30120, 31200, comp.clone())).unwrap();
    timetable.add_trip(trip_spec("200", "b", "c", 30600, 31800, comp)).unwrap();
    timetable
}

/// Enable log output from tests with RUST_LOG.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
