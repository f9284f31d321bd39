use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use super::SimError;


/// Identity of a station: its name, trimmed and lowercased.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone)]
pub struct StationId(String);

impl StationId {
    pub fn new(name: &str) -> StationId {
        StationId(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> GeoLocation {
        GeoLocation{latitude, longitude}
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub location: Option<GeoLocation>,
}

impl Station {
    pub fn new(name: &str, location: Option<GeoLocation>) -> Station {
        Station {
            id: StationId::new(name),
            name: String::from(name.trim()),
            location,
        }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl FromStr for DayOfWeek {
    type Err = SimError;

    fn from_str(ss: &str) -> Result<DayOfWeek, SimError> {
        let day = match ss.trim().to_lowercase().as_str() {
            "mon" | "monday" => DayOfWeek::Monday,
            "tue" | "tuesday" => DayOfWeek::Tuesday,
            "wed" | "wednesday" => DayOfWeek::Wednesday,
            "thu" | "thursday" => DayOfWeek::Thursday,
            "fri" | "friday" => DayOfWeek::Friday,
            "sat" | "saturday" => DayOfWeek::Saturday,
            "sun" | "sunday" => DayOfWeek::Sunday,
            _ => return Err(SimError::InvalidConfig {
                key: String::from("day_of_week"),
                reason: format!("unknown day {:?}", ss),
            }),
        };
        Ok(day)
    }
}

/// One vehicle of a train composition, with its capacity figures.
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct RollingStockUnit {
    pub unit_type: String,
    pub seats: u32,
    pub standing: u32,
    pub norm: u32,
}

impl RollingStockUnit {
    pub fn new(unit_type: &str, seats: u32, standing: u32, norm: u32) -> RollingStockUnit {
        RollingStockUnit {
            unit_type: String::from(unit_type),
            seats,
            standing,
            norm,
        }
    }
}

/// An ordered multiset of rolling-stock units.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Default)]
pub struct Composition {
    units: Vec<RollingStockUnit>,
}

impl Composition {
    pub fn new(units: Vec<RollingStockUnit>) -> Composition {
        Composition{units}
    }

    pub fn units(&self) -> &[RollingStockUnit] {
        &self.units
    }

    pub fn seats(&self) -> u32 {
        self.units.iter().map(|uu| uu.seats).sum()
    }

    pub fn standing(&self) -> u32 {
        self.units.iter().map(|uu| uu.standing).sum()
    }

    pub fn norm(&self) -> u32 {
        self.units.iter().map(|uu| uu.norm).sum()
    }

    pub fn total_capacity(&self) -> u32 {
        self.seats() + self.standing()
    }

    /// Identity of the unit set, independent of the order of the units.
    pub fn canonical_key(&self) -> String {
        self.units.iter().map(|uu| uu.unit_type.as_str()).sorted().join("+")
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.units.is_empty() {
            return write!(f, "<empty>");
        }
        write!(f, "{}", self.units.iter().map(|uu| uu.unit_type.as_str()).join("+"))
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct TrainService {
    pub train_number: String,
    pub composition: Composition,
}

impl TrainService {
    pub fn new(train_number: &str, composition: Composition) -> TrainService {
        TrainService {
            train_number: String::from(train_number),
            composition,
        }
    }
}

/// Which capacity figure of a composition a trip is judged against.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum ComfortNorm {
    SeatsOnly,
    Norm,
    Crush,
}

impl ComfortNorm {
    pub fn capacity(&self, composition: &Composition) -> u32 {
        match self {
            ComfortNorm::SeatsOnly => composition.seats(),
            ComfortNorm::Norm => composition.norm(),
            ComfortNorm::Crush => composition.total_capacity(),
        }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct TripId(pub usize);

impl TripId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single leg of a train between two consecutive stops.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ScheduledTrip {
    pub id: TripId,
    pub train_service: TrainService,
    pub departure_s: u32,
    pub arrival_s: u32,
    pub from: StationId,
    pub to: StationId,
    pub comfort_norm: ComfortNorm,
    pub day: DayOfWeek,
}

impl ScheduledTrip {
    pub fn duration_s(&self) -> u32 {
        self.arrival_s - self.departure_s
    }

    pub fn train_number(&self) -> &str {
        &self.train_service.train_number
    }

    pub fn seat_capacity(&self) -> u32 {
        self.train_service.composition.seats()
    }

    pub fn norm_capacity(&self) -> u32 {
        self.comfort_norm.capacity(&self.train_service.composition)
    }

    fn sort_key(&self) -> (&str, DayOfWeek, u32, u32, &StationId, &StationId) {
        (self.train_number(), self.day, self.departure_s, self.arrival_s, &self.from, &self.to)
    }
}

impl PartialOrd for ScheduledTrip {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTrip {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key()).then(self.id.cmp(&other.id))
    }
}

/// The trip data handed over by the timetable provider, before ids are assigned.
#[derive(Debug, Clone)]
pub struct TripSpec {
    pub train_service: TrainService,
    pub departure_s: u32,
    pub arrival_s: u32,
    pub from: String,
    pub to: String,
    pub comfort_norm: ComfortNorm,
    pub day: DayOfWeek,
}

#[derive(Debug, Clone, Default)]
pub struct Timetable {
    stations: BTreeMap<StationId, Station>,
    trips: Vec<ScheduledTrip>,
}

impl Timetable {
    pub fn new(stations: Vec<Station>) -> Timetable {
        Timetable {
            stations: stations.into_iter().map(|ss| (ss.id.clone(), ss)).collect(),
            trips: vec![],
        }
    }

    pub fn add_station(&mut self, station: Station) {
        self.stations.insert(station.id.clone(), station);
    }

    /// Validate and insert a trip; the returned id indexes `trip()`.
    pub fn add_trip(&mut self, spec: TripSpec) -> Result<TripId, SimError> {
        let from = StationId::new(&spec.from);
        let to = StationId::new(&spec.to);
        for station in [&from, &to] {
            if !self.stations.contains_key(station) {
                return Err(SimError::InvalidTopology(
                    format!("train {} uses unknown station {}",
                            spec.train_service.train_number, station)));
            }
        }
        if spec.arrival_s < spec.departure_s {
            return Err(SimError::InvalidTopology(
                format!("train {} from {} to {} arrives at {}s before departing at {}s",
                        spec.train_service.train_number, from, to, spec.arrival_s,
                        spec.departure_s)));
        }

        let id = TripId(self.trips.len());
        self.trips.push(ScheduledTrip {
            id,
            train_service: spec.train_service,
            departure_s: spec.departure_s,
            arrival_s: spec.arrival_s,
            from,
            to,
            comfort_norm: spec.comfort_norm,
            day: spec.day,
        });
        Ok(id)
    }

    pub fn station(&self, id: &StationId) -> Option<&Station> {
        self.stations.get(id)
    }

    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    pub fn trip(&self, id: TripId) -> Option<&ScheduledTrip> {
        self.trips.get(id.index())
    }

    pub fn trips(&self) -> &[ScheduledTrip] {
        &self.trips
    }

    pub fn num_trips(&self) -> usize {
        self.trips.len()
    }

    /// Trips running on `day`, in their natural order.
    pub fn trips_on(&self, day: DayOfWeek) -> Vec<&ScheduledTrip> {
        self.trips.iter().filter(|tt| tt.day == day).sorted().collect()
    }

    /// The next leg of the same train on `day`, for every trip that has one.
    ///
    /// A leg follows another when it has the same train number, departs from the
    /// station the previous leg arrives at, and does not depart before that arrival.
    pub fn service_successors(&self, day: DayOfWeek) -> HashMap<TripId, TripId> {
        let mut successors = HashMap::new();
        let by_train = self.trips_on(day).into_iter()
            .into_group_map_by(|tt| tt.train_number().to_string());
        for (_, legs) in by_train {
            // trips_on already sorted each group by departure
            for (prev, next) in legs.iter().tuple_windows() {
                if prev.to == next.from && next.departure_s >= prev.arrival_s {
                    successors.insert(prev.id, next.id);
                }
            }
        }
        return successors;
    }

    /// Distinct train numbers running on `day`, with the composition they are planned with.
    pub fn planned_services(&self, day: DayOfWeek) -> BTreeMap<String, Composition> {
        let mut services = BTreeMap::new();
        for trip in self.trips_on(day) {
            services.entry(trip.train_number().to_string())
                    .or_insert_with(|| trip.train_service.composition.clone());
        }
        services
    }

    /// A private copy in which every trip of a train number runs with the given composition.
    pub fn with_realized_compositions(&self, realized: &BTreeMap<String, Composition>)
                                      -> Timetable {
        let mut copy = self.clone();
        for trip in copy.trips.iter_mut() {
            if let Some(composition) = realized.get(trip.train_number()) {
                trip.train_service = TrainService::new(trip.train_number(), composition.clone());
            }
        }
        copy
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{build_line_timetable, trip_spec, unit};

    #[test]
    fn test_station_identity_is_case_insensitive() {
        assert_eq!(StationId::new(" Amsterdam Centraal"), StationId::new("amsterdam centraal"));
        let station = Station::new("Gouda ", None);
        assert_eq!(station.name, "Gouda");
        assert_eq!(station.id.as_str(), "gouda");
    }

    #[test]
    fn test_composition_capacities() {
        let comp = Composition::new(vec![unit("SLT6", 40), unit("VIRM4", 100)]);
        assert_eq!(comp.seats(), 140);
        assert_eq!(comp.standing(), 70);
        assert_eq!(comp.norm(), 40 + 10 + 100 + 25);
        assert_eq!(comp.total_capacity(), 210);
        assert_eq!(comp.canonical_key(), "SLT6+VIRM4");

        let flipped = Composition::new(vec![unit("VIRM4", 100), unit("SLT6", 40)]);
        assert_eq!(comp.canonical_key(), flipped.canonical_key());
        assert_eq!(flipped.to_string(), "VIRM4+SLT6");

        assert_eq!(ComfortNorm::SeatsOnly.capacity(&comp), 140);
        assert_eq!(ComfortNorm::Crush.capacity(&comp), 210);
    }

    #[test]
    fn test_reject_arrival_before_departure() {
        let mut timetable = Timetable::new(vec![Station::new("A", None), Station::new("B", None)]);
        let result = timetable.add_trip(trip_spec("1", "A", "B", 100, 50, Composition::default()));
        match result {
            Err(SimError::InvalidTopology(msg)) => assert!(msg.contains("train 1")),
            other => panic!("expected invalid topology, got {:?}", other),
        }
        assert_eq!(timetable.num_trips(), 0);
    }

    #[test]
    fn test_reject_unknown_station() {
        let mut timetable = Timetable::new(vec![Station::new("A", None)]);
        let result = timetable.add_trip(trip_spec("1", "A", "Z", 0, 50, Composition::default()));
        assert!(matches!(result, Err(SimError::InvalidTopology(_))));
    }

    #[test]
    fn test_service_successors() {
        let timetable = build_line_timetable();
        let successors = timetable.service_successors(DayOfWeek::Tuesday);
        assert_eq!(successors.len(), 1);
        assert_eq!(successors.get(&TripId(0)), Some(&TripId(1)));
        assert!(timetable.service_successors(DayOfWeek::Monday).is_empty());
    }

    #[test]
    fn test_trip_ordering() {
        let timetable = build_line_timetable();
        let order: Vec<TripId> = timetable.trips_on(DayOfWeek::Tuesday).iter()
                                          .map(|tt| tt.id).collect();
        assert_eq!(order, vec![TripId(0), TripId(1), TripId(2)]);
    }

    #[test]
    fn test_realized_copy_leaves_original_untouched() {
        let timetable = build_line_timetable();
        let mut realized = BTreeMap::new();
        realized.insert(String::from("100"), Composition::new(vec![unit("SLT4", 20)]));
        let copy = timetable.with_realized_compositions(&realized);

        assert_eq!(copy.trip(TripId(0)).unwrap().seat_capacity(), 20);
        assert_eq!(copy.trip(TripId(1)).unwrap().seat_capacity(), 20);
        assert_eq!(copy.trip(TripId(2)).unwrap().seat_capacity(), 100);
        assert_eq!(timetable.trip(TripId(0)).unwrap().seat_capacity(), 100);

        let planned = timetable.planned_services(DayOfWeek::Tuesday);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned["100"].canonical_key(), "VIRM4");
    }
}
