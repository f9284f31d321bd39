use std::cmp::Ordering;

use super::timetable::{StationId, TripId};
use super::SimError;


/// A vertex of the event-activity network: something happening at a station at a time.
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub enum EventNode {
    Departure { station: StationId, time_s: u32, trip: TripId },
    Arrival { station: StationId, time_s: u32, trip: TripId },
    /// Waiting on the platform for this or any later departure at the station.
    Transfer { station: StationId, time_s: u32 },
}

impl EventNode {
    pub fn station(&self) -> &StationId {
        match self {
            EventNode::Departure { station, .. } => station,
            EventNode::Arrival { station, .. } => station,
            EventNode::Transfer { station, .. } => station,
        }
    }

    pub fn time_s(&self) -> u32 {
        match self {
            EventNode::Departure { time_s, .. } => *time_s,
            EventNode::Arrival { time_s, .. } => *time_s,
            EventNode::Transfer { time_s, .. } => *time_s,
        }
    }

    pub fn trip(&self) -> Option<TripId> {
        match self {
            EventNode::Departure { trip, .. } => Some(*trip),
            EventNode::Arrival { trip, .. } => Some(*trip),
            EventNode::Transfer { .. } => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            EventNode::Arrival { .. } => 0,
            EventNode::Transfer { .. } => 1,
            EventNode::Departure { .. } => 2,
        }
    }
}

// Ordered by station and time first; kind and trip only separate simultaneous events.
impl Ord for EventNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.station().cmp(other.station())
            .then(self.time_s().cmp(&other.time_s()))
            .then(self.kind_rank().cmp(&other.kind_rank()))
            .then(self.trip().cmp(&other.trip()))
    }
}

impl PartialOrd for EventNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A directed activity between two events. Weights are durations in seconds.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum Edge {
    /// Riding a scheduled trip from its departure to its arrival.
    Trip { trip: TripId, duration_s: u32 },
    /// Changing trains at a station.
    Transfer { duration_s: u32 },
    /// Waiting on the platform for a later departure.
    Wait { duration_s: u32 },
    /// Staying aboard while the same train continues on its next leg.
    Dwell { duration_s: u32 },
}

impl Edge {
    pub fn weight(&self) -> u32 {
        match self {
            Edge::Trip { duration_s, .. } => *duration_s,
            Edge::Transfer { duration_s } => *duration_s,
            Edge::Wait { duration_s } => *duration_s,
            Edge::Dwell { duration_s } => *duration_s,
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, Edge::Transfer { .. })
    }

    pub fn trip(&self) -> Option<TripId> {
        match self {
            Edge::Trip { trip, .. } => Some(*trip),
            _ => None,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct PathStep {
    pub source: EventNode,
    pub target: EventNode,
    pub edge: Edge,
}

/// Consecutive trips ridden without leaving the train.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Ride {
    pub trips: Vec<TripId>,
    pub board_time_s: u32,
    pub alight_time_s: u32,
}

/// A chain of edges through the network. Owns its steps, so it outlives the search
/// that produced it.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Path {
    steps: Vec<PathStep>,
}

impl Path {
    /// Fails unless every step starts where the previous one ended.
    pub fn new(steps: Vec<PathStep>) -> Result<Path, SimError> {
        if steps.is_empty() {
            return Err(SimError::InvalidTopology(String::from("a path needs at least one edge")));
        }
        for (ii, pair) in steps.windows(2).enumerate() {
            if pair[0].target != pair[1].source {
                return Err(SimError::InvalidTopology(
                    format!("path is broken between edge {} and edge {}", ii, ii + 1)));
            }
        }
        Ok(Path{steps})
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn weight(&self) -> u32 {
        self.steps.iter().map(|ss| ss.edge.weight()).sum()
    }

    pub fn start_node(&self) -> &EventNode {
        &self.steps[0].source
    }

    pub fn end_node(&self) -> &EventNode {
        &self.steps[self.steps.len() - 1].target
    }

    pub fn transfer_count(&self) -> usize {
        self.steps.iter().filter(|ss| ss.edge.is_transfer()).count()
    }

    /// Time the first trip on the path leaves; the start node's time if no trip is ridden.
    pub fn departure_time_s(&self) -> u32 {
        match self.steps.iter().find(|ss| ss.edge.trip().is_some()) {
            Some(step) => step.source.time_s(),
            None => self.start_node().time_s(),
        }
    }

    pub fn arrival_time_s(&self) -> u32 {
        self.end_node().time_s()
    }

    pub fn trips(&self) -> Vec<TripId> {
        self.steps.iter().filter_map(|ss| ss.edge.trip()).collect()
    }

    /// Split the ridden trips into rides; dwell edges keep a ride going, anything else ends it.
    pub fn rides(&self) -> Vec<Ride> {
        let mut rides: Vec<Ride> = vec![];
        let mut current: Option<Ride> = None;
        for step in &self.steps {
            match step.edge {
                Edge::Trip { trip, .. } => {
                    let ride = current.get_or_insert_with(|| Ride {
                        trips: vec![],
                        board_time_s: step.source.time_s(),
                        alight_time_s: step.target.time_s(),
                    });
                    ride.trips.push(trip);
                    ride.alight_time_s = step.target.time_s();
                }
                Edge::Dwell { .. } => (),
                Edge::Transfer { .. } | Edge::Wait { .. } => {
                    if let Some(ride) = current.take() {
                        rides.push(ride);
                    }
                }
            }
        }
        if let Some(ride) = current.take() {
            rides.push(ride);
        }
        return rides;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn dep(station: &str, time_s: u32, trip: usize) -> EventNode {
        EventNode::Departure { station: StationId::new(station), time_s, trip: TripId(trip) }
    }

    fn arr(station: &str, time_s: u32, trip: usize) -> EventNode {
        EventNode::Arrival { station: StationId::new(station), time_s, trip: TripId(trip) }
    }

    fn ride_step(from: &str, to: &str, dep_s: u32, arr_s: u32, trip: usize) -> PathStep {
        PathStep {
            source: dep(from, dep_s, trip),
            target: arr(to, arr_s, trip),
            edge: Edge::Trip { trip: TripId(trip), duration_s: arr_s - dep_s },
        }
    }

    fn link_step(source: EventNode, target: EventNode, edge: Edge) -> PathStep {
        PathStep{source, target, edge}
    }

    #[test]
    fn test_node_ordering() {
        let aa = arr("A", 100, 3);
        let bb = dep("A", 100, 1);
        let cc = dep("A", 50, 9);
        let dd = dep("B", 0, 0);
        let mut nodes = vec![dd.clone(), bb.clone(), aa.clone(), cc.clone()];
        nodes.sort();
        assert_eq!(nodes, vec![cc, aa, bb, dd]);
    }

    #[test]
    fn test_path_summary() {
        let steps = vec![
            ride_step("A", "B", 100, 200, 0),
            link_step(arr("B", 200, 0), dep("B", 230, 1), Edge::Dwell { duration_s: 30 }),
            ride_step("B", "C", 230, 400, 1),
            link_step(arr("C", 400, 1), dep("C", 500, 2), Edge::Transfer { duration_s: 100 }),
            ride_step("C", "D", 500, 600, 2),
        ];
        let path = Path::new(steps).unwrap();
        assert_eq!(path.weight(), 500);
        assert_eq!(path.transfer_count(), 1);
        assert_eq!(path.departure_time_s(), 100);
        assert_eq!(path.arrival_time_s(), 600);
        assert_eq!(path.start_node(), &dep("A", 100, 0));
        assert_eq!(path.end_node(), &arr("D", 600, 2));
        assert_eq!(path.trips(), vec![TripId(0), TripId(1), TripId(2)]);

        let rides = path.rides();
        assert_eq!(rides.len(), 2);
        assert_eq!(rides[0], Ride { trips: vec![TripId(0), TripId(1)], board_time_s: 100,
                                    alight_time_s: 400 });
        assert_eq!(rides[1], Ride { trips: vec![TripId(2)], board_time_s: 500,
                                    alight_time_s: 600 });
    }

    #[test]
    fn test_path_must_be_contiguous() {
        let steps = vec![
            ride_step("A", "B", 100, 200, 0),
            ride_step("C", "D", 300, 400, 1),
        ];
        assert!(matches!(Path::new(steps), Err(SimError::InvalidTopology(_))));
        assert!(Path::new(vec![]).is_err());
    }

    #[test]
    fn test_departure_skips_leading_waits() {
        let steps = vec![
            link_step(dep("A", 100, 0), dep("A", 160, 1), Edge::Wait { duration_s: 60 }),
            ride_step("A", "B", 160, 300, 1),
        ];
        let path = Path::new(steps).unwrap();
        assert_eq!(path.departure_time_s(), 160);
        assert_eq!(path.weight(), 200);
        assert_eq!(path.transfer_count(), 0);
    }
}
