use std::cmp::Reverse;
use std::collections::HashMap;

use priority_queue::PriorityQueue;

use super::graph::Ride;
use super::timetable::TripId;
use super::SimError;


/// Per-trip occupancy of one replication.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct Counter {
    /// Passengers who boarded this trip at its departure station.
    pub boarded: u32,
    /// Passengers aboard while the trip runs.
    pub on_board: u32,
}

/// The counters of every trip, plus the service successors along which boarded
/// passengers stay aboard. Owned by exactly one replication.
#[derive(Debug, Clone)]
pub struct CounterSet {
    counters: Vec<Counter>,
    successors: HashMap<TripId, TripId>,
}

impl CounterSet {
    pub fn new(num_trips: usize, successors: HashMap<TripId, TripId>) -> CounterSet {
        CounterSet {
            counters: vec![Counter::default(); num_trips],
            successors,
        }
    }

    pub fn get(&self, trip: TripId) -> Option<&Counter> {
        self.counters.get(trip.index())
    }

    pub fn counters(&self) -> &[Counter] {
        &self.counters
    }

    pub fn successor(&self, trip: TripId) -> Option<TripId> {
        self.successors.get(&trip).cloned()
    }

    /// `trip` and every later leg of the same train.
    fn downstream(&self, trip: TripId) -> Vec<TripId> {
        let mut chain = vec![trip];
        let mut current = trip;
        while let Some(next) = self.successor(current) {
            // a malformed successor map must not loop forever
            if chain.len() > self.counters.len() {
                break;
            }
            chain.push(next);
            current = next;
        }
        return chain;
    }

    fn check_trip(&self, trip: TripId) -> Result<(), SimError> {
        if trip.index() >= self.counters.len() {
            return Err(SimError::CounterInvariantViolation {
                trip,
                detail: format!("no counter for trip (only {} trips)", self.counters.len()),
            });
        }
        Ok(())
    }

    /// `size` passengers board `trip` and stay aboard the rest of the train's run.
    pub fn board(&mut self, trip: TripId, size: u32) -> Result<(), SimError> {
        self.check_trip(trip)?;
        let old_boarded = self.counters[trip.index()].boarded;
        self.counters[trip.index()].boarded = old_boarded.checked_add(size).ok_or_else(|| {
            SimError::CounterInvariantViolation {
                trip,
                detail: format!("boarded count overflows adding {}", size),
            }
        })?;

        for leg in self.downstream(trip) {
            self.check_trip(leg)?;
            let counter = &mut self.counters[leg.index()];
            let old = counter.on_board;
            counter.on_board = old.checked_add(size).ok_or_else(|| {
                SimError::CounterInvariantViolation {
                    trip: leg,
                    detail: format!("boarding {} onto {} on board overflows", size, old),
                }
            })?;
        }
        Ok(())
    }

    /// `size` passengers leave before `trip` departs and are no longer aboard it or any
    /// later leg.
    pub fn alight(&mut self, trip: TripId, size: u32) -> Result<(), SimError> {
        self.check_trip(trip)?;
        for leg in self.downstream(trip) {
            self.check_trip(leg)?;
            let counter = &mut self.counters[leg.index()];
            let old = counter.on_board;
            let new = old.checked_sub(size).ok_or_else(|| SimError::CounterInvariantViolation {
                trip: leg,
                detail: format!("alighting {} from {} on board", size, old),
            })?;
            counter.on_board = new;
        }
        Ok(())
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum EventKind {
    Boarding,
    Alighting,
}

impl EventKind {
    // boarding first at equal times
    fn rank(&self) -> u8 {
        match self {
            EventKind::Boarding => 0,
            EventKind::Alighting => 1,
        }
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct Event {
    pub time_s: u32,
    pub kind: EventKind,
    pub trip: TripId,
    pub size: u32,
    // insertion order, keeps otherwise identical events distinct
    seq: u64,
}

impl Event {
    pub fn process(&self, counters: &mut CounterSet) -> Result<(), SimError> {
        match self.kind {
            EventKind::Boarding => counters.board(self.trip, self.size),
            EventKind::Alighting => counters.alight(self.trip, self.size),
        }
    }

    fn priority(&self) -> Reverse<(u32, u8, u64)> {
        Reverse((self.time_s, self.kind.rank(), self.seq))
    }
}

/// Discrete-event loop over boarding and alighting events.
pub struct Engine {
    queue: PriorityQueue<Event, Reverse<(u32, u8, u64)>>,
    next_seq: u64,
}

impl Engine {
    pub fn new() -> Engine {
        Engine {
            queue: PriorityQueue::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, time_s: u32, kind: EventKind, trip: TripId, size: u32) {
        let event = Event {
            time_s,
            kind,
            trip,
            size,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let priority = event.priority();
        self.queue.push(event, priority);
    }

    /// Board a group on the first trip of a ride. If the train runs on after the last
    /// trip of the ride, the group alights before that next leg.
    pub fn schedule_ride(&mut self, ride: &Ride, size: u32, counters: &CounterSet) {
        let (first, last) = match (ride.trips.first(), ride.trips.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return,
        };
        self.schedule(ride.board_time_s, EventKind::Boarding, first, size);
        if let Some(next) = counters.successor(last) {
            self.schedule(ride.alight_time_s, EventKind::Alighting, next, size);
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Process events in time order until none are left. Returns how many were processed.
    pub fn run(&mut self, counters: &mut CounterSet) -> Result<usize, SimError> {
        let mut processed = 0;
        while let Some((event, _)) = self.queue.pop() {
            event.process(counters)?;
            processed += 1;
        }
        log::debug!("processed {} events", processed);
        Ok(processed)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_isaac::Isaac64Rng;

    // one train running trips 0 -> 1 -> 2, and an unrelated trip 3
    fn chain_counters() -> CounterSet {
        let successors: HashMap<TripId, TripId> =
            [(TripId(0), TripId(1)), (TripId(1), TripId(2))].iter().cloned().collect();
        CounterSet::new(4, successors)
    }

    fn ride(trips: &[usize], board: u32, alight: u32) -> Ride {
        Ride {
            trips: trips.iter().map(|tt| TripId(*tt)).collect(),
            board_time_s: board,
            alight_time_s: alight,
        }
    }

    #[test]
    fn test_boarding_carries_downstream() {
        let mut counters = chain_counters();
        counters.board(TripId(0), 5).unwrap();
        counters.board(TripId(1), 2).unwrap();
        let on_board: Vec<u32> = counters.counters().iter().map(|cc| cc.on_board).collect();
        let boarded: Vec<u32> = counters.counters().iter().map(|cc| cc.boarded).collect();
        assert_eq!(on_board, vec![5, 7, 7, 0]);
        assert_eq!(boarded, vec![5, 2, 0, 0]);

        counters.alight(TripId(2), 6).unwrap();
        assert_eq!(counters.get(TripId(2)), Some(&Counter { boarded: 0, on_board: 1 }));
        assert_eq!(counters.get(TripId(1)).unwrap().on_board, 7);
    }

    #[test]
    fn test_alighting_more_than_aboard() {
        let mut counters = chain_counters();
        counters.board(TripId(1), 2).unwrap();
        match counters.alight(TripId(1), 3) {
            Err(SimError::CounterInvariantViolation { trip, .. }) => assert_eq!(trip, TripId(1)),
            other => panic!("expected a violation, got {:?}", other),
        }
        assert!(counters.board(TripId(9), 1).is_err());
    }

    #[test]
    fn test_boarding_overflow() {
        let mut counters = chain_counters();
        counters.board(TripId(3), u32::MAX).unwrap();
        assert!(matches!(counters.board(TripId(3), 1),
                         Err(SimError::CounterInvariantViolation { .. })));
    }

    #[test]
    fn test_event_order() {
        // boarding at 100 must come before an alighting at 100, whatever the insertion order
        let mut engine = Engine::new();
        let mut counters = chain_counters();
        engine.schedule(100, EventKind::Alighting, TripId(1), 3);
        engine.schedule(50, EventKind::Boarding, TripId(0), 1);
        engine.schedule(100, EventKind::Boarding, TripId(1), 2);
        assert_eq!(engine.pending(), 3);
        assert_eq!(engine.run(&mut counters).unwrap(), 3);
        assert_eq!(engine.pending(), 0);
        assert_eq!(counters.get(TripId(0)).unwrap().on_board, 1);
        assert_eq!(counters.get(TripId(1)).unwrap().on_board, 0);
        assert_eq!(counters.get(TripId(2)).unwrap().on_board, 0);
    }

    #[test]
    fn test_schedule_ride() {
        let mut engine = Engine::new();
        let mut counters = chain_counters();
        // ride trip 0 only: alight before trip 1
        engine.schedule_ride(&ride(&[0], 100, 200), 4, &counters);
        // ride trips 1 and 2 to the end of the line: no alighting event
        engine.schedule_ride(&ride(&[1, 2], 250, 400), 2, &counters);
        engine.schedule_ride(&ride(&[], 0, 0), 9, &counters);
        assert_eq!(engine.pending(), 3);
        engine.run(&mut counters).unwrap();

        let on_board: Vec<u32> = counters.counters().iter().map(|cc| cc.on_board).collect();
        assert_eq!(on_board, vec![4, 2, 2, 0]);
        assert_eq!(counters.get(TripId(1)).unwrap().boarded, 2);
    }

    #[test]
    fn test_random_sequences_balance() {
        // on a single trip, N is boardings minus alightings and never negative
        let mut rng = Isaac64Rng::seed_from_u64(8);
        for _ in 0..20 {
            let mut counters = CounterSet::new(1, HashMap::new());
            let mut expected: i64 = 0;
            for _ in 0..200 {
                let size = rng.gen_range(1..5);
                if rng.gen::<bool>() || expected < size as i64 {
                    counters.board(TripId(0), size).unwrap();
                    expected += size as i64;
                } else {
                    counters.alight(TripId(0), size).unwrap();
                    expected -= size as i64;
                }
                assert_eq!(counters.get(TripId(0)).unwrap().on_board as i64, expected);
            }
        }
    }
}
