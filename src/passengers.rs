use std::collections::BTreeMap;
use std::fmt;

use super::timetable::StationId;


/// An origin-destination pair; passengers are grouped by journey for estimation.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone)]
pub struct Journey {
    pub origin: StationId,
    pub destination: StationId,
}

impl Journey {
    pub fn new(origin: StationId, destination: StationId) -> Journey {
        Journey{origin, destination}
    }
}

impl fmt::Display for Journey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.origin, self.destination)
    }
}

/// A historical check-in/check-out record. Times are seconds since midnight.
#[derive(PartialEq, Debug, Clone)]
pub struct Passenger {
    pub check_in_s: u32,
    pub check_out_s: u32,
    pub origin: StationId,
    pub destination: StationId,
}

impl Passenger {
    pub fn new(check_in_s: u32, check_out_s: u32, origin: &str, destination: &str) -> Passenger {
        Passenger {
            check_in_s,
            check_out_s,
            origin: StationId::new(origin),
            destination: StationId::new(destination),
        }
    }

    pub fn journey(&self) -> Journey {
        Journey::new(self.origin.clone(), self.destination.clone())
    }

    pub fn travel_time_s(&self) -> u32 {
        self.check_out_s.saturating_sub(self.check_in_s)
    }
}

/// Group passengers by journey, keeping each group in input order.
pub fn group_by_journey(passengers: &[Passenger]) -> BTreeMap<Journey, Vec<&Passenger>> {
    let mut groups: BTreeMap<Journey, Vec<&Passenger>> = BTreeMap::new();
    for passenger in passengers {
        groups.entry(passenger.journey()).or_insert_with(Vec::new).push(passenger);
    }
    return groups;
}

/// Median check-in to check-out time of a group, rounded down; None for an empty group.
pub fn median_travel_time_s(passengers: &[&Passenger]) -> Option<u32> {
    if passengers.is_empty() {
        return None;
    }
    let mut times: Vec<u32> = passengers.iter().map(|pp| pp.travel_time_s()).collect();
    times.sort_unstable();
    let mid = times.len() / 2;
    if times.len() % 2 == 1 {
        Some(times[mid])
    } else {
        Some((times[mid - 1] + times[mid]) / 2)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_journey() {
        let passengers = vec![
            Passenger::new(100, 900, "A", "B"),
            Passenger::new(200, 1100, "B", "A"),
            Passenger::new(300, 1000, "a", "b "),
        ];
        let groups = group_by_journey(&passengers);
        assert_eq!(groups.len(), 2);

        let ab = Journey::new(StationId::new("A"), StationId::new("B"));
        let group = &groups[&ab];
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].check_in_s, 100);
        assert_eq!(group[1].check_in_s, 300);
        assert_eq!(ab.to_string(), "a->b");
    }

    #[test]
    fn test_median_travel_time() {
        let passengers = vec![
            Passenger::new(0, 600, "A", "B"),
            Passenger::new(0, 1200, "A", "B"),
            Passenger::new(0, 900, "A", "B"),
            Passenger::new(0, 1500, "A", "B"),
        ];
        let refs: Vec<&Passenger> = passengers.iter().collect();
        assert_eq!(median_travel_time_s(&refs), Some(1050));
        assert_eq!(median_travel_time_s(&refs[..3]), Some(900));
        assert_eq!(median_travel_time_s(&[]), None);

        // a check-out before check-in counts as zero travel time
        assert_eq!(Passenger::new(500, 100, "A", "B").travel_time_s(), 0);
    }
}
