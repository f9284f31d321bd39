use petgraph::graph::EdgeIndex;

use super::dijkstra::{label_setting_search, LexCost};
use super::graph::{Path, PathStep};
use super::network::Network;
use super::timetable::StationId;
use super::SimError;


/// Produces a small set of candidate paths between two stations.
pub trait RouteGeneration: Send + Sync {
    /// Candidates leaving `origin` at or after `earliest_departure_s` and arriving at
    /// `destination`. Fails with `NoRouteFound` when the destination cannot be reached.
    fn generate(&self, network: &Network, origin: &StationId, destination: &StationId,
                earliest_departure_s: u32) -> Result<Vec<Path>, SimError>;
}

/// Deterministically picks one of the candidate paths for a passenger.
pub trait RouteSelection: Send + Sync {
    /// None when there is no viable candidate; the caller drops the passenger.
    fn select<'a>(&self, candidates: &'a [Path], check_in_s: u32, check_out_s: u32)
                  -> Option<&'a Path>;
}

/// The fastest path (ties broken by fewer transfers) and, if that path transfers,
/// the path with the fewest transfers (ties broken by travel time).
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicRouteGeneration;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Criterion {
    TimeFirst,
    TransfersFirst,
}

impl LexicographicRouteGeneration {
    fn search(&self, network: &Network, origin: &StationId, destination: &StationId,
              earliest_departure_s: u32, criterion: Criterion)
              -> Result<Option<Path>, SimError> {
        let sources: Vec<_> = network.departures_from(origin, earliest_departure_s)?
            .into_iter()
            .map(|(dep_time, node)| {
                let wait = dep_time - earliest_departure_s;
                let label = match criterion {
                    Criterion::TimeFirst => LexCost(wait, 0),
                    Criterion::TransfersFirst => LexCost(0, wait),
                };
                (node, label)
            })
            .collect();
        if sources.is_empty() {
            return Ok(None);
        }

        let found = label_setting_search(
            network.graph(),
            &sources,
            |node| network.is_arrival_at(node, destination),
            |er| {
                let edge = er.weight();
                let transfers = if edge.is_transfer() { 1 } else { 0 };
                match criterion {
                    Criterion::TimeFirst => LexCost(edge.weight(), transfers),
                    Criterion::TransfersFirst => LexCost(transfers, edge.weight()),
                }
            });
        match found {
            Some((_, edges)) => Ok(Some(edges_to_path(network, &edges)?)),
            None => Ok(None),
        }
    }
}

impl RouteGeneration for LexicographicRouteGeneration {
    fn generate(&self, network: &Network, origin: &StationId, destination: &StationId,
                earliest_departure_s: u32) -> Result<Vec<Path>, SimError> {
        let fastest = self.search(network, origin, destination, earliest_departure_s,
                                  Criterion::TimeFirst)?;
        let fastest = match fastest {
            Some(path) => path,
            None => return Err(SimError::NoRouteFound {
                origin: origin.clone(),
                destination: destination.clone(),
                earliest_departure_s,
            }),
        };

        let mut candidates = vec![];
        let needs_second = fastest.transfer_count() > 0;
        candidates.push(fastest);
        if needs_second {
            if let Some(fewest) = self.search(network, origin, destination,
                                              earliest_departure_s, Criterion::TransfersFirst)? {
                if !candidates.contains(&fewest) {
                    candidates.push(fewest);
                }
            }
        }
        log::debug!("{} candidate routes from {} to {} after {}s", candidates.len(), origin,
                    destination, earliest_departure_s);
        Ok(candidates)
    }
}

/// Turn the edge indices of a search result into an owned path.
fn edges_to_path(network: &Network, edges: &[EdgeIndex]) -> Result<Path, SimError> {
    let graph = network.graph();
    let mut steps = Vec::with_capacity(edges.len());
    for edge_idx in edges {
        let (source, target) = graph.edge_endpoints(*edge_idx).ok_or_else(|| {
            SimError::InvalidTopology(format!("edge {} is not in the network", edge_idx.index()))
        })?;
        steps.push(PathStep {
            source: graph[source].clone(),
            target: graph[target].clone(),
            edge: graph[*edge_idx],
        });
    }
    Path::new(steps)
}

/// Minimum total travel time counted from check-in, which is the same as the earliest
/// arrival. The first of equal candidates wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarliestArrival;

impl RouteSelection for EarliestArrival {
    fn select<'a>(&self, candidates: &'a [Path], check_in_s: u32, _check_out_s: u32)
                  -> Option<&'a Path> {
        let mut best: Option<(u32, &Path)> = None;
        for path in candidates {
            let travel_time = path.arrival_time_s().saturating_sub(check_in_s);
            match best {
                Some((best_time, _)) if best_time <= travel_time => (),
                _ => best = Some((travel_time, path)),
            }
        }
        best.map(|(_, path)| path)
    }
}

/// Accepts paths that depart and arrive close to the passenger's observed check-in and
/// check-out, then prefers fewer transfers, a later arrival and an earlier departure.
#[derive(Debug, Clone, Copy)]
pub struct LeastTransfersLastArrival {
    pub threshold_min: f64,
}

impl LeastTransfersLastArrival {
    pub fn new(threshold_min: f64) -> LeastTransfersLastArrival {
        LeastTransfersLastArrival{threshold_min}
    }

    /// |departure - check-in| + |arrival - check-out|, in minutes.
    pub fn deviation_min(path: &Path, check_in_s: u32, check_out_s: u32) -> f64 {
        let dep_diff = (path.departure_time_s() as i64 - check_in_s as i64).abs();
        let arr_diff = (path.arrival_time_s() as i64 - check_out_s as i64).abs();
        return (dep_diff + arr_diff) as f64 / 60.;
    }
}

impl RouteSelection for LeastTransfersLastArrival {
    fn select<'a>(&self, candidates: &'a [Path], check_in_s: u32, check_out_s: u32)
                  -> Option<&'a Path> {
        let accepted: Vec<&Path> = candidates.iter()
            .filter(|pp| {
                LeastTransfersLastArrival::deviation_min(pp, check_in_s, check_out_s) <=
                    self.threshold_min
            })
            .collect();
        let pool: Vec<&Path> = if accepted.is_empty() {
            candidates.iter().collect()
        } else {
            accepted
        };

        let mut best: Option<&Path> = None;
        for path in pool {
            let better = match best {
                None => true,
                Some(current) => {
                    let key = (path.transfer_count(), std::cmp::Reverse(path.arrival_time_s()),
                               path.departure_time_s());
                    let best_key = (current.transfer_count(),
                                    std::cmp::Reverse(current.arrival_time_s()),
                                    current.departure_time_s());
                    key < best_key
                }
            };
            if better {
                best = Some(path);
            }
        }
        best
    }
}
