// The event-activity network: departure and arrival events of one operating day, linked by
// trip, dwell, transfer and wait activities. Stored as a petgraph arena so it can be shared
// read-only between replication threads.
use std::collections::HashMap;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use super::graph::{Edge, EventNode};
use super::timetable::{DayOfWeek, StationId, Timetable, TripId};
use super::SimError;


#[derive(PartialEq, Debug, Clone)]
pub struct NetworkOptions {
    // minimum time a passenger needs to change trains
    pub min_transfer_s: u32,
    // longest gap between an arrival and a departure that still counts as a transfer
    pub max_transfer_wait_s: Option<u32>,
    // link consecutive departures at a station instead of enumerating every transfer
    pub wait_edges: bool,
}

impl NetworkOptions {
    pub fn new(transfer_time_min: u32) -> NetworkOptions {
        NetworkOptions {
            min_transfer_s: transfer_time_min * 60,
            max_transfer_wait_s: None,
            wait_edges: false,
        }
    }
}

pub struct Network {
    day: DayOfWeek,
    graph: DiGraph<EventNode, Edge>,
    edge_index: HashMap<(NodeIndex, NodeIndex), EdgeIndex>,
    // per station, sorted by time
    departures: HashMap<StationId, Vec<(u32, NodeIndex)>>,
    trip_nodes: HashMap<TripId, (NodeIndex, NodeIndex)>,
}

impl Network {
    /// Build the network for `day` with the default options for `transfer_time_min`.
    pub fn build(timetable: &Timetable, transfer_time_min: u32, day: DayOfWeek)
                 -> Result<Network, SimError> {
        Network::build_with(timetable, day, &NetworkOptions::new(transfer_time_min))
    }

    pub fn build_with(timetable: &Timetable, day: DayOfWeek, options: &NetworkOptions)
                      -> Result<Network, SimError> {
        log::info!("building event-activity network for {:?}...", day);
        let mut network = Network {
            day,
            graph: DiGraph::new(),
            edge_index: HashMap::new(),
            departures: HashMap::new(),
            trip_nodes: HashMap::new(),
        };

        // departure and arrival events, joined by the trip itself
        let mut arrivals = vec![];
        for trip in timetable.trips_on(day) {
            if trip.arrival_s < trip.departure_s {
                return Err(SimError::InvalidTopology(
                    format!("trip {} of train {} arrives before it departs",
                            trip.id, trip.train_number())));
            }
            let dep_node = network.graph.add_node(EventNode::Departure {
                station: trip.from.clone(),
                time_s: trip.departure_s,
                trip: trip.id,
            });
            let arr_node = network.graph.add_node(EventNode::Arrival {
                station: trip.to.clone(),
                time_s: trip.arrival_s,
                trip: trip.id,
            });
            network.add_edge(dep_node, arr_node,
                             Edge::Trip { trip: trip.id, duration_s: trip.duration_s() });
            network.departures.entry(trip.from.clone()).or_insert_with(Vec::new)
                   .push((trip.departure_s, dep_node));
            network.trip_nodes.insert(trip.id, (dep_node, arr_node));
            arrivals.push((trip.id, trip.to.clone(), trip.arrival_s, arr_node));
        }
        for station_deps in network.departures.values_mut() {
            station_deps.sort();
        }

        // staying aboard when a train continues
        let successors = timetable.service_successors(day);
        for (prev, next) in &successors {
            let (_, prev_arr) = network.trip_nodes[prev];
            let (next_dep, _) = network.trip_nodes[next];
            let gap = network.graph[next_dep].time_s() - network.graph[prev_arr].time_s();
            network.add_edge(prev_arr, next_dep, Edge::Dwell { duration_s: gap });
        }

        if options.wait_edges {
            network.add_wait_chains(&arrivals, options);
        } else {
            network.add_transfer_window(&arrivals, &successors, options);
        }

        log::info!("network has {} nodes and {} edges", network.graph.node_count(),
                   network.graph.edge_count());
        Ok(network)
    }

    fn add_edge(&mut self, source: NodeIndex, target: NodeIndex, edge: Edge) {
        if self.edge_index.contains_key(&(source, target)) {
            log::warn!("duplicate edge {:?} -> {:?} ignored", self.graph[source],
                       self.graph[target]);
            return;
        }
        let idx = self.graph.add_edge(source, target, edge);
        self.edge_index.insert((source, target), idx);
    }

    fn within_window(gap: u32, options: &NetworkOptions) -> bool {
        gap >= options.min_transfer_s && match options.max_transfer_wait_s {
            Some(max_wait) => gap <= max_wait,
            None => true,
        }
    }

    /// One transfer edge from every arrival to every departure in its transfer window.
    fn add_transfer_window(&mut self, arrivals: &[(TripId, StationId, u32, NodeIndex)],
                           successors: &HashMap<TripId, TripId>, options: &NetworkOptions) {
        for (trip, station, arr_time, arr_node) in arrivals {
            let successor_dep = successors.get(trip).map(|next| self.trip_nodes[next].0);
            let candidates: Vec<(u32, NodeIndex)> = match self.departures.get(station) {
                Some(deps) => deps.iter()
                                  .filter(|(dep_time, dep_node)| {
                                      *dep_time >= *arr_time &&
                                      Some(*dep_node) != successor_dep &&
                                      Network::within_window(dep_time - arr_time, options)
                                  })
                                  .cloned()
                                  .collect(),
                None => continue,
            };
            for (dep_time, dep_node) in candidates {
                self.add_edge(*arr_node, dep_node,
                              Edge::Transfer { duration_s: dep_time - arr_time });
            }
        }
    }

    /// Every departure gets a platform node; platform nodes at a station are chained in
    /// departure order. An arrival reaches the chain only through a transfer, so changing
    /// trains is always counted, while staying aboard goes over the dwell edge.
    fn add_wait_chains(&mut self, arrivals: &[(TripId, StationId, u32, NodeIndex)],
                       options: &NetworkOptions) {
        let mut platforms: HashMap<StationId, Vec<(u32, NodeIndex)>> = HashMap::new();
        let stations: Vec<(StationId, Vec<(u32, NodeIndex)>)> =
            self.departures.iter().map(|(ss, deps)| (ss.clone(), deps.clone())).collect();
        for (station, deps) in stations {
            let mut chain = Vec::with_capacity(deps.len());
            for (dep_time, dep_node) in deps {
                let platform = self.graph.add_node(EventNode::Transfer {
                    station: station.clone(),
                    time_s: dep_time,
                });
                self.add_edge(platform, dep_node, Edge::Wait { duration_s: 0 });
                chain.push((dep_time, platform));
            }
            for pair in chain.windows(2) {
                let (t0, n0) = pair[0];
                let (t1, n1) = pair[1];
                self.add_edge(n0, n1, Edge::Wait { duration_s: t1 - t0 });
            }
            platforms.insert(station, chain);
        }

        for (_, station, arr_time, arr_node) in arrivals {
            let ready_time = arr_time + options.min_transfer_s;
            let first = platforms.get(station).and_then(|chain| {
                let pos = chain.partition_point(|(tt, _)| *tt < ready_time);
                chain.get(pos).cloned()
            });
            match first {
                Some((dep_time, platform))
                        if Network::within_window(dep_time - arr_time, options) => {
                    self.add_edge(*arr_node, platform,
                                  Edge::Transfer { duration_s: dep_time - arr_time });
                }
                _ => continue,
            }
        }
    }

    pub fn day(&self) -> DayOfWeek {
        self.day
    }

    pub fn graph(&self) -> &DiGraph<EventNode, Edge> {
        &self.graph
    }

    pub fn node(&self, idx: NodeIndex) -> &EventNode {
        &self.graph[idx]
    }

    pub fn node_set(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn outgoing_edges(&self, node: NodeIndex) -> impl Iterator<Item = (NodeIndex, &Edge)> {
        self.graph.edges(node).map(|er| (er.target(), er.weight()))
    }

    pub fn edge_between(&self, source: NodeIndex, target: NodeIndex) -> Option<&Edge> {
        self.edge_index.get(&(source, target)).map(|idx| &self.graph[*idx])
    }

    pub fn trip_nodes(&self, trip: TripId) -> Option<(NodeIndex, NodeIndex)> {
        self.trip_nodes.get(&trip).cloned()
    }

    /// Departure events at `station` no earlier than `not_before`.
    ///
    /// A station without any departure on this day cannot start a route, which is a
    /// topology error rather than a missing route.
    pub fn departures_from(&self, station: &StationId, not_before: u32)
                           -> Result<Vec<(u32, NodeIndex)>, SimError> {
        match self.departures.get(station) {
            Some(deps) if !deps.is_empty() => {
                let pos = deps.partition_point(|(tt, _)| *tt < not_before);
                Ok(deps[pos..].to_vec())
            }
            _ => Err(SimError::InvalidTopology(
                format!("station {} has no departures on {:?}", station, self.day))),
        }
    }

    pub fn is_arrival_at(&self, node: NodeIndex, station: &StationId) -> bool {
        match &self.graph[node] {
            EventNode::Arrival { station: ss, .. } => ss == station,
            _ => false,
        }
    }
}
