use std::collections::hash_map::Entry::{Occupied, Vacant};
use std::collections::{BinaryHeap, HashMap};
use std::cmp::Ordering;
use std::ops::Add;

use petgraph::algo::Measure;
use petgraph::graph::{DiGraph, EdgeIndex, EdgeReference, NodeIndex};
use petgraph::visit::{EdgeRef, VisitMap, Visitable};


/// Label-setting shortest path search, based on the dijkstra implementation in the
/// petgraph library.
///
/// Every entry of `sources` is a start node with its initial label, so a search can
/// begin from several departure events at once and charge each one its waiting time.
/// The search stops at the first node popped for which `is_target` holds, which is the
/// cheapest target under `edge_cost`. Edge costs must be non-negative.
///
/// Returns the cost of the best target and the edges leading to it from its source,
/// in travel order. Returns None if no target is reachable.
pub fn label_setting_search<N, E, K, F, G>(
    graph: &DiGraph<N, E>,
    sources: &[(NodeIndex, K)],
    mut is_target: G,
    mut edge_cost: F,
) -> Option<(K, Vec<EdgeIndex>)>
where
    F: FnMut(EdgeReference<E>) -> K,
    G: FnMut(NodeIndex) -> bool,
    K: Measure + Copy,
{
    let mut visited = graph.visit_map();
    let mut scores: HashMap<NodeIndex, K> = HashMap::new();
    let mut edges_used: HashMap<NodeIndex, EdgeIndex> = HashMap::new();
    let mut visit_next = BinaryHeap::new();

    for (node, initial) in sources {
        match scores.entry(*node) {
            Occupied(ent) => {
                if *initial < *ent.get() {
                    *ent.into_mut() = *initial;
                    visit_next.push(MinScored(*initial, *node));
                }
            }
            Vacant(ent) => {
                ent.insert(*initial);
                visit_next.push(MinScored(*initial, *node));
            }
        }
    }

    while let Some(MinScored(node_score, node)) = visit_next.pop() {
        // stale heap entries stand in for decrease-key
        if visited.is_visited(&node) {
            continue;
        }
        if is_target(node) {
            let mut path = vec![];
            let mut current = node;
            while let Some(edge_idx) = edges_used.get(&current) {
                path.push(*edge_idx);
                match graph.edge_endpoints(*edge_idx) {
                    Some((source, _)) => current = source,
                    None => break,
                }
            }
            path.reverse();
            return Some((node_score, path));
        }
        visited.visit(node);

        for edge in graph.edges(node) {
            let next = edge.target();
            if visited.is_visited(&next) {
                continue;
            }
            let next_score = node_score + edge_cost(edge);
            match scores.entry(next) {
                Occupied(ent) => {
                    if next_score < *ent.get() {
                        *ent.into_mut() = next_score;
                        visit_next.push(MinScored(next_score, next));
                        edges_used.insert(next, edge.id());
                    }
                }
                Vacant(ent) => {
                    ent.insert(next_score);
                    visit_next.push(MinScored(next_score, next));
                    edges_used.insert(next, edge.id());
                }
            }
        }
    }
    None
}

/// Single-pair shortest path, returning the cost and the visited nodes.
pub fn shortest_path<N, E, K, F>(graph: &DiGraph<N, E>, from: NodeIndex, to: NodeIndex,
                                 edge_cost: F) -> Option<(K, Vec<NodeIndex>)>
where
    F: FnMut(EdgeReference<E>) -> K,
    K: Measure + Copy,
{
    let (cost, edges) = label_setting_search(graph, &[(from, K::default())], |nn| nn == to,
                                             edge_cost)?;
    let mut nodes = vec![from];
    for edge_idx in edges {
        let (_, target) = graph.edge_endpoints(edge_idx)?;
        nodes.push(target);
    }
    return Some((cost, nodes));
}

/// A two-level cost compared lexicographically: the first component dominates and the
/// second only breaks ties.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default)]
pub struct LexCost(pub u32, pub u32);

impl Add for LexCost {
    type Output = LexCost;

    fn add(self, other: LexCost) -> LexCost {
        LexCost(self.0 + other.0, self.1 + other.1)
    }
}


#[derive(Copy, Clone, Debug)]
pub struct MinScored<K, T>(pub K, pub T);

impl<K: PartialOrd, T> PartialEq for MinScored<K, T> {
    #[inline]
    fn eq(&self, other: &MinScored<K, T>) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: PartialOrd, T> Eq for MinScored<K, T> {}

impl<K: PartialOrd, T> PartialOrd for MinScored<K, T> {
    #[inline]
    fn partial_cmp(&self, other: &MinScored<K, T>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so that std's max-heap pops the smallest score.
impl<K: PartialOrd, T> Ord for MinScored<K, T> {
    #[inline]
    fn cmp(&self, other: &MinScored<K, T>) -> Ordering {
        let a = &self.0;
        let b = &other.0;
        if a == b {
            Ordering::Equal
        } else if a < b {
            Ordering::Greater
        } else if a > b {
            Ordering::Less
        } else if a.ne(a) && b.ne(b) {
            // NaN cases
            Ordering::Equal
        } else if a.ne(a) {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}
