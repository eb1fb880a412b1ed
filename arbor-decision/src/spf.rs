//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::graph::{LinkId, LinkState, NodeId};

// Ordered list of links from source to destination.
pub type Path = Vec<LinkId>;

// SPF vertex state, keyed by interned node ID.
#[derive(Clone, Debug, Default)]
pub(crate) struct Vertex {
    pub(crate) metric: u32,
    pub(crate) next_hops: BTreeSet<NodeId>,
}

// ===== global functions =====

// Dijkstra from `src` over all usable links, accumulating equal-cost
// first hops. Overloaded nodes don't carry transit traffic: their
// outgoing edges are never relaxed, but they remain valid destinations.
// `excluded` removes one link from the graph (used by the k-shortest
// computation).
pub(crate) fn run_spf(
    ls: &LinkState,
    src: NodeId,
    excluded: Option<LinkId>,
) -> BTreeMap<NodeId, Vertex> {
    let mut result = BTreeMap::new();
    let mut queue = BinaryHeap::new();

    result.insert(src, Vertex::default());
    queue.push(Reverse((0, src)));

    while let Some(Reverse((distance, u))) = queue.pop() {
        if distance > result[&u].metric {
            continue;
        }
        if u != src && ls.adj_dbs.get(&u).is_some_and(|db| db.overloaded) {
            continue;
        }
        let Some(links) = ls.node_links.get(&u) else {
            continue;
        };
        for &lid in links {
            if Some(lid) == excluded {
                continue;
            }
            let link = &ls.links[&lid];
            if !link.is_up() {
                continue;
            }
            let v = link.other(u);
            let new_distance = distance.saturating_add(link.metric());

            // First hops toward `v` through `u`: `v` itself when `u` is
            // the source, `u`'s first hops otherwise.
            let first_hops = if u == src {
                std::iter::once(v).collect()
            } else {
                result[&u].next_hops.clone()
            };

            match result.get_mut(&v) {
                Some(vertex) => {
                    if new_distance < vertex.metric {
                        vertex.metric = new_distance;
                        vertex.next_hops = first_hops;
                        queue.push(Reverse((new_distance, v)));
                    } else if new_distance == vertex.metric {
                        vertex.next_hops.extend(first_hops);
                    }
                }
                None => {
                    result.insert(
                        v,
                        Vertex {
                            metric: new_distance,
                            next_hops: first_hops,
                        },
                    );
                    queue.push(Reverse((new_distance, v)));
                }
            }
        }
    }

    result
}

// Breadth-first hop counts from `src` over all usable links, used by the
// ordered-FIB hold TTL computation.
pub(crate) fn run_hops(
    ls: &LinkState,
    src: NodeId,
) -> BTreeMap<NodeId, u32> {
    let mut hops = BTreeMap::new();
    let mut frontier = vec![src];
    hops.insert(src, 0);

    let mut distance = 0;
    while !frontier.is_empty() {
        distance += 1;
        let mut next_frontier = Vec::new();
        for u in frontier {
            for &lid in ls.node_links.get(&u).into_iter().flatten() {
                let link = &ls.links[&lid];
                if !link.is_up() {
                    continue;
                }
                let v = link.other(u);
                if !hops.contains_key(&v) {
                    hops.insert(v, distance);
                    next_frontier.push(v);
                }
            }
        }
        frontier = next_frontier;
    }

    hops
}

// K-shortest paths, k in {1, 2}.
//
// k=1 enumerates every equal-cost shortest path. k=2 is Yen's algorithm
// restricted to the second rank: each shortest-path edge is removed in
// turn, SPF re-run, and the globally cheapest alternatives kept.
pub(crate) fn kth_paths(
    ls: &LinkState,
    src: NodeId,
    dst: NodeId,
    k: usize,
) -> Vec<Path> {
    match k {
        1 => shortest_paths(ls, src, dst, None),
        2 => second_shortest_paths(ls, src, dst),
        _ => Vec::new(),
    }
}

// Sum of the effective link metrics along a path.
pub fn path_cost(ls: &LinkState, path: &Path) -> u32 {
    path.iter()
        .fold(0, |cost, lid| cost.saturating_add(ls.link(*lid).metric()))
}

// Returns whether `a` appears in `b` as a contiguous link subsequence.
pub fn path_a_in_path_b(a: &Path, b: &Path) -> bool {
    !a.is_empty() && b.windows(a.len()).any(|window| window == a.as_slice())
}

// ===== helper functions =====

// All equal-cost shortest paths from src to dst, enumerated by walking
// the predecessor DAG of the SPF result backwards.
fn shortest_paths(
    ls: &LinkState,
    src: NodeId,
    dst: NodeId,
    excluded: Option<LinkId>,
) -> Vec<Path> {
    if src == dst {
        return Vec::new();
    }
    let spf = run_spf(ls, src, excluded);
    if !spf.contains_key(&dst) {
        return Vec::new();
    }

    let mut paths = Vec::new();
    let mut stack = Vec::new();
    backtrack(ls, &spf, src, dst, excluded, &mut stack, &mut paths);
    paths
}

fn backtrack(
    ls: &LinkState,
    spf: &BTreeMap<NodeId, Vertex>,
    src: NodeId,
    current: NodeId,
    excluded: Option<LinkId>,
    stack: &mut Vec<LinkId>,
    paths: &mut Vec<Path>,
) {
    if current == src {
        let mut path = stack.clone();
        path.reverse();
        paths.push(path);
        return;
    }

    let current_metric = spf[&current].metric;
    for &lid in ls.node_links.get(&current).into_iter().flatten() {
        if Some(lid) == excluded {
            continue;
        }
        let link = &ls.links[&lid];
        if !link.is_up() {
            continue;
        }
        let u = link.other(current);
        let Some(u_vertex) = spf.get(&u) else {
            continue;
        };
        // A predecessor must sit on a shortest path and be allowed to
        // carry transit traffic.
        if u != src && ls.adj_dbs.get(&u).is_some_and(|db| db.overloaded) {
            continue;
        }
        if u_vertex.metric.saturating_add(link.metric()) != current_metric {
            continue;
        }
        stack.push(lid);
        backtrack(ls, spf, src, u, excluded, stack, paths);
        stack.pop();
    }
}

fn second_shortest_paths(
    ls: &LinkState,
    src: NodeId,
    dst: NodeId,
) -> Vec<Path> {
    let first = shortest_paths(ls, src, dst, None);
    if first.is_empty() {
        return Vec::new();
    }

    let removal_candidates = first
        .iter()
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>();

    let mut best_cost = u32::MAX;
    let mut candidates = BTreeSet::new();
    for &lid in &removal_candidates {
        for alternative in shortest_paths(ls, src, dst, Some(lid)) {
            if first.contains(&alternative) {
                continue;
            }
            let cost = path_cost(ls, &alternative);
            if cost < best_cost {
                best_cost = cost;
                candidates.clear();
            }
            if cost == best_cost {
                candidates.insert(alternative);
            }
        }
    }

    candidates.into_iter().collect()
}
