//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::time::Instant;

use arbor_utils::counters::Counters;
use arbor_utils::ip::{AddressFamily, IpAddrExt, IpNetworkExt};
use arbor_utils::mpls::{Label, MplsAction};
use ipnetwork::IpNetwork;
use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::graph::LinkState;
use crate::lsdb::{
    ForwardingAlgorithm, ForwardingType, PrefixEntry, PrefixType,
};
use crate::metric_vector::{
    self, CompareResult, CompareType, IGP_COST_ENTITY_PRIORITY,
    IGP_COST_ENTITY_TYPE, MetricEntity, MetricVector,
};
use crate::prefixes::PrefixState;
use crate::route::{
    Nexthop, RibMplsEntry, RibUnicastEntry, RouteDatabaseDelta, RouteDb,
    StaticRoutes,
};
use crate::spf;

// Best-path and route assembly engine.
#[derive(Debug)]
pub struct SpfSolver {
    my_node: String,
    enable_v4: bool,
    compute_lfa_paths: bool,
    bgp_dry_run: bool,
    bgp_use_igp_metric: bool,
    static_routes: StaticRoutes,
    static_route_updates: Vec<RouteDatabaseDelta>,
    counters: Counters,
}

// Outcome of destination-set selection for one prefix.
#[derive(Debug, Default)]
struct BestPathResult {
    nodes: BTreeSet<String>,
    best_node: Option<String>,
    best_igp_metric: Option<u32>,
}

// ===== impl SpfSolver =====

impl SpfSolver {
    pub fn new(config: &Config, counters: Counters) -> SpfSolver {
        SpfSolver {
            my_node: config.node_name.clone(),
            enable_v4: config.enable_v4,
            compute_lfa_paths: config.compute_lfa_paths,
            bgp_dry_run: config.bgp_dry_run,
            bgp_use_igp_metric: config.bgp_use_igp_metric,
            static_routes: Default::default(),
            static_route_updates: Default::default(),
            counters,
        }
    }

    // ===== static MPLS routes =====

    pub fn static_routes(&self) -> &StaticRoutes {
        &self.static_routes
    }

    pub fn static_routes_updated(&self) -> bool {
        !self.static_route_updates.is_empty()
    }

    pub fn push_static_routes_delta(&mut self, delta: RouteDatabaseDelta) {
        self.static_route_updates.push(delta);
    }

    // Squashes the accumulated static-route deltas monotonically: the
    // latest update for a label wins, and updates and deletes of the same
    // label cancel each other.
    pub fn process_static_route_updates(
        &mut self,
    ) -> Option<RouteDatabaseDelta> {
        let mut to_update = BTreeMap::new();
        let mut to_delete = BTreeSet::new();
        for delta in std::mem::take(&mut self.static_route_updates) {
            for route in delta.mpls_routes_to_update {
                to_delete.remove(&route.label);
                to_update.insert(route.label, route);
            }
            for label in delta.mpls_routes_to_delete {
                to_update.remove(&label);
                to_delete.insert(label);
            }
        }
        if to_update.is_empty() && to_delete.is_empty() {
            return None;
        }

        let mut delta = RouteDatabaseDelta {
            node: self.my_node.clone(),
            ..Default::default()
        };
        for (label, route) in to_update {
            self.static_routes
                .mpls_routes
                .insert(label, route.nexthops.clone());
            delta.mpls_routes_to_update.push(route);
        }
        for label in to_delete {
            self.static_routes.mpls_routes.remove(&label);
            delta.mpls_routes_to_delete.push(label);
        }
        Some(delta)
    }

    // ===== route computation =====

    // Builds the route database from the perspective of `my_node`, using
    // the per-area graph and the global prefix view. Returns `None` when
    // the node isn't part of the graph.
    pub fn build_route_db(
        &self,
        my_node: &str,
        link_state: &mut LinkState,
        prefix_state: &PrefixState,
    ) -> Option<RouteDb> {
        if !link_state.has_node(my_node) {
            return None;
        }

        let start_time = Instant::now();
        self.counters.increment("decision.route_build_runs");

        let mut route_db = RouteDb::default();

        // Unicast best paths: IP and IP-to-MPLS routes.
        for (prefix, node_prefixes) in prefix_state.prefixes() {
            let mut has_bgp = false;
            let mut has_non_bgp = false;
            let mut missing_mv = false;
            let mut has_sp_ecmp = false;
            for (node, entry) in node_prefixes {
                let is_bgp = entry.prefix_type == PrefixType::Bgp;
                has_bgp |= is_bgp;
                has_non_bgp |= !is_bgp;
                if is_bgp && entry.metric_vector.is_none() {
                    missing_mv = true;
                    Error::MissingMetricVector(*prefix, node.clone()).log();
                }
                has_sp_ecmp |= entry.forwarding_algorithm
                    == ForwardingAlgorithm::SpEcmp;
            }

            // Skip BGP prefixes with inconsistent advertisements.
            if has_bgp {
                if has_non_bgp {
                    Error::MixedPrefixTypes(*prefix).log();
                    self.counters.increment("decision.skipped_unicast_route");
                    continue;
                }
                if missing_mv {
                    self.counters.increment("decision.skipped_unicast_route");
                    continue;
                }
            }

            // Don't route to self-advertised prefixes.
            if node_prefixes.contains_key(my_node) && !has_bgp {
                continue;
            }

            let is_v4 = prefix.address_family() == AddressFamily::Ipv4;
            if is_v4 && !self.enable_v4 {
                Error::V4PrefixDisabled(*prefix).log();
                self.counters.increment("decision.skipped_unicast_route");
                continue;
            }

            if has_sp_ecmp && has_bgp {
                self.select_ecmp_bgp(
                    &mut route_db.unicast,
                    my_node,
                    *prefix,
                    node_prefixes,
                    is_v4,
                    link_state,
                    prefix_state,
                );
            } else if has_sp_ecmp {
                self.select_ecmp_openr(
                    &mut route_db.unicast,
                    my_node,
                    *prefix,
                    node_prefixes,
                    is_v4,
                    link_state,
                );
            } else {
                let Some(best) = self.best_announcing_nodes(
                    my_node,
                    *prefix,
                    node_prefixes,
                    has_bgp,
                    true,
                    link_state,
                ) else {
                    continue;
                };
                if best.nodes.is_empty() {
                    continue;
                }
                self.select_ksp2(
                    &mut route_db.unicast,
                    *prefix,
                    my_node,
                    &best,
                    node_prefixes,
                    has_bgp,
                    is_v4,
                    link_state,
                    prefix_state,
                );
            }
        }

        // MPLS routes for all node labels.
        self.build_node_label_routes(&mut route_db, my_node, link_state);

        // MPLS routes for the local adjacency labels.
        self.build_adj_label_routes(&mut route_db, my_node, link_state);

        let elapsed = start_time.elapsed();
        debug!(elapsed_ms = elapsed.as_millis() as u64, "route build done");
        self.counters
            .add("decision.route_build_ms", elapsed.as_millis() as u64);
        Some(route_db)
    }

    // ===== helpers: unicast route selection =====

    // Plain equal-cost shortest-path selection over all advertisers.
    fn select_ecmp_openr(
        &self,
        unicast: &mut BTreeMap<IpNetwork, RibUnicastEntry>,
        my_node: &str,
        prefix: IpNetwork,
        node_prefixes: &BTreeMap<String, PrefixEntry>,
        is_v4: bool,
        link_state: &mut LinkState,
    ) {
        let Some(best) = self.best_announcing_nodes(
            my_node,
            prefix,
            node_prefixes,
            false,
            false,
            link_state,
        ) else {
            return;
        };

        let per_destination =
            prefix_forwarding_type(node_prefixes) == ForwardingType::SrMpls;

        let (min_metric, nexthop_nodes) = self.get_next_hops_with_metric(
            my_node,
            &best.nodes,
            per_destination,
            link_state,
        );
        if nexthop_nodes.is_empty() {
            warn!(%prefix, advertised_by = %best.nodes.iter().join(", "),
                "no route to prefix");
            self.counters.increment("decision.no_route_to_prefix");
            return;
        }

        let mut entry = RibUnicastEntry::new(prefix);
        entry.nexthops = self.materialize_nexthops(
            my_node,
            &best.nodes,
            is_v4,
            per_destination,
            min_metric,
            &nexthop_nodes,
            None,
            link_state,
        );
        unicast.insert(prefix, entry);
    }

    // BGP best-path selection followed by shortest-path next-hop
    // resolution toward the winning advertisers.
    #[allow(clippy::too_many_arguments)]
    fn select_ecmp_bgp(
        &self,
        unicast: &mut BTreeMap<IpNetwork, RibUnicastEntry>,
        my_node: &str,
        prefix: IpNetwork,
        node_prefixes: &BTreeMap<String, PrefixEntry>,
        is_v4: bool,
        link_state: &mut LinkState,
        prefix_state: &PrefixState,
    ) {
        let Some(best) = self.best_announcing_nodes(
            my_node,
            prefix,
            node_prefixes,
            true,
            false,
            link_state,
        ) else {
            return;
        };
        if best.nodes.is_empty() {
            Error::NoRouteToPrefix(prefix).log();
            self.counters.increment("decision.no_route_to_prefix");
            return;
        }
        let Some(best_node) = &best.best_node else {
            return;
        };

        let mut best_vias = prefix_state.get_loopback_vias(
            [best_node],
            is_v4,
            best.best_igp_metric,
        );
        if best_vias.len() != 1 {
            self.counters.increment("decision.missing_loopback_addr");
            Error::MissingLoopbackAddr(prefix, best_node.clone()).log();
            return;
        }

        let (min_metric, nexthop_nodes) = self.get_next_hops_with_metric(
            my_node,
            &best.nodes,
            false,
            link_state,
        );

        let mut entry = RibUnicastEntry::new(prefix);
        entry.nexthops = self.materialize_nexthops(
            my_node,
            &best.nodes,
            is_v4,
            false,
            min_metric,
            &nexthop_nodes,
            None,
            link_state,
        );
        entry.best_prefix_entry = node_prefixes.get(best_node).cloned();
        entry.do_not_install = self.bgp_dry_run;
        entry.best_nexthop = best_vias.pop();
        unicast.insert(prefix, entry);
    }

    // Shortest plus filtered second-shortest paths with MPLS label
    // stacking, for edge-disjoint ECMP.
    #[allow(clippy::too_many_arguments)]
    fn select_ksp2(
        &self,
        unicast: &mut BTreeMap<IpNetwork, RibUnicastEntry>,
        prefix: IpNetwork,
        my_node: &str,
        best: &BestPathResult,
        node_prefixes: &BTreeMap<String, PrefixEntry>,
        has_bgp: bool,
        is_v4: bool,
        link_state: &mut LinkState,
        prefix_state: &PrefixState,
    ) {
        let mut self_node_contained = false;

        // Shortest paths toward each destination node.
        let mut paths = Vec::new();
        for node in &best.nodes {
            if node == my_node {
                self_node_contained = true;
                continue;
            }
            paths.extend(link_state.kth_paths(my_node, node, 1));
        }

        // Second-shortest paths, rejecting any that contain a shortest
        // path as a contiguous sub-path (anti-double-spray).
        let first_paths_len = paths.len();
        for node in &best.nodes {
            if node == my_node {
                continue;
            }
            for sec_path in link_state.kth_paths(my_node, node, 2) {
                if paths[..first_paths_len].iter().any(|first_path| {
                    spf::path_a_in_path_b(first_path, &sec_path)
                }) {
                    continue;
                }
                paths.push(sec_path);
            }
        }

        if paths.is_empty() {
            return;
        }

        let my_id = link_state.node_id(my_node).unwrap();
        let mut entry = RibUnicastEntry::new(prefix);
        for path in &paths {
            // Walk the path accumulating the cost and the node label of
            // every traversed node.
            let mut cost = 0u32;
            let mut labels = Vec::new();
            let mut node_id = my_id;
            for &lid in path {
                let link = link_state.link(lid);
                cost = cost.saturating_add(link.metric());
                node_id = link.other(node_id);
                let node_name = link_state.node_name(node_id);
                labels.push(
                    link_state
                        .adjacency_database(node_name)
                        .map(|db| db.node_label)
                        .unwrap_or(0),
                );
            }
            let dst_node = link_state.node_name(node_id).to_owned();

            // Label stack, bottom first: the destination's prepend label
            // (if any), then the traversed node labels from destination
            // down to the second hop. The first hop's label is left out
            // (penultimate-hop popping). Labels are stacked exactly as
            // advertised, truncated to the 20-bit label field.
            let mut stack = Vec::new();
            if let Some(prepend_label) = node_prefixes
                .get(&dst_node)
                .and_then(|entry| entry.prepend_label)
            {
                stack.push(Label::new(prepend_label & Label::VALUE_MASK));
            }
            for &node_label in labels[1..].iter().rev() {
                stack.push(Label::new(node_label & Label::VALUE_MASK));
            }
            let mpls_action =
                (!stack.is_empty()).then(|| MplsAction::Push(stack));

            let first_link = link_state.link(path[0]);
            let addr = if is_v4 {
                IpAddr::V4(first_link.nh_v4_from(my_id))
            } else {
                IpAddr::V6(first_link.nh_v6_from(my_id))
            };
            entry.nexthops.insert(Nexthop::new(
                addr,
                Some(first_link.ifname_from(my_id).to_owned()),
                cost,
                mpls_action,
                true,
                Some(link_state.area().to_owned()),
            ));
        }

        // Anycast advertised by the local node too: merge the next-hops
        // of the local prepend label's static MPLS route at cost zero.
        let mut static_nexthops = 0u64;
        if self_node_contained
            && let Some(label) = node_prefixes
                .get(my_node)
                .and_then(|entry| entry.prepend_label)
                .map(|label| Label::new(label & Label::VALUE_MASK))
        {
            match self.static_routes.mpls_routes.get(&label) {
                Some(nexthops) => {
                    for nexthop in nexthops {
                        if entry.nexthops.insert(Nexthop::new(
                            nexthop.addr,
                            None,
                            0,
                            None,
                            true,
                            None,
                        )) {
                            static_nexthops += 1;
                        }
                    }
                }
                None => Error::MissingStaticNexthops(label.get()).log(),
            }
        }

        // Enforce the per-prefix minimum next-hop threshold over the
        // dynamic (non-static) next-hops.
        let min_nexthop = best
            .nodes
            .iter()
            .filter_map(|node| {
                node_prefixes.get(node).and_then(|entry| entry.min_nexthop)
            })
            .max();
        let dynamic_nexthops =
            entry.nexthops.len() as u64 - static_nexthops;
        if let Some(threshold) = min_nexthop
            && threshold > dynamic_nexthops
        {
            warn!(%prefix, %dynamic_nexthops, %threshold,
                "dropping route, not enough next-hops");
            return;
        }

        if has_bgp
            && let Some(best_node) = &best.best_node
        {
            let mut best_vias = prefix_state.get_loopback_vias(
                [best_node],
                is_v4,
                best.best_igp_metric,
            );
            if best_vias.len() == 1 {
                entry.best_nexthop = best_vias.pop();
                entry.best_prefix_entry =
                    node_prefixes.get(best_node).cloned();
                entry.do_not_install = self.bgp_dry_run;
            }
        }

        unicast.insert(prefix, entry);
    }

    // ===== helpers: destination-set selection =====

    // Resolves which advertising nodes are eligible destinations for a
    // prefix.
    fn best_announcing_nodes(
        &self,
        my_node: &str,
        prefix: IpNetwork,
        node_prefixes: &BTreeMap<String, PrefixEntry>,
        has_bgp: bool,
        use_ksp2: bool,
        link_state: &mut LinkState,
    ) -> Option<BestPathResult> {
        // KSP2 requires every advertiser to use SR-MPLS forwarding.
        if use_ksp2 {
            for (node, entry) in node_prefixes {
                if entry.forwarding_type != ForwardingType::SrMpls {
                    Error::IncompatibleForwardingType(prefix, node.clone())
                        .log();
                    self.counters
                        .increment("decision.incompatible_forwarding_type");
                    return None;
                }
            }
        }

        // Without BGP, all advertisers are best nodes.
        if !has_bgp {
            let mut result = BestPathResult::default();
            for node in node_prefixes.keys() {
                if node == my_node {
                    return None;
                }
                result.nodes.insert(node.clone());
            }
            return Some(self.maybe_filter_drained_nodes(result, link_state));
        }

        let Some(result) = self.run_best_path_selection_bgp(
            my_node,
            prefix,
            node_prefixes,
            link_state,
        ) else {
            warn!(%prefix, "no route to BGP prefix");
            self.counters.increment("decision.no_route_to_prefix");
            return None;
        };

        if !use_ksp2 {
            // Don't program a BGP prefix whose best path is self.
            if result.nodes.contains(my_node) {
                debug!(%prefix, "best path originated by self");
                return None;
            }
            return Some(self.maybe_filter_drained_nodes(result, link_state));
        }

        // With KSP2, a self-originated anycast prefix is still programmed
        // when the local node carries a prepend label and other
        // advertisers exist.
        let label_exists_for_me = node_prefixes
            .get(my_node)
            .is_some_and(|entry| entry.prepend_label.is_some());
        if !result.nodes.contains(my_node)
            || (result.nodes.len() > 1 && label_exists_for_me)
        {
            return Some(self.maybe_filter_drained_nodes(result, link_state));
        }
        debug!(%prefix, "best path originated by self");
        None
    }

    // BGP-style best-path selection over the reachable advertisers,
    // optionally augmenting each metric vector with the IGP cost.
    fn run_best_path_selection_bgp(
        &self,
        my_node: &str,
        prefix: IpNetwork,
        node_prefixes: &BTreeMap<String, PrefixEntry>,
        link_state: &mut LinkState,
    ) -> Option<BestPathResult> {
        let spf_result = link_state.spf_result(my_node);

        let mut nodes = BTreeSet::new();
        let mut best_node = None;
        let mut best_vector: Option<MetricVector> = None;
        let mut best_igp_metric = None;
        for (node, prefix_entry) in node_prefixes {
            // Skip unreachable advertisers.
            let Some(spf_node) = spf_result.get(node) else {
                debug!(%node, "skipping unreachable advertiser");
                continue;
            };
            let Some(mut metric_vector) = prefix_entry.metric_vector.clone()
            else {
                continue;
            };

            // The IGP-cost entity is owned by the decision engine.
            if metric_vector.contains_entity_type(IGP_COST_ENTITY_TYPE) {
                Error::UnexpectedIgpCostEntity(prefix, node.clone()).log();
                continue;
            }

            if self.bgp_use_igp_metric {
                let igp_metric = spf_node.metric;
                if best_igp_metric
                    .is_none_or(|best_metric| best_metric > igp_metric)
                {
                    best_igp_metric = Some(igp_metric);
                }
                // Lowest IGP cost wins, hence the negation.
                metric_vector.metrics.push(MetricEntity {
                    entity_type: IGP_COST_ENTITY_TYPE,
                    priority: IGP_COST_ENTITY_PRIORITY,
                    op: CompareType::WinIfNotPresent,
                    is_best_path_tie_breaker: false,
                    metric: vec![-(igp_metric as i64)],
                });
            }

            let result = match &best_vector {
                Some(best) => metric_vector::compare_metric_vectors(
                    &metric_vector,
                    best,
                ),
                None => CompareResult::Winner,
            };
            match result {
                CompareResult::Winner | CompareResult::TieWinner => {
                    if result == CompareResult::Winner {
                        nodes.clear();
                    }
                    best_vector = Some(metric_vector);
                    best_node = Some(node.clone());
                    nodes.insert(node.clone());
                }
                CompareResult::TieLooser => {
                    nodes.insert(node.clone());
                }
                CompareResult::Tie | CompareResult::Error => {
                    Error::BestPathSelectionFailed(prefix).log();
                    self.counters.increment("decision.errors");
                    return None;
                }
                CompareResult::Looser => (),
            }
        }

        Some(BestPathResult {
            nodes,
            best_node,
            best_igp_metric,
        })
    }

    // Drops overloaded destinations, unless that would leave none.
    fn maybe_filter_drained_nodes(
        &self,
        result: BestPathResult,
        link_state: &LinkState,
    ) -> BestPathResult {
        let filtered = result
            .nodes
            .iter()
            .filter(|node| !link_state.is_node_overloaded(node))
            .cloned()
            .collect::<BTreeSet<_>>();
        if filtered.is_empty() {
            result
        } else {
            BestPathResult {
                nodes: filtered,
                ..result
            }
        }
    }

    // ===== helpers: next-hop computation =====

    // The set of advertisers closest to `my_node`, with their distance.
    fn min_cost_nodes(
        spf_result: &crate::graph::SpfResult,
        dst_nodes: &BTreeSet<String>,
    ) -> (u32, BTreeSet<String>) {
        let mut shortest_metric = u32::MAX;
        let mut min_cost_nodes = BTreeSet::new();
        for dst_node in dst_nodes {
            let Some(spf_node) = spf_result.get(dst_node) else {
                continue;
            };
            if shortest_metric > spf_node.metric {
                shortest_metric = spf_node.metric;
                min_cost_nodes.clear();
            }
            if shortest_metric == spf_node.metric {
                min_cost_nodes.insert(dst_node.clone());
            }
        }
        (shortest_metric, min_cost_nodes)
    }

    // Returns the minimum metric toward the destination set and, per
    // (next-hop neighbor, destination tag), the remaining distance from
    // that neighbor. The destination tag is the destination node name
    // when `per_destination`, collapsed to "" otherwise. With LFA
    // enabled, loop-free alternate neighbors are added per RFC 5286.
    fn get_next_hops_with_metric(
        &self,
        my_node: &str,
        dst_nodes: &BTreeSet<String>,
        per_destination: bool,
        link_state: &mut LinkState,
    ) -> (u32, BTreeMap<(String, String), u32>) {
        let spf_from_here = link_state.spf_result(my_node);
        let (shortest_metric, min_cost_nodes) =
            Self::min_cost_nodes(&spf_from_here, dst_nodes);

        let mut nexthop_nodes = BTreeMap::new();
        if min_cost_nodes.is_empty() {
            return (shortest_metric, nexthop_nodes);
        }

        // Neighbors along a shortest path toward the closest advertisers.
        for dst_node in &min_cost_nodes {
            let dst_tag = if per_destination { dst_node.as_str() } else { "" };
            for neighbor in &spf_from_here[dst_node].next_hops {
                let Some(metric_to_neighbor) =
                    link_state.metric_from_a_to_b(my_node, neighbor)
                else {
                    continue;
                };
                nexthop_nodes.insert(
                    (neighbor.clone(), dst_tag.to_owned()),
                    shortest_metric - metric_to_neighbor,
                );
            }
        }

        // Neighbors offering a loop-free alternate toward any
        // destination.
        if self.compute_lfa_paths {
            let my_id = link_state.node_id(my_node).unwrap();
            let neighbors = link_state
                .links_from_node(my_node)
                .into_iter()
                .filter_map(|lid| {
                    let link = link_state.link(lid);
                    link.is_up().then(|| {
                        link_state.node_name(link.other(my_id)).to_owned()
                    })
                })
                .collect::<Vec<_>>();
            for neighbor in neighbors {
                let Some(metric_to_neighbor) =
                    link_state.metric_from_a_to_b(my_node, &neighbor)
                else {
                    continue;
                };
                let spf_from_neighbor = link_state.spf_result(&neighbor);
                for dst_node in dst_nodes {
                    let Some(my_distance) =
                        spf_from_here.get(dst_node).map(|node| node.metric)
                    else {
                        continue;
                    };
                    let Some(neighbor_distance) = spf_from_neighbor
                        .get(dst_node)
                        .map(|node| node.metric)
                    else {
                        continue;
                    };

                    // RFC 5286 loop-free criterion.
                    if neighbor_distance
                        < my_distance.saturating_add(metric_to_neighbor)
                    {
                        let key = (
                            neighbor.clone(),
                            if per_destination {
                                dst_node.clone()
                            } else {
                                String::new()
                            },
                        );
                        nexthop_nodes
                            .entry(key)
                            .and_modify(|metric| {
                                *metric =
                                    std::cmp::min(*metric, neighbor_distance)
                            })
                            .or_insert(neighbor_distance);
                    }
                }
            }
        }

        (shortest_metric, nexthop_nodes)
    }

    // Converts next-hop nodes into programmable next-hops over the local
    // links, attaching MPLS actions where required.
    #[allow(clippy::too_many_arguments)]
    fn materialize_nexthops(
        &self,
        my_node: &str,
        dst_nodes: &BTreeSet<String>,
        is_v4: bool,
        per_destination: bool,
        min_metric: u32,
        nexthop_nodes: &BTreeMap<(String, String), u32>,
        swap_label: Option<Label>,
        link_state: &LinkState,
    ) -> BTreeSet<Nexthop> {
        debug_assert!(!nexthop_nodes.is_empty());

        let mut nexthops = BTreeSet::new();
        let Some(my_id) = link_state.node_id(my_node) else {
            return nexthops;
        };

        let collapsed_tag = BTreeSet::from([String::new()]);
        let dst_tags = if per_destination { dst_nodes } else { &collapsed_tag };
        for lid in link_state.links_from_node(my_node) {
            let link = link_state.link(lid);
            let neighbor = link_state.node_name(link.other(my_id));
            for dst_tag in dst_tags {
                let Some(&metric_from_neighbor) = nexthop_nodes
                    .get(&(neighbor.to_owned(), dst_tag.clone()))
                else {
                    continue;
                };

                // Ignore held links.
                if !link.is_up() {
                    continue;
                }

                // Don't divert traffic through a co-destination.
                if !dst_tag.is_empty()
                    && dst_nodes.contains(neighbor)
                    && neighbor != dst_tag.as_str()
                {
                    continue;
                }

                // Without LFA, only next-hops on a shortest path qualify.
                let metric_over_link =
                    link.metric().saturating_add(metric_from_neighbor);
                if !self.compute_lfa_paths && metric_over_link != min_metric {
                    continue;
                }

                let mut mpls_action = None;
                if let Some(swap_label) = swap_label {
                    mpls_action = Some(if dst_nodes.contains(neighbor) {
                        MplsAction::Php
                    } else {
                        MplsAction::Swap(swap_label)
                    });
                }

                // Per-destination paths through an intermediate node push
                // the destination's node label.
                if !dst_tag.is_empty() && dst_tag.as_str() != neighbor {
                    let Some(label) = link_state
                        .adjacency_database(dst_tag)
                        .and_then(|db| Label::checked(db.node_label))
                    else {
                        continue;
                    };
                    debug_assert!(mpls_action.is_none());
                    mpls_action = Some(MplsAction::Push(vec![label]));
                }

                let addr = if is_v4 {
                    IpAddr::V4(link.nh_v4_from(my_id))
                } else {
                    IpAddr::V6(link.nh_v6_from(my_id))
                };
                nexthops.insert(Nexthop::new(
                    addr,
                    Some(link.ifname_from(my_id).to_owned()),
                    metric_over_link,
                    mpls_action,
                    false,
                    Some(link_state.area().to_owned()),
                ));
            }
        }
        nexthops
    }

    // ===== helpers: MPLS label routes =====

    // Node-label routes: POP_AND_LOOKUP for the local label, SWAP/PHP
    // toward every other node. Duplicate labels resolve in favor of the
    // lexicographically larger node name.
    fn build_node_label_routes(
        &self,
        route_db: &mut RouteDb,
        my_node: &str,
        link_state: &mut LinkState,
    ) {
        let node_labels = link_state
            .adjacency_databases()
            .map(|db| (db.node.clone(), db.node_label))
            .collect::<Vec<_>>();

        let mut label_to_node = BTreeMap::<Label, (String, RibMplsEntry)>::new();
        for (node, top_label) in node_labels {
            // An unset label means the node doesn't run SR.
            if top_label == 0 {
                continue;
            }
            let Some(label) = Label::checked(top_label) else {
                Error::InvalidNodeLabel(node, top_label).log();
                self.counters.increment("decision.skipped_mpls_route");
                continue;
            };

            // Label collisions can happen transiently when segmented
            // networks join; the bigger node name keeps the label.
            if let Some((owner, _)) = label_to_node.get(&label) {
                info!(%label, first = %owner, second = %node,
                    "duplicate node label");
                self.counters.increment("decision.duplicate_node_label");
                if *owner > node {
                    continue;
                }
            }

            if node == my_node {
                let nexthop = Nexthop::new(
                    IpAddr::unspecified(AddressFamily::Ipv6),
                    None,
                    0,
                    Some(MplsAction::PopAndLookup),
                    false,
                    None,
                );
                label_to_node.insert(
                    label,
                    (
                        node,
                        RibMplsEntry::new(label, BTreeSet::from([nexthop])),
                    ),
                );
                continue;
            }

            let dst_nodes = BTreeSet::from([node.clone()]);
            let (min_metric, nexthop_nodes) = self
                .get_next_hops_with_metric(
                    my_node,
                    &dst_nodes,
                    false,
                    link_state,
                );
            if nexthop_nodes.is_empty() {
                Error::NoRouteToLabel(node, top_label).log();
                self.counters.increment("decision.no_route_to_label");
                continue;
            }
            let nexthops = self.materialize_nexthops(
                my_node,
                &dst_nodes,
                false,
                false,
                min_metric,
                &nexthop_nodes,
                Some(label),
                link_state,
            );
            label_to_node
                .insert(label, (node, RibMplsEntry::new(label, nexthops)));
        }

        for (label, (_, entry)) in label_to_node {
            route_db.mpls.insert(label, entry);
        }
    }

    // Adjacency-label routes: a single PHP next-hop over the link.
    fn build_adj_label_routes(
        &self,
        route_db: &mut RouteDb,
        my_node: &str,
        link_state: &LinkState,
    ) {
        let Some(my_id) = link_state.node_id(my_node) else {
            return;
        };
        for lid in link_state.links_from_node(my_node) {
            let link = link_state.link(lid);
            let top_label = link.adj_label_from(my_id);
            if top_label == 0 {
                continue;
            }
            let Some(label) = Label::checked(top_label) else {
                Error::InvalidAdjLabel(my_node.to_owned(), top_label).log();
                self.counters.increment("decision.skipped_mpls_route");
                continue;
            };
            let nexthop = Nexthop::new(
                IpAddr::V6(link.nh_v6_from(my_id)),
                Some(link.ifname_from(my_id).to_owned()),
                link.metric(),
                Some(MplsAction::Php),
                false,
                Some(link_state.area().to_owned()),
            );
            route_db
                .mpls
                .entry(label)
                .or_insert_with(|| {
                    RibMplsEntry::new(label, BTreeSet::from([nexthop]))
                });
        }
    }
}

// ===== helper functions =====

// The effective forwarding type of a prefix: SR-MPLS only when every
// advertiser agrees on it.
fn prefix_forwarding_type(
    node_prefixes: &BTreeMap<String, PrefixEntry>,
) -> ForwardingType {
    if node_prefixes
        .values()
        .all(|entry| entry.forwarding_type == ForwardingType::SrMpls)
    {
        ForwardingType::SrMpls
    } else {
        ForwardingType::Ip
    }
}
