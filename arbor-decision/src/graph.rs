//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Instant;

use arbor_utils::counters::Counters;

use crate::lsdb::AdjacencyDatabase;
use crate::spf;

// Interned node identifier, an index into the name table.
pub type NodeId = usize;

// Link identifier: the ordered pair of its endpoint node IDs. Links are
// unique per node pair.
pub type LinkId = (NodeId, NodeId);

// SPF result from one source: per-destination distance and first-hop
// neighbor set.
pub type SpfResult = BTreeMap<String, SpfNode>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpfNode {
    pub metric: u32,
    pub next_hops: BTreeSet<String>,
}

// One direction of a link, as advertised by the adjacency database of the
// node on that side.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkSide {
    pub ifname: String,
    pub nh_v4: Ipv4Addr,
    pub nh_v6: Ipv6Addr,
    pub metric: u32,
    pub adj_label: u32,
}

// Hold timer state used for ordered FIB programming. A link being brought
// up is visible but not usable until its TTL expires; a link being
// brought down stays usable until its TTL expires.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkHold {
    Up(u32),
    Down(u32),
}

// Bidirectional link. Exists only while both endpoints advertise a
// matching adjacency.
#[derive(Clone, Debug)]
pub struct Link {
    id: LinkId,
    // sides[0] is advertised by id.0, sides[1] by id.1.
    sides: [LinkSide; 2],
    hold: Option<LinkHold>,
}

// Summary of an adjacency database mutation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LinkStateChange {
    pub topology_changed: bool,
    pub link_attributes_changed: bool,
    pub node_label_changed: bool,
}

// Per-area link-state graph with cached SPF results.
#[derive(Debug)]
pub struct LinkState {
    area: String,
    counters: Counters,
    // Interned node names. IDs are never reused.
    pub(crate) names: Vec<String>,
    ids: BTreeMap<String, NodeId>,
    pub(crate) adj_dbs: BTreeMap<NodeId, AdjacencyDatabase>,
    pub(crate) links: BTreeMap<LinkId, Link>,
    pub(crate) node_links: BTreeMap<NodeId, BTreeSet<LinkId>>,
    spf_cache: BTreeMap<NodeId, Arc<SpfResult>>,
}

// ===== impl Link =====

impl Link {
    pub fn endpoints(&self) -> LinkId {
        self.id
    }

    pub fn other(&self, node: NodeId) -> NodeId {
        if node == self.id.0 { self.id.1 } else { self.id.0 }
    }

    pub(crate) fn side_from(&self, node: NodeId) -> &LinkSide {
        if node == self.id.0 { &self.sides[0] } else { &self.sides[1] }
    }

    // Effective metric: the max of the two advertised directions.
    pub fn metric(&self) -> u32 {
        std::cmp::max(self.sides[0].metric, self.sides[1].metric)
    }

    // A link in hold-up is visible but may not carry traffic yet.
    pub fn is_up(&self) -> bool {
        !matches!(self.hold, Some(LinkHold::Up(_)))
    }

    pub fn hold(&self) -> Option<LinkHold> {
        self.hold
    }

    pub fn ifname_from(&self, node: NodeId) -> &str {
        &self.side_from(node).ifname
    }

    pub fn nh_v4_from(&self, node: NodeId) -> Ipv4Addr {
        self.side_from(node).nh_v4
    }

    pub fn nh_v6_from(&self, node: NodeId) -> Ipv6Addr {
        self.side_from(node).nh_v6
    }

    pub fn adj_label_from(&self, node: NodeId) -> u32 {
        self.side_from(node).adj_label
    }
}

// ===== impl LinkStateChange =====

impl LinkStateChange {
    pub fn needs_route_update(&self) -> bool {
        self.topology_changed
            || self.link_attributes_changed
            || self.node_label_changed
    }
}

// ===== impl LinkState =====

impl LinkState {
    pub fn new(area: String, counters: Counters) -> LinkState {
        LinkState {
            area,
            counters,
            names: Default::default(),
            ids: Default::default(),
            adj_dbs: Default::default(),
            links: Default::default(),
            node_links: Default::default(),
            spf_cache: Default::default(),
        }
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.ids.get(name).copied()
    }

    pub fn node_name(&self, id: NodeId) -> &str {
        &self.names[id]
    }

    // A node exists once it advertises an adjacency database.
    pub fn has_node(&self, name: &str) -> bool {
        self.node_id(name)
            .is_some_and(|id| self.adj_dbs.contains_key(&id))
    }

    pub fn is_node_overloaded(&self, name: &str) -> bool {
        self.node_id(name)
            .and_then(|id| self.adj_dbs.get(&id))
            .is_some_and(|db| db.overloaded)
    }

    pub fn adjacency_databases(
        &self,
    ) -> impl Iterator<Item = &AdjacencyDatabase> {
        self.adj_dbs.values()
    }

    pub fn adjacency_database(
        &self,
        name: &str,
    ) -> Option<&AdjacencyDatabase> {
        self.node_id(name).and_then(|id| self.adj_dbs.get(&id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.adj_dbs.values().map(|db| db.node.as_str())
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[&id]
    }

    // All links incident to the node, including held ones.
    pub fn links_from_node(&self, name: &str) -> Vec<LinkId> {
        self.node_id(name)
            .and_then(|id| self.node_links.get(&id))
            .map(|links| links.iter().copied().collect())
            .unwrap_or_default()
    }

    // Effective metric of the direct usable link between two nodes.
    pub fn metric_from_a_to_b(&self, a: &str, b: &str) -> Option<u32> {
        let a = self.node_id(a)?;
        let b = self.node_id(b)?;
        let link = self.links.get(&link_id(a, b))?;
        link.is_up().then(|| link.metric())
    }

    // Hop count along the shortest hop-count path between two nodes.
    pub fn hops_from_a_to_b(&self, a: &str, b: &str) -> Option<u32> {
        let a = self.node_id(a)?;
        let b = self.node_id(b)?;
        spf::run_hops(self, a).get(&b).copied()
    }

    // Largest hop count from any node to the given node.
    pub fn max_hops_to_node(&self, name: &str) -> u32 {
        let Some(id) = self.node_id(name) else {
            return 0;
        };
        spf::run_hops(self, id).values().copied().max().unwrap_or(0)
    }

    pub fn has_holds(&self) -> bool {
        self.links.values().any(|link| link.hold.is_some())
    }

    // Replaces the node's adjacency database, recomputing the incident
    // links against the current advertisements of its peers. When the
    // hold TTLs are non-zero, added links start in hold-up and removed
    // links linger in hold-down.
    pub fn update_adjacency_database(
        &mut self,
        db: AdjacencyDatabase,
        hold_up_ttl: u32,
        hold_down_ttl: u32,
    ) -> LinkStateChange {
        let node_id = self.intern(&db.node);
        let mut change = LinkStateChange::default();

        match self.adj_dbs.get(&node_id) {
            Some(old) => {
                if old.node_label != db.node_label {
                    change.node_label_changed = true;
                }
                if old.overloaded != db.overloaded {
                    change.topology_changed = true;
                }
            }
            None => {
                if db.node_label != 0 {
                    change.node_label_changed = true;
                }
            }
        }

        // Build the set of links the new database forms with the current
        // peer advertisements. The first adjacency per peer wins.
        let mut desired = BTreeMap::new();
        for adj in &db.adjacencies {
            let peer_id = self.intern(&adj.other_node);
            if peer_id == node_id {
                continue;
            }
            let Some(peer_db) = self.adj_dbs.get(&peer_id) else {
                continue;
            };
            let Some(peer_adj) = peer_db
                .adjacencies
                .iter()
                .find(|peer_adj| peer_adj.other_node == db.node)
            else {
                continue;
            };
            let id = link_id(node_id, peer_id);
            if desired.contains_key(&id) {
                continue;
            }
            let node_side = LinkSide {
                ifname: adj.ifname.clone(),
                nh_v4: adj.nh_v4,
                nh_v6: adj.nh_v6,
                metric: adj.metric,
                adj_label: adj.adj_label,
            };
            let peer_side = LinkSide {
                ifname: peer_adj.ifname.clone(),
                nh_v4: peer_adj.nh_v4,
                nh_v6: peer_adj.nh_v6,
                metric: peer_adj.metric,
                adj_label: peer_adj.adj_label,
            };
            let sides = if id.0 == node_id {
                [node_side, peer_side]
            } else {
                [peer_side, node_side]
            };
            desired.insert(id, Link { id, sides, hold: None });
        }

        // Apply additions and side updates.
        for (id, new_link) in &desired {
            match self.links.get_mut(id) {
                Some(link) => {
                    if link.metric() != new_link.metric() {
                        change.topology_changed = true;
                    } else if link.sides != new_link.sides {
                        change.link_attributes_changed = true;
                    }
                    link.sides = new_link.sides.clone();
                    // A re-advertised link cancels a pending bring-down.
                    if matches!(link.hold, Some(LinkHold::Down(_))) {
                        link.hold = None;
                    }
                }
                None => {
                    let mut link = new_link.clone();
                    if hold_up_ttl > 0 {
                        link.hold = Some(LinkHold::Up(hold_up_ttl));
                    } else {
                        change.topology_changed = true;
                    }
                    self.insert_link(*id, link);
                }
            }
        }

        // Apply removals.
        let current = self
            .node_links
            .get(&node_id)
            .cloned()
            .unwrap_or_default();
        for id in current {
            if desired.contains_key(&id) {
                continue;
            }
            match self.links[&id].hold {
                // Held-up links were never usable.
                Some(LinkHold::Up(_)) => self.remove_link(id),
                Some(LinkHold::Down(_)) => (),
                None => {
                    if hold_down_ttl > 0 {
                        self.links.get_mut(&id).unwrap().hold =
                            Some(LinkHold::Down(hold_down_ttl));
                    } else {
                        self.remove_link(id);
                        change.topology_changed = true;
                    }
                }
            }
        }

        self.adj_dbs.insert(node_id, db);
        if change.topology_changed {
            self.spf_cache.clear();
        }
        change
    }

    // Removes a node and all of its links.
    pub fn delete_adjacency_database(
        &mut self,
        name: &str,
    ) -> LinkStateChange {
        let mut change = LinkStateChange::default();
        let Some(node_id) = self.node_id(name) else {
            return change;
        };
        if let Some(db) = self.adj_dbs.remove(&node_id)
            && db.node_label != 0
        {
            change.node_label_changed = true;
        }
        for id in self
            .node_links
            .get(&node_id)
            .cloned()
            .unwrap_or_default()
        {
            if self.links[&id].is_up() {
                change.topology_changed = true;
            }
            self.remove_link(id);
        }
        if change.topology_changed {
            self.spf_cache.clear();
        }
        change
    }

    // Monotonically decreases all hold TTLs. An expired hold-up makes the
    // link usable; an expired hold-down removes it.
    pub fn decrement_holds(&mut self) -> LinkStateChange {
        let mut change = LinkStateChange::default();
        let held = self
            .links
            .iter()
            .filter(|(_, link)| link.hold.is_some())
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        for id in held {
            match self.links[&id].hold.unwrap() {
                LinkHold::Up(ttl) => {
                    let link = self.links.get_mut(&id).unwrap();
                    if ttl <= 1 {
                        link.hold = None;
                        change.topology_changed = true;
                    } else {
                        link.hold = Some(LinkHold::Up(ttl - 1));
                    }
                }
                LinkHold::Down(ttl) => {
                    if ttl <= 1 {
                        self.remove_link(id);
                        change.topology_changed = true;
                    } else {
                        self.links.get_mut(&id).unwrap().hold =
                            Some(LinkHold::Down(ttl - 1));
                    }
                }
            }
        }
        if change.topology_changed {
            self.spf_cache.clear();
        }
        change
    }

    // Cached shortest-path computation from the given source.
    pub fn spf_result(&mut self, src: &str) -> Arc<SpfResult> {
        let Some(src_id) = self.node_id(src) else {
            return Arc::new(SpfResult::default());
        };
        if let Some(cached) = self.spf_cache.get(&src_id) {
            return cached.clone();
        }

        let start_time = Instant::now();
        let internal = spf::run_spf(self, src_id, None);
        let result = internal
            .into_iter()
            .map(|(id, node)| {
                let next_hops = node
                    .next_hops
                    .into_iter()
                    .map(|nh| self.names[nh].clone())
                    .collect();
                (
                    self.names[id].clone(),
                    SpfNode { metric: node.metric, next_hops },
                )
            })
            .collect::<SpfResult>();

        self.counters.increment("decision.spf_runs");
        self.counters.add(
            "decision.spf_ms",
            start_time.elapsed().as_millis() as u64,
        );

        let result = Arc::new(result);
        self.spf_cache.insert(src_id, result.clone());
        result
    }

    // K-shortest paths between two nodes, k in {1, 2}. Paths are ordered
    // link lists from src to dst.
    pub fn kth_paths(
        &mut self,
        src: &str,
        dst: &str,
        k: usize,
    ) -> Vec<spf::Path> {
        let (Some(src_id), Some(dst_id)) =
            (self.node_id(src), self.node_id(dst))
        else {
            return Vec::new();
        };
        let start_time = Instant::now();
        let paths = spf::kth_paths(self, src_id, dst_id, k);
        self.counters.add(
            "decision.path_build_ms",
            start_time.elapsed().as_millis() as u64,
        );
        paths
    }

    // ===== helpers =====

    fn intern(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        id
    }

    fn insert_link(&mut self, id: LinkId, link: Link) {
        self.links.insert(id, link);
        self.node_links.entry(id.0).or_default().insert(id);
        self.node_links.entry(id.1).or_default().insert(id);
    }

    fn remove_link(&mut self, id: LinkId) {
        self.links.remove(&id);
        if let Some(links) = self.node_links.get_mut(&id.0) {
            links.remove(&id);
        }
        if let Some(links) = self.node_links.get_mut(&id.1) {
            links.remove(&id);
        }
    }
}

// ===== global functions =====

pub fn link_id(a: NodeId, b: NodeId) -> LinkId {
    if a < b { (a, b) } else { (b, a) }
}
