//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use arbor_utils::mpls::{Label, MplsAction};
use derive_new::new;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::lsdb::{PerfEvents, PrefixEntry};

// Route nexthop.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct Nexthop {
    pub addr: IpAddr,
    pub ifname: Option<String>,
    pub metric: u32,
    pub mpls_action: Option<MplsAction>,
    // Set on paths longer than the shortest one (k-shortest and static
    // merges).
    pub non_shortest: bool,
    pub area: Option<String>,
    // Load-balancing weight, assigned by RIB policies. Zero means unset.
    #[new(default)]
    pub weight: u32,
}

// Unicast RIB entry.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RibUnicastEntry {
    pub prefix: IpNetwork,
    pub nexthops: BTreeSet<Nexthop>,
    // Winning advertisement, set for BGP-typed prefixes.
    pub best_prefix_entry: Option<PrefixEntry>,
    pub do_not_install: bool,
    pub best_nexthop: Option<Nexthop>,
}

// MPLS RIB entry.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct RibMplsEntry {
    pub label: Label,
    pub nexthops: BTreeSet<Nexthop>,
}

// Computed route database of one node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RouteDb {
    pub unicast: BTreeMap<IpNetwork, RibUnicastEntry>,
    pub mpls: BTreeMap<Label, RibMplsEntry>,
}

// Statically programmed MPLS routes, merged into KSP2 anycast entries.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct StaticRoutes {
    pub mpls_routes: BTreeMap<Label, BTreeSet<Nexthop>>,
}

// Introspection form of the route database.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteDatabase {
    pub node: String,
    pub unicast_routes: Vec<RibUnicastEntry>,
    pub mpls_routes: Vec<RibMplsEntry>,
}

// Incremental route update pushed toward the FIB programmer. Also the
// shape of static-route deltas received from the prefix manager.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteDatabaseDelta {
    pub node: String,
    pub unicast_routes_to_update: Vec<RibUnicastEntry>,
    pub unicast_routes_to_delete: Vec<IpNetwork>,
    pub mpls_routes_to_update: Vec<RibMplsEntry>,
    pub mpls_routes_to_delete: Vec<Label>,
    pub perf_events: Option<PerfEvents>,
}

// ===== impl RibUnicastEntry =====

impl RibUnicastEntry {
    pub fn new(prefix: IpNetwork) -> RibUnicastEntry {
        RibUnicastEntry {
            prefix,
            nexthops: Default::default(),
            best_prefix_entry: None,
            do_not_install: false,
            best_nexthop: None,
        }
    }
}

// ===== impl RouteDb =====

impl RouteDb {
    // Merges another route database into this one. Areas are disjoint, so
    // a plain union suffices.
    pub fn merge(&mut self, other: RouteDb) {
        self.unicast.extend(other.unicast);
        self.mpls.extend(other.mpls);
    }

    pub fn is_empty(&self) -> bool {
        self.unicast.is_empty() && self.mpls.is_empty()
    }
}

// ===== impl RouteDatabaseDelta =====

impl RouteDatabaseDelta {
    pub fn is_empty(&self) -> bool {
        self.unicast_routes_to_update.is_empty()
            && self.unicast_routes_to_delete.is_empty()
            && self.mpls_routes_to_update.is_empty()
            && self.mpls_routes_to_delete.is_empty()
    }
}

// ===== global functions =====

// Diffs two route databases into an incremental update. An entry is an
// update if it's absent in `old` or structurally unequal (nexthop sets
// compared as sets); a delete if present in `old` but absent in `new`.
pub fn route_delta(new: &RouteDb, old: &RouteDb) -> RouteDatabaseDelta {
    let mut delta = RouteDatabaseDelta::default();

    for (prefix, entry) in &new.unicast {
        if old.unicast.get(prefix) == Some(entry) {
            continue;
        }
        delta.unicast_routes_to_update.push(entry.clone());
    }
    for prefix in old.unicast.keys() {
        if !new.unicast.contains_key(prefix) {
            delta.unicast_routes_to_delete.push(*prefix);
        }
    }

    for (label, entry) in &new.mpls {
        if old.mpls.get(label) == Some(entry) {
            continue;
        }
        delta.mpls_routes_to_update.push(entry.clone());
    }
    for label in old.mpls.keys() {
        if !new.mpls.contains_key(label) {
            delta.mpls_routes_to_delete.push(*label);
        }
    }

    delta
}
