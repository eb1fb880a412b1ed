//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::Utc;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::metric_vector::MetricVector;

// Markers prefixing the keys of the replicated key-value store.
pub const ADJ_DB_MARKER: &str = "adj:";
pub const PREFIX_DB_MARKER: &str = "prefix:";
pub const FIB_TIME_MARKER: &str = "fibTime:";

// Area used when a publication doesn't carry one.
pub const DEFAULT_AREA: &str = "0";

// Adjacency database advertised by one node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct AdjacencyDatabase {
    pub node: String,
    pub overloaded: bool,
    pub node_label: u32,
    pub adjacencies: Vec<Adjacency>,
    pub perf_events: Option<PerfEvents>,
}

// One directed adjacency, from the advertising node to a peer.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Adjacency {
    pub other_node: String,
    pub ifname: String,
    pub nh_v4: Ipv4Addr,
    pub nh_v6: Ipv6Addr,
    pub metric: u32,
    pub adj_label: u32,
}

// Prefix database advertised by one node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PrefixDatabase {
    pub node: String,
    pub prefix_entries: Vec<PrefixEntry>,
    pub delete_prefix: bool,
    pub perf_events: Option<PerfEvents>,
}

// One advertised prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PrefixEntry {
    pub prefix: IpNetwork,
    pub prefix_type: PrefixType,
    pub forwarding_type: ForwardingType,
    pub forwarding_algorithm: ForwardingAlgorithm,
    pub metric_vector: Option<MetricVector>,
    pub prepend_label: Option<u32>,
    pub min_nexthop: Option<u64>,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum PrefixType {
    Loopback,
    Default,
    Static,
    Rib,
    Bgp,
}

#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum ForwardingType {
    #[default]
    Ip,
    SrMpls,
}

#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum ForwardingAlgorithm {
    #[default]
    SpEcmp,
    Ksp2EdEcmp,
}

// One value of the replicated key-value store. `value` is absent on pure
// TTL refreshes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct KeyVal {
    pub value: Option<String>,
    pub ttl_version: i64,
}

// Delta published by the replicated key-value store.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Publication {
    pub area: Option<String>,
    pub key_vals: BTreeMap<String, KeyVal>,
    pub expired_keys: Vec<String>,
}

// Chain of timestamped events carried along advertisements for
// convergence measurement.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PerfEvents {
    pub events: Vec<PerfEvent>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PerfEvent {
    pub node: String,
    pub event: String,
    pub unix_ts_ms: i64,
}

// ===== impl PrefixEntry =====

impl PrefixEntry {
    pub fn new(prefix: IpNetwork, prefix_type: PrefixType) -> PrefixEntry {
        PrefixEntry {
            prefix,
            prefix_type,
            forwarding_type: Default::default(),
            forwarding_algorithm: Default::default(),
            metric_vector: None,
            prepend_label: None,
            min_nexthop: None,
        }
    }
}

// ===== impl PerfEvents =====

impl PerfEvents {
    // Appends an event stamped with the current wall-clock time.
    pub fn add_event(&mut self, node: &str, event: &str) {
        self.events.push(PerfEvent {
            node: node.to_owned(),
            event: event.to_owned(),
            unix_ts_ms: Utc::now().timestamp_millis(),
        });
    }

    pub fn extend(&mut self, other: PerfEvents) {
        self.events.extend(other.events);
    }
}

// ===== global functions =====

// Extracts the node name from an LSDB key ("<marker><node>[:<suffix>]").
pub fn node_from_key(key: &str) -> Option<&str> {
    key.split(':').nth(1).filter(|node| !node.is_empty())
}

// Extracts the prefix from a per-prefix LSDB key
// ("prefix:<node>:<prefix>"). Returns `None` for bare full-database keys.
pub fn prefix_from_key(key: &str) -> Option<IpNetwork> {
    key.splitn(3, ':').nth(2)?.parse().ok()
}
