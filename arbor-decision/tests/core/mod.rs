//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod pipeline;
mod policy;
mod prefixes;
mod route;

use arbor_decision::graph::LinkState;
use arbor_decision::lsdb::{
    Adjacency, AdjacencyDatabase, ForwardingAlgorithm, ForwardingType,
    KeyVal, PrefixDatabase, PrefixEntry, PrefixType, Publication,
};
use arbor_decision::metric_vector::{
    CompareType, MetricEntity, MetricVector,
};
use arbor_utils::counters::Counters;
use ipnetwork::IpNetwork;

//
// Helper functions.
//

pub fn net(prefix: &str) -> IpNetwork {
    prefix.parse().unwrap()
}

pub fn adjacency(
    other_node: &str,
    ifname: &str,
    nh_v4: &str,
    nh_v6: &str,
    metric: u32,
) -> Adjacency {
    Adjacency {
        other_node: other_node.to_owned(),
        ifname: ifname.to_owned(),
        nh_v4: nh_v4.parse().unwrap(),
        nh_v6: nh_v6.parse().unwrap(),
        metric,
        adj_label: 0,
    }
}

pub fn adj_db(
    node: &str,
    node_label: u32,
    adjacencies: Vec<Adjacency>,
) -> AdjacencyDatabase {
    AdjacencyDatabase {
        node: node.to_owned(),
        overloaded: false,
        node_label,
        adjacencies,
        perf_events: None,
    }
}

pub fn prefix_entry(prefix: &str, prefix_type: PrefixType) -> PrefixEntry {
    PrefixEntry::new(net(prefix), prefix_type)
}

pub fn sr_ksp2_entry(prefix: &str, prefix_type: PrefixType) -> PrefixEntry {
    let mut entry = prefix_entry(prefix, prefix_type);
    entry.forwarding_type = ForwardingType::SrMpls;
    entry.forwarding_algorithm = ForwardingAlgorithm::Ksp2EdEcmp;
    entry
}

pub fn prefix_db(node: &str, entries: Vec<PrefixEntry>) -> PrefixDatabase {
    PrefixDatabase {
        node: node.to_owned(),
        prefix_entries: entries,
        delete_prefix: false,
        perf_events: None,
    }
}

pub fn metric_vector(
    entities: Vec<(i64, i64, CompareType, bool, Vec<i64>)>,
) -> MetricVector {
    MetricVector {
        metrics: entities
            .into_iter()
            .map(|(entity_type, priority, op, tie_breaker, metric)| {
                MetricEntity {
                    entity_type,
                    priority,
                    op,
                    is_best_path_tie_breaker: tie_breaker,
                    metric,
                }
            })
            .collect(),
    }
}

// Builds a link state from full adjacency databases, no hold timers.
pub fn link_state(databases: Vec<AdjacencyDatabase>) -> LinkState {
    let mut link_state =
        LinkState::new("0".to_owned(), Counters::default());
    for database in databases {
        link_state.update_adjacency_database(database, 0, 0);
    }
    link_state
}

// Publication carrying serialized adjacency and prefix databases.
pub fn publication(
    adj_dbs: Vec<AdjacencyDatabase>,
    prefix_dbs: Vec<PrefixDatabase>,
) -> Publication {
    let mut publication = Publication::default();
    for database in adj_dbs {
        publication.key_vals.insert(
            format!("adj:{}", database.node),
            KeyVal {
                value: Some(serde_json::to_string(&database).unwrap()),
                ttl_version: 1,
            },
        );
    }
    for database in prefix_dbs {
        publication.key_vals.insert(
            format!("prefix:{}", database.node),
            KeyVal {
                value: Some(serde_json::to_string(&database).unwrap()),
                ttl_version: 1,
            },
        );
    }
    publication
}

//
// Common topologies.
//

// Two nodes joined by a single link of the given metric.
pub fn two_nodes(metric: u32) -> LinkState {
    link_state(vec![
        adj_db(
            "A",
            0,
            vec![adjacency("B", "if-ab", "10.1.0.2", "fe80::2", metric)],
        ),
        adj_db(
            "B",
            0,
            vec![adjacency("A", "if-ba", "10.1.0.1", "fe80::1", metric)],
        ),
    ])
}

// Triangle with unit metrics.
pub fn triangle() -> Vec<AdjacencyDatabase> {
    vec![
        adj_db(
            "A",
            101,
            vec![
                adjacency("B", "if-ab", "10.1.0.2", "fe80::12", 1),
                adjacency("C", "if-ac", "10.2.0.3", "fe80::13", 1),
            ],
        ),
        adj_db(
            "B",
            102,
            vec![
                adjacency("A", "if-ba", "10.1.0.1", "fe80::21", 1),
                adjacency("C", "if-bc", "10.3.0.3", "fe80::23", 1),
            ],
        ),
        adj_db(
            "C",
            103,
            vec![
                adjacency("A", "if-ca", "10.2.0.1", "fe80::31", 1),
                adjacency("B", "if-cb", "10.3.0.2", "fe80::32", 1),
            ],
        ),
    ]
}

// Square: A-B, A-C, B-D, C-D, with the given metric on the C-D link and
// unit metrics elsewhere.
pub fn square(cd_metric: u32) -> LinkState {
    link_state(vec![
        adj_db(
            "A",
            0,
            vec![
                adjacency("B", "if-ab", "10.1.0.2", "fe80::12", 1),
                adjacency("C", "if-ac", "10.2.0.3", "fe80::13", 1),
            ],
        ),
        adj_db(
            "B",
            0,
            vec![
                adjacency("A", "if-ba", "10.1.0.1", "fe80::21", 1),
                adjacency("D", "if-bd", "10.3.0.4", "fe80::24", 1),
            ],
        ),
        adj_db(
            "C",
            0,
            vec![
                adjacency("A", "if-ca", "10.2.0.1", "fe80::31", 1),
                adjacency("D", "if-cd", "10.4.0.4", "fe80::34", cd_metric),
            ],
        ),
        adj_db(
            "D",
            0,
            vec![
                adjacency("B", "if-db", "10.3.0.2", "fe80::42", 1),
                adjacency("C", "if-dc", "10.4.0.3", "fe80::43", cd_metric),
            ],
        ),
    ])
}
