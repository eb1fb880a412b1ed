//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use tracing::{error, warn};

use crate::debug::Debug;
use crate::error::Error;
use crate::graph::LinkState;
use crate::instance::Decision;
use crate::lsdb::{
    self, ADJ_DB_MARKER, AdjacencyDatabase, DEFAULT_AREA, FIB_TIME_MARKER,
    PREFIX_DB_MARKER, PrefixDatabase, Publication,
};

// ===== LSDB publication processing =====

// Classifies and applies one publication of the replicated key-value
// store. Values that fail to deserialize are logged and skipped; internal
// invariant violations abort the process so it restarts from the durable
// store.
pub(crate) fn process_publication(
    decision: &mut Decision,
    publication: Publication,
) {
    let my_node = decision.config.node_name.clone();
    let area = publication
        .area
        .clone()
        .unwrap_or_else(|| DEFAULT_AREA.to_owned());
    Debug::PublicationRx(
        &area,
        publication.key_vals.len(),
        publication.expired_keys.len(),
    )
    .log();

    if !decision.area_link_states.contains_key(&area) {
        let link_state =
            LinkState::new(area.clone(), decision.counters.clone());
        decision.area_link_states.insert(area.clone(), link_state);
    }

    if publication.key_vals.is_empty() && publication.expired_keys.is_empty()
    {
        return;
    }

    // LSDB additions and updates.
    for (key, key_val) in publication.key_vals {
        // Skip pure TTL refreshes.
        let Some(value) = key_val.value else {
            continue;
        };
        let Some(node) = lsdb::node_from_key(&key) else {
            warn!(%key, "malformed LSDB key");
            continue;
        };
        let node = node.to_owned();

        if key.starts_with(ADJ_DB_MARKER) {
            let adj_db = match serde_json::from_str::<AdjacencyDatabase>(
                &value,
            ) {
                Ok(adj_db) => adj_db,
                Err(error) => {
                    Error::InputParse(key, error).log();
                    decision.counters.increment("decision.errors");
                    continue;
                }
            };
            if adj_db.node != node {
                Error::NodeKeyMismatch(key, adj_db.node).log();
                std::process::abort();
            }
            Debug::AdjacencyDbUpdate(&node).log();

            // With ordered FIB programming, added links hold for as many
            // decrements as the node is hops away, and removed links for
            // the remainder of the network diameter.
            let link_state =
                decision.area_link_states.get_mut(&area).unwrap();
            let mut hold_up_ttl = 0;
            let mut hold_down_ttl = 0;
            if decision.config.enable_ordered_fib_programming
                && let Some(hops) =
                    link_state.hops_from_a_to_b(&my_node, &node)
            {
                hold_up_ttl = hops;
                hold_down_ttl =
                    link_state.max_hops_to_node(&node).saturating_sub(hops);
            }

            decision.counters.increment("decision.adj_db_update");
            let perf_events = adj_db.perf_events.clone();
            let change = link_state.update_adjacency_database(
                adj_db,
                hold_up_ttl,
                hold_down_ttl,
            );
            let has_holds = link_state.has_holds();
            decision
                .pending_updates
                .apply_link_state_change(&change, perf_events);
            if decision.config.enable_ordered_fib_programming && has_holds {
                decision.arm_ordered_fib_timer();
            }
            continue;
        }

        if key.starts_with(PREFIX_DB_MARKER) {
            let prefix_db = match serde_json::from_str::<PrefixDatabase>(
                &value,
            ) {
                Ok(prefix_db) => prefix_db,
                Err(error) => {
                    Error::InputParse(key, error).log();
                    decision.counters.increment("decision.errors");
                    continue;
                }
            };
            if prefix_db.node != node {
                Error::NodeKeyMismatch(key, prefix_db.node).log();
                std::process::abort();
            }
            Debug::PrefixDbUpdate(&node).log();

            let node_prefix_db =
                update_node_prefix_database(decision, &key, prefix_db);
            decision.counters.increment("decision.prefix_db_update");
            let perf_events = node_prefix_db.perf_events.clone();
            let changed =
                decision.prefix_state.update_prefix_database(&node_prefix_db);
            decision
                .pending_updates
                .apply_prefix_state_change(&changed, perf_events);
            continue;
        }

        if key.starts_with(FIB_TIME_MARKER) {
            match value.trim().parse::<u64>() {
                Ok(fib_time_ms) => {
                    let fib_time = Duration::from_millis(fib_time_ms);
                    Debug::FibTimeUpdate(&node, fib_time).log();
                    decision.fib_times.insert(node, fib_time);
                }
                Err(error) => Error::FibTimeParse(key, error).log(),
            }
            continue;
        }
    }

    // LSDB deletions.
    for key in publication.expired_keys {
        let Some(node) = lsdb::node_from_key(&key) else {
            continue;
        };
        let node = node.to_owned();

        if key.starts_with(ADJ_DB_MARKER) {
            Debug::AdjacencyDbDelete(&node).log();
            let link_state =
                decision.area_link_states.get_mut(&area).unwrap();
            let change = link_state.delete_adjacency_database(&node);
            decision
                .pending_updates
                .apply_link_state_change(&change, None);
            continue;
        }

        if key.starts_with(PREFIX_DB_MARKER) {
            // Expiry is signaled the same way a client withdrawal would
            // be.
            let delete_db = PrefixDatabase {
                node: node.clone(),
                delete_prefix: true,
                ..Default::default()
            };
            let node_prefix_db =
                update_node_prefix_database(decision, &key, delete_db);
            let changed =
                decision.prefix_state.update_prefix_database(&node_prefix_db);
            decision
                .pending_updates
                .apply_prefix_state_change(&changed, None);
            continue;
        }
    }
}

// ===== helper functions =====

// Folds a keyed prefix database update into the per-node advertisement
// state and returns the node's merged database. Per-prefix keyed entries
// take precedence over the full-database set on identical prefixes.
pub(crate) fn update_node_prefix_database(
    decision: &mut Decision,
    key: &str,
    prefix_db: PrefixDatabase,
) -> PrefixDatabase {
    let node = prefix_db.node.clone();

    match lsdb::prefix_from_key(key) {
        // Per-prefix keyed update.
        Some(key_prefix) => {
            let entries =
                decision.per_prefix_entries.entry(node.clone()).or_default();
            if prefix_db.delete_prefix {
                entries.remove(&key_prefix);
            } else if let Some(entry) = prefix_db.prefix_entries.first() {
                if prefix_db.prefix_entries.len() > 1 {
                    error!(%key,
                        "received more than one prefix entry, \
                         only the first is processed");
                }
                entries.insert(key_prefix, entry.clone());
            } else {
                error!(%key, "received no entries for per-prefix update");
            }
        }
        // Full-database update.
        None => {
            let entries =
                decision.full_db_entries.entry(node.clone()).or_default();
            entries.clear();
            for entry in &prefix_db.prefix_entries {
                entries.insert(entry.prefix, entry.clone());
            }
        }
    }

    let mut merged = PrefixDatabase {
        node: node.clone(),
        perf_events: prefix_db.perf_events,
        ..Default::default()
    };
    if let Some(entries) = decision.per_prefix_entries.get(&node) {
        merged.prefix_entries.extend(entries.values().cloned());
    }
    if let Some(entries) = decision.full_db_entries.get(&node) {
        for (prefix, entry) in entries {
            if decision
                .per_prefix_entries
                .get(&node)
                .is_some_and(|per_prefix| per_prefix.contains_key(prefix))
            {
                continue;
            }
            merged.prefix_entries.push(entry.clone());
        }
    }
    merged
}
