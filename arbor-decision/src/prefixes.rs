//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use arbor_utils::ip::IpNetworkExt;
use ipnetwork::IpNetwork;
use tracing::{debug, error};

use crate::lsdb::{PrefixDatabase, PrefixEntry, PrefixType};
use crate::route::Nexthop;

// Aggregated view of all advertised prefixes.
#[derive(Debug, Default)]
pub struct PrefixState {
    // prefix -> advertising node -> entry.
    prefixes: BTreeMap<IpNetwork, BTreeMap<String, PrefixEntry>>,
    // node -> advertised prefix set.
    node_prefixes: BTreeMap<String, BTreeSet<IpNetwork>>,
    // Host loopback address of each node, per address family.
    loopbacks_v4: BTreeMap<String, Ipv4Addr>,
    loopbacks_v6: BTreeMap<String, Ipv6Addr>,
}

// ===== impl PrefixState =====

impl PrefixState {
    // Replaces the node's advertised prefix set, returning the prefixes
    // whose advertisement changed.
    pub fn update_prefix_database(
        &mut self,
        prefix_db: &PrefixDatabase,
    ) -> BTreeSet<IpNetwork> {
        let mut changed = BTreeSet::new();
        let node = &prefix_db.node;

        let old_prefix_set =
            self.node_prefixes.get(node).cloned().unwrap_or_default();
        let new_prefix_set = prefix_db
            .prefix_entries
            .iter()
            .map(|entry| entry.prefix)
            .collect::<BTreeSet<_>>();

        // Process withdrawals first.
        for prefix in old_prefix_set.difference(&new_prefix_set) {
            debug!(%prefix, %node, "prefix withdrawn");
            if let Some(node_list) = self.prefixes.get_mut(prefix) {
                node_list.remove(node);
                if node_list.is_empty() {
                    self.prefixes.remove(prefix);
                }
            }
            changed.insert(*prefix);
            self.delete_loopback(prefix, node);
        }

        // Process additions and updates.
        for entry in &prefix_db.prefix_entries {
            let node_list = self.prefixes.entry(entry.prefix).or_default();
            match node_list.get(node) {
                None => {
                    debug!(prefix = %entry.prefix, %node,
                        "prefix advertised");
                }
                Some(old_entry) if old_entry != entry => {
                    debug!(prefix = %entry.prefix, %node, "prefix updated");
                }
                Some(_) => continue,
            }
            node_list.insert(node.clone(), entry.clone());
            changed.insert(entry.prefix);

            // Track host loopback addresses per node.
            if entry.prefix_type == PrefixType::Loopback
                && entry.prefix.is_host_prefix()
            {
                match entry.prefix {
                    IpNetwork::V4(prefix) => {
                        self.loopbacks_v4.insert(node.clone(), prefix.ip());
                    }
                    IpNetwork::V6(prefix) => {
                        self.loopbacks_v6.insert(node.clone(), prefix.ip());
                    }
                }
            }
        }

        if new_prefix_set.is_empty() {
            self.node_prefixes.remove(node);
        } else {
            self.node_prefixes.insert(node.clone(), new_prefix_set);
        }

        changed
    }

    pub fn prefixes(
        &self,
    ) -> &BTreeMap<IpNetwork, BTreeMap<String, PrefixEntry>> {
        &self.prefixes
    }

    // Returns the loopback addresses of the given nodes as next-hops
    // annotated with the IGP metric. Nodes without a known loopback are
    // logged and skipped.
    pub fn get_loopback_vias(
        &self,
        nodes: impl IntoIterator<Item = impl AsRef<str>>,
        is_v4: bool,
        igp_metric: Option<u32>,
    ) -> Vec<Nexthop> {
        let mut vias = Vec::new();
        for node in nodes {
            let node = node.as_ref();
            let addr = if is_v4 {
                self.loopbacks_v4.get(node).copied().map(IpAddr::V4)
            } else {
                self.loopbacks_v6.get(node).copied().map(IpAddr::V6)
            };
            match addr {
                Some(addr) => vias.push(Nexthop::new(
                    addr,
                    None,
                    igp_metric.unwrap_or(0),
                    None,
                    false,
                    None,
                )),
                None => error!(%node, "no loopback for node"),
            }
        }
        vias
    }

    // Reassembles per-node prefix databases for introspection.
    pub fn prefix_databases(&self) -> BTreeMap<String, PrefixDatabase> {
        let mut databases = BTreeMap::<String, PrefixDatabase>::new();
        for (prefix, node_list) in &self.prefixes {
            for (node, entry) in node_list {
                let db = databases
                    .entry(node.clone())
                    .or_insert_with(|| PrefixDatabase {
                        node: node.clone(),
                        ..Default::default()
                    });
                debug_assert_eq!(*prefix, entry.prefix);
                db.prefix_entries.push(entry.clone());
            }
        }
        databases
    }

    pub fn node_loopbacks_v4(&self) -> &BTreeMap<String, Ipv4Addr> {
        &self.loopbacks_v4
    }

    pub fn node_loopbacks_v6(&self) -> &BTreeMap<String, Ipv6Addr> {
        &self.loopbacks_v6
    }

    // ===== helpers =====

    fn delete_loopback(&mut self, prefix: &IpNetwork, node: &str) {
        if !prefix.is_host_prefix() {
            return;
        }
        match prefix {
            IpNetwork::V4(prefix) => {
                if self.loopbacks_v4.get(node) == Some(&prefix.ip()) {
                    self.loopbacks_v4.remove(node);
                }
            }
            IpNetwork::V6(prefix) => {
                if self.loopbacks_v6.get(node) == Some(&prefix.ip()) {
                    self.loopbacks_v6.remove(node);
                }
            }
        }
    }
}
