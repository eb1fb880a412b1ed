//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::route::RouteDatabaseDelta;

// Decision debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // LSDB input
    PublicationRx(&'a str, usize, usize),
    AdjacencyDbUpdate(&'a str),
    AdjacencyDbDelete(&'a str),
    PrefixDbUpdate(&'a str),
    FibTimeUpdate(&'a str, Duration),
    StaticRoutesUpdate(usize, usize),
    // Pipeline
    DebounceScheduled(Duration),
    ProcessPendingUpdates(usize),
    ColdStartExpiry,
    HoldsDecrement,
    RouteDeltaPublish(&'a str, &'a RouteDatabaseDelta),
    // RIB policy
    RibPolicyUpdate(Duration),
    RibPolicyExpired,
}

// ===== impl Debug =====

impl Debug<'_> {
    // Logs the message.
    pub(crate) fn log(&self) {
        match self {
            Debug::PublicationRx(area, key_vals, expired) => {
                debug!(%area, %key_vals, %expired, "{}", self);
            }
            Debug::AdjacencyDbUpdate(node)
            | Debug::AdjacencyDbDelete(node)
            | Debug::PrefixDbUpdate(node) => {
                debug!(%node, "{}", self);
            }
            Debug::FibTimeUpdate(node, fib_time) => {
                debug!(%node, ?fib_time, "{}", self);
            }
            Debug::StaticRoutesUpdate(updates, deletes) => {
                debug!(%updates, %deletes, "{}", self);
            }
            Debug::DebounceScheduled(timeout) => {
                debug!(?timeout, "{}", self);
            }
            Debug::ProcessPendingUpdates(count) => {
                debug!(%count, "{}", self);
            }
            Debug::ColdStartExpiry | Debug::HoldsDecrement => {
                info!("{}", self);
            }
            Debug::RouteDeltaPublish(event, delta) => {
                info!(
                    %event,
                    unicast_updates = delta.unicast_routes_to_update.len(),
                    unicast_deletes = delta.unicast_routes_to_delete.len(),
                    mpls_updates = delta.mpls_routes_to_update.len(),
                    mpls_deletes = delta.mpls_routes_to_delete.len(),
                    "{}", self
                );
            }
            Debug::RibPolicyUpdate(validity) => {
                info!(?validity, "{}", self);
            }
            Debug::RibPolicyExpired => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::PublicationRx(..) => {
                write!(f, "publication received")
            }
            Debug::AdjacencyDbUpdate(..) => {
                write!(f, "adjacency database update")
            }
            Debug::AdjacencyDbDelete(..) => {
                write!(f, "adjacency database delete")
            }
            Debug::PrefixDbUpdate(..) => {
                write!(f, "prefix database update")
            }
            Debug::FibTimeUpdate(..) => {
                write!(f, "FIB programming time update")
            }
            Debug::StaticRoutesUpdate(..) => {
                write!(f, "static routes update")
            }
            Debug::DebounceScheduled(..) => {
                write!(f, "route recomputation scheduled")
            }
            Debug::ProcessPendingUpdates(..) => {
                write!(f, "processing accumulated updates")
            }
            Debug::ColdStartExpiry => {
                write!(f, "cold start period ended")
            }
            Debug::HoldsDecrement => {
                write!(f, "decrementing ordered-FIB holds")
            }
            Debug::RouteDeltaPublish(..) => {
                write!(f, "publishing route delta")
            }
            Debug::RibPolicyUpdate(..) => {
                write!(f, "RIB policy updated")
            }
            Debug::RibPolicyExpired => {
                write!(f, "RIB policy expired")
            }
        }
    }
}
