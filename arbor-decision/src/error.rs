//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ipnetwork::IpNetwork;
use tracing::{error, warn};

// Decision errors.
#[derive(Debug)]
pub enum Error {
    // LSDB input
    InputParse(String, serde_json::Error),
    FibTimeParse(String, std::num::ParseIntError),
    NodeKeyMismatch(String, String),
    // Unicast route computation
    MixedPrefixTypes(IpNetwork),
    MissingMetricVector(IpNetwork, String),
    UnexpectedIgpCostEntity(IpNetwork, String),
    BestPathSelectionFailed(IpNetwork),
    V4PrefixDisabled(IpNetwork),
    IncompatibleForwardingType(IpNetwork, String),
    MissingLoopbackAddr(IpNetwork, String),
    MissingStaticNexthops(u32),
    NoRouteToPrefix(IpNetwork),
    // MPLS route computation
    InvalidNodeLabel(String, u32),
    InvalidAdjLabel(String, u32),
    NoRouteToLabel(String, u32),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::InputParse(key, error) => {
                error!(%key, %error, "{}", self);
            }
            Error::FibTimeParse(key, error) => {
                error!(%key, %error, "{}", self);
            }
            Error::NodeKeyMismatch(key, node) => {
                error!(%key, %node, "{}", self);
            }
            Error::MixedPrefixTypes(prefix) => {
                error!(%prefix, "{}", self);
            }
            Error::MissingMetricVector(prefix, node) => {
                error!(%prefix, %node, "{}", self);
            }
            Error::UnexpectedIgpCostEntity(prefix, node) => {
                error!(%prefix, %node, "{}", self);
            }
            Error::BestPathSelectionFailed(prefix) => {
                error!(%prefix, "{}", self);
            }
            Error::V4PrefixDisabled(prefix) => {
                warn!(%prefix, "{}", self);
            }
            Error::IncompatibleForwardingType(prefix, node) => {
                error!(%prefix, %node, "{}", self);
            }
            Error::MissingLoopbackAddr(prefix, node) => {
                error!(%prefix, %node, "{}", self);
            }
            Error::MissingStaticNexthops(label) => {
                error!(%label, "{}", self);
            }
            Error::NoRouteToPrefix(prefix) => {
                warn!(%prefix, "{}", self);
            }
            Error::InvalidNodeLabel(node, label)
            | Error::InvalidAdjLabel(node, label) => {
                error!(%node, %label, "{}", self);
            }
            Error::NoRouteToLabel(node, label) => {
                warn!(%node, %label, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InputParse(..) => {
                write!(f, "failed to deserialize LSDB value")
            }
            Error::FibTimeParse(..) => {
                write!(f, "failed to parse FIB time value")
            }
            Error::NodeKeyMismatch(..) => {
                write!(f, "LSDB key doesn't match the advertised node")
            }
            Error::MixedPrefixTypes(..) => {
                write!(
                    f,
                    "prefix advertised with both BGP and non-BGP types"
                )
            }
            Error::MissingMetricVector(..) => {
                write!(f, "BGP prefix entry without a metric vector")
            }
            Error::UnexpectedIgpCostEntity(..) => {
                write!(
                    f,
                    "received reserved IGP-cost metric entity in metric vector"
                )
            }
            Error::BestPathSelectionFailed(..) => {
                write!(f, "tie or error ordering prefix entries")
            }
            Error::V4PrefixDisabled(..) => {
                write!(f, "received v4 prefix while v4 is not enabled")
            }
            Error::IncompatibleForwardingType(..) => {
                write!(
                    f,
                    "forwarding type is incompatible with the KSP2 algorithm"
                )
            }
            Error::MissingLoopbackAddr(..) => {
                write!(f, "failed to find the best path's loopback address")
            }
            Error::MissingStaticNexthops(..) => {
                write!(f, "no static next-hops for prepend label")
            }
            Error::NoRouteToPrefix(..) => {
                write!(f, "no route to prefix")
            }
            Error::InvalidNodeLabel(..) => {
                write!(f, "ignoring invalid node label")
            }
            Error::InvalidAdjLabel(..) => {
                write!(f, "ignoring invalid adjacency label")
            }
            Error::NoRouteToLabel(..) => {
                write!(f, "no route to node label")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InputParse(_, error) => Some(error),
            Error::FibTimeParse(_, error) => Some(error),
            _ => None,
        }
    }
}
