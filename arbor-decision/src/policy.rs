//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::route::RibUnicastEntry;

// RIB policy acceptance errors, surfaced through the API future.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PolicyError {
    Disabled,
    Stale,
    Invalid(String),
}

// Wire form of a RIB policy: a TTL plus an ordered statement list.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RibPolicySpec {
    pub statements: Vec<RibPolicyStatement>,
    pub ttl_secs: i64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RibPolicyStatement {
    // Prefixes the statement applies to.
    pub prefixes: BTreeSet<IpNetwork>,
    // Next-hop weight per area; next-hops weighted zero are removed.
    pub default_weight: u32,
    pub area_weights: BTreeMap<String, u32>,
}

// Accepted RIB policy with its computed expiry.
#[derive(Clone, Debug)]
pub struct RibPolicy {
    statements: Vec<RibPolicyStatement>,
    valid_until: Instant,
}

// ===== impl PolicyError =====

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::Disabled => {
                write!(f, "RIB policy feature is not enabled")
            }
            PolicyError::Stale => {
                write!(f, "RIB policy TTL has already expired")
            }
            PolicyError::Invalid(message) => {
                write!(f, "invalid RIB policy: {}", message)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

// ===== impl RibPolicy =====

impl RibPolicy {
    // Validates a policy spec. The TTL must be strictly positive at
    // acceptance time and at least one statement must be present.
    pub fn try_from_spec(spec: RibPolicySpec) -> Result<RibPolicy, PolicyError> {
        if spec.statements.is_empty() {
            return Err(PolicyError::Invalid(
                "policy must carry at least one statement".to_owned(),
            ));
        }
        if spec.ttl_secs <= 0 {
            return Err(PolicyError::Stale);
        }
        Ok(RibPolicy {
            statements: spec.statements,
            valid_until: Instant::now()
                + Duration::from_secs(spec.ttl_secs as u64),
        })
    }

    // Remaining validity. Zero once expired.
    pub fn ttl_duration(&self) -> Duration {
        self.valid_until.saturating_duration_since(Instant::now())
    }

    pub fn is_active(&self) -> bool {
        self.ttl_duration() > Duration::ZERO
    }

    pub fn to_spec(&self) -> RibPolicySpec {
        RibPolicySpec {
            statements: self.statements.clone(),
            ttl_secs: self.ttl_duration().as_secs() as i64,
        }
    }

    // Applies all matching statements to a unicast entry, rewriting
    // next-hop weights by area and dropping next-hops weighted zero.
    // Returns whether the entry was modified.
    pub fn apply(&self, entry: &mut RibUnicastEntry) -> bool {
        let mut modified = false;
        for statement in &self.statements {
            if !statement.prefixes.contains(&entry.prefix) {
                continue;
            }
            let nexthops = std::mem::take(&mut entry.nexthops);
            for mut nexthop in nexthops {
                let weight = nexthop
                    .area
                    .as_ref()
                    .and_then(|area| statement.area_weights.get(area))
                    .copied()
                    .unwrap_or(statement.default_weight);
                if weight == 0 {
                    modified = true;
                    continue;
                }
                if nexthop.weight != weight {
                    nexthop.weight = weight;
                    modified = true;
                }
                entry.nexthops.insert(nexthop);
            }
        }
        modified
    }
}
