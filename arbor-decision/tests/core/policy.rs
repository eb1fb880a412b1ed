//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::time::Duration;

use arbor_decision::policy::{
    PolicyError, RibPolicy, RibPolicySpec, RibPolicyStatement,
};
use arbor_decision::route::{Nexthop, RibUnicastEntry};
use maplit::{btreemap, btreeset};

use super::net;

fn area_nexthop(addr: &str, area: &str) -> Nexthop {
    Nexthop::new(
        addr.parse().unwrap(),
        Some("if-1".to_owned()),
        10,
        None,
        false,
        Some(area.to_owned()),
    )
}

fn policy(
    prefix: &str,
    default_weight: u32,
    area_weights: BTreeMap<String, u32>,
    ttl_secs: i64,
) -> RibPolicySpec {
    RibPolicySpec {
        statements: vec![RibPolicyStatement {
            prefixes: btreeset! {net(prefix)},
            default_weight,
            area_weights,
        }],
        ttl_secs,
    }
}

#[test]
fn acceptance_validation() {
    // Non-positive TTL is stale.
    let spec = policy("10.0.0.0/8", 1, BTreeMap::new(), 0);
    assert!(matches!(
        RibPolicy::try_from_spec(spec),
        Err(PolicyError::Stale)
    ));

    // A policy without statements is invalid.
    let spec = RibPolicySpec {
        statements: vec![],
        ttl_secs: 60,
    };
    assert!(matches!(
        RibPolicy::try_from_spec(spec),
        Err(PolicyError::Invalid(_))
    ));

    let spec = policy("10.0.0.0/8", 1, BTreeMap::new(), 60);
    let policy = RibPolicy::try_from_spec(spec).unwrap();
    assert!(policy.is_active());
    assert!(policy.ttl_duration() <= Duration::from_secs(60));
    assert_eq!(policy.to_spec().statements.len(), 1);
}

#[test]
fn rewrites_next_hop_weights_by_area() {
    let spec = policy(
        "10.0.0.0/8",
        1,
        btreemap! {"area-1".to_owned() => 3},
        60,
    );
    let policy = RibPolicy::try_from_spec(spec).unwrap();

    let mut entry = RibUnicastEntry::new(net("10.0.0.0/8"));
    entry.nexthops.insert(area_nexthop("10.1.0.1", "area-1"));
    entry.nexthops.insert(area_nexthop("10.2.0.1", "area-2"));
    assert!(policy.apply(&mut entry));

    let weights = entry
        .nexthops
        .iter()
        .map(|nexthop| (nexthop.area.clone().unwrap(), nexthop.weight))
        .collect::<BTreeMap<_, _>>();
    assert_eq!(
        weights,
        btreemap! {"area-1".to_owned() => 3, "area-2".to_owned() => 1}
    );

    // Non-matching prefixes are untouched.
    let mut other = RibUnicastEntry::new(net("10.0.0.0/24"));
    other.nexthops.insert(area_nexthop("10.1.0.1", "area-1"));
    assert!(!policy.apply(&mut other));
    assert_eq!(other.nexthops.iter().next().unwrap().weight, 0);
}

#[test]
fn zero_weight_removes_next_hops() {
    let spec = policy(
        "10.0.0.0/8",
        1,
        btreemap! {"area-1".to_owned() => 0},
        60,
    );
    let area_drop = RibPolicy::try_from_spec(spec).unwrap();

    let mut entry = RibUnicastEntry::new(net("10.0.0.0/8"));
    entry.nexthops.insert(area_nexthop("10.1.0.1", "area-1"));
    entry.nexthops.insert(area_nexthop("10.2.0.1", "area-2"));
    assert!(area_drop.apply(&mut entry));
    assert_eq!(entry.nexthops.len(), 1);
    assert_eq!(
        entry.nexthops.iter().next().unwrap().area.as_deref(),
        Some("area-2")
    );

    // Weighting every next-hop to zero empties the entry; the caller
    // drops it.
    let spec = policy("10.0.0.0/8", 0, BTreeMap::new(), 60);
    let full_drop = RibPolicy::try_from_spec(spec).unwrap();
    assert!(full_drop.apply(&mut entry));
    assert!(entry.nexthops.is_empty());
}
