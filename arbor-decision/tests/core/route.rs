//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use arbor_decision::route::{
    Nexthop, RibMplsEntry, RibUnicastEntry, RouteDb, route_delta,
};
use arbor_utils::mpls::{Label, MplsAction};

use super::net;

fn nexthop(addr: &str, metric: u32) -> Nexthop {
    Nexthop::new(
        addr.parse().unwrap(),
        Some("if-1".to_owned()),
        metric,
        None,
        false,
        Some("0".to_owned()),
    )
}

fn unicast_entry(prefix: &str, nexthops: Vec<Nexthop>) -> RibUnicastEntry {
    let mut entry = RibUnicastEntry::new(net(prefix));
    entry.nexthops = nexthops.into_iter().collect();
    entry
}

#[test]
fn delta_reports_updates_and_deletes() {
    let mut old = RouteDb::default();
    old.unicast.insert(
        net("fd00:1::/64"),
        unicast_entry("fd00:1::/64", vec![nexthop("fe80::1", 10)]),
    );
    old.unicast.insert(
        net("fd00:2::/64"),
        unicast_entry("fd00:2::/64", vec![nexthop("fe80::1", 10)]),
    );
    old.mpls.insert(
        Label::new(100),
        RibMplsEntry::new(
            Label::new(100),
            BTreeSet::from([nexthop("fe80::1", 10)]),
        ),
    );

    let mut new = RouteDb::default();
    // fd00:1::/64 unchanged, fd00:2::/64 changed, fd00:3::/64 added,
    // label 100 removed, label 200 added.
    new.unicast.insert(
        net("fd00:1::/64"),
        unicast_entry("fd00:1::/64", vec![nexthop("fe80::1", 10)]),
    );
    new.unicast.insert(
        net("fd00:2::/64"),
        unicast_entry("fd00:2::/64", vec![nexthop("fe80::2", 20)]),
    );
    new.unicast.insert(
        net("fd00:3::/64"),
        unicast_entry("fd00:3::/64", vec![nexthop("fe80::1", 10)]),
    );
    new.mpls.insert(
        Label::new(200),
        RibMplsEntry::new(
            Label::new(200),
            BTreeSet::from([nexthop("fe80::1", 10)]),
        ),
    );

    let delta = route_delta(&new, &old);
    assert_eq!(
        delta
            .unicast_routes_to_update
            .iter()
            .map(|entry| entry.prefix)
            .collect::<Vec<_>>(),
        vec![net("fd00:2::/64"), net("fd00:3::/64")]
    );
    assert!(delta.unicast_routes_to_delete.is_empty());
    assert_eq!(
        delta
            .mpls_routes_to_update
            .iter()
            .map(|entry| entry.label)
            .collect::<Vec<_>>(),
        vec![Label::new(200)]
    );
    assert_eq!(delta.mpls_routes_to_delete, vec![Label::new(100)]);
}

// Applying the delta to the old database reproduces the new one.
#[test]
fn delta_round_trip() {
    let mut old = RouteDb::default();
    old.unicast.insert(
        net("fd00:1::/64"),
        unicast_entry("fd00:1::/64", vec![nexthop("fe80::1", 10)]),
    );
    old.mpls.insert(
        Label::new(100),
        RibMplsEntry::new(
            Label::new(100),
            BTreeSet::from([nexthop("fe80::1", 10)]),
        ),
    );

    let mut new = old.clone();
    new.unicast.remove(&net("fd00:1::/64"));
    new.unicast.insert(
        net("fd00:9::/64"),
        unicast_entry("fd00:9::/64", vec![nexthop("fe80::9", 9)]),
    );
    new.mpls.insert(
        Label::new(100),
        RibMplsEntry::new(
            Label::new(100),
            BTreeSet::from([nexthop("fe80::2", 5)]),
        ),
    );

    let delta = route_delta(&new, &old);

    let mut reconstructed = old.clone();
    for entry in delta.unicast_routes_to_update {
        reconstructed.unicast.insert(entry.prefix, entry);
    }
    for prefix in delta.unicast_routes_to_delete {
        reconstructed.unicast.remove(&prefix);
    }
    for entry in delta.mpls_routes_to_update {
        reconstructed.mpls.insert(entry.label, entry);
    }
    for label in delta.mpls_routes_to_delete {
        reconstructed.mpls.remove(&label);
    }
    assert_eq!(reconstructed, new);
}

#[test]
fn nexthop_sets_compare_structurally() {
    let a = unicast_entry(
        "fd00:1::/64",
        vec![nexthop("fe80::1", 10), nexthop("fe80::2", 10)],
    );
    let b = unicast_entry(
        "fd00:1::/64",
        vec![nexthop("fe80::2", 10), nexthop("fe80::1", 10)],
    );
    assert_eq!(a, b);

    let mut c = b.clone();
    c.nexthops.insert(Nexthop::new(
        "fe80::1".parse().unwrap(),
        Some("if-1".to_owned()),
        10,
        Some(MplsAction::Php),
        false,
        Some("0".to_owned()),
    ));
    assert_ne!(a, c);
}
