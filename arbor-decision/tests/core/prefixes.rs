//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use arbor_decision::lsdb::PrefixType;
use arbor_decision::prefixes::PrefixState;
use maplit::btreeset;

use super::{net, prefix_db, prefix_entry};

#[test]
fn update_and_withdraw() {
    let mut prefix_state = PrefixState::default();

    let changed = prefix_state.update_prefix_database(&prefix_db(
        "A",
        vec![
            prefix_entry("fd00:1::/64", PrefixType::Default),
            prefix_entry("fd00:2::/64", PrefixType::Default),
        ],
    ));
    assert_eq!(changed, btreeset! {net("fd00:1::/64"), net("fd00:2::/64")});

    // Re-advertising the same set changes nothing.
    let changed = prefix_state.update_prefix_database(&prefix_db(
        "A",
        vec![
            prefix_entry("fd00:1::/64", PrefixType::Default),
            prefix_entry("fd00:2::/64", PrefixType::Default),
        ],
    ));
    assert!(changed.is_empty());

    // Dropping one prefix reports only the withdrawal.
    let changed = prefix_state.update_prefix_database(&prefix_db(
        "A",
        vec![prefix_entry("fd00:1::/64", PrefixType::Default)],
    ));
    assert_eq!(changed, btreeset! {net("fd00:2::/64")});
    assert!(!prefix_state.prefixes().contains_key(&net("fd00:2::/64")));
}

#[test]
fn tracks_host_loopbacks() {
    let mut prefix_state = PrefixState::default();
    prefix_state.update_prefix_database(&prefix_db(
        "A",
        vec![
            prefix_entry("10.0.0.1/32", PrefixType::Loopback),
            prefix_entry("fd00::1/128", PrefixType::Loopback),
            // Non-host loopback prefixes aren't tracked.
            prefix_entry("10.1.0.0/24", PrefixType::Loopback),
        ],
    ));

    assert_eq!(
        prefix_state.node_loopbacks_v4().get("A"),
        Some(&"10.0.0.1".parse().unwrap())
    );
    assert_eq!(
        prefix_state.node_loopbacks_v6().get("A"),
        Some(&"fd00::1".parse().unwrap())
    );

    let vias = prefix_state.get_loopback_vias(["A"], true, Some(5));
    assert_eq!(vias.len(), 1);
    assert_eq!(vias[0].addr, "10.0.0.1".parse::<std::net::IpAddr>().unwrap());
    assert_eq!(vias[0].metric, 5);

    // Unknown node: logged and skipped.
    assert!(prefix_state.get_loopback_vias(["B"], true, None).is_empty());

    // Withdrawing the loopback clears the tracking.
    prefix_state.update_prefix_database(&prefix_db(
        "A",
        vec![prefix_entry("fd00::1/128", PrefixType::Loopback)],
    ));
    assert!(prefix_state.node_loopbacks_v4().get("A").is_none());
    assert!(prefix_state.node_loopbacks_v6().get("A").is_some());
}
