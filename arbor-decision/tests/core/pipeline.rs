//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::time::Duration;

use arbor_decision::api::DecisionApi;
use arbor_decision::config::Config;
use arbor_decision::instance::Decision;
use arbor_decision::lsdb::{KeyVal, PerfEvents, PrefixType, Publication};
use arbor_decision::policy::{
    PolicyError, RibPolicySpec, RibPolicyStatement,
};
use arbor_decision::route::{
    Nexthop, RibMplsEntry, RouteDatabaseDelta,
};
use arbor_utils::counters::Counters;
use arbor_utils::mpls::Label;
use maplit::btreeset;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::{
    adj_db, adjacency, net, prefix_db, prefix_entry, publication, triangle,
};

struct Harness {
    kvstore_tx: mpsc::UnboundedSender<Publication>,
    static_tx: mpsc::UnboundedSender<RouteDatabaseDelta>,
    route_rx: mpsc::UnboundedReceiver<RouteDatabaseDelta>,
    api: DecisionApi,
    counters: Counters,
    handle: JoinHandle<()>,
}

impl Harness {
    fn spawn(config: Config) -> Harness {
        let counters = Counters::default();
        let (kvstore_tx, kvstore_rx) = mpsc::unbounded_channel();
        let (static_tx, static_rx) = mpsc::unbounded_channel();
        let (route_tx, route_rx) = mpsc::unbounded_channel();
        let (decision, api, api_rx) =
            Decision::new(config, counters.clone(), route_tx);
        let handle =
            tokio::spawn(decision.run(kvstore_rx, static_rx, api_rx));
        Harness {
            kvstore_tx,
            static_tx,
            route_rx,
            api,
            counters,
            handle,
        }
    }

    async fn recv_delta(&mut self) -> RouteDatabaseDelta {
        timeout(Duration::from_secs(5), self.route_rx.recv())
            .await
            .expect("timed out waiting for route delta")
            .expect("route updates queue closed")
    }

    async fn assert_no_delta(&mut self, wait: Duration) {
        assert!(
            timeout(wait, self.route_rx.recv()).await.is_err(),
            "unexpected route delta"
        );
    }
}

fn config(node: &str) -> Config {
    Config {
        node_name: node.to_owned(),
        enable_v4: true,
        debounce_min_ms: 5,
        debounce_max_ms: 50,
        ..Default::default()
    }
}

// Two-node topology where A and B each advertise one prefix, with perf
// events attached to A's prefix advertisement.
fn two_node_publication() -> Publication {
    let mut a_prefixes =
        prefix_db("A", vec![prefix_entry("10.0.0.0/24", PrefixType::Default)]);
    let mut perf_events = PerfEvents::default();
    perf_events.add_event("A", "PREFIX_DB_UPDATED");
    a_prefixes.perf_events = Some(perf_events);
    let b_prefixes =
        prefix_db("B", vec![prefix_entry("20.0.0.0/24", PrefixType::Default)]);

    publication(
        vec![
            adj_db(
                "A",
                0,
                vec![adjacency("B", "if-ab", "10.1.0.2", "fe80::2", 10)],
            ),
            adj_db(
                "B",
                0,
                vec![adjacency("A", "if-ba", "10.1.0.1", "fe80::1", 10)],
            ),
        ],
        vec![a_prefixes, b_prefixes],
    )
}

#[tokio::test]
async fn two_node_full_sync_end_to_end() {
    let mut harness = Harness::spawn(config("A"));
    harness
        .kvstore_tx
        .send(two_node_publication())
        .unwrap();

    let delta = harness.recv_delta().await;
    assert_eq!(delta.node, "A");
    assert_eq!(delta.unicast_routes_to_update.len(), 1);
    let entry = &delta.unicast_routes_to_update[0];
    assert_eq!(entry.prefix, net("20.0.0.0/24"));
    assert_eq!(entry.nexthops.len(), 1);
    assert!(delta.unicast_routes_to_delete.is_empty());

    // Perf events survive the pipeline, annotated along the way.
    let perf_events = delta.perf_events.unwrap();
    let event_names = perf_events
        .events
        .iter()
        .map(|event| event.event.as_str())
        .collect::<BTreeSet<_>>();
    assert!(event_names.contains("PREFIX_DB_UPDATED"));
    assert!(event_names.contains("DECISION_RECEIVED"));
    assert!(event_names.contains("DECISION_DEBOUNCE"));
    assert!(event_names.contains("ROUTE_UPDATE"));

    assert_eq!(harness.counters.counter("decision.adj_db_update"), 2);
    assert_eq!(harness.counters.counter("decision.prefix_db_update"), 2);
    assert!(harness.counters.counter("decision.spf_runs") > 0);
}

// N notifications within the debounce window produce exactly one
// publish.
#[tokio::test]
async fn debounce_coalesces_notifications() {
    let mut harness = Harness::spawn(config("A"));
    for _ in 0..5 {
        harness
            .kvstore_tx
            .send(two_node_publication())
            .unwrap();
    }

    let delta = harness.recv_delta().await;
    assert_eq!(delta.unicast_routes_to_update.len(), 1);
    harness.assert_no_delta(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn expired_keys_withdraw_routes() {
    let mut harness = Harness::spawn(config("A"));
    harness
        .kvstore_tx
        .send(two_node_publication())
        .unwrap();
    harness.recv_delta().await;

    let mut expiry = Publication::default();
    expiry.expired_keys.push("prefix:B".to_owned());
    harness.kvstore_tx.send(expiry).unwrap();

    let delta = harness.recv_delta().await;
    assert!(delta.unicast_routes_to_update.is_empty());
    assert_eq!(delta.unicast_routes_to_delete, vec![net("20.0.0.0/24")]);
}

#[tokio::test]
async fn per_prefix_keyed_updates() {
    let mut harness = Harness::spawn(config("A"));
    harness
        .kvstore_tx
        .send(two_node_publication())
        .unwrap();
    harness.recv_delta().await;

    // A per-prefix keyed advertisement adds to B's full-database set
    // instead of replacing it.
    let mut keyed = Publication::default();
    keyed.key_vals.insert(
        "prefix:B:30.0.0.0/24".to_owned(),
        KeyVal {
            value: Some(
                serde_json::to_string(&prefix_db(
                    "B",
                    vec![prefix_entry("30.0.0.0/24", PrefixType::Default)],
                ))
                .unwrap(),
            ),
            ttl_version: 1,
        },
    );
    harness.kvstore_tx.send(keyed).unwrap();

    let delta = harness.recv_delta().await;
    assert_eq!(
        delta
            .unicast_routes_to_update
            .iter()
            .map(|entry| entry.prefix)
            .collect::<Vec<_>>(),
        vec![net("30.0.0.0/24")]
    );
    assert!(delta.unicast_routes_to_delete.is_empty());

    // Expiring the per-prefix key withdraws only that prefix.
    let mut expiry = Publication::default();
    expiry.expired_keys.push("prefix:B:30.0.0.0/24".to_owned());
    harness.kvstore_tx.send(expiry).unwrap();

    let delta = harness.recv_delta().await;
    assert!(delta.unicast_routes_to_update.is_empty());
    assert_eq!(delta.unicast_routes_to_delete, vec![net("30.0.0.0/24")]);
}

#[tokio::test]
async fn static_routes_are_published_first() {
    let mut harness = Harness::spawn(config("A"));
    let nexthops = BTreeSet::from([Nexthop::new(
        "fe80::99".parse().unwrap(),
        None,
        0,
        None,
        true,
        None,
    )]);
    harness
        .static_tx
        .send(RouteDatabaseDelta {
            mpls_routes_to_update: vec![RibMplsEntry::new(
                Label::new(300),
                nexthops.clone(),
            )],
            ..Default::default()
        })
        .unwrap();

    let delta = harness.recv_delta().await;
    assert_eq!(delta.node, "A");
    assert_eq!(delta.mpls_routes_to_update.len(), 1);
    assert_eq!(delta.mpls_routes_to_update[0].label, Label::new(300));

    // The static route shows up in the introspected route database.
    let database = harness.api.static_routes().await.unwrap();
    assert_eq!(database.mpls_routes.len(), 1);
    assert_eq!(database.mpls_routes[&Label::new(300)], nexthops);
}

#[tokio::test]
async fn rib_policy_drops_zero_weight_routes() {
    let mut harness_config = config("A");
    harness_config.enable_rib_policy = true;
    let mut harness = Harness::spawn(harness_config);

    harness
        .kvstore_tx
        .send(two_node_publication())
        .unwrap();
    let delta = harness.recv_delta().await;
    assert_eq!(delta.unicast_routes_to_update.len(), 1);

    // Weight the only next-hop's area to zero: the previously published
    // prefix must be withdrawn.
    let spec = RibPolicySpec {
        statements: vec![RibPolicyStatement {
            prefixes: btreeset! {net("20.0.0.0/24")},
            default_weight: 0,
            area_weights: Default::default(),
        }],
        ttl_secs: 60,
    };
    harness.api.set_rib_policy(spec.clone()).await.unwrap();

    let delta = harness.recv_delta().await;
    assert!(
        !delta
            .unicast_routes_to_update
            .iter()
            .any(|entry| entry.prefix == net("20.0.0.0/24"))
    );
    assert_eq!(delta.unicast_routes_to_delete, vec![net("20.0.0.0/24")]);

    // Policy-triggered publications carry a present-but-fresh perf
    // chain holding only their own marker.
    let perf_events = delta.perf_events.unwrap();
    assert_eq!(perf_events.events.len(), 1);
    assert_eq!(perf_events.events[0].event, "RIB_POLICY_UPDATE");

    let active = harness.api.rib_policy().await.unwrap();
    assert_eq!(active.statements, spec.statements);
    assert!(active.ttl_secs <= 60);
}

#[tokio::test]
async fn rib_policy_acceptance_errors() {
    // Disabled by configuration.
    let harness = Harness::spawn(config("A"));
    let spec = RibPolicySpec {
        statements: vec![RibPolicyStatement {
            prefixes: btreeset! {net("10.0.0.0/8")},
            default_weight: 1,
            area_weights: Default::default(),
        }],
        ttl_secs: 60,
    };
    assert_eq!(
        harness.api.set_rib_policy(spec.clone()).await,
        Err(PolicyError::Disabled)
    );

    // Stale TTL.
    let mut harness_config = config("A");
    harness_config.enable_rib_policy = true;
    let harness = Harness::spawn(harness_config);
    let mut stale = spec.clone();
    stale.ttl_secs = 0;
    assert_eq!(
        harness.api.set_rib_policy(stale).await,
        Err(PolicyError::Stale)
    );

    // Nothing configured yet.
    assert!(matches!(
        harness.api.rib_policy().await,
        Err(PolicyError::Invalid(_))
    ));
}

#[tokio::test]
async fn cold_start_suppresses_publications() {
    let mut harness_config = config("A");
    harness_config.eor_time_secs = Some(1);
    let mut harness = Harness::spawn(harness_config);

    harness
        .kvstore_tx
        .send(two_node_publication())
        .unwrap();

    // Nothing is published while the cold-start timer is pending; the
    // accumulated changes go out when it fires.
    harness.assert_no_delta(Duration::from_millis(300)).await;
    let delta = harness.recv_delta().await;
    assert_eq!(delta.unicast_routes_to_update.len(), 1);
    assert_eq!(
        delta.unicast_routes_to_update[0].prefix,
        net("20.0.0.0/24")
    );

    // The cold-start publication carries a present-but-fresh perf chain
    // holding only its own marker, keeping it out of the FIB
    // programming-time accounting.
    let perf_events = delta.perf_events.unwrap();
    assert_eq!(perf_events.events.len(), 1);
    assert_eq!(perf_events.events[0].event, "COLD_START_UPDATE");
}

#[tokio::test]
async fn introspection_requests() {
    let mut harness = Harness::spawn(config("A"));
    harness
        .kvstore_tx
        .send(publication(triangle(), vec![]))
        .unwrap();
    harness
        .kvstore_tx
        .send(publication(
            vec![],
            vec![prefix_db(
                "B",
                vec![prefix_entry("fd00:b::/64", PrefixType::Default)],
            )],
        ))
        .unwrap();
    harness.recv_delta().await;

    let adj_dbs = harness.api.adjacency_databases().await.unwrap();
    assert_eq!(adj_dbs.len(), 3);
    let all_adj_dbs = harness.api.all_adjacency_databases().await.unwrap();
    assert_eq!(all_adj_dbs.len(), 3);

    let prefix_dbs = harness.api.prefix_databases().await.unwrap();
    assert_eq!(prefix_dbs.len(), 1);
    assert_eq!(prefix_dbs["B"].prefix_entries.len(), 1);

    let route_db = harness.api.route_database(None).await.unwrap();
    assert_eq!(route_db.node, "A");
    assert!(
        route_db
            .unicast_routes
            .iter()
            .any(|entry| entry.prefix == net("fd00:b::/64"))
    );

    // Route database from another node's perspective.
    let route_db = harness
        .api
        .route_database(Some("C".to_owned()))
        .await
        .unwrap();
    assert!(
        route_db
            .unicast_routes
            .iter()
            .any(|entry| entry.prefix == net("fd00:b::/64"))
    );
}

#[tokio::test]
async fn shutdown_on_queue_closure() {
    let harness = Harness::spawn(config("A"));
    let Harness {
        kvstore_tx,
        static_tx,
        api,
        handle,
        route_rx,
        ..
    } = harness;
    drop(kvstore_tx);
    drop(static_tx);
    drop(api);
    drop(route_rx);

    timeout(Duration::from_secs(5), handle)
        .await
        .expect("decision loop didn't shut down")
        .unwrap();
}
