//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use arbor_utils::backoff::ExponentialBackoff;
use arbor_utils::counters::Counters;
use arbor_utils::task::{IntervalTask, TimeoutTask};
use ipnetwork::IpNetwork;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{
    Receiver, UnboundedReceiver, UnboundedSender,
};
use tracing::{debug, error, info, warn};

use crate::api::{ApiRequest, DecisionApi};
use crate::config::Config;
use crate::debug::Debug;
use crate::events;
use crate::graph::{LinkState, LinkStateChange};
use crate::lsdb::{DEFAULT_AREA, PerfEvents, PrefixEntry, Publication};
use crate::policy::{PolicyError, RibPolicy, RibPolicySpec};
use crate::prefixes::PrefixState;
use crate::route::{
    RibMplsEntry, RouteDatabase, RouteDatabaseDelta, RouteDb, route_delta,
};
use crate::solver::SpfSolver;
use crate::tasks;
use crate::tasks::messages::ProtocolInputMsg;
use crate::tasks::messages::input::{
    ColdStartExpiryMsg, DecrementHoldsMsg, ProcessUpdatesMsg,
    RibPolicyExpiryMsg, SubmitCountersMsg,
};

#[derive(Debug)]
pub struct Decision {
    pub(crate) config: Config,
    pub(crate) counters: Counters,
    pub(crate) solver: SpfSolver,
    // Replicated topology and prefix view.
    pub(crate) area_link_states: BTreeMap<String, LinkState>,
    pub(crate) prefix_state: PrefixState,
    // Keyed prefix advertisement state, per node. Per-prefix entries
    // override the full-database set.
    pub(crate) per_prefix_entries:
        BTreeMap<String, BTreeMap<IpNetwork, PrefixEntry>>,
    pub(crate) full_db_entries:
        BTreeMap<String, BTreeMap<IpNetwork, PrefixEntry>>,
    // Advertised FIB programming time per node.
    pub(crate) fib_times: BTreeMap<String, Duration>,
    // Accumulated change notifications awaiting the debounce timer.
    pub(crate) pending_updates: PendingUpdates,
    backoff: ExponentialBackoff,
    rib_policy: Option<RibPolicy>,
    // Last published route database, diffed against on every publish.
    route_db: RouteDb,
    route_updates_tx: UnboundedSender<RouteDatabaseDelta>,
    // Timer channels and handles.
    tx: ProtocolInputChannelsTx,
    rx: Option<ProtocolInputChannelsRx>,
    debounce_timer: Option<TimeoutTask>,
    cold_start_timer: Option<TimeoutTask>,
    ordered_fib_timer: Option<TimeoutTask>,
    rib_policy_timer: Option<TimeoutTask>,
    _counters_timer: Option<IntervalTask>,
}

// Accumulates change notifications between debounced route
// recomputations.
#[derive(Debug)]
pub struct PendingUpdates {
    node_name: String,
    count: usize,
    needs_route_update: bool,
    perf_events: Option<PerfEvents>,
}

#[derive(Clone, Debug)]
pub(crate) struct ProtocolInputChannelsTx {
    pub process_updates: UnboundedSender<ProcessUpdatesMsg>,
    pub cold_start_expiry: UnboundedSender<ColdStartExpiryMsg>,
    pub decrement_holds: UnboundedSender<DecrementHoldsMsg>,
    pub submit_counters: UnboundedSender<SubmitCountersMsg>,
    pub rib_policy_expiry: UnboundedSender<RibPolicyExpiryMsg>,
}

#[derive(Debug)]
pub(crate) struct ProtocolInputChannelsRx {
    pub process_updates: UnboundedReceiver<ProcessUpdatesMsg>,
    pub cold_start_expiry: UnboundedReceiver<ColdStartExpiryMsg>,
    pub decrement_holds: UnboundedReceiver<DecrementHoldsMsg>,
    pub submit_counters: UnboundedReceiver<SubmitCountersMsg>,
    pub rib_policy_expiry: UnboundedReceiver<RibPolicyExpiryMsg>,
}

// ===== impl PendingUpdates =====

impl PendingUpdates {
    pub(crate) fn new(node_name: String) -> PendingUpdates {
        PendingUpdates {
            node_name,
            count: 0,
            needs_route_update: false,
            perf_events: None,
        }
    }

    pub(crate) fn apply_link_state_change(
        &mut self,
        change: &LinkStateChange,
        perf_events: Option<PerfEvents>,
    ) {
        self.apply(change.needs_route_update(), perf_events);
    }

    pub(crate) fn apply_prefix_state_change(
        &mut self,
        changed: &BTreeSet<IpNetwork>,
        perf_events: Option<PerfEvents>,
    ) {
        self.apply(!changed.is_empty(), perf_events);
    }

    pub(crate) fn needs_route_update(&self) -> bool {
        self.needs_route_update
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    // Appends an event to the accumulated perf chain, if one exists.
    pub(crate) fn add_event(&mut self, event: &str) {
        if let Some(perf_events) = &mut self.perf_events {
            perf_events.add_event(&self.node_name, event);
        }
    }

    pub(crate) fn take_perf_events(&mut self) -> Option<PerfEvents> {
        self.perf_events.take()
    }

    pub(crate) fn reset(&mut self) {
        self.count = 0;
        self.needs_route_update = false;
        self.perf_events = None;
    }

    fn apply(
        &mut self,
        needs_route_update: bool,
        perf_events: Option<PerfEvents>,
    ) {
        self.count += 1;
        self.needs_route_update |= needs_route_update;
        if let Some(incoming) = perf_events {
            let node_name = &self.node_name;
            let events = self.perf_events.get_or_insert_with(|| {
                let mut perf_events = PerfEvents::default();
                perf_events.add_event(node_name, "DECISION_RECEIVED");
                perf_events
            });
            events.extend(incoming);
        }
    }
}

// ===== impl ProtocolInputChannelsRx =====

impl ProtocolInputChannelsRx {
    async fn recv(&mut self) -> Option<ProtocolInputMsg> {
        tokio::select! {
            msg = self.process_updates.recv() => {
                msg.map(ProtocolInputMsg::ProcessUpdates)
            }
            msg = self.cold_start_expiry.recv() => {
                msg.map(ProtocolInputMsg::ColdStartExpiry)
            }
            msg = self.decrement_holds.recv() => {
                msg.map(ProtocolInputMsg::DecrementHolds)
            }
            msg = self.submit_counters.recv() => {
                msg.map(ProtocolInputMsg::SubmitCounters)
            }
            msg = self.rib_policy_expiry.recv() => {
                msg.map(ProtocolInputMsg::RibPolicyExpiry)
            }
        }
    }
}

// ===== impl Decision =====

impl Decision {
    // Creates the instance plus the request handle served by its event
    // loop. `route_updates_tx` is the queue toward the FIB programmer.
    pub fn new(
        config: Config,
        counters: Counters,
        route_updates_tx: UnboundedSender<RouteDatabaseDelta>,
    ) -> (Decision, DecisionApi, Receiver<ApiRequest>) {
        let (api_tx, api_rx) = mpsc::channel(4);
        let (tx, rx) = Self::protocol_input_channels();
        let decision = Decision {
            solver: SpfSolver::new(&config, counters.clone()),
            pending_updates: PendingUpdates::new(config.node_name.clone()),
            backoff: ExponentialBackoff::new(
                Duration::from_millis(config.debounce_min_ms),
                Duration::from_millis(config.debounce_max_ms),
            ),
            config,
            counters,
            area_link_states: Default::default(),
            prefix_state: Default::default(),
            per_prefix_entries: Default::default(),
            full_db_entries: Default::default(),
            fib_times: Default::default(),
            rib_policy: None,
            route_db: Default::default(),
            route_updates_tx,
            tx,
            rx: Some(rx),
            debounce_timer: None,
            cold_start_timer: None,
            ordered_fib_timer: None,
            rib_policy_timer: None,
            _counters_timer: None,
        };
        let api = DecisionApi::new(api_tx);
        (decision, api, api_rx)
    }

    // Runs the event loop until every input queue is closed. No delta is
    // published after shutdown begins.
    pub async fn run(
        mut self,
        mut kvstore_updates_rx: UnboundedReceiver<Publication>,
        mut static_routes_rx: UnboundedReceiver<RouteDatabaseDelta>,
        mut api_rx: Receiver<ApiRequest>,
    ) {
        let mut protocol_rx = self.rx.take().unwrap();

        // Suppress route publications until the cold-start timer fires.
        if let Some(eor_time_secs) = self.config.eor_time_secs {
            self.cold_start_timer = Some(tasks::cold_start_timer(
                Duration::from_secs(eor_time_secs),
                &self.tx.cold_start_expiry,
            ));
        }

        // Periodic counter submission.
        self._counters_timer = Some(tasks::counters_interval(
            Duration::from_secs(self.config.counter_submit_interval_secs),
            &self.tx.submit_counters,
        ));

        let mut kvstore_open = true;
        let mut static_open = true;
        let mut api_open = true;
        while kvstore_open || static_open || api_open {
            tokio::select! {
                publication = kvstore_updates_rx.recv(), if kvstore_open => {
                    match publication {
                        Some(publication) => {
                            self.process_kvstore_update(publication)
                        }
                        None => {
                            info!("KvStore updates queue closed");
                            kvstore_open = false;
                        }
                    }
                }
                delta = static_routes_rx.recv(), if static_open => {
                    match delta {
                        Some(delta) => {
                            self.process_static_routes_update(delta)
                        }
                        None => {
                            info!("static routes queue closed");
                            static_open = false;
                        }
                    }
                }
                request = api_rx.recv(), if api_open => {
                    match request {
                        Some(request) => self.process_api_request(request),
                        None => api_open = false,
                    }
                }
                msg = protocol_rx.recv() => {
                    if let Some(msg) = msg {
                        self.process_protocol_msg(msg);
                    }
                }
            }
        }
    }

    // ===== input processing =====

    fn process_kvstore_update(&mut self, publication: Publication) {
        events::process_publication(self, publication);

        // Recompute routes behind the debounce timer, if anything
        // changed.
        if self.pending_updates.needs_route_update() {
            self.arm_debounce_timer();
        }
    }

    fn process_static_routes_update(&mut self, delta: RouteDatabaseDelta) {
        Debug::StaticRoutesUpdate(
            delta.mpls_routes_to_update.len(),
            delta.mpls_routes_to_delete.len(),
        )
        .log();
        self.solver.push_static_routes_delta(delta);
        self.arm_debounce_timer();
    }

    fn process_protocol_msg(&mut self, msg: ProtocolInputMsg) {
        match msg {
            ProtocolInputMsg::ProcessUpdates(_) => {
                // The timer has fired; its handle is spent.
                self.debounce_timer = None;
                self.process_pending_updates();
            }
            ProtocolInputMsg::ColdStartExpiry(_) => {
                Debug::ColdStartExpiry.log();
                self.cold_start_timer = None;
                self.cold_start_update();
            }
            ProtocolInputMsg::DecrementHolds(_) => {
                // The timer has fired; its handle is spent.
                self.ordered_fib_timer = None;
                self.decrement_ordered_fib_holds();
            }
            ProtocolInputMsg::SubmitCounters(_) => {
                self.update_global_counters();
            }
            ProtocolInputMsg::RibPolicyExpiry(_) => {
                Debug::RibPolicyExpired.log();
                self.rib_policy_timer = None;
                self.process_rib_policy_update();
            }
        }
    }

    fn process_api_request(&mut self, request: ApiRequest) {
        match request {
            ApiRequest::GetRouteDatabase { node, responder } => {
                let node = node
                    .unwrap_or_else(|| self.config.node_name.clone());
                let mut database = RouteDatabase {
                    node: node.clone(),
                    ..Default::default()
                };
                if let Some(route_db) = self.build_route_db_all(&node) {
                    database.unicast_routes =
                        route_db.unicast.into_values().collect();
                    database.mpls_routes =
                        route_db.mpls.into_values().collect();
                }
                for (label, nexthops) in
                    &self.solver.static_routes().mpls_routes
                {
                    database
                        .mpls_routes
                        .push(RibMplsEntry::new(*label, nexthops.clone()));
                }
                let _ = responder.send(database);
            }
            ApiRequest::GetStaticRoutes { responder } => {
                let _ = responder.send(self.solver.static_routes().clone());
            }
            ApiRequest::GetAdjacencyDatabases { responder } => {
                let adj_dbs = self
                    .area_link_states
                    .get(DEFAULT_AREA)
                    .map(|link_state| {
                        link_state
                            .adjacency_databases()
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                let _ = responder.send(adj_dbs);
            }
            ApiRequest::GetAllAdjacencyDatabases { responder } => {
                let adj_dbs = self
                    .area_link_states
                    .values()
                    .flat_map(|link_state| {
                        link_state.adjacency_databases().cloned()
                    })
                    .collect();
                let _ = responder.send(adj_dbs);
            }
            ApiRequest::GetPrefixDatabases { responder } => {
                let _ = responder.send(self.prefix_state.prefix_databases());
            }
            ApiRequest::SetRibPolicy { policy, responder } => {
                let _ = responder.send(self.set_rib_policy(policy));
            }
            ApiRequest::GetRibPolicy { responder } => {
                let result = if !self.config.enable_rib_policy {
                    Err(PolicyError::Disabled)
                } else {
                    match &self.rib_policy {
                        Some(policy) => Ok(policy.to_spec()),
                        None => Err(PolicyError::Invalid(
                            "RIB policy is not configured".to_owned(),
                        )),
                    }
                };
                let _ = responder.send(result);
            }
        }
    }

    // ===== route recomputation =====

    // Debounced recomputation entry point.
    fn process_pending_updates(&mut self) {
        // Until cold start ends, changes keep accumulating.
        if self.cold_start_timer.is_some() {
            return;
        }

        self.pending_updates.add_event("DECISION_DEBOUNCE");
        Debug::ProcessPendingUpdates(self.pending_updates.count()).log();

        // Static routes go out first, downstream routes may reference
        // them.
        let mut static_routes_updated = false;
        if self.solver.static_routes_updated() {
            static_routes_updated = true;
            if let Some(delta) = self.solver.process_static_route_updates() {
                let _ = self.route_updates_tx.send(delta);
            }
        }

        let maybe_route_db = if self.pending_updates.needs_route_update()
            || static_routes_updated
        {
            let node = self.config.node_name.clone();
            self.build_route_db_all(&node)
        } else {
            None
        };
        match maybe_route_db {
            Some(route_db) => {
                let perf_events = self.pending_updates.take_perf_events();
                self.send_route_update(route_db, perf_events, "ROUTE_UPDATE");
            }
            None => warn!("pending updates incurred no routes"),
        }

        self.pending_updates.reset();
        self.backoff.report_success();
        self.debounce_timer = None;
    }

    // First publication after the cold-start window. Without any routes,
    // an empty delta is still published so the FIB programmer can mark
    // convergence.
    fn cold_start_update(&mut self) {
        let node = self.config.node_name.clone();
        let route_db = match self.build_route_db_all(&node) {
            Some(route_db) => route_db,
            None => {
                error!(
                    "no routes to program after cold start duration, \
                     sending empty route database"
                );
                RouteDb::default()
            }
        };
        // Empty perf chain: this update must not count toward the FIB
        // programming time.
        self.send_route_update(
            route_db,
            Some(PerfEvents::default()),
            "COLD_START_UPDATE",
        );
    }

    fn decrement_ordered_fib_holds(&mut self) {
        Debug::HoldsDecrement.log();
        let mut topology_changed = false;
        let mut still_has_holds = false;
        for link_state in self.area_link_states.values_mut() {
            topology_changed |=
                link_state.decrement_holds().topology_changed;
            still_has_holds |= link_state.has_holds();
        }

        if topology_changed && self.cold_start_timer.is_none() {
            let node = self.config.node_name.clone();
            match self.build_route_db_all(&node) {
                // Empty perf chain: this update must not count toward the
                // FIB programming time.
                Some(route_db) => self.send_route_update(
                    route_db,
                    Some(PerfEvents::default()),
                    "ORDERED_FIB_HOLDS_EXPIRED",
                ),
                None => debug!("hold decrement incurred no route updates"),
            }
        }

        if still_has_holds {
            self.ordered_fib_timer = Some(tasks::ordered_fib_timer(
                self.max_fib_time(),
                &self.tx.decrement_holds,
            ));
        } else {
            self.ordered_fib_timer = None;
        }
    }

    // Recomputation triggered by a RIB policy change or expiry.
    fn process_rib_policy_update(&mut self) {
        if self.cold_start_timer.is_some() {
            return;
        }
        let node = self.config.node_name.clone();
        match self.build_route_db_all(&node) {
            // Empty perf chain: this update must not count toward the FIB
            // programming time.
            Some(route_db) => self.send_route_update(
                route_db,
                Some(PerfEvents::default()),
                "RIB_POLICY_UPDATE",
            ),
            None => warn!("RIB policy update incurred no routes"),
        }
    }

    // Builds and merges the route databases of every area.
    fn build_route_db_all(&mut self, node: &str) -> Option<RouteDb> {
        let mut route_db = RouteDb::default();
        for (area, link_state) in &mut self.area_link_states {
            match self.solver.build_route_db(
                node,
                link_state,
                &self.prefix_state,
            ) {
                Some(area_db) => route_db.merge(area_db),
                None => warn!(%area, "no routes for area"),
            }
        }
        if route_db.is_empty() { None } else { Some(route_db) }
    }

    // Applies the active RIB policy, diffs against the last published
    // database and pushes the delta to the FIB queue.
    fn send_route_update(
        &mut self,
        mut route_db: RouteDb,
        mut perf_events: Option<PerfEvents>,
        event: &str,
    ) {
        if let Some(perf_events) = perf_events.as_mut() {
            perf_events.add_event(&self.config.node_name, event);
        }

        if let Some(policy) = &self.rib_policy
            && policy.is_active()
        {
            route_db.unicast.retain(|prefix, entry| {
                if policy.apply(entry) {
                    debug!(%prefix, "RIB policy transformed the route");
                }
                if entry.nexthops.is_empty() {
                    debug!(%prefix,
                        "removing route, no remaining valid next-hops");
                    return false;
                }
                true
            });
        }

        let mut delta = route_delta(&route_db, &self.route_db);
        self.route_db = route_db;

        delta.node = self.config.node_name.clone();
        delta.perf_events = perf_events;
        Debug::RouteDeltaPublish(event, &delta).log();
        let _ = self.route_updates_tx.send(delta);
    }

    // ===== RIB policy =====

    fn set_rib_policy(
        &mut self,
        spec: RibPolicySpec,
    ) -> Result<(), PolicyError> {
        if !self.config.enable_rib_policy {
            return Err(PolicyError::Disabled);
        }
        let policy = RibPolicy::try_from_spec(spec)?;
        let validity = policy.ttl_duration();
        Debug::RibPolicyUpdate(validity).log();
        self.rib_policy = Some(policy);

        // Recompute once the policy expires.
        self.rib_policy_timer = Some(tasks::rib_policy_timer(
            validity,
            &self.tx.rib_policy_expiry,
        ));

        self.process_rib_policy_update();
        Ok(())
    }

    // ===== timers =====

    // Schedules the debounced recomputation with the next backoff. At max
    // backoff no further rescheduling happens, but a timer stays armed.
    fn arm_debounce_timer(&mut self) {
        if !self.backoff.at_max_backoff() {
            self.backoff.report_error();
            let timeout = self.backoff.time_remaining_until_retry();
            Debug::DebounceScheduled(timeout).log();
            match &mut self.debounce_timer {
                Some(timer) => timer.reset(timeout),
                None => {
                    self.debounce_timer = Some(tasks::process_updates_timer(
                        timeout,
                        &self.tx.process_updates,
                    ));
                }
            }
        } else if self.debounce_timer.is_none() {
            self.debounce_timer = Some(tasks::process_updates_timer(
                self.backoff.time_remaining_until_retry(),
                &self.tx.process_updates,
            ));
        }
    }

    pub(crate) fn arm_ordered_fib_timer(&mut self) {
        if self.ordered_fib_timer.is_none() {
            self.ordered_fib_timer = Some(tasks::ordered_fib_timer(
                self.max_fib_time(),
                &self.tx.decrement_holds,
            ));
        }
    }

    // Longest advertised FIB programming time across the network.
    fn max_fib_time(&self) -> Duration {
        self.fib_times
            .values()
            .copied()
            .max()
            .unwrap_or_default()
            .max(Duration::from_millis(1))
    }

    // ===== counters =====

    fn update_global_counters(&mut self) {
        let node = self.config.node_name.clone();
        let mut num_adjacencies = 0;
        let mut num_partial_adjacencies = 0;
        let mut node_set = BTreeSet::new();
        for link_state in self.area_link_states.values_mut() {
            num_adjacencies += link_state.num_links();
            let spf_result = link_state.spf_result(&node);
            for adj_db in link_state.adjacency_databases() {
                node_set.insert(adj_db.node.clone());
                let num_links =
                    link_state.links_from_node(&adj_db.node).len();
                // Partial adjacencies only count on reachable,
                // non-isolated nodes.
                if spf_result.contains_key(&adj_db.node) && num_links != 0 {
                    num_partial_adjacencies += adj_db
                        .adjacencies
                        .len()
                        .saturating_sub(num_links);
                }
            }
        }

        self.counters.set_gauge(
            "decision.num_partial_adjacencies",
            num_partial_adjacencies as u64,
        );
        self.counters.set_gauge(
            "decision.num_complete_adjacencies",
            num_adjacencies as u64,
        );
        self.counters.set_gauge(
            "decision.num_nodes",
            std::cmp::max(node_set.len(), 1) as u64,
        );
        self.counters.set_gauge(
            "decision.num_prefixes",
            self.prefix_state.prefixes().len() as u64,
        );
        self.counters.set_gauge(
            "decision.num_nodes_v4_loopbacks",
            self.prefix_state.node_loopbacks_v4().len() as u64,
        );
        self.counters.set_gauge(
            "decision.num_nodes_v6_loopbacks",
            self.prefix_state.node_loopbacks_v6().len() as u64,
        );
    }

    // ===== helpers =====

    fn protocol_input_channels()
    -> (ProtocolInputChannelsTx, ProtocolInputChannelsRx) {
        let (process_updates_tx, process_updates_rx) =
            mpsc::unbounded_channel();
        let (cold_start_tx, cold_start_rx) = mpsc::unbounded_channel();
        let (decrement_holds_tx, decrement_holds_rx) =
            mpsc::unbounded_channel();
        let (submit_counters_tx, submit_counters_rx) =
            mpsc::unbounded_channel();
        let (rib_policy_tx, rib_policy_rx) = mpsc::unbounded_channel();

        let tx = ProtocolInputChannelsTx {
            process_updates: process_updates_tx,
            cold_start_expiry: cold_start_tx,
            decrement_holds: decrement_holds_tx,
            submit_counters: submit_counters_tx,
            rib_policy_expiry: rib_policy_tx,
        };
        let rx = ProtocolInputChannelsRx {
            process_updates: process_updates_rx,
            cold_start_expiry: cold_start_rx,
            decrement_holds: decrement_holds_rx,
            submit_counters: submit_counters_rx,
            rib_policy_expiry: rib_policy_rx,
        };
        (tx, rx)
    }
}
