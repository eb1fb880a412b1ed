//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use arbor_utils::task::{IntervalTask, TimeoutTask};
use tokio::sync::mpsc::UnboundedSender;

//
// Decision tasks diagram:
//                                     +--------------+
//                     api_rx (1x) ->  |              |
//         kvstore_updates_rx (1x) ->  |              |
//           static_routes_rx (1x) ->  |              | -> (1x) route_updates
//                                     |   instance   |
//       process_updates_timer (1x) -> |              |
//            cold_start_timer (1x) -> |              |
//           ordered_fib_timer (1x) -> |              |
//          counters_interval  (1x) -> |              |
//            rib_policy_timer (1x) -> |              |
//                                     +--------------+
//

// Decision inter-task message types.
pub mod messages {
    use serde::{Deserialize, Serialize};

    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;

    // Input messages (timer tasks -> main task).
    pub mod input {
        use super::*;

        #[derive(Debug)]
        #[derive(Deserialize, Serialize)]
        pub enum ProtocolMsg {
            ProcessUpdates(ProcessUpdatesMsg),
            ColdStartExpiry(ColdStartExpiryMsg),
            DecrementHolds(DecrementHoldsMsg),
            SubmitCounters(SubmitCountersMsg),
            RibPolicyExpiry(RibPolicyExpiryMsg),
        }

        #[derive(Debug)]
        #[derive(Deserialize, Serialize)]
        pub struct ProcessUpdatesMsg {}

        #[derive(Debug)]
        #[derive(Deserialize, Serialize)]
        pub struct ColdStartExpiryMsg {}

        #[derive(Debug)]
        #[derive(Deserialize, Serialize)]
        pub struct DecrementHoldsMsg {}

        #[derive(Debug)]
        #[derive(Deserialize, Serialize)]
        pub struct SubmitCountersMsg {}

        #[derive(Debug)]
        #[derive(Deserialize, Serialize)]
        pub struct RibPolicyExpiryMsg {}
    }
}

// ===== Decision tasks =====

// Debounced route recomputation timer.
pub(crate) fn process_updates_timer(
    timeout: Duration,
    process_updatesp: &UnboundedSender<messages::input::ProcessUpdatesMsg>,
) -> TimeoutTask {
    let process_updatesp = process_updatesp.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::ProcessUpdatesMsg {};
        let _ = process_updatesp.send(msg);
    })
}

// Cold-start timer; route publications are suppressed until it fires.
pub(crate) fn cold_start_timer(
    timeout: Duration,
    cold_start_expiryp: &UnboundedSender<messages::input::ColdStartExpiryMsg>,
) -> TimeoutTask {
    let cold_start_expiryp = cold_start_expiryp.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::ColdStartExpiryMsg {};
        let _ = cold_start_expiryp.send(msg);
    })
}

// Ordered-FIB hold decrement timer.
pub(crate) fn ordered_fib_timer(
    timeout: Duration,
    decrement_holdsp: &UnboundedSender<messages::input::DecrementHoldsMsg>,
) -> TimeoutTask {
    let decrement_holdsp = decrement_holdsp.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::DecrementHoldsMsg {};
        let _ = decrement_holdsp.send(msg);
    })
}

// Periodic counter submission.
pub(crate) fn counters_interval(
    interval: Duration,
    submit_countersp: &UnboundedSender<messages::input::SubmitCountersMsg>,
) -> IntervalTask {
    let submit_countersp = submit_countersp.clone();

    IntervalTask::new(interval, false, move || {
        let submit_countersp = submit_countersp.clone();

        async move {
            let msg = messages::input::SubmitCountersMsg {};
            let _ = submit_countersp.send(msg);
        }
    })
}

// RIB policy expiry timer.
pub(crate) fn rib_policy_timer(
    timeout: Duration,
    rib_policy_expiryp: &UnboundedSender<messages::input::RibPolicyExpiryMsg>,
) -> TimeoutTask {
    let rib_policy_expiryp = rib_policy_expiryp.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::RibPolicyExpiryMsg {};
        let _ = rib_policy_expiryp.send(msg);
    })
}
