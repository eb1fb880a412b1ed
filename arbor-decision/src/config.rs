//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::Deserialize;

// Decision configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node_name: String,
    // Program v4 prefixes. When disabled, v4 prefixes are dropped.
    pub enable_v4: bool,
    // Compute Loop-Free Alternate paths (RFC 5286).
    pub compute_lfa_paths: bool,
    // Coordinate FIB programming across nodes with hold timers.
    pub enable_ordered_fib_programming: bool,
    // Compute BGP routes but mark them do-not-install.
    pub bgp_dry_run: bool,
    // Append the IGP cost to BGP metric vector comparisons.
    pub bgp_use_igp_metric: bool,
    pub enable_rib_policy: bool,
    // Debounce window for route recomputation.
    pub debounce_min_ms: u64,
    pub debounce_max_ms: u64,
    // Cold-start duration; route publications are suppressed until it
    // elapses. `None` disables cold-start handling.
    pub eor_time_secs: Option<u64>,
    pub counter_submit_interval_secs: u64,
}

// ===== impl Config =====

impl Default for Config {
    fn default() -> Config {
        Config {
            node_name: String::new(),
            enable_v4: false,
            compute_lfa_paths: false,
            enable_ordered_fib_programming: false,
            bgp_dry_run: false,
            bgp_use_igp_metric: false,
            enable_rib_policy: false,
            debounce_min_ms: 10,
            debounce_max_ms: 250,
            eor_time_secs: None,
            counter_submit_interval_secs: 5,
        }
    }
}
