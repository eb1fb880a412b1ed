//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// Process-wide counter registry handle.
//
// Cloning the handle shares the underlying registry. Writes are
// fire-and-forget; tests inject their own handle and inspect it directly.
#[derive(Clone, Debug, Default)]
pub struct Counters {
    inner: Arc<Mutex<CountersInner>>,
}

#[derive(Debug, Default)]
struct CountersInner {
    // Monotonic counters.
    counters: BTreeMap<String, u64>,
    // Last-value gauges.
    gauges: BTreeMap<String, u64>,
}

// ===== impl Counters =====

impl Counters {
    // Increments a monotonic counter by one.
    pub fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    // Adds a value to a monotonic counter.
    pub fn add(&self, name: &str, value: u64) {
        let mut inner = self.inner.lock().unwrap();
        *inner.counters.entry(name.to_owned()).or_default() += value;
    }

    // Sets a gauge to the given value.
    pub fn set_gauge(&self, name: &str, value: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.gauges.insert(name.to_owned(), value);
    }

    // Returns the current value of a counter (zero if never written).
    pub fn counter(&self, name: &str) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.counters.get(name).copied().unwrap_or(0)
    }

    // Returns the current value of a gauge.
    pub fn gauge(&self, name: &str) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner.gauges.get(name).copied()
    }

    // Returns a snapshot of all counters and gauges.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let inner = self.inner.lock().unwrap();
        inner
            .counters
            .iter()
            .chain(inner.gauges.iter())
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }
}

// ===== tests =====
