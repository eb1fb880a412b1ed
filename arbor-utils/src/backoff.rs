//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::{Duration, Instant};

// Exponential backoff tracker.
//
// Every reported error doubles the retry delay, up to the configured
// maximum. A reported success resets the tracker to its initial state.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    init_delay: Duration,
    max_delay: Duration,
    current_delay: Duration,
    last_error: Option<Instant>,
}

// ===== impl ExponentialBackoff =====

impl ExponentialBackoff {
    pub fn new(
        init_delay: Duration,
        max_delay: Duration,
    ) -> ExponentialBackoff {
        ExponentialBackoff {
            init_delay,
            max_delay,
            current_delay: Duration::ZERO,
            last_error: None,
        }
    }

    // Registers an error, doubling the retry delay.
    pub fn report_error(&mut self) {
        self.current_delay = if self.last_error.is_none() {
            self.init_delay
        } else {
            std::cmp::min(self.current_delay * 2, self.max_delay)
        };
        self.last_error = Some(Instant::now());
    }

    // Registers a success, resetting the tracker.
    pub fn report_success(&mut self) {
        self.current_delay = Duration::ZERO;
        self.last_error = None;
    }

    // Returns whether the retry delay has reached its maximum value.
    pub fn at_max_backoff(&self) -> bool {
        self.current_delay >= self.max_delay
    }

    // Returns how long to wait before the next retry.
    pub fn time_remaining_until_retry(&self) -> Duration {
        match self.last_error {
            Some(last_error) => (last_error + self.current_delay)
                .saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }
}

// ===== tests =====
