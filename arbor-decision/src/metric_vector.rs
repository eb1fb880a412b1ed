//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

// Metric entity type and priority reserved for the IGP cost appended by
// the decision engine itself. Advertisers must not use them.
pub const IGP_COST_ENTITY_TYPE: i64 = 0;
pub const IGP_COST_ENTITY_PRIORITY: i64 = 0;

// Ordered set of prioritized metric entities used to compare
// announcements of the same prefix deterministically.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct MetricVector {
    pub metrics: Vec<MetricEntity>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct MetricEntity {
    pub entity_type: i64,
    pub priority: i64,
    pub op: CompareType,
    pub is_best_path_tie_breaker: bool,
    // Higher values win; compared lexicographically.
    pub metric: Vec<i64>,
}

// How an entity present in only one of the two vectors is resolved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum CompareType {
    WinIfPresent,
    WinIfNotPresent,
    IgnoreIfNotPresent,
}

// Outcome of a metric vector comparison, from the perspective of the
// left-hand side. Tie-breaker entities only produce the tentative
// TieWinner/TieLooser outcomes, which select the best node without
// shrinking the equal-cost set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareResult {
    Winner,
    TieWinner,
    Tie,
    TieLooser,
    Looser,
    Error,
}

// ===== impl MetricVector =====

impl MetricVector {
    pub fn contains_entity_type(&self, entity_type: i64) -> bool {
        self.metrics
            .iter()
            .any(|entity| entity.entity_type == entity_type)
    }
}

// ===== impl CompareResult =====

impl CompareResult {
    // Returns the result seen from the other side of the comparison.
    fn invert(self) -> CompareResult {
        match self {
            CompareResult::Winner => CompareResult::Looser,
            CompareResult::TieWinner => CompareResult::TieLooser,
            CompareResult::Tie => CompareResult::Tie,
            CompareResult::TieLooser => CompareResult::TieWinner,
            CompareResult::Looser => CompareResult::Winner,
            CompareResult::Error => CompareResult::Error,
        }
    }
}

// ===== global functions =====

// Compares two metric vectors by walking their entities in decreasing
// priority order. Entities present on one side only are resolved by their
// compare op. The walk stops at the first non-tie outcome.
pub fn compare_metric_vectors(
    l: &MetricVector,
    r: &MetricVector,
) -> CompareResult {
    let l = match sorted_entities(l) {
        Some(entities) => entities,
        None => return CompareResult::Error,
    };
    let r = match sorted_entities(r) {
        Some(entities) => entities,
        None => return CompareResult::Error,
    };

    let mut result = CompareResult::Tie;
    let mut li = 0;
    let mut ri = 0;
    while result == CompareResult::Tie && li < l.len() && ri < r.len() {
        let (le, re) = (l[li], r[ri]);
        match le.priority.cmp(&re.priority) {
            Ordering::Equal => {
                result = compare_entities(le, re);
                li += 1;
                ri += 1;
            }
            Ordering::Greater => {
                result = loner_result(le);
                li += 1;
            }
            Ordering::Less => {
                result = loner_result(re).invert();
                ri += 1;
            }
        }
    }
    while result == CompareResult::Tie && li < l.len() {
        result = loner_result(l[li]);
        li += 1;
    }
    while result == CompareResult::Tie && ri < r.len() {
        result = loner_result(r[ri]).invert();
        ri += 1;
    }
    result
}

// ===== helper functions =====

// Returns the entities sorted by decreasing priority, or `None` when two
// entities share a priority (malformed vector).
fn sorted_entities(vector: &MetricVector) -> Option<Vec<&MetricEntity>> {
    let mut entities = vector.metrics.iter().collect::<Vec<_>>();
    entities.sort_by(|a, b| b.priority.cmp(&a.priority));
    if entities
        .windows(2)
        .any(|pair| pair[0].priority == pair[1].priority)
    {
        return None;
    }
    Some(entities)
}

// Compares two entities of equal priority.
fn compare_entities(l: &MetricEntity, r: &MetricEntity) -> CompareResult {
    if l.entity_type != r.entity_type
        || l.is_best_path_tie_breaker != r.is_best_path_tie_breaker
        || l.metric.len() != r.metric.len()
    {
        return CompareResult::Error;
    }
    for (a, b) in l.metric.iter().zip(r.metric.iter()) {
        match a.cmp(b) {
            Ordering::Greater => {
                return if l.is_best_path_tie_breaker {
                    CompareResult::TieWinner
                } else {
                    CompareResult::Winner
                };
            }
            Ordering::Less => {
                return if l.is_best_path_tie_breaker {
                    CompareResult::TieLooser
                } else {
                    CompareResult::Looser
                };
            }
            Ordering::Equal => {}
        }
    }
    CompareResult::Tie
}

// Resolves an entity present in one vector only.
fn loner_result(entity: &MetricEntity) -> CompareResult {
    match entity.op {
        CompareType::WinIfPresent => {
            if entity.is_best_path_tie_breaker {
                CompareResult::TieWinner
            } else {
                CompareResult::Winner
            }
        }
        CompareType::WinIfNotPresent => {
            if entity.is_best_path_tie_breaker {
                CompareResult::TieLooser
            } else {
                CompareResult::Looser
            }
        }
        CompareType::IgnoreIfNotPresent => CompareResult::Tie,
    }
}
