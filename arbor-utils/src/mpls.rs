//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// MPLS label.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Label(u32);

// Per-hop MPLS label operation attached to a next-hop.
//
// PUSH stacks are ordered from the bottom of the stack to the top.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum MplsAction {
    Push(Vec<Label>),
    Swap(Label),
    Php,
    PopAndLookup,
}

// ===== impl Label =====

impl Label {
    pub const VALUE_MASK: u32 = 0x000FFFFF;

    // Well-known MPLS labels.
    pub const IPV4_EXPLICIT_NULL: u32 = 0;
    pub const ROUTER_ALERT: u32 = 1;
    pub const IPV6_EXPLICIT_NULL: u32 = 2;
    pub const IMPLICIT_NULL: u32 = 3;

    // MPLS label ranges.
    pub const RESERVED_RANGE: std::ops::RangeInclusive<u32> = 0..=15;
    pub const UNRESERVED_RANGE: std::ops::RangeInclusive<u32> = 16..=1048575;

    pub fn new(label: u32) -> Label {
        if label > *Self::UNRESERVED_RANGE.end() {
            panic!("invalid label value: {}", label);
        }
        Label(label)
    }

    // Fallible constructor for labels learned from the network. Only
    // unreserved label values are accepted.
    pub fn checked(label: u32) -> Option<Label> {
        if Self::UNRESERVED_RANGE.contains(&label) {
            Some(Label(label))
        } else {
            None
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_reserved(&self) -> bool {
        Self::RESERVED_RANGE.contains(&self.0)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Label::IPV4_EXPLICIT_NULL => write!(f, "ipv4-explicit-null"),
            Label::ROUTER_ALERT => write!(f, "router-alert"),
            Label::IPV6_EXPLICIT_NULL => write!(f, "ipv6-explicit-null"),
            Label::IMPLICIT_NULL => write!(f, "implicit-null"),
            _ => write!(f, "{}", self.0),
        }
    }
}

// ===== impl MplsAction =====

impl std::fmt::Display for MplsAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MplsAction::Push(labels) => {
                write!(f, "push(")?;
                for (pos, label) in labels.iter().enumerate() {
                    if pos != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", label)?;
                }
                write!(f, ")")
            }
            MplsAction::Swap(label) => write!(f, "swap({})", label),
            MplsAction::Php => write!(f, "php"),
            MplsAction::PopAndLookup => write!(f, "pop-and-lookup"),
        }
    }
}

// ===== tests =====
