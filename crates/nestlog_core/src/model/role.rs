//! Per-baby membership roles.
//!
//! # Invariants
//! - The variant set is closed; storage uses the stable ids from `as_str`.
//! - Ordering is partial: `Viewer` and `Pediatrician` are both read-only and
//!   incomparable with each other.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Role held by one principal on one baby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Parent,
    Viewer,
    Pediatrician,
}

/// Every role, highest privilege first.
pub const ALL_ROLES: [Role; 5] = [
    Role::Owner,
    Role::Admin,
    Role::Parent,
    Role::Viewer,
    Role::Pediatrician,
];

impl Role {
    /// Stable storage id.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Parent => "parent",
            Self::Viewer => "viewer",
            Self::Pediatrician => "pediatrician",
        }
    }

    /// Parses a stable storage id; unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "parent" => Some(Self::Parent),
            "viewer" => Some(Self::Viewer),
            "pediatrician" => Some(Self::Pediatrician),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Owner => "Owner",
            Self::Admin => "Admin",
            Self::Parent => "Parent",
            Self::Viewer => "Viewer",
            Self::Pediatrician => "Pediatrician",
        }
    }

    /// Short description shown in the invite role picker.
    pub fn description(self) -> &'static str {
        match self {
            Self::Owner => "Full access, including deleting the baby",
            Self::Admin => "Full access except deleting the baby",
            Self::Parent => "Can add, edit, and delete events",
            Self::Viewer => "Can view events and history, read-only",
            Self::Pediatrician => "Read-only access to events and analytics",
        }
    }

    // Viewer and Pediatrician share a tier and stay incomparable.
    fn tier(self) -> u8 {
        match self {
            Self::Owner => 3,
            Self::Admin => 2,
            Self::Parent => 1,
            Self::Viewer | Self::Pediatrician => 0,
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match self.tier().cmp(&other.tier()) {
            Ordering::Equal => None,
            ordering => Some(ordering),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
