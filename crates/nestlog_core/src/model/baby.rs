//! Baby record: the shared resource that owns memberships, the active
//! sleep session and an event ledger.
//!
//! # Invariants
//! - At least one member holds `Role::Owner`.
//! - `active_sleep` is the only representation of a running session, so at
//!   most one session can exist per baby.
//! - `name` is non-blank after trim.

use crate::model::principal::PrincipalId;
use crate::model::role::Role;
use crate::model::{EpochMs, ModelValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type BabyId = Uuid;

/// Running sleep session co-located on the baby record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSleep {
    /// Authoritative server time when the session started.
    pub started_at: EpochMs,
    pub started_by: PrincipalId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baby {
    pub id: BabyId,
    pub name: String,
    pub birth_date: Option<EpochMs>,
    pub photo_url: Option<String>,
    pub created_by: PrincipalId,
    pub created_at: EpochMs,
    pub members: BTreeMap<PrincipalId, Role>,
    pub active_sleep: Option<ActiveSleep>,
}

impl Baby {
    /// Creates a baby whose only member is `creator` as owner.
    pub fn new(
        creator: PrincipalId,
        name: impl Into<String>,
        birth_date: Option<EpochMs>,
        created_at: EpochMs,
    ) -> Self {
        let mut members = BTreeMap::new();
        members.insert(creator.clone(), Role::Owner);
        Self {
            id: Uuid::new_v4(),
            name: name.into().trim().to_string(),
            birth_date,
            photo_url: None,
            created_by: creator,
            created_at,
            members,
            active_sleep: None,
        }
    }

    /// Validates persisted/profile invariants that do not depend on callers.
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        validate_baby_name(&self.name)
    }

    /// Number of members currently holding `role`.
    pub fn count_role(&self, role: Role) -> usize {
        self.members.values().filter(|held| **held == role).count()
    }

    /// Owner principal, if the record is well-formed.
    pub fn owner(&self) -> Option<&PrincipalId> {
        self.members
            .iter()
            .find(|(_, role)| **role == Role::Owner)
            .map(|(principal, _)| principal)
    }

    pub fn is_sleeping(&self) -> bool {
        self.active_sleep.is_some()
    }
}

pub fn validate_baby_name(name: &str) -> Result<(), ModelValidationError> {
    if name.trim().is_empty() {
        return Err(ModelValidationError::BlankBabyName);
    }
    Ok(())
}
