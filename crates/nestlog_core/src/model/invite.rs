//! Email-addressed membership invitations.
//!
//! # Invariants
//! - Status moves `Pending -> Accepted | Declined` at most once.
//! - Terminal invites are never rewritten; cancel deletes a pending record.
//! - `to_email` is stored normalized (trimmed, lowercased).

use crate::model::baby::BabyId;
use crate::model::principal::PrincipalId;
use crate::model::role::Role;
use crate::model::EpochMs;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type InviteId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

impl InviteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }

    /// Accepted and declined invites never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: InviteId,
    pub baby_id: BabyId,
    /// Denormalized so the recipient inbox can render without baby access.
    pub baby_name: String,
    pub from_uid: PrincipalId,
    pub from_name: String,
    pub to_email: String,
    pub role: Role,
    pub status: InviteStatus,
    pub created_at: EpochMs,
    pub resolved_at: Option<EpochMs>,
    pub resolved_by: Option<PrincipalId>,
}

impl Invite {
    /// Builds a fresh pending invite. `to_email` must already be normalized.
    pub fn pending(
        baby_id: BabyId,
        baby_name: impl Into<String>,
        from_uid: PrincipalId,
        from_name: impl Into<String>,
        to_email: impl Into<String>,
        role: Role,
        created_at: EpochMs,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            baby_id,
            baby_name: baby_name.into(),
            from_uid,
            from_name: from_name.into(),
            to_email: to_email.into(),
            role,
            status: InviteStatus::Pending,
            created_at,
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.status.is_terminal()
    }
}
