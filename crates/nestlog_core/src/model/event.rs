//! Care event ledger records.
//!
//! # Responsibility
//! - Define the discrete care events logged against a baby.
//! - Enforce kind-specific field rules before persistence.
//!
//! # Invariants
//! - `kind` and `created_at` never change after creation.
//! - Only `amount_ml` and `duration_min` are mutable.
//! - `end` is never earlier than `start` when both are set.

use crate::model::baby::BabyId;
use crate::model::principal::PrincipalId;
use crate::model::{EpochMs, ModelValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type EventId = Uuid;

/// Largest feeding volume accepted from manual entry.
pub const MAX_FEEDING_ML: u32 = 2_000;
/// Largest sleep length accepted from manual entry (24 h). Timer-derived
/// sessions are not capped.
pub const MAX_MANUAL_SLEEP_MIN: u32 = 1_440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Feeding,
    Sleep,
    Poop,
    Pee,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feeding => "feeding",
            Self::Sleep => "sleep",
            Self::Poop => "poop",
            Self::Pee => "pee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "feeding" => Some(Self::Feeding),
            "sleep" => Some(Self::Sleep),
            "poop" => Some(Self::Poop),
            "pee" => Some(Self::Pee),
            _ => None,
        }
    }
}

/// Kind-specific payload of a care event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFields {
    /// Feeding volume in millilitres.
    pub amount_ml: Option<u32>,
    /// Sleep length in whole minutes.
    pub duration_min: Option<u32>,
    pub start: Option<EpochMs>,
    pub end: Option<EpochMs>,
}

impl EventFields {
    pub fn feeding(amount_ml: u32) -> Self {
        Self {
            amount_ml: Some(amount_ml),
            ..Self::default()
        }
    }

    pub fn sleep(duration_min: u32) -> Self {
        Self {
            duration_min: Some(duration_min),
            ..Self::default()
        }
    }

    /// Rejects hand-entered values above `MAX_FEEDING_ML` or
    /// `MAX_MANUAL_SLEEP_MIN`.
    pub fn check_manual_bounds(&self) -> Result<(), ModelValidationError> {
        check_max("amount_ml", self.amount_ml, MAX_FEEDING_ML)?;
        check_max("duration_min", self.duration_min, MAX_MANUAL_SLEEP_MIN)
    }
}

/// Field merge applied by `update_event`; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    pub amount_ml: Option<u32>,
    pub duration_min: Option<u32>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.amount_ml.is_none() && self.duration_min.is_none()
    }

    /// Same ceilings as `EventFields::check_manual_bounds`, for the patched
    /// values only.
    pub fn check_manual_bounds(&self) -> Result<(), ModelValidationError> {
        check_max("amount_ml", self.amount_ml, MAX_FEEDING_ML)?;
        check_max("duration_min", self.duration_min, MAX_MANUAL_SLEEP_MIN)
    }

    /// Merges the patch into `fields`.
    pub fn apply_to(&self, fields: &mut EventFields) {
        if let Some(amount) = self.amount_ml {
            fields.amount_ml = Some(amount);
        }
        if let Some(duration) = self.duration_min {
            fields.duration_min = Some(duration);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareEvent {
    pub id: EventId,
    pub baby_id: BabyId,
    /// Serialized as `type` to match the ledger document schema.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Authoritative server time; the ledger ordering key.
    pub time: EpochMs,
    pub logged_by: PrincipalId,
    pub fields: EventFields,
    pub created_at: EpochMs,
    pub updated_at: EpochMs,
}

impl CareEvent {
    /// Creates an event stamped with one server time for all clocks.
    pub fn new(
        baby_id: BabyId,
        kind: EventKind,
        logged_by: PrincipalId,
        fields: EventFields,
        server_now: EpochMs,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            baby_id,
            kind,
            time: server_now,
            logged_by,
            fields,
            created_at: server_now,
            updated_at: server_now,
        }
    }

    /// Validates kind-specific field rules.
    ///
    /// # Errors
    /// - Feeding without a positive `amount_ml`, or with a duration.
    /// - Sleep without a positive `duration_min`, or with an amount.
    /// - Poop/pee carrying amount or duration.
    /// - `end < start`.
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        let kind = self.kind.as_str();
        let fields = &self.fields;
        match self.kind {
            EventKind::Feeding => {
                require_positive(kind, "amount_ml", fields.amount_ml)?;
                forbid(kind, "duration_min", fields.duration_min)?;
            }
            EventKind::Sleep => {
                require_positive(kind, "duration_min", fields.duration_min)?;
                forbid(kind, "amount_ml", fields.amount_ml)?;
            }
            EventKind::Poop | EventKind::Pee => {
                forbid(kind, "amount_ml", fields.amount_ml)?;
                forbid(kind, "duration_min", fields.duration_min)?;
            }
        }

        if let (Some(start), Some(end)) = (fields.start, fields.end) {
            if end < start {
                return Err(ModelValidationError::EndBeforeStart { start, end });
            }
        }
        Ok(())
    }
}

fn require_positive(
    kind: &'static str,
    field: &'static str,
    value: Option<u32>,
) -> Result<(), ModelValidationError> {
    match value {
        None => Err(ModelValidationError::MissingField { kind, field }),
        Some(0) => Err(ModelValidationError::NonPositive(field)),
        Some(_) => Ok(()),
    }
}

fn check_max(
    field: &'static str,
    value: Option<u32>,
    max: u32,
) -> Result<(), ModelValidationError> {
    match value {
        Some(value) if value > max => Err(ModelValidationError::ExceedsMaximum { field, max }),
        _ => Ok(()),
    }
}

fn forbid(
    kind: &'static str,
    field: &'static str,
    value: Option<u32>,
) -> Result<(), ModelValidationError> {
    match value {
        Some(_) => Err(ModelValidationError::UnexpectedField { kind, field }),
        None => Ok(()),
    }
}
