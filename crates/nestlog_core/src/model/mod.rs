//! Domain model for shared baby-care tracking.
//!
//! # Responsibility
//! - Define canonical records shared by services and store implementations.
//! - Keep model-level invariants (`validate`) next to the data they guard.
//!
//! # Invariants
//! - Every baby, invite and care event is identified by a stable UUID.
//! - Principals are referenced by `PrincipalId`, never copied into records.
//! - All timestamps are Unix epoch milliseconds assigned by the store clock.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod baby;
pub mod event;
pub mod invite;
pub mod principal;
pub mod role;

/// Unix epoch milliseconds.
pub type EpochMs = i64;

/// Model invariant violations detected before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    /// Baby display name is blank after trim.
    BlankBabyName,
    /// Email address does not look like `local@domain.tld`.
    InvalidEmail(String),
    /// Event is missing a field its kind requires.
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    /// Event carries a field its kind does not allow.
    UnexpectedField {
        kind: &'static str,
        field: &'static str,
    },
    /// Numeric field must be strictly positive.
    NonPositive(&'static str),
    /// Hand-entered measurement is above the plausible ceiling.
    ExceedsMaximum { field: &'static str, max: u32 },
    /// `end` is earlier than `start`.
    EndBeforeStart { start: EpochMs, end: EpochMs },
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankBabyName => write!(f, "baby name must not be blank"),
            Self::InvalidEmail(value) => write!(f, "invalid email address: `{value}`"),
            Self::MissingField { kind, field } => {
                write!(f, "{kind} event requires field `{field}`")
            }
            Self::UnexpectedField { kind, field } => {
                write!(f, "{kind} event must not carry field `{field}`")
            }
            Self::NonPositive(field) => write!(f, "field `{field}` must be greater than 0"),
            Self::ExceedsMaximum { field, max } => {
                write!(f, "field `{field}` must not exceed {max}")
            }
            Self::EndBeforeStart { start, end } => {
                write!(f, "event end {end} is earlier than start {start}")
            }
        }
    }
}

impl Error for ModelValidationError {}
