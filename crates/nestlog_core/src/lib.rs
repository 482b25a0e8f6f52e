//! Core domain logic for NestLog, a shared baby-care log.
//! This crate is the single source of truth for membership, invite, sleep
//! session and event ledger invariants.

pub mod access;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use access::permissions;
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::baby::{ActiveSleep, Baby, BabyId};
pub use model::event::{CareEvent, EventFields, EventId, EventKind, EventPatch};
pub use model::invite::{Invite, InviteId, InviteStatus};
pub use model::principal::{normalize_email, Principal, PrincipalId};
pub use model::role::Role;
pub use model::{EpochMs, ModelValidationError};
pub use service::sleep_service::{elapsed_ms, elapsed_seconds, format_elapsed};
pub use service::{
    BabyService, EventService, InviteService, MemberService, SendInviteOutcome, ServiceError,
    ServiceResult, SleepService, SleepTimer, TimerView,
};
pub use store::{
    Clock, DocumentStore, ManualClock, SqliteStore, StoreError, StoreResult, Subscription,
    SystemClock,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
