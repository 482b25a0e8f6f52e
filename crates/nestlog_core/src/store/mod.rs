//! Document store collaborator contract.
//!
//! # Responsibility
//! - Describe the persistence protocol the services rely on: single-document
//!   reads, guarded atomic transactions, live watches and server time.
//! - Keep storage engines swappable behind `DocumentStore`.
//!
//! # Invariants
//! - `transaction` applies every mutation or none of them.
//! - Guard mutations (`Expect*`) are evaluated inside the same transaction
//!   as the writes they protect.
//! - Every successful commit is observable by watchers as one transition.
//!
//! # See also
//! - `store::sqlite_store` for the SQLite implementation.

use crate::db::DbError;
use crate::model::baby::{ActiveSleep, Baby, BabyId};
use crate::model::event::{CareEvent, EventId, EventPatch};
use crate::model::invite::{Invite, InviteId, InviteStatus};
use crate::model::principal::PrincipalId;
use crate::model::role::Role;
use crate::model::{EpochMs, ModelValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod clock;
pub mod sqlite_store;
pub mod watch;

pub use clock::{Clock, ManualClock, SystemClock};
pub use sqlite_store::SqliteStore;
pub use watch::{
    ErrorCallback, Snapshot, SnapshotCallback, SnapshotData, Subscription, WatchHub, WatchTarget,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    /// Storage engine failure (connection, migration, constraint).
    Db(DbError),
    /// Persisted data no longer maps to the model.
    InvalidData(String),
    /// Mutation or guard referenced a document that does not exist.
    NotFound(String),
    /// A transaction guard did not hold; nothing was written.
    PreconditionFailed(String),
    /// Record rejected by model validation before any write.
    Validation(ModelValidationError),
    /// Store cannot serve requests right now.
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Db(err) => err.is_transient(),
            Self::Unavailable(_) => true,
            _ => false,
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::NotFound(what) => write!(f, "document not found: {what}"),
            Self::PreconditionFailed(message) => write!(f, "precondition failed: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ModelValidationError> for StoreError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

/// One step of a transaction: either a guard or a single-document write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Fails unless the invite exists with exactly this status.
    ExpectInviteStatus {
        invite_id: InviteId,
        status: InviteStatus,
    },
    /// Fails unless `principal_id` currently holds `role` (`None` = absent).
    ExpectMemberRole {
        baby_id: BabyId,
        principal_id: PrincipalId,
        role: Option<Role>,
    },
    /// Fails unless `principal_id` holds any role.
    ExpectMember {
        baby_id: BabyId,
        principal_id: PrincipalId,
    },
    /// Fails unless the running session started at `started_at`
    /// (`None` = no session running).
    ExpectActiveSleep {
        baby_id: BabyId,
        started_at: Option<EpochMs>,
    },
    InsertBaby(Baby),
    UpdateBabyProfile {
        baby_id: BabyId,
        name: String,
        birth_date: Option<EpochMs>,
    },
    /// `None` clears the photo.
    SetBabyPhoto {
        baby_id: BabyId,
        photo_url: Option<String>,
    },
    /// Deletes the baby with its members, events and invites.
    DeleteBaby(BabyId),
    SetMemberRole {
        baby_id: BabyId,
        principal_id: PrincipalId,
        role: Role,
    },
    /// Deletes the member entry entirely.
    RemoveMember {
        baby_id: BabyId,
        principal_id: PrincipalId,
    },
    SetActiveSleep {
        baby_id: BabyId,
        active: Option<ActiveSleep>,
    },
    InsertInvite(Invite),
    ResolveInvite {
        invite_id: InviteId,
        status: InviteStatus,
        resolved_at: EpochMs,
        resolved_by: Option<PrincipalId>,
    },
    DeleteInvite(InviteId),
    InsertEvent(CareEvent),
    PatchEvent {
        baby_id: BabyId,
        event_id: EventId,
        patch: EventPatch,
        updated_at: EpochMs,
    },
    DeleteEvent {
        baby_id: BabyId,
        event_id: EventId,
    },
}

/// Filter for invite lookups; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteQuery {
    pub baby_id: Option<BabyId>,
    pub to_email: Option<String>,
    pub from_uid: Option<PrincipalId>,
    pub status: Option<InviteStatus>,
}

impl InviteQuery {
    /// Pending invites for one `(baby, email)` pair.
    pub fn pending_for(baby_id: BabyId, to_email: impl Into<String>) -> Self {
        Self {
            baby_id: Some(baby_id),
            to_email: Some(to_email.into()),
            from_uid: None,
            status: Some(InviteStatus::Pending),
        }
    }

    /// Recipient inbox.
    pub fn inbox(to_email: impl Into<String>) -> Self {
        Self {
            to_email: Some(to_email.into()),
            status: Some(InviteStatus::Pending),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Ledger query for one baby, bounded by `since <= time < until`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub baby_id: BabyId,
    pub since: Option<EpochMs>,
    pub until: Option<EpochMs>,
    pub order: TimeOrder,
    pub limit: Option<u32>,
}

impl EventQuery {
    /// Full display feed, newest first.
    pub fn feed(baby_id: BabyId) -> Self {
        Self {
            baby_id,
            since: None,
            until: None,
            order: TimeOrder::NewestFirst,
            limit: None,
        }
    }
}

/// Persistence collaborator used by every service.
///
/// Implementations must be shareable across threads: each thread stands in
/// for one connected device.
pub trait DocumentStore: Send + Sync {
    /// Authoritative timestamp for `time`, `created_at` and session starts.
    fn server_time(&self) -> StoreResult<EpochMs>;

    fn get_baby(&self, baby_id: BabyId) -> StoreResult<Option<Baby>>;

    /// Babies where `principal` holds any role, oldest first.
    fn babies_for_member(&self, principal: &PrincipalId) -> StoreResult<Vec<Baby>>;

    fn get_invite(&self, invite_id: InviteId) -> StoreResult<Option<Invite>>;

    /// Matching invites, newest first.
    fn query_invites(&self, query: &InviteQuery) -> StoreResult<Vec<Invite>>;

    fn get_event(&self, baby_id: BabyId, event_id: EventId) -> StoreResult<Option<CareEvent>>;

    fn query_events(&self, query: &EventQuery) -> StoreResult<Vec<CareEvent>>;

    /// Single-document write.
    fn write(&self, mutation: Mutation) -> StoreResult<()> {
        self.transaction(vec![mutation])
    }

    /// Applies all mutations atomically, in order.
    fn transaction(&self, mutations: Vec<Mutation>) -> StoreResult<()>;

    /// Starts a live subscription. The current snapshot is delivered before
    /// this returns; later snapshots follow every commit touching `target`.
    fn watch(
        &self,
        target: WatchTarget,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> StoreResult<Subscription>;
}
