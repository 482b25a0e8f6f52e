//! Core use-case services.
//!
//! # Responsibility
//! - Check permissions against the latest baby snapshot, then express each
//!   use case as guarded store mutations.
//! - Keep callers (CLI, future UI bindings) decoupled from storage details.
//!
//! # Invariants
//! - Every operation takes the acting principal explicitly.
//! - Multi-document transitions go through `DocumentStore::transaction`.
//! - No operation retries on its own.

use crate::model::baby::{Baby, BabyId};
use crate::model::principal::PrincipalId;
use crate::store::DocumentStore;
use log::warn;

pub mod baby_service;
pub mod error;
pub mod event_service;
pub mod invite_service;
pub mod member_service;
pub mod sleep_service;

pub use baby_service::BabyService;
pub use error::{ServiceError, ServiceResult};
pub use event_service::EventService;
pub use invite_service::{InviteService, SendInviteOutcome};
pub use member_service::MemberService;
pub use sleep_service::{SleepService, SleepTimer, TimerView};

pub(crate) fn load_baby<S: DocumentStore + ?Sized>(
    store: &S,
    baby_id: BabyId,
) -> ServiceResult<Baby> {
    store
        .get_baby(baby_id)?
        .ok_or_else(|| ServiceError::NotFound(format!("baby {baby_id}")))
}

pub(crate) fn authorize(
    allowed: bool,
    action: &'static str,
    baby_id: BabyId,
    actor: &PrincipalId,
) -> ServiceResult<()> {
    if allowed {
        return Ok(());
    }
    warn!(
        "event=permission_check module=service status=denied action=\"{action}\" baby_id={baby_id} principal={actor}"
    );
    Err(ServiceError::denied(action, actor))
}
