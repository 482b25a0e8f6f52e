//! Error type shared by every use-case service.

use crate::model::principal::PrincipalId;
use crate::model::ModelValidationError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    /// Actor lacks the role required for `action`. Nothing was written.
    PermissionDenied {
        action: &'static str,
        principal: PrincipalId,
    },
    /// Referenced baby, invite, member or event does not exist.
    NotFound(String),
    /// Operation is not valid for the current state, including guards that
    /// failed because another device got there first.
    InvalidState(String),
    /// Input rejected by model validation.
    Validation(ModelValidationError),
    /// Store failure; the caller decides whether to retry.
    Store(StoreError),
}

impl ServiceError {
    pub(crate) fn denied(action: &'static str, principal: &PrincipalId) -> Self {
        Self::PermissionDenied {
            action,
            principal: principal.clone(),
        }
    }

    /// Whether the failure came from the store and may clear up on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_transient())
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied { action, principal } => {
                write!(f, "permission denied: {principal} may not {action}")
            }
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::PreconditionFailed(message) => Self::InvalidState(message),
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Validation(err) => Self::Validation(err),
            other => Self::Store(other),
        }
    }
}

impl From<ModelValidationError> for ServiceError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceError;
    use crate::db::DbError;
    use crate::store::StoreError;

    #[test]
    fn guard_failures_become_invalid_state() {
        let err = ServiceError::from(StoreError::PreconditionFailed("lost race".to_string()));
        assert!(matches!(err, ServiceError::InvalidState(message) if message == "lost race"));
    }

    #[test]
    fn only_store_outages_are_transient() {
        let outage = ServiceError::from(StoreError::Unavailable("offline".to_string()));
        assert!(outage.is_transient());
        let busy = ServiceError::from(StoreError::from(rusqlite::Error::InvalidQuery));
        assert!(busy.is_transient());
        let schema = ServiceError::from(StoreError::Db(DbError::SchemaTooNew {
            found: 9,
            supported: 2,
        }));
        assert!(!schema.is_transient());
        let missing = ServiceError::from(StoreError::NotFound("baby".to_string()));
        assert!(!missing.is_transient());
        let corrupt = ServiceError::from(StoreError::InvalidData("bad role".to_string()));
        assert!(!corrupt.is_transient());
    }
}
