//! Authenticated identities supplied by the external identity provider.
//!
//! The core never manages credentials; it only reads `uid` and `email` from
//! whatever the identity collaborator hands over.

use crate::model::ModelValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

/// Opaque principal identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for PrincipalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PrincipalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Current principal as reported by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: PrincipalId,
    pub email: String,
    pub display_name: String,
}

impl Principal {
    pub fn new(
        uid: impl Into<PrincipalId>,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: display_name.into(),
        }
    }

    /// Returns whether `email` addresses this principal, ignoring case and
    /// surrounding whitespace.
    pub fn owns_email(&self, email: &str) -> bool {
        fold_email(&self.email) == fold_email(email)
    }
}

/// Normalizes an invite address: trimmed, lowercased, shape-checked.
///
/// # Errors
/// - Returns `ModelValidationError::InvalidEmail` when the normalized value
///   is not shaped like `local@domain.tld`.
pub fn normalize_email(value: &str) -> Result<String, ModelValidationError> {
    let normalized = fold_email(value);
    if !EMAIL_RE.is_match(&normalized) {
        return Err(ModelValidationError::InvalidEmail(value.trim().to_string()));
    }
    Ok(normalized)
}

/// Masks the local part of an address for log output (`j***@example.com`).
pub fn redact_email(value: &str) -> String {
    match value.trim().split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

fn fold_email(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{normalize_email, redact_email, Principal};

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(
            normalize_email("  Grandma@Example.COM ").expect("valid email"),
            "grandma@example.com"
        );
    }

    #[test]
    fn normalize_email_rejects_malformed_values() {
        for value in ["", "   ", "no-at-sign", "a@b", "two words@x.com"] {
            assert!(normalize_email(value).is_err(), "`{value}` should be rejected");
        }
    }

    #[test]
    fn redact_email_keeps_domain_only() {
        assert_eq!(redact_email("jane@example.com"), "j***@example.com");
        assert_eq!(redact_email("garbage"), "***");
    }

    #[test]
    fn owns_email_is_case_insensitive() {
        let principal = Principal::new("u1", "Jane@Example.com", "Jane");
        assert!(principal.owns_email(" jane@example.COM"));
        assert!(!principal.owns_email("john@example.com"));
    }
}
