//! # Enrichment Client
//!
//! Two independent lookups per contact against an external provider: email
//! validity and company profile. Each lookup yields a [`LookupOutcome`] so that
//! "the provider could not answer" travels by value instead of as an error.
//! An `Err` from a client is reserved for failures the caller should record
//! against the contact.

pub mod http;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpEnrichmentClient;

/// Result of a single provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome<T> {
    Resolved(T),
    /// Timeout, transport failure, non-2xx or malformed body
    Unavailable { reason: String },
}

impl<T> LookupOutcome<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn resolved(self) -> Option<T> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Provider answer for `validate-email`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailLookup {
    pub valid: bool,
}

/// Provider answer for `company-info`. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    async fn validate_email(&self, email: &str) -> Result<LookupOutcome<EmailLookup>>;

    async fn lookup_company(&self, company: &str) -> Result<LookupOutcome<CompanyProfile>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_outcome_accessors() {
        let resolved = LookupOutcome::Resolved(EmailLookup { valid: true });
        assert!(resolved.is_resolved());
        assert_eq!(resolved.resolved(), Some(EmailLookup { valid: true }));

        let missing: LookupOutcome<EmailLookup> = LookupOutcome::unavailable("timeout");
        assert!(!missing.is_resolved());
        assert_eq!(missing.resolved(), None);
    }

    #[test]
    fn test_company_profile_tolerates_missing_fields() {
        let profile: CompanyProfile =
            serde_json::from_str(r#"{"company": "Acme", "domain": "acme.com"}"#).unwrap();
        assert_eq!(profile.domain.as_deref(), Some("acme.com"));
        assert_eq!(profile.size, None);
        assert_eq!(profile.location, None);
    }
}
