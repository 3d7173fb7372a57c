//! # Contact Model
//!
//! One contact per input row. Created PENDING in bulk alongside its batch and
//! mutated only by the batch worker that owns the batch (or by the staleness
//! sweep once that worker is known to be gone).

use crate::enrichment::CompanyProfile;
use crate::state_machine::ProcessingState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What is known about a contact's email address.
///
/// A missing address is never looked up, which is different from an address the
/// provider judged invalid or could not judge at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmailCheck {
    #[default]
    NotAttempted,
    Valid,
    Invalid,
    /// The provider could not be reached or answered garbage
    Unavailable,
}

impl EmailCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAttempted => "not_attempted",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Unavailable => "unavailable",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for EmailCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmailCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_attempted" => Ok(Self::NotAttempted),
            "valid" => Ok(Self::Valid),
            "invalid" => Ok(Self::Invalid),
            "unavailable" => Ok(Self::Unavailable),
            _ => Err(format!("Invalid email check: {s}")),
        }
    }
}

/// A parsed input row. Missing columns are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub contact_id: i64,
    pub job_id: i64,
    pub batch_id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub status: ProcessingState,
    /// True only when the provider confirmed the address
    pub email_valid: bool,
    pub email_check: EmailCheck,
    pub company_domain: Option<String>,
    pub company_size: Option<String>,
    pub company_location: Option<String>,
    /// Set when a worker moves the contact to IN_PROGRESS; doubles as its lease
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// New Contact for creation; the batch reference is assigned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContact {
    pub job_id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl NewContact {
    pub fn from_record(job_id: i64, record: &ContactRecord) -> Self {
        Self {
            job_id,
            name: non_empty(&record.name),
            email: non_empty(&record.email),
            company: non_empty(&record.company),
            phone: non_empty(&record.phone),
        }
    }
}

impl Contact {
    /// Materialize a freshly created, PENDING contact
    pub fn pending(contact_id: i64, batch_id: i64, new_contact: NewContact) -> Self {
        Self {
            contact_id,
            job_id: new_contact.job_id,
            batch_id,
            name: new_contact.name,
            email: new_contact.email,
            company: new_contact.company,
            phone: new_contact.phone,
            status: ProcessingState::Pending,
            email_valid: false,
            email_check: EmailCheck::NotAttempted,
            company_domain: None,
            company_size: None,
            company_location: None,
            claimed_at: None,
            processed_at: None,
            error_message: None,
        }
    }

    pub fn record_email_check(&mut self, check: EmailCheck) {
        self.email_check = check;
        self.email_valid = check.is_valid();
    }

    pub fn record_company_profile(&mut self, profile: CompanyProfile) {
        self.company_domain = profile.domain;
        self.company_size = profile.size;
        self.company_location = profile.location;
    }
}
