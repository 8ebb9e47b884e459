//! Enquiry Records
//!
//! Request payloads for the three forms, their validation, and the row each
//! one becomes in the spreadsheet.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use formsheet_sheets::TabNames;
use serde::Deserialize;
use serde_json::Value;

const GENERAL_MISSING: &str =
    "Missing required fields. Please provide firstName, lastName, email, and message.";
const PROGRAM_MISSING: &str = "Missing required fields. Please provide organization_name, contact_name, contact_email, focus_area, and organization_description.";
const EMAIL_MISSING: &str = "Email address is required.";

/// Which form a submission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnquiryKind {
    General,
    Program,
    Subscription,
}

impl EnquiryKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::General => "General enquiry",
            Self::Program => "Program enquiry",
            Self::Subscription => "Subscription",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Self::General => "Thank you for your enquiry. We will get back to you shortly!",
            Self::Program => "Thank you for your program enquiry. Our team will contact you soon!",
            Self::Subscription => "You have been successfully subscribed to our newsletter!",
        }
    }
}

/// A required field was absent; carries the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingFields(pub &'static str);

impl fmt::Display for MissingFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// One validated submission, ready to become a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnquiryRecord {
    General {
        timestamp: String,
        first_name: String,
        last_name: String,
        email: String,
        phone: String,
        message: String,
    },
    Program {
        timestamp: String,
        organization_name: String,
        contact_name: String,
        contact_email: String,
        focus_area: String,
        organization_description: String,
    },
    Subscription {
        timestamp: String,
        email: String,
        interests: String,
    },
}

impl EnquiryRecord {
    pub fn kind(&self) -> EnquiryKind {
        match self {
            Self::General { .. } => EnquiryKind::General,
            Self::Program { .. } => EnquiryKind::Program,
            Self::Subscription { .. } => EnquiryKind::Subscription,
        }
    }

    pub fn tab<'a>(&self, tabs: &'a TabNames) -> &'a str {
        match self.kind() {
            EnquiryKind::General => &tabs.general,
            EnquiryKind::Program => &tabs.program,
            EnquiryKind::Subscription => &tabs.subscription,
        }
    }

    /// Column order as it appears in the sheet, timestamp first.
    pub fn into_row(self) -> Vec<String> {
        match self {
            Self::General {
                timestamp,
                first_name,
                last_name,
                email,
                phone,
                message,
            } => vec![timestamp, first_name, last_name, email, phone, message],
            Self::Program {
                timestamp,
                organization_name,
                contact_name,
                contact_email,
                focus_area,
                organization_description,
            } => vec![
                timestamp,
                organization_name,
                contact_name,
                contact_email,
                focus_area,
                organization_description,
            ],
            Self::Subscription {
                timestamp,
                email,
                interests,
            } => vec![timestamp, email, interests],
        }
    }
}

/// Current UTC time as ISO-8601 with milliseconds, e.g. `2025-01-31T09:15:02.123Z`.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Form value as text. Falsy values (missing, null, false, zero, empty
/// string) count as absent.
fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralEnquiry {
    #[serde(default)]
    pub first_name: Option<Value>,
    #[serde(default)]
    pub last_name: Option<Value>,
    #[serde(default)]
    pub email: Option<Value>,
    #[serde(default)]
    pub phone: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

impl GeneralEnquiry {
    pub fn validate(self, timestamp: String) -> Result<EnquiryRecord, MissingFields> {
        match (
            text(self.first_name),
            text(self.last_name),
            text(self.email),
            text(self.message),
        ) {
            (Some(first_name), Some(last_name), Some(email), Some(message)) => {
                Ok(EnquiryRecord::General {
                    timestamp,
                    first_name,
                    last_name,
                    email,
                    phone: text(self.phone).unwrap_or_else(|| "N/A".to_string()),
                    message,
                })
            }
            _ => Err(MissingFields(GENERAL_MISSING)),
        }
    }
}

/// Pro-bono program enquiry. Field names are snake_case on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct ProgramEnquiry {
    #[serde(default)]
    pub organization_name: Option<Value>,
    #[serde(default)]
    pub contact_name: Option<Value>,
    #[serde(default)]
    pub contact_email: Option<Value>,
    #[serde(default)]
    pub focus_area: Option<Value>,
    #[serde(default)]
    pub organization_description: Option<Value>,
}

impl ProgramEnquiry {
    pub fn validate(self, timestamp: String) -> Result<EnquiryRecord, MissingFields> {
        match (
            text(self.organization_name),
            text(self.contact_name),
            text(self.contact_email),
            text(self.focus_area),
            text(self.organization_description),
        ) {
            (
                Some(organization_name),
                Some(contact_name),
                Some(contact_email),
                Some(focus_area),
                Some(organization_description),
            ) => Ok(EnquiryRecord::Program {
                timestamp,
                organization_name,
                contact_name,
                contact_email,
                focus_area,
                organization_description,
            }),
            _ => Err(MissingFields(PROGRAM_MISSING)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub email: Option<Value>,
    #[serde(default)]
    pub interests: Option<Value>,
}

impl Subscription {
    pub fn validate(self, timestamp: String) -> Result<EnquiryRecord, MissingFields> {
        let email = text(self.email).ok_or(MissingFields(EMAIL_MISSING))?;
        Ok(EnquiryRecord::Subscription {
            timestamp,
            email,
            interests: join_interests(self.interests),
        })
    }
}

/// `["a", "b"]` becomes `"a, b"`; nothing (or any falsy value) becomes
/// `"General"`. A bare string (single-valued form field) is kept as is.
fn join_interests(interests: Option<Value>) -> String {
    match interests {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        other => text(other).unwrap_or_else(|| "General".to_string()),
    }
}
