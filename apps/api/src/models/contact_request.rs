use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::backend::{parse_column, BackendError, Table};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    New,
    Replied,
    Ignored,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::New => "new",
            RequestStatus::Replied => "replied",
            RequestStatus::Ignored => "ignored",
        }
    }

    /// Lifecycle position used when sorting by status.
    pub fn rank(&self) -> u8 {
        match self {
            RequestStatus::New => 0,
            RequestStatus::Replied => 1,
            RequestStatus::Ignored => 2,
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(RequestStatus::New),
            "replied" => Ok(RequestStatus::Replied),
            "ignored" => Ok(RequestStatus::Ignored),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Immediately,
    WithinAWeek,
    ThisMonth,
    Flexible,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Immediately => "IMMEDIATELY",
            Urgency::WithinAWeek => "WITHIN_A_WEEK",
            Urgency::ThisMonth => "THIS_MONTH",
            Urgency::Flexible => "FLEXIBLE",
        }
    }

    /// Business priority: lower is more urgent.
    pub fn priority(&self) -> u8 {
        match self {
            Urgency::Immediately => 0,
            Urgency::WithinAWeek => 1,
            Urgency::ThisMonth => 2,
            Urgency::Flexible => 3,
        }
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMMEDIATELY" => Ok(Urgency::Immediately),
            "WITHIN_A_WEEK" => Ok(Urgency::WithinAWeek),
            "THIS_MONTH" => Ok(Urgency::ThisMonth),
            "FLEXIBLE" => Ok(Urgency::Flexible),
            other => Err(format!("unknown urgency '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContactPreference {
    Email,
    Phone,
    Whatsapp,
}

impl ContactPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactPreference::Email => "email",
            ContactPreference::Phone => "phone",
            ContactPreference::Whatsapp => "whatsapp",
        }
    }
}

impl FromStr for ContactPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(ContactPreference::Email),
            "phone" => Ok(ContactPreference::Phone),
            "whatsapp" => Ok(ContactPreference::Whatsapp),
            other => Err(format!("unknown contact preference '{other}'")),
        }
    }
}

/// Row as stored; enum columns are text until parsed.
#[derive(Debug, Clone, FromRow)]
pub struct ContactRequestRow {
    pub id: Uuid,
    pub ca_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub service_needed: String,
    pub urgency: String,
    pub contact_preference: String,
    pub status: String,
    pub ca_notes: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parsed contact request, the shape every view and filter works with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactRequest {
    pub id: Uuid,
    pub ca_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub service_needed: String,
    pub urgency: Urgency,
    pub contact_preference: ContactPreference,
    pub status: RequestStatus,
    pub ca_notes: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ContactRequestRow> for ContactRequest {
    type Error = BackendError;

    fn try_from(row: ContactRequestRow) -> Result<Self, Self::Error> {
        let table = Table::ContactRequests;
        Ok(ContactRequest {
            urgency: parse_column(table, "urgency", &row.urgency)?,
            contact_preference: parse_column(
                table,
                "contact_preference",
                &row.contact_preference,
            )?,
            status: parse_column(table, "status", &row.status)?,
            id: row.id,
            ca_id: row.ca_id,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            subject: row.subject,
            message: row.message,
            service_needed: row.service_needed,
            ca_notes: row.ca_notes,
            replied_at: row.replied_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row(status: &str, urgency: &str) -> ContactRequestRow {
        ContactRequestRow {
            id: Uuid::new_v4(),
            ca_id: Uuid::new_v4(),
            customer_id: None,
            customer_name: "Ravi Kumar".to_string(),
            customer_email: "ravi@example.com".to_string(),
            customer_phone: None,
            subject: "Need help".to_string(),
            message: "Please call".to_string(),
            service_needed: "Audit".to_string(),
            urgency: urgency.to_string(),
            contact_preference: "email".to_string(),
            status: status.to_string(),
            ca_notes: None,
            replied_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_row_parses() {
        let parsed = ContactRequest::try_from(make_row("replied", "WITHIN_A_WEEK")).unwrap();
        assert_eq!(parsed.status, RequestStatus::Replied);
        assert_eq!(parsed.urgency, Urgency::WithinAWeek);
        assert_eq!(parsed.contact_preference, ContactPreference::Email);
    }

    #[test]
    fn test_unknown_urgency_is_malformed() {
        let err = ContactRequest::try_from(make_row("new", "ASAP")).unwrap_err();
        assert!(matches!(err, BackendError::Malformed { .. }));
    }

    #[test]
    fn test_urgency_serializes_in_screaming_case() {
        let json = serde_json::to_string(&Urgency::WithinAWeek).unwrap();
        assert_eq!(json, "\"WITHIN_A_WEEK\"");
        let back: Urgency = serde_json::from_str("\"THIS_MONTH\"").unwrap();
        assert_eq!(back, Urgency::ThisMonth);
    }

    const SCHEMA: &str = include_str!("../../migrations/0001_marketplace_schema.sql");

    fn check_list(column: &str, values: &[&str]) -> String {
        let quoted: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
        format!("CHECK ({column} IN ({}))", quoted.join(", "))
    }

    #[test]
    fn test_schema_constrains_text_enums() {
        let status = [RequestStatus::New, RequestStatus::Replied, RequestStatus::Ignored];
        let urgency = [
            Urgency::Immediately,
            Urgency::WithinAWeek,
            Urgency::ThisMonth,
            Urgency::Flexible,
        ];
        let preference = [
            ContactPreference::Email,
            ContactPreference::Phone,
            ContactPreference::Whatsapp,
        ];

        let status: Vec<&str> = status.iter().map(|s| s.as_str()).collect();
        let urgency: Vec<&str> = urgency.iter().map(|u| u.as_str()).collect();
        let preference: Vec<&str> = preference.iter().map(|p| p.as_str()).collect();
        assert!(SCHEMA.contains(&check_list("status", &status)));
        assert!(SCHEMA.contains(&check_list("urgency", &urgency)));
        assert!(SCHEMA.contains(&check_list("contact_preference", &preference)));
    }
}
