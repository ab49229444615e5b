use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::backend::cache::{ListCache, Lookup};
use crate::backend::pagination::{PageRequest, Paginated};
use crate::backend::query::{Direction, Insert, Select, Update};
use crate::backend::Table;
use crate::contact_requests::filter::{filter_and_sort, RequestFilter, SortSpec};
use crate::errors::AppError;
use crate::models::contact_request::{
    ContactPreference, ContactRequest, ContactRequestRow, RequestStatus, Urgency,
};
use crate::models::profile::{ProfileRow, Role};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateContactRequest {
    pub ca_id: Uuid,
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub customer_name: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub customer_email: String,
    #[validate(length(min = 7, max = 20, message = "Enter a valid phone number"))]
    pub customer_phone: Option<String>,
    #[validate(length(min = 3, max = 200, message = "Subject must be 3-200 characters"))]
    pub subject: String,
    #[validate(length(min = 10, max = 5000, message = "Message must be 10-5000 characters"))]
    pub message: String,
    #[validate(length(min = 1, max = 100, message = "Choose a service"))]
    pub service_needed: String,
    pub urgency: Urgency,
    pub contact_preference: ContactPreference,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub new: usize,
    pub replied: usize,
    pub ignored: usize,
    pub total: usize,
}

/// The UPDATE a status change issues. Moving to `replied` stamps `replied_at`
/// only when it is still null, so the first reply keeps its stamp even when
/// two replies land at once.
pub fn status_update(ca_id: Uuid, id: Uuid, status: RequestStatus) -> Update {
    let update = Update::table(Table::ContactRequests).set("status", status.as_str());
    let update = if status == RequestStatus::Replied {
        update.stamp_once("replied_at")
    } else {
        update
    };
    update.touch("updated_at").eq("id", id).eq("ca_id", ca_id)
}

pub fn count_by_status(records: &[ContactRequest]) -> StatusCounts {
    let mut counts = StatusCounts {
        total: records.len(),
        ..Default::default()
    };
    for r in records {
        match r.status {
            RequestStatus::New => counts.new += 1,
            RequestStatus::Replied => counts.replied += 1,
            RequestStatus::Ignored => counts.ignored += 1,
        }
    }
    counts
}

pub fn inbox_scope(ca_id: Uuid) -> String {
    format!("contact_requests:{ca_id}")
}

fn parse_rows(rows: Vec<ContactRequestRow>) -> Result<Vec<ContactRequest>, AppError> {
    rows.into_iter()
        .map(|r| ContactRequest::try_from(r).map_err(AppError::from))
        .collect()
}

pub async fn create_contact_request(
    pool: &PgPool,
    cache: &ListCache,
    customer_id: Option<Uuid>,
    req: CreateContactRequest,
) -> Result<ContactRequest, AppError> {
    req.validate()?;
    if matches!(
        req.contact_preference,
        ContactPreference::Phone | ContactPreference::Whatsapp
    ) && req
        .customer_phone
        .as_deref()
        .map_or(true, |p| p.trim().is_empty())
    {
        return Err(AppError::Validation(format!(
            "A phone number is required for {} contact",
            req.contact_preference.as_str()
        )));
    }

    let ca: ProfileRow = Select::from(Table::Profiles)
        .eq("id", req.ca_id)
        .maybe_single(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("CA {} not found", req.ca_id)))?;
    if ca.role.parse::<Role>().ok() != Some(Role::Ca) {
        return Err(AppError::Validation(
            "Contact requests can only be sent to chartered accountants".to_string(),
        ));
    }

    let row: ContactRequestRow = Insert::into(Table::ContactRequests)
        .value("ca_id", req.ca_id)
        .value("customer_id", customer_id)
        .value("customer_name", req.customer_name.trim())
        .value("customer_email", req.customer_email.trim())
        .value(
            "customer_phone",
            req.customer_phone.map(|p| p.trim().to_string()),
        )
        .value("subject", req.subject.trim())
        .value("message", req.message)
        .value("service_needed", req.service_needed.trim())
        .value("urgency", req.urgency.as_str())
        .value("contact_preference", req.contact_preference.as_str())
        .value("status", RequestStatus::New.as_str())
        .returning(pool)
        .await?;

    let created = ContactRequest::try_from(row)?;
    info!(
        "Contact request {} created for CA {}",
        created.id, created.ca_id
    );
    cache.invalidate(&inbox_scope(created.ca_id)).await;
    Ok(created)
}

/// Every request addressed to the CA, newest first; served from the list cache when warm.
pub async fn load_inbox(
    pool: &PgPool,
    cache: &ListCache,
    ca_id: Uuid,
) -> Result<Vec<ContactRequest>, AppError> {
    let scope = inbox_scope(ca_id);
    let slot = match cache.get::<Vec<ContactRequest>>(&scope, "all").await {
        Lookup::Hit(cached) => return Ok(cached),
        Lookup::Miss(slot) => slot,
    };

    let rows: Vec<ContactRequestRow> = Select::from(Table::ContactRequests)
        .eq("ca_id", ca_id)
        .order("created_at", Direction::Desc)
        .fetch_all(pool)
        .await?;
    let records = parse_rows(rows)?;
    debug!("Loaded {} contact requests for CA {ca_id}", records.len());

    cache.put(slot, &records).await;
    Ok(records)
}

pub async fn list_for_ca(
    pool: &PgPool,
    cache: &ListCache,
    ca_id: Uuid,
    filter: &RequestFilter,
    sort: SortSpec,
    page: &PageRequest,
) -> Result<Paginated<ContactRequest>, AppError> {
    let records = load_inbox(pool, cache, ca_id).await?;
    let view = filter_and_sort(records, filter, sort);
    Ok(Paginated::from_slice(view, page))
}

pub async fn get_contact_request(
    pool: &PgPool,
    ca_id: Uuid,
    id: Uuid,
) -> Result<ContactRequest, AppError> {
    let row: ContactRequestRow = Select::from(Table::ContactRequests)
        .eq("id", id)
        .eq("ca_id", ca_id)
        .maybe_single(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Contact request {id} not found")))?;
    Ok(ContactRequest::try_from(row)?)
}

pub async fn update_status(
    pool: &PgPool,
    cache: &ListCache,
    ca_id: Uuid,
    id: Uuid,
    status: RequestStatus,
) -> Result<ContactRequest, AppError> {
    let row: ContactRequestRow = status_update(ca_id, id, status)
        .single(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::NotFound(_) => AppError::NotFound(format!("Contact request {id} not found")),
            other => other,
        })?;

    info!("Contact request {id} moved to {status}");
    cache.invalidate(&inbox_scope(ca_id)).await;
    Ok(ContactRequest::try_from(row)?)
}

pub async fn update_notes(
    pool: &PgPool,
    cache: &ListCache,
    ca_id: Uuid,
    id: Uuid,
    notes: Option<String>,
) -> Result<ContactRequest, AppError> {
    let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if notes.as_ref().is_some_and(|n| n.len() > 5000) {
        return Err(AppError::Validation(
            "Notes must be at most 5000 characters".to_string(),
        ));
    }

    let row: ContactRequestRow = Update::table(Table::ContactRequests)
        .set("ca_notes", notes)
        .touch("updated_at")
        .eq("id", id)
        .eq("ca_id", ca_id)
        .single(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::NotFound(_) => AppError::NotFound(format!("Contact request {id} not found")),
            other => other,
        })?;

    cache.invalidate(&inbox_scope(ca_id)).await;
    Ok(ContactRequest::try_from(row)?)
}

pub async fn status_counts(
    pool: &PgPool,
    cache: &ListCache,
    ca_id: Uuid,
) -> Result<StatusCounts, AppError> {
    let records = load_inbox(pool, cache, ca_id).await?;
    Ok(count_by_status(&records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_request(status: RequestStatus) -> ContactRequest {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        ContactRequest {
            id: Uuid::new_v4(),
            ca_id: Uuid::new_v4(),
            customer_id: None,
            customer_name: "Meera Iyer".to_string(),
            customer_email: "meera@example.com".to_string(),
            customer_phone: Some("9876543210".to_string()),
            subject: "Need help with GST Registration".to_string(),
            message: "I am starting a small business.".to_string(),
            service_needed: "GST".to_string(),
            urgency: Urgency::WithinAWeek,
            contact_preference: ContactPreference::Phone,
            status,
            ca_notes: None,
            replied_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_reply_stamps_replied_at_only_when_unset() {
        let q = status_update(Uuid::nil(), Uuid::nil(), RequestStatus::Replied);
        assert_eq!(
            q.build(true).sql(),
            "UPDATE contact_requests SET status = $1, \
             replied_at = COALESCE(replied_at, now()), updated_at = now() \
             WHERE id = $2 AND ca_id = $3 RETURNING *"
        );
    }

    #[test]
    fn test_ignore_does_not_stamp() {
        let sql = status_update(Uuid::nil(), Uuid::nil(), RequestStatus::Ignored)
            .build(true)
            .sql()
            .to_string();
        assert!(!sql.contains("replied_at"));
        assert!(sql.starts_with("UPDATE contact_requests SET status = $1, updated_at = now()"));
    }

    #[test]
    fn test_count_by_status() {
        let records = vec![
            make_request(RequestStatus::New),
            make_request(RequestStatus::New),
            make_request(RequestStatus::Replied),
            make_request(RequestStatus::Ignored),
        ];
        assert_eq!(
            count_by_status(&records),
            StatusCounts {
                new: 2,
                replied: 1,
                ignored: 1,
                total: 4
            }
        );
    }

    #[test]
    fn test_create_payload_validation() {
        let payload = CreateContactRequest {
            ca_id: Uuid::new_v4(),
            customer_name: "M".to_string(),
            customer_email: "not-an-email".to_string(),
            customer_phone: None,
            subject: "GST".to_string(),
            message: "short".to_string(),
            service_needed: "GST".to_string(),
            urgency: Urgency::Immediately,
            contact_preference: ContactPreference::Email,
        };
        let errors = payload.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("customer_name"));
        assert!(fields.contains_key("customer_email"));
        assert!(fields.contains_key("message"));
        assert!(!fields.contains_key("subject"));
    }

    #[test]
    fn test_inbox_scope_is_per_ca() {
        let a = Uuid::new_v4();
        assert_eq!(inbox_scope(a), format!("contact_requests:{a}"));
    }
}
