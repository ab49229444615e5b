use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::backend::pagination::{PageParams, PageRequest, Paginated};
use crate::contact_requests::filter::{DateRange, RequestFilter, SortSpec};
use crate::contact_requests::service::{
    self, CreateContactRequest, StatusCounts,
};
use crate::errors::AppError;
use crate::models::contact_request::{ContactRequest, RequestStatus};
use crate::state::AppState;

/// Inbox query string. List values are comma separated: `?status=new,replied&urgency=IMMEDIATELY`.
#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    pub status: Option<String>,
    pub urgency: Option<String>,
    pub contact_preference: Option<String>,
    pub service_needed: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

fn parse_list<T: FromStr<Err = String>>(raw: Option<&str>) -> Result<Vec<T>, AppError> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(AppError::Validation))
        .collect()
}

impl InboxQuery {
    pub fn into_parts(self) -> Result<(RequestFilter, SortSpec, PageParams), AppError> {
        let filter = RequestFilter {
            status: parse_list(self.status.as_deref())?,
            urgency: parse_list(self.urgency.as_deref())?,
            contact_preference: parse_list(self.contact_preference.as_deref())?,
            service_needed: self
                .service_needed
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            date_range: DateRange {
                from: self.from,
                to: self.to,
            },
            search: self.search,
        };
        let mut sort = SortSpec::default();
        if let Some(field) = self.sort.as_deref().filter(|s| !s.is_empty()) {
            sort.field = field.parse().map_err(AppError::Validation)?;
        }
        if let Some(direction) = self.direction.as_deref().filter(|s| !s.is_empty()) {
            sort.direction = direction.parse().map_err(AppError::Validation)?;
        }
        let page = PageParams {
            page: self.page,
            page_size: self.page_size,
        };
        Ok((filter, sort, page))
    }
}

/// POST /api/v1/contact-requests
pub async fn handle_create(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    Json(req): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<ContactRequest>), AppError> {
    let created =
        service::create_contact_request(&state.db, &state.cache, user.map(|u| u.0), req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/contact-requests
pub async fn handle_list(
    State(state): State<AppState>,
    CurrentUser(ca_id): CurrentUser,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Paginated<ContactRequest>>, AppError> {
    let (filter, sort, page) = query.into_parts()?;
    let page = PageRequest::from_params(&page, state.config.default_page_size);
    let result = service::list_for_ca(&state.db, &state.cache, ca_id, &filter, sort, &page).await?;
    Ok(Json(result))
}

/// GET /api/v1/contact-requests/stats
pub async fn handle_stats(
    State(state): State<AppState>,
    CurrentUser(ca_id): CurrentUser,
) -> Result<Json<StatusCounts>, AppError> {
    Ok(Json(
        service::status_counts(&state.db, &state.cache, ca_id).await?,
    ))
}

/// GET /api/v1/contact-requests/:id
pub async fn handle_get(
    State(state): State<AppState>,
    CurrentUser(ca_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ContactRequest>, AppError> {
    Ok(Json(service::get_contact_request(&state.db, ca_id, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: RequestStatus,
}

/// PATCH /api/v1/contact-requests/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    CurrentUser(ca_id): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<ContactRequest>, AppError> {
    let updated = service::update_status(&state.db, &state.cache, ca_id, id, req.status).await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct NotesUpdate {
    pub notes: Option<String>,
}

/// PATCH /api/v1/contact-requests/:id/notes
pub async fn handle_update_notes(
    State(state): State<AppState>,
    CurrentUser(ca_id): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<NotesUpdate>,
) -> Result<Json<ContactRequest>, AppError> {
    let updated = service::update_notes(&state.db, &state.cache, ca_id, id, req.notes).await?;
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact_requests::filter::{SortDirection, SortField};
    use crate::models::contact_request::Urgency;

    #[test]
    fn test_query_lists_are_comma_separated() {
        let query = InboxQuery {
            status: Some("new, replied".to_string()),
            urgency: Some("IMMEDIATELY".to_string()),
            service_needed: Some("GST,Audit,".to_string()),
            sort: Some("urgency".to_string()),
            direction: Some("asc".to_string()),
            ..Default::default()
        };
        let (filter, sort, _) = query.into_parts().unwrap();
        assert_eq!(filter.status, vec![RequestStatus::New, RequestStatus::Replied]);
        assert_eq!(filter.urgency, vec![Urgency::Immediately]);
        assert_eq!(filter.service_needed, vec!["GST", "Audit"]);
        assert_eq!(sort.field, SortField::Urgency);
        assert_eq!(sort.direction, SortDirection::Asc);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let query = InboxQuery {
            status: Some("archived".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.into_parts(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_empty_query_means_no_constraints() {
        let (filter, sort, page) = InboxQuery::default().into_parts().unwrap();
        assert!(filter.status.is_empty());
        assert!(filter.service_needed.is_empty());
        assert_eq!(sort, SortSpec::default());
        assert!(page.page.is_none());
    }
}
