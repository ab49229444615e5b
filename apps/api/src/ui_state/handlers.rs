use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::state::AppState;
use crate::ui_state::{DashboardSection, PostDraft, UserUiState};

/// GET /api/v1/me/ui-state
pub async fn handle_get(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<UserUiState> {
    Json(state.ui_state.get(user).await)
}

#[derive(Debug, Deserialize)]
pub struct SectionBody {
    pub section: DashboardSection,
}

/// PUT /api/v1/me/ui-state/dashboard-section
pub async fn handle_set_section(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<SectionBody>,
) -> Json<UserUiState> {
    Json(state.ui_state.set_dashboard_section(user, body.section).await)
}

/// PUT /api/v1/me/ui-state/post-draft
pub async fn handle_save_draft(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(draft): Json<PostDraft>,
) -> Result<Json<UserUiState>, AppError> {
    draft.validate()?;
    Ok(Json(state.ui_state.save_draft(user, draft).await))
}

/// DELETE /api/v1/me/ui-state/post-draft
pub async fn handle_clear_draft(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<UserUiState> {
    Json(state.ui_state.clear_draft(user).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_body_uses_snake_case() {
        let body: SectionBody = serde_json::from_str(r#"{"section": "contact_requests"}"#).unwrap();
        assert_eq!(body.section, DashboardSection::ContactRequests);
        assert!(serde_json::from_str::<SectionBody>(r#"{"section": "billing"}"#).is_err());
    }
}
