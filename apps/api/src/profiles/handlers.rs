use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::backend::pagination::{PageParams, PageRequest, Paginated};
use crate::errors::AppError;
use crate::models::profile::{AddressRow, EducationRow, ExperienceRow, SocialProfileRow};
use crate::profiles::completion::CompletionReport;
use crate::profiles::directory::{self, CaDetail, CaListing, DirectoryFilter};
use crate::profiles::service::{
    self, AddressInput, NewEducation, NewExperience, OnboardingResult, OnboardingSave,
    ProfilePatch, ProfileView, SocialLinks, VerificationView,
};
use crate::state::AppState;
use crate::upload::read_upload_form;

/// GET /api/v1/profiles/:id
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(service::get_profile(&state.db, &state.storage, id).await?))
}

/// PATCH /api/v1/profiles/me
pub async fn handle_update_profile(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<ProfileView>, AppError> {
    let view =
        service::update_profile(&state.db, &state.cache, &state.storage, owner, patch).await?;
    Ok(Json(view))
}

/// PUT /api/v1/profiles/me/onboarding
pub async fn handle_save_onboarding(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Json(save): Json<OnboardingSave>,
) -> Result<Json<OnboardingResult>, AppError> {
    let result =
        service::save_onboarding(&state.db, &state.cache, &state.storage, owner, save).await?;
    Ok(Json(result))
}

/// PUT /api/v1/profiles/me/address
pub async fn handle_upsert_address(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Json(address): Json<AddressInput>,
) -> Result<Json<AddressRow>, AppError> {
    Ok(Json(
        service::upsert_address(&state.db, &state.cache, owner, address).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ServicesBody {
    pub services: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    pub services: Vec<String>,
}

/// PUT /api/v1/profiles/me/services
pub async fn handle_replace_services(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Json(body): Json<ServicesBody>,
) -> Result<Json<ServicesResponse>, AppError> {
    let services = service::replace_services(&state.db, &state.cache, owner, body.services).await?;
    Ok(Json(ServicesResponse { services }))
}

/// PUT /api/v1/profiles/me/social
pub async fn handle_upsert_social(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Json(links): Json<SocialLinks>,
) -> Result<Json<SocialProfileRow>, AppError> {
    Ok(Json(
        service::upsert_social_profile(&state.db, owner, links).await?,
    ))
}

/// POST /api/v1/profiles/me/picture
pub async fn handle_upload_picture(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    multipart: Multipart,
) -> Result<Json<ProfileView>, AppError> {
    let mut form = read_upload_form(multipart).await?;
    let file = form.require_file()?;
    state.ui_state.start_upload(owner, "profile_picture").await;
    let result =
        service::upload_profile_picture(&state.db, &state.cache, &state.storage, owner, file)
            .await;
    state
        .ui_state
        .finish_upload(owner, "profile_picture", result.is_ok())
        .await;
    Ok(Json(result?))
}

/// GET /api/v1/profiles/:id/completion
pub async fn handle_completion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionReport>, AppError> {
    Ok(Json(service::completion(&state.db, id).await?))
}

/// GET /api/v1/profiles/:id/experiences
pub async fn handle_list_experiences(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ExperienceRow>>, AppError> {
    Ok(Json(service::list_experiences(&state.db, id).await?))
}

/// POST /api/v1/profiles/me/experiences
pub async fn handle_add_experience(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Json(exp): Json<NewExperience>,
) -> Result<(StatusCode, Json<ExperienceRow>), AppError> {
    let row = service::add_experience(&state.db, owner, exp).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// DELETE /api/v1/profiles/me/experiences/:id
pub async fn handle_remove_experience(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    service::remove_experience(&state.db, owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/profiles/:id/educations
pub async fn handle_list_educations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EducationRow>>, AppError> {
    Ok(Json(service::list_educations(&state.db, id).await?))
}

/// POST /api/v1/profiles/me/educations
pub async fn handle_add_education(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Json(edu): Json<NewEducation>,
) -> Result<(StatusCode, Json<EducationRow>), AppError> {
    let row = service::add_education(&state.db, owner, edu).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// DELETE /api/v1/profiles/me/educations/:id
pub async fn handle_remove_education(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    service::remove_education(&state.db, owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/profiles/me/verification
///
/// Multipart: `membership_number` text field plus the certificate as `file`.
pub async fn handle_submit_verification(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<VerificationView>), AppError> {
    let mut form = read_upload_form(multipart).await?;
    let certificate = form.require_file()?;
    let membership_number = form
        .text("membership_number")
        .ok_or_else(|| AppError::Validation("membership_number is required".to_string()))?
        .to_string();
    let view = service::submit_verification(
        &state.db,
        &state.storage,
        owner,
        &membership_number,
        certificate,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/profiles/me/verification
pub async fn handle_verification_status(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
) -> Result<Json<Option<VerificationView>>, AppError> {
    Ok(Json(
        service::verification_status(&state.db, &state.storage, owner).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryQuery {
    #[serde(default, alias = "q")]
    pub query: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub service: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl DirectoryQuery {
    pub fn into_parts(self) -> (DirectoryFilter, PageParams) {
        (
            DirectoryFilter {
                query: self.query,
                city: self.city,
                state: self.state,
                service: self.service,
            },
            PageParams {
                page: self.page,
                page_size: self.page_size,
            },
        )
    }
}

/// GET /api/v1/cas
pub async fn handle_search_cas(
    State(state): State<AppState>,
    Query(query): Query<DirectoryQuery>,
) -> Result<Json<Paginated<CaListing>>, AppError> {
    let (filter, page) = query.into_parts();
    let page = PageRequest::from_params(&page, state.config.default_page_size);
    let result =
        directory::search_cas(&state.db, &state.cache, &state.storage, &filter, &page).await?;
    Ok(Json(result))
}

/// GET /api/v1/cas/:id
pub async fn handle_get_ca(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CaDetail>, AppError> {
    Ok(Json(
        directory::get_ca_detail(&state.db, &state.storage, id).await?,
    ))
}
