use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::backend::cache::ListCache;
use crate::backend::query::{Bind, Delete, Direction, Insert, Select, Update};
use crate::backend::{parse_column, BackendError, Table};
use crate::errors::AppError;
use crate::models::profile::{
    AddressRow, CaVerificationRow, EducationRow, ExperienceRow, ProfileRow, Role, ServiceRow,
    SocialProfileRow, VerificationStatus,
};
use crate::profiles::completion::{compute_completion, CompletionReport};
use crate::profiles::directory::DIRECTORY_SCOPE;
use crate::storage::{discard_on_error, remove_quietly, superseded_object, Bucket, Storage};
use crate::upload::UploadedFile;

/// Upper bound on services a CA can list.
pub const MAX_SERVICES: usize = 30;

// ────────────────────────────────────────────────────────────────────────────
// View types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileView {
    pub id: Uuid,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub years_of_experience: Option<i32>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reshapes a profile row; `avatar_url` is the already-resolved picture URL.
pub fn profile_view(row: ProfileRow, avatar_url: Option<String>) -> Result<ProfileView, BackendError> {
    let role = parse_column(Table::Profiles, "role", &row.role)?;
    Ok(ProfileView {
        full_name: row.full_name(),
        id: row.id,
        role,
        first_name: row.first_name,
        last_name: row.last_name,
        email: row.email,
        phone: row.phone,
        gender: row.gender,
        bio: row.bio,
        avatar_url,
        years_of_experience: row.years_of_experience,
        is_verified: row.is_verified,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub async fn resolve_profile(storage: &Storage, row: ProfileRow) -> Result<ProfileView, AppError> {
    let avatar = storage
        .resolve(Bucket::ProfilePictures, row.profile_picture.as_deref())
        .await;
    Ok(profile_view(row, avatar)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationView {
    pub id: Uuid,
    pub membership_number: String,
    pub status: VerificationStatus,
    pub certificate_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

// ────────────────────────────────────────────────────────────────────────────
// Request payloads
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfilePatch {
    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters"))]
    pub last_name: Option<String>,
    #[validate(length(min = 7, max = 20, message = "Enter a valid phone number"))]
    pub phone: Option<String>,
    #[validate(length(max = 20))]
    pub gender: Option<String>,
    #[validate(length(max = 1000, message = "Bio must be at most 1000 characters"))]
    pub bio: Option<String>,
    #[validate(range(min = 0, max = 70, message = "Years of experience must be 0-70"))]
    pub years_of_experience: Option<i32>,
}

impl ProfilePatch {
    fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.phone.is_none()
            && self.gender.is_none()
            && self.bio.is_none()
            && self.years_of_experience.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(max = 200))]
    pub address_line: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(equal = 6, message = "Pincode must be 6 digits"))]
    pub pincode: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewExperience {
    #[validate(length(min = 1, max = 100, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 100, message = "Company is required"))]
    pub company: String,
    #[validate(length(max = 100))]
    pub location: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_current: bool,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewEducation {
    #[validate(length(min = 1, max = 150, message = "Institution is required"))]
    pub institution: String,
    #[validate(length(min = 1, max = 100, message = "Degree is required"))]
    pub degree: String,
    #[validate(length(max = 100))]
    pub field_of_study: Option<String>,
    #[validate(range(min = 1950, max = 2100))]
    pub start_year: i32,
    #[validate(range(min = 1950, max = 2100))]
    pub end_year: Option<i32>,
    #[validate(length(max = 20))]
    pub grade: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SocialLinks {
    #[validate(url(message = "Enter a valid LinkedIn URL"))]
    pub linkedin_url: Option<String>,
    #[validate(url(message = "Enter a valid Twitter URL"))]
    pub twitter_url: Option<String>,
    #[validate(url(message = "Enter a valid website URL"))]
    pub website_url: Option<String>,
    #[validate(url(message = "Enter a valid GitHub URL"))]
    pub github_url: Option<String>,
}

/// The onboarding save: profile, address and services written together.
#[derive(Debug, Clone, Deserialize)]
pub struct OnboardingSave {
    #[serde(default)]
    pub profile: ProfilePatch,
    #[serde(default)]
    pub address: Option<AddressInput>,
    #[serde(default)]
    pub services: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnboardingResult {
    pub profile: ProfileView,
    pub address: Option<AddressRow>,
    pub services: Vec<String>,
    pub completion: CompletionReport,
}

// ────────────────────────────────────────────────────────────────────────────
// Pure helpers
// ────────────────────────────────────────────────────────────────────────────

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Trims names, drops blanks and collapses case-insensitive duplicates (first spelling wins).
pub fn normalize_service_names(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            continue;
        }
        if out.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            continue;
        }
        out.push(name);
    }
    out
}

pub fn check_experience_dates(exp: &NewExperience) -> Result<(), AppError> {
    match (exp.is_current, exp.end_date) {
        (true, Some(_)) => Err(AppError::Validation(
            "A current position cannot have an end date".to_string(),
        )),
        (false, Some(end)) if end < exp.start_date => Err(AppError::Validation(
            "End date cannot be before start date".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn check_education_years(edu: &NewEducation) -> Result<(), AppError> {
    match edu.end_year {
        Some(end) if end < edu.start_year => Err(AppError::Validation(
            "End year cannot be before start year".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn check_pincode(address: &AddressInput) -> Result<(), AppError> {
    match address.pincode.as_deref().map(str::trim) {
        Some(pin) if !pin.is_empty() && !pin.chars().all(|c| c.is_ascii_digit()) => Err(
            AppError::Validation("Pincode must contain digits only".to_string()),
        ),
        _ => Ok(()),
    }
}

/// ICAI membership numbers are six or seven digits.
pub fn check_membership_number(raw: &str) -> Result<String, AppError> {
    let number = raw.trim();
    if (6..=7).contains(&number.len()) && number.chars().all(|c| c.is_ascii_digit()) {
        Ok(number.to_string())
    } else {
        Err(AppError::Validation(
            "Membership number must be 6 or 7 digits".to_string(),
        ))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Connection-level writes (shared by single saves and the onboarding transaction)
// ────────────────────────────────────────────────────────────────────────────

async fn write_profile(
    conn: &mut PgConnection,
    owner: Uuid,
    patch: &ProfilePatch,
) -> Result<ProfileRow, AppError> {
    if patch.is_empty() {
        return Ok(Select::from(Table::Profiles)
            .eq("id", owner)
            .single(&mut *conn)
            .await?);
    }
    Ok(Update::table(Table::Profiles)
        .set_some("first_name", clean(patch.first_name.clone()))
        .set_some("last_name", clean(patch.last_name.clone()))
        .set_some("phone", clean(patch.phone.clone()))
        .set_some("gender", clean(patch.gender.clone()))
        .set_some("bio", patch.bio.clone().map(|b| b.trim().to_string()))
        .set_some("years_of_experience", patch.years_of_experience)
        .touch("updated_at")
        .eq("id", owner)
        .single(&mut *conn)
        .await?)
}

async fn write_address(
    conn: &mut PgConnection,
    owner: Uuid,
    address: &AddressInput,
) -> Result<AddressRow, AppError> {
    Ok(Insert::into(Table::Address)
        .value("profile_id", owner)
        .value("address_line", clean(address.address_line.clone()))
        .value("city", clean(address.city.clone()))
        .value("state", clean(address.state.clone()))
        .value("pincode", clean(address.pincode.clone()))
        .value("updated_at", Utc::now())
        .upsert(&["profile_id"])
        .returning(&mut *conn)
        .await?)
}

/// Delete-all-then-insert; callers run it inside a transaction.
async fn write_services(
    conn: &mut PgConnection,
    owner: Uuid,
    names: &[String],
) -> Result<Vec<String>, AppError> {
    let names = normalize_service_names(names);
    if names.len() > MAX_SERVICES {
        return Err(AppError::Validation(format!(
            "At most {MAX_SERVICES} services can be listed"
        )));
    }

    Delete::from(Table::Services)
        .eq("profile_id", owner)
        .execute(&mut *conn)
        .await?;

    let rows: Vec<Vec<Bind>> = names
        .iter()
        .map(|n| vec![owner.into(), n.clone().into()])
        .collect();
    Insert::many(Table::Services, &["profile_id", "service_name"], rows)
        .execute(&mut *conn)
        .await?;
    Ok(names)
}

// ────────────────────────────────────────────────────────────────────────────
// Profile
// ────────────────────────────────────────────────────────────────────────────

pub async fn get_profile_row(pool: &PgPool, id: Uuid) -> Result<ProfileRow, AppError> {
    Select::from(Table::Profiles)
        .eq("id", id)
        .maybe_single(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {id} not found")))
}

pub async fn get_profile(pool: &PgPool, storage: &Storage, id: Uuid) -> Result<ProfileView, AppError> {
    let row = get_profile_row(pool, id).await?;
    resolve_profile(storage, row).await
}

pub async fn update_profile(
    pool: &PgPool,
    cache: &ListCache,
    storage: &Storage,
    owner: Uuid,
    patch: ProfilePatch,
) -> Result<ProfileView, AppError> {
    patch.validate()?;
    let mut conn = pool.acquire().await?;
    let row = write_profile(&mut conn, owner, &patch).await?;
    info!("Profile {owner} updated");
    cache.invalidate(DIRECTORY_SCOPE).await;
    resolve_profile(storage, row).await
}

pub async fn get_address(pool: &PgPool, profile_id: Uuid) -> Result<Option<AddressRow>, AppError> {
    Ok(Select::from(Table::Address)
        .eq("profile_id", profile_id)
        .maybe_single(pool)
        .await?)
}

pub async fn upsert_address(
    pool: &PgPool,
    cache: &ListCache,
    owner: Uuid,
    address: AddressInput,
) -> Result<AddressRow, AppError> {
    address.validate()?;
    check_pincode(&address)?;
    let mut conn = pool.acquire().await?;
    let row = write_address(&mut conn, owner, &address).await?;
    info!("Address saved for profile {owner}");
    cache.invalidate(DIRECTORY_SCOPE).await;
    Ok(row)
}

pub async fn list_services(pool: &PgPool, profile_id: Uuid) -> Result<Vec<ServiceRow>, AppError> {
    Ok(Select::from(Table::Services)
        .eq("profile_id", profile_id)
        .order("created_at", Direction::Asc)
        .fetch_all(pool)
        .await?)
}

pub async fn replace_services(
    pool: &PgPool,
    cache: &ListCache,
    owner: Uuid,
    names: Vec<String>,
) -> Result<Vec<String>, AppError> {
    let mut tx = pool.begin().await?;
    let saved = write_services(&mut tx, owner, &names).await?;
    tx.commit().await?;
    info!("Replaced services for profile {owner} ({} listed)", saved.len());
    cache.invalidate(DIRECTORY_SCOPE).await;
    Ok(saved)
}

/// Onboarding save. All three writes share one transaction: a failure in any
/// step rolls back the others and surfaces a single error.
pub async fn save_onboarding(
    pool: &PgPool,
    cache: &ListCache,
    storage: &Storage,
    owner: Uuid,
    save: OnboardingSave,
) -> Result<OnboardingResult, AppError> {
    save.profile.validate()?;
    if let Some(address) = &save.address {
        address.validate()?;
        check_pincode(address)?;
    }

    let mut tx = pool.begin().await?;
    let profile = write_profile(&mut tx, owner, &save.profile).await?;
    let address = match &save.address {
        Some(address) => Some(write_address(&mut tx, owner, address).await?),
        None => Select::from(Table::Address)
            .eq("profile_id", owner)
            .maybe_single(&mut *tx)
            .await?,
    };
    let services: Vec<String> = match &save.services {
        Some(names) => write_services(&mut tx, owner, names).await?,
        None => {
            let existing: Vec<ServiceRow> = Select::from(Table::Services)
                .eq("profile_id", owner)
                .order("created_at", Direction::Asc)
                .fetch_all(&mut *tx)
                .await?;
            existing.into_iter().map(|s| s.service_name).collect()
        }
    };
    tx.commit().await?;
    info!("Onboarding saved for profile {owner}");
    cache.invalidate(DIRECTORY_SCOPE).await;

    let service_rows: Vec<ServiceRow> = services
        .iter()
        .map(|name| ServiceRow {
            id: Uuid::nil(),
            profile_id: owner,
            service_name: name.clone(),
            created_at: profile.updated_at,
        })
        .collect();
    let completion = compute_completion(Some(&profile), address.as_ref(), &service_rows);

    Ok(OnboardingResult {
        profile: resolve_profile(storage, profile).await?,
        address,
        services,
        completion,
    })
}

/// Completion for a profile; address and services load concurrently.
pub async fn completion(pool: &PgPool, id: Uuid) -> Result<CompletionReport, AppError> {
    let profile: Option<ProfileRow> = Select::from(Table::Profiles)
        .eq("id", id)
        .maybe_single(pool)
        .await?;
    let Some(profile) = profile else {
        return Err(AppError::NotFound(format!("Profile {id} not found")));
    };

    let (address, services) = tokio::try_join!(get_address(pool, id), list_services(pool, id))?;
    Ok(compute_completion(Some(&profile), address.as_ref(), &services))
}

pub async fn upload_profile_picture(
    pool: &PgPool,
    cache: &ListCache,
    storage: &Storage,
    owner: Uuid,
    file: UploadedFile,
) -> Result<ProfileView, AppError> {
    let previous = get_profile_row(pool, owner).await?.profile_picture;
    let path = storage
        .upload(Bucket::ProfilePictures, owner, &file.content_type, file.bytes)
        .await?;
    let written = Update::table(Table::Profiles)
        .set("profile_picture", path.as_str())
        .touch("updated_at")
        .eq("id", owner)
        .single::<ProfileRow, _>(pool)
        .await;
    let row = discard_on_error(storage, Bucket::ProfilePictures, &path, written).await?;
    if let Some(old) = superseded_object(previous.as_deref(), &path) {
        remove_quietly(storage, Bucket::ProfilePictures, old).await;
    }
    cache.invalidate(DIRECTORY_SCOPE).await;
    resolve_profile(storage, row).await
}

// ────────────────────────────────────────────────────────────────────────────
// Experiences / educations
// ────────────────────────────────────────────────────────────────────────────

pub async fn list_experiences(pool: &PgPool, profile_id: Uuid) -> Result<Vec<ExperienceRow>, AppError> {
    Ok(Select::from(Table::Experiences)
        .eq("profile_id", profile_id)
        .order("is_current", Direction::Desc)
        .order("start_date", Direction::Desc)
        .fetch_all(pool)
        .await?)
}

pub async fn add_experience(
    pool: &PgPool,
    owner: Uuid,
    exp: NewExperience,
) -> Result<ExperienceRow, AppError> {
    exp.validate()?;
    check_experience_dates(&exp)?;
    let row: ExperienceRow = Insert::into(Table::Experiences)
        .value("profile_id", owner)
        .value("title", exp.title.trim())
        .value("company", exp.company.trim())
        .value("location", clean(exp.location))
        .value("start_date", exp.start_date)
        .value("end_date", exp.end_date)
        .value("is_current", exp.is_current)
        .value("description", clean(exp.description))
        .returning(pool)
        .await?;
    debug!("Experience {} added to profile {owner}", row.id);
    Ok(row)
}

pub async fn remove_experience(pool: &PgPool, owner: Uuid, id: Uuid) -> Result<(), AppError> {
    let removed = Delete::from(Table::Experiences)
        .eq("id", id)
        .eq("profile_id", owner)
        .execute(pool)
        .await?;
    if removed == 0 {
        return Err(AppError::NotFound(format!("Experience {id} not found")));
    }
    Ok(())
}

pub async fn list_educations(pool: &PgPool, profile_id: Uuid) -> Result<Vec<EducationRow>, AppError> {
    Ok(Select::from(Table::Educations)
        .eq("profile_id", profile_id)
        .order("start_year", Direction::Desc)
        .fetch_all(pool)
        .await?)
}

pub async fn add_education(
    pool: &PgPool,
    owner: Uuid,
    edu: NewEducation,
) -> Result<EducationRow, AppError> {
    edu.validate()?;
    check_education_years(&edu)?;
    let row: EducationRow = Insert::into(Table::Educations)
        .value("profile_id", owner)
        .value("institution", edu.institution.trim())
        .value("degree", edu.degree.trim())
        .value("field_of_study", clean(edu.field_of_study))
        .value("start_year", edu.start_year)
        .value("end_year", edu.end_year)
        .value("grade", clean(edu.grade))
        .returning(pool)
        .await?;
    debug!("Education {} added to profile {owner}", row.id);
    Ok(row)
}

pub async fn remove_education(pool: &PgPool, owner: Uuid, id: Uuid) -> Result<(), AppError> {
    let removed = Delete::from(Table::Educations)
        .eq("id", id)
        .eq("profile_id", owner)
        .execute(pool)
        .await?;
    if removed == 0 {
        return Err(AppError::NotFound(format!("Education {id} not found")));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Social profile
// ────────────────────────────────────────────────────────────────────────────

pub async fn get_social_profile(
    pool: &PgPool,
    profile_id: Uuid,
) -> Result<Option<SocialProfileRow>, AppError> {
    Ok(Select::from(Table::SocialProfile)
        .eq("profile_id", profile_id)
        .maybe_single(pool)
        .await?)
}

pub async fn upsert_social_profile(
    pool: &PgPool,
    owner: Uuid,
    links: SocialLinks,
) -> Result<SocialProfileRow, AppError> {
    let links = SocialLinks {
        linkedin_url: clean(links.linkedin_url),
        twitter_url: clean(links.twitter_url),
        website_url: clean(links.website_url),
        github_url: clean(links.github_url),
    };
    links.validate()?;
    Ok(Insert::into(Table::SocialProfile)
        .value("profile_id", owner)
        .value("linkedin_url", links.linkedin_url)
        .value("twitter_url", links.twitter_url)
        .value("website_url", links.website_url)
        .value("github_url", links.github_url)
        .value("updated_at", Utc::now())
        .upsert(&["profile_id"])
        .returning(pool)
        .await?)
}

// ────────────────────────────────────────────────────────────────────────────
// CA verification
// ────────────────────────────────────────────────────────────────────────────

async fn verification_view(
    storage: &Storage,
    row: CaVerificationRow,
) -> Result<VerificationView, AppError> {
    let status = parse_column(Table::CaVerifications, "status", &row.status)?;
    let certificate_url = storage
        .resolve(Bucket::CaCertificates, Some(&row.certificate_path))
        .await;
    Ok(VerificationView {
        id: row.id,
        membership_number: row.membership_number,
        status,
        certificate_url,
        submitted_at: row.submitted_at,
        reviewed_at: row.reviewed_at,
    })
}

async fn latest_verification(
    pool: &PgPool,
    owner: Uuid,
) -> Result<Option<CaVerificationRow>, AppError> {
    Ok(Select::from(Table::CaVerifications)
        .eq("profile_id", owner)
        .order("submitted_at", Direction::Desc)
        .limit(1)
        .maybe_single(pool)
        .await?)
}

pub async fn submit_verification(
    pool: &PgPool,
    storage: &Storage,
    owner: Uuid,
    membership_number: &str,
    certificate: UploadedFile,
) -> Result<VerificationView, AppError> {
    let membership_number = check_membership_number(membership_number)?;

    let profile = get_profile_row(pool, owner).await?;
    if profile.role.parse::<Role>().ok() != Some(Role::Ca) {
        return Err(AppError::Forbidden);
    }
    if let Some(existing) = latest_verification(pool, owner).await? {
        if existing.status == VerificationStatus::Pending.as_str() {
            return Err(AppError::Validation(
                "A verification request is already pending review".to_string(),
            ));
        }
    }

    let path = storage
        .upload(
            Bucket::CaCertificates,
            owner,
            &certificate.content_type,
            certificate.bytes,
        )
        .await?;
    let inserted = Insert::into(Table::CaVerifications)
        .value("profile_id", owner)
        .value("membership_number", membership_number)
        .value("certificate_path", path.as_str())
        .value("status", VerificationStatus::Pending.as_str())
        .returning::<CaVerificationRow, _>(pool)
        .await;
    let row = discard_on_error(storage, Bucket::CaCertificates, &path, inserted).await?;
    info!("Verification {} submitted by CA {owner}", row.id);
    verification_view(storage, row).await
}

pub async fn verification_status(
    pool: &PgPool,
    storage: &Storage,
    owner: Uuid,
) -> Result<Option<VerificationView>, AppError> {
    match latest_verification(pool, owner).await? {
        Some(row) => Ok(Some(verification_view(storage, row).await?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_experience(is_current: bool, start: &str, end: Option<&str>) -> NewExperience {
        NewExperience {
            title: "Senior Associate".to_string(),
            company: "Kapoor & Co".to_string(),
            location: None,
            start_date: start.parse().unwrap(),
            end_date: end.map(|e| e.parse().unwrap()),
            is_current,
            description: None,
        }
    }

    #[test]
    fn test_normalize_service_names() {
        let names = vec![
            " GST Filing ".to_string(),
            "gst   filing".to_string(),
            "".to_string(),
            "Audit".to_string(),
            "  ".to_string(),
            "Income  Tax".to_string(),
        ];
        assert_eq!(
            normalize_service_names(&names),
            vec!["GST Filing", "Audit", "Income Tax"]
        );
    }

    #[test]
    fn test_current_experience_rejects_end_date() {
        let exp = make_experience(true, "2020-01-01", Some("2021-01-01"));
        assert!(check_experience_dates(&exp).is_err());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let exp = make_experience(false, "2020-01-01", Some("2019-06-01"));
        assert!(check_experience_dates(&exp).is_err());
        let ok = make_experience(false, "2020-01-01", Some("2020-06-01"));
        assert!(check_experience_dates(&ok).is_ok());
        let open = make_experience(true, "2020-01-01", None);
        assert!(check_experience_dates(&open).is_ok());
    }

    #[test]
    fn test_education_years() {
        let edu = NewEducation {
            institution: "ICAI".to_string(),
            degree: "CA Final".to_string(),
            field_of_study: None,
            start_year: 2018,
            end_year: Some(2016),
            grade: None,
        };
        assert!(check_education_years(&edu).is_err());
    }

    #[test]
    fn test_pincode_must_be_digits() {
        let address = AddressInput {
            pincode: Some("41100A".to_string()),
            ..Default::default()
        };
        assert!(address.validate().is_ok());
        assert!(check_pincode(&address).is_err());

        let short = AddressInput {
            pincode: Some("4110".to_string()),
            ..Default::default()
        };
        assert!(short.validate().is_err());
    }

    #[test]
    fn test_membership_number_format() {
        assert_eq!(check_membership_number(" 123456 ").unwrap(), "123456");
        assert!(check_membership_number("12345").is_err());
        assert!(check_membership_number("12345a7").is_err());
    }

    #[test]
    fn test_social_links_must_be_urls() {
        let links = SocialLinks {
            linkedin_url: Some("linkedin.com/in/someone".to_string()),
            ..Default::default()
        };
        assert!(links.validate().is_err());
        let ok = SocialLinks {
            linkedin_url: Some("https://www.linkedin.com/in/someone".to_string()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_profile_view_rejects_unknown_role() {
        let row = ProfileRow {
            id: Uuid::new_v4(),
            role: "superuser".to_string(),
            first_name: Some("A".to_string()),
            last_name: None,
            email: None,
            phone: None,
            gender: None,
            bio: None,
            profile_picture: None,
            years_of_experience: None,
            is_verified: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            profile_view(row, None),
            Err(BackendError::Malformed { .. })
        ));
    }

    #[test]
    fn test_empty_patch_detected() {
        assert!(ProfilePatch::default().is_empty());
        let patch = ProfilePatch {
            bio: Some("Tax specialist".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
