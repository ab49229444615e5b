use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::backend::cache::{ListCache, Lookup};
use crate::backend::pagination::{PageRequest, Paginated};
use crate::backend::query::{Direction, Filter, Select};
use crate::backend::Table;
use crate::errors::AppError;
use crate::models::profile::{
    AddressRow, EducationRow, ExperienceRow, ProfileRow, Role, ServiceRow, SocialProfileRow,
};
use crate::profiles::service::{self, resolve_profile, ProfileView};
use crate::storage::Storage;

/// Cache scope for directory search results; profile mutations bump it.
pub const DIRECTORY_SCOPE: &str = "ca_directory";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DirectoryFilter {
    /// Matches first name, last name or bio.
    pub query: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Matches any listed service name.
    pub service: Option<String>,
}

fn term(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl DirectoryFilter {
    /// Stable cache key for one filter/page combination.
    pub fn cache_key(&self, page: &PageRequest) -> String {
        format!(
            "q={}|city={}|state={}|service={}|p={}|n={}",
            term(&self.query).unwrap_or_default().to_lowercase(),
            term(&self.city).unwrap_or_default().to_lowercase(),
            term(&self.state).unwrap_or_default().to_lowercase(),
            term(&self.service).unwrap_or_default().to_lowercase(),
            page.page,
            page.page_size
        )
    }
}

#[derive(Debug, FromRow)]
struct CaListingRow {
    #[sqlx(flatten)]
    profile: ProfileRow,
    city: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaListing {
    #[serde(flatten)]
    pub profile: ProfileView,
    pub city: Option<String>,
    pub state: Option<String>,
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaDetail {
    pub profile: ProfileView,
    pub address: Option<AddressRow>,
    pub services: Vec<String>,
    pub experiences: Vec<ExperienceRow>,
    pub educations: Vec<EducationRow>,
    pub social: Option<SocialProfileRow>,
}

/// Groups service rows by owner, keeping each owner's insertion order.
pub fn group_services(rows: Vec<ServiceRow>) -> HashMap<Uuid, Vec<String>> {
    let mut grouped: HashMap<Uuid, Vec<String>> = HashMap::new();
    for row in rows {
        grouped.entry(row.profile_id).or_default().push(row.service_name);
    }
    grouped
}

fn listing_query(filter: &DirectoryFilter) -> Select {
    let mut select = Select::from(Table::Profiles)
        .columns("profiles.*, address.city AS city, address.state AS state")
        .join("LEFT JOIN address ON address.profile_id = profiles.id")
        .eq("profiles.role", Role::Ca.as_str());
    if let Some(q) = term(&filter.query) {
        select = select.filter(Filter::AnyILike(
            vec!["profiles.first_name", "profiles.last_name", "profiles.bio"],
            q.to_string(),
        ));
    }
    if let Some(city) = term(&filter.city) {
        select = select.filter(Filter::ILike("address.city", city.to_string()));
    }
    if let Some(state) = term(&filter.state) {
        select = select.filter(Filter::ILike("address.state", state.to_string()));
    }
    select
}

pub async fn search_cas(
    pool: &PgPool,
    cache: &ListCache,
    storage: &Storage,
    filter: &DirectoryFilter,
    page: &PageRequest,
) -> Result<Paginated<CaListing>, AppError> {
    let key = filter.cache_key(page);
    let slot = match cache.get::<Paginated<CaListing>>(DIRECTORY_SCOPE, &key).await {
        Lookup::Hit(cached) => return Ok(cached),
        Lookup::Miss(slot) => slot,
    };

    let mut select = listing_query(filter);
    if let Some(service_term) = term(&filter.service) {
        let matches: Vec<ServiceRow> = Select::from(Table::Services)
            .filter(Filter::ILike("service_name", service_term.to_string()))
            .fetch_all(pool)
            .await?;
        let mut ids: Vec<Uuid> = matches.into_iter().map(|s| s.profile_id).collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Paginated {
                total: Some(0),
                ..Paginated::from_page(Vec::new(), page)
            });
        }
        select = select.filter(Filter::In("profiles.id", ids.into()));
    }

    let select = select
        .order("profiles.is_verified", Direction::Desc)
        .order("profiles.created_at", Direction::Desc);
    let paged = select.clone().page(page);
    let (rows, total) = tokio::try_join!(
        paged.fetch_all::<CaListingRow, _>(pool),
        select.count(pool),
    )?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.profile.id).collect();
    let mut services = if ids.is_empty() {
        HashMap::new()
    } else {
        let service_rows: Vec<ServiceRow> = Select::from(Table::Services)
            .filter(Filter::In("profile_id", ids.into()))
            .order("created_at", Direction::Asc)
            .fetch_all(pool)
            .await?;
        group_services(service_rows)
    };

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let services = services.remove(&row.profile.id).unwrap_or_default();
        items.push(CaListing {
            profile: resolve_profile(storage, row.profile).await?,
            city: row.city,
            state: row.state,
            services,
        });
    }
    debug!("Directory search returned {} of {total} CAs", items.len());

    let result = Paginated {
        total: Some(total.max(0) as usize),
        ..Paginated::from_page(items, page)
    };
    cache.put(slot, &result).await;
    Ok(result)
}

/// Full public profile of one CA; the sections load concurrently.
pub async fn get_ca_detail(
    pool: &PgPool,
    storage: &Storage,
    id: Uuid,
) -> Result<CaDetail, AppError> {
    let (profile, address, services, experiences, educations, social) = tokio::try_join!(
        service::get_profile_row(pool, id),
        service::get_address(pool, id),
        service::list_services(pool, id),
        service::list_experiences(pool, id),
        service::list_educations(pool, id),
        service::get_social_profile(pool, id),
    )?;

    if profile.role.parse::<Role>().ok() != Some(Role::Ca) {
        return Err(AppError::NotFound(format!("CA {id} not found")));
    }

    Ok(CaDetail {
        profile: resolve_profile(storage, profile).await?,
        address,
        services: services.into_iter().map(|s| s.service_name).collect(),
        experiences,
        educations,
        social,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_service(profile_id: Uuid, name: &str) -> ServiceRow {
        ServiceRow {
            id: Uuid::new_v4(),
            profile_id,
            service_name: name.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_group_services_keeps_order_per_owner() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let grouped = group_services(vec![
            make_service(a, "Audit"),
            make_service(b, "GST Filing"),
            make_service(a, "Income Tax"),
        ]);
        assert_eq!(grouped[&a], vec!["Audit", "Income Tax"]);
        assert_eq!(grouped[&b], vec!["GST Filing"]);
    }

    #[test]
    fn test_listing_query_only_targets_cas() {
        let sql = listing_query(&DirectoryFilter::default()).build().sql().to_string();
        assert!(sql.starts_with(
            "SELECT profiles.*, address.city AS city, address.state AS state FROM profiles \
             LEFT JOIN address ON address.profile_id = profiles.id"
        ));
        assert!(sql.ends_with("WHERE profiles.role = $1"));
    }

    #[test]
    fn test_listing_query_ignores_blank_terms() {
        let filter = DirectoryFilter {
            query: Some("  ".to_string()),
            city: Some("Pune".to_string()),
            ..Default::default()
        };
        let sql = listing_query(&filter).build().sql().to_string();
        assert!(!sql.contains("first_name"));
        assert!(sql.contains("address.city ILIKE $2"));
    }

    #[test]
    fn test_cache_key_is_case_insensitive() {
        let page = PageRequest::new(2, 10);
        let a = DirectoryFilter {
            city: Some("Pune".to_string()),
            ..Default::default()
        };
        let b = DirectoryFilter {
            city: Some(" pune ".to_string()),
            ..Default::default()
        };
        assert_eq!(a.cache_key(&page), b.cache_key(&page));
        assert_ne!(a.cache_key(&page), a.cache_key(&PageRequest::new(3, 10)));
    }
}
