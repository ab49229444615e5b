// Reference lookups for address forms. Rows come from the location-import batch job.

use axum::{
    extract::{Path, State},
    Json,
};
use sqlx::PgPool;
use tracing::debug;

use crate::backend::cache::{ListCache, Lookup};
use crate::backend::query::{Direction, Select};
use crate::backend::Table;
use crate::errors::AppError;
use crate::models::location::{DistrictRow, StateRow};
use crate::state::AppState;

pub const LOCATIONS_SCOPE: &str = "locations";

pub async fn list_states(pool: &PgPool, cache: &ListCache) -> Result<Vec<StateRow>, AppError> {
    let slot = match cache.get::<Vec<StateRow>>(LOCATIONS_SCOPE, "states").await {
        Lookup::Hit(cached) => return Ok(cached),
        Lookup::Miss(slot) => slot,
    };
    let rows: Vec<StateRow> = Select::from(Table::States)
        .order("name", Direction::Asc)
        .fetch_all(pool)
        .await?;
    debug!("Loaded {} states", rows.len());
    cache.put(slot, &rows).await;
    Ok(rows)
}

pub async fn list_districts(
    pool: &PgPool,
    cache: &ListCache,
    state_id: i32,
) -> Result<Vec<DistrictRow>, AppError> {
    let key = format!("districts:{state_id}");
    let slot = match cache.get::<Vec<DistrictRow>>(LOCATIONS_SCOPE, &key).await {
        Lookup::Hit(cached) => return Ok(cached),
        Lookup::Miss(slot) => slot,
    };

    let state: Option<StateRow> = Select::from(Table::States)
        .eq("id", state_id)
        .maybe_single(pool)
        .await?;
    if state.is_none() {
        return Err(AppError::NotFound(format!("State {state_id} not found")));
    }

    let rows: Vec<DistrictRow> = Select::from(Table::Districts)
        .eq("state_id", state_id)
        .order("name", Direction::Asc)
        .fetch_all(pool)
        .await?;
    debug!("Loaded {} districts for state {state_id}", rows.len());
    cache.put(slot, &rows).await;
    Ok(rows)
}

/// GET /api/v1/states
pub async fn handle_list_states(
    State(state): State<AppState>,
) -> Result<Json<Vec<StateRow>>, AppError> {
    Ok(Json(list_states(&state.db, &state.cache).await?))
}

/// GET /api/v1/states/:id/districts
pub async fn handle_list_districts(
    State(state): State<AppState>,
    Path(state_id): Path<i32>,
) -> Result<Json<Vec<DistrictRow>>, AppError> {
    Ok(Json(list_districts(&state.db, &state.cache, state_id).await?))
}
