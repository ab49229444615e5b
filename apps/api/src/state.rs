use sqlx::PgPool;

use crate::backend::cache::ListCache;
use crate::config::Config;
use crate::storage::Storage;
use crate::ui_state::UiStateStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Redis-backed list cache; mutations bump the owning scope's generation.
    pub cache: ListCache,
    /// Object storage for pictures, post images and CA certificates.
    pub storage: Storage,
    pub config: Config,
    pub ui_state: UiStateStore,
}
