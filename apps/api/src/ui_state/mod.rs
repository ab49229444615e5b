// Per-user client state: active dashboard section, the post being drafted
// and the progress of the latest upload. Each piece is owned independently;
// nothing here is persisted across restarts, and idle or excess entries are
// evicted.

pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DashboardSection {
    #[default]
    Overview,
    ContactRequests,
    Profile,
    Forum,
    Settings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate)]
pub struct PostDraft {
    #[validate(length(max = 200))]
    #[serde(default)]
    pub title: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub content: String,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    Uploading,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadProgress {
    /// Which upload this is, e.g. `profile_picture` or `post_image`.
    pub target: String,
    pub phase: UploadPhase,
    pub percent: u8,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserUiState {
    pub dashboard_section: DashboardSection,
    pub post_draft: Option<PostDraft>,
    pub draft_saved_at: Option<DateTime<Utc>>,
    pub upload: Option<UploadProgress>,
}

/// Entries untouched for this long are dropped.
pub const IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Upper bound on tracked users; the least recently touched is evicted past it.
pub const MAX_TRACKED_USERS: usize = 10_000;

#[derive(Debug)]
struct Entry {
    state: UserUiState,
    touched: Instant,
}

/// Shared store keyed by user id; cloned into every request via `AppState`.
#[derive(Debug, Clone)]
pub struct UiStateStore {
    inner: Arc<RwLock<HashMap<Uuid, Entry>>>,
    idle_ttl: Duration,
    capacity: usize,
}

impl Default for UiStateStore {
    fn default() -> Self {
        Self::with_limits(IDLE_TTL, MAX_TRACKED_USERS)
    }
}

impl UiStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(idle_ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            idle_ttl,
            capacity: capacity.max(1),
        }
    }

    /// State for `user`, defaults when nothing live has been written.
    pub async fn get(&self, user: Uuid) -> UserUiState {
        self.inner
            .read()
            .await
            .get(&user)
            .filter(|e| e.touched.elapsed() < self.idle_ttl)
            .map(|e| e.state.clone())
            .unwrap_or_default()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    async fn update<F>(&self, user: Uuid, f: F) -> UserUiState
    where
        F: FnOnce(&mut UserUiState),
    {
        let mut map = self.inner.write().await;
        let now = Instant::now();
        if map.get(&user).is_some_and(|e| now - e.touched >= self.idle_ttl) {
            map.remove(&user);
        }
        if !map.contains_key(&user) && map.len() >= self.capacity {
            self.evict(&mut map, now);
        }

        let entry = map.entry(user).or_insert_with(|| Entry {
            state: UserUiState::default(),
            touched: now,
        });
        entry.touched = now;
        f(&mut entry.state);
        entry.state.clone()
    }

    /// Drops idle entries, then the least recently touched until there is room.
    fn evict(&self, map: &mut HashMap<Uuid, Entry>, now: Instant) {
        let before = map.len();
        map.retain(|_, e| now - e.touched < self.idle_ttl);
        while map.len() >= self.capacity {
            let Some(oldest) = map.iter().min_by_key(|(_, e)| e.touched).map(|(id, _)| *id) else {
                break;
            };
            map.remove(&oldest);
        }
        debug!("Evicted {} UI state entries", before - map.len());
    }

    pub async fn set_dashboard_section(&self, user: Uuid, section: DashboardSection) -> UserUiState {
        self.update(user, |s| s.dashboard_section = section).await
    }

    pub async fn save_draft(&self, user: Uuid, draft: PostDraft) -> UserUiState {
        self.update(user, |s| {
            s.post_draft = Some(draft);
            s.draft_saved_at = Some(Utc::now());
        })
        .await
    }

    pub async fn clear_draft(&self, user: Uuid) -> UserUiState {
        self.update(user, |s| {
            s.post_draft = None;
            s.draft_saved_at = None;
        })
        .await
    }

    pub async fn set_upload(&self, user: Uuid, target: &str, phase: UploadPhase, percent: u8) {
        let progress = UploadProgress {
            target: target.to_string(),
            phase,
            percent: percent.min(100),
            updated_at: Utc::now(),
        };
        self.update(user, |s| s.upload = Some(progress)).await;
    }

    pub async fn start_upload(&self, user: Uuid, target: &str) {
        self.set_upload(user, target, UploadPhase::Uploading, 0).await;
    }

    /// Records the outcome of an upload started with `start_upload`.
    pub async fn finish_upload(&self, user: Uuid, target: &str, succeeded: bool) {
        let (phase, percent) = if succeeded {
            (UploadPhase::Done, 100)
        } else {
            (UploadPhase::Failed, 0)
        };
        self.set_upload(user, target, phase, percent).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_user_gets_defaults() {
        let store = UiStateStore::new();
        let state = store.get(Uuid::new_v4()).await;
        assert_eq!(state, UserUiState::default());
        assert_eq!(state.dashboard_section, DashboardSection::Overview);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let store = UiStateStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.set_dashboard_section(a, DashboardSection::Forum).await;
        assert_eq!(store.get(a).await.dashboard_section, DashboardSection::Forum);
        assert_eq!(store.get(b).await.dashboard_section, DashboardSection::Overview);
    }

    #[tokio::test]
    async fn test_draft_save_and_clear() {
        let store = UiStateStore::new();
        let user = Uuid::new_v4();
        let draft = PostDraft {
            title: "GST on freelance income".to_string(),
            ..Default::default()
        };
        let saved = store.save_draft(user, draft.clone()).await;
        assert_eq!(saved.post_draft, Some(draft));
        assert!(saved.draft_saved_at.is_some());

        let cleared = store.clear_draft(user).await;
        assert!(cleared.post_draft.is_none());
        assert!(cleared.draft_saved_at.is_none());
    }

    #[tokio::test]
    async fn test_upload_progress_lifecycle() {
        let store = UiStateStore::new();
        let user = Uuid::new_v4();
        store.start_upload(user, "post_image").await;
        let upload = store.get(user).await.upload.unwrap();
        assert_eq!(upload.phase, UploadPhase::Uploading);
        assert_eq!(upload.percent, 0);

        store.finish_upload(user, "post_image", true).await;
        let upload = store.get(user).await.upload.unwrap();
        assert_eq!(upload.phase, UploadPhase::Done);
        assert_eq!(upload.percent, 100);

        store.set_upload(user, "post_image", UploadPhase::Uploading, 250).await;
        assert_eq!(store.get(user).await.upload.unwrap().percent, 100);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = UiStateStore::new();
        let clone = store.clone();
        let user = Uuid::new_v4();
        clone.set_dashboard_section(user, DashboardSection::Settings).await;
        assert_eq!(store.get(user).await.dashboard_section, DashboardSection::Settings);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_entries_expire() {
        let store = UiStateStore::with_limits(Duration::from_secs(60), 10);
        let user = Uuid::new_v4();
        store.set_dashboard_section(user, DashboardSection::Forum).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.get(user).await.dashboard_section, DashboardSection::Forum);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.get(user).await, UserUiState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_is_bounded_by_capacity() {
        let store = UiStateStore::with_limits(Duration::from_secs(3600), 3);
        let users: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for user in &users {
            store.set_dashboard_section(*user, DashboardSection::Profile).await;
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        // Touching the first user makes the second the least recent.
        store.set_dashboard_section(users[0], DashboardSection::Settings).await;

        for _ in 0..50 {
            store.set_dashboard_section(Uuid::new_v4(), DashboardSection::Forum).await;
        }
        assert_eq!(store.len().await, 3);
        assert_eq!(store.get(users[1]).await, UserUiState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_prefers_least_recently_touched() {
        let store = UiStateStore::with_limits(Duration::from_secs(3600), 2);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.set_dashboard_section(a, DashboardSection::Profile).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        store.set_dashboard_section(b, DashboardSection::Forum).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        store.set_dashboard_section(a, DashboardSection::Settings).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        store.set_dashboard_section(c, DashboardSection::Forum).await;

        assert_eq!(store.get(a).await.dashboard_section, DashboardSection::Settings);
        assert_eq!(store.get(b).await, UserUiState::default());
        assert_eq!(store.get(c).await.dashboard_section, DashboardSection::Forum);
    }
}
