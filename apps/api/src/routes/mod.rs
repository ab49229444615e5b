pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::contact_requests::handlers as contact;
use crate::forum::handlers as forum;
use crate::locations;
use crate::profiles::handlers as profiles;
use crate::state::AppState;
use crate::storage::MAX_UPLOAD_BYTES;
use crate::ui_state::handlers as ui;

/// Multipart framing on top of the largest accepted file.
const BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Profiles / onboarding
        .route("/api/v1/profiles/me", patch(profiles::handle_update_profile))
        .route(
            "/api/v1/profiles/me/onboarding",
            put(profiles::handle_save_onboarding),
        )
        .route(
            "/api/v1/profiles/me/address",
            put(profiles::handle_upsert_address),
        )
        .route(
            "/api/v1/profiles/me/services",
            put(profiles::handle_replace_services),
        )
        .route(
            "/api/v1/profiles/me/social",
            put(profiles::handle_upsert_social),
        )
        .route(
            "/api/v1/profiles/me/picture",
            post(profiles::handle_upload_picture),
        )
        .route(
            "/api/v1/profiles/me/experiences",
            post(profiles::handle_add_experience),
        )
        .route(
            "/api/v1/profiles/me/experiences/:id",
            delete(profiles::handle_remove_experience),
        )
        .route(
            "/api/v1/profiles/me/educations",
            post(profiles::handle_add_education),
        )
        .route(
            "/api/v1/profiles/me/educations/:id",
            delete(profiles::handle_remove_education),
        )
        .route(
            "/api/v1/profiles/me/verification",
            post(profiles::handle_submit_verification).get(profiles::handle_verification_status),
        )
        .route("/api/v1/profiles/:id", get(profiles::handle_get_profile))
        .route(
            "/api/v1/profiles/:id/completion",
            get(profiles::handle_completion),
        )
        .route(
            "/api/v1/profiles/:id/experiences",
            get(profiles::handle_list_experiences),
        )
        .route(
            "/api/v1/profiles/:id/educations",
            get(profiles::handle_list_educations),
        )
        // CA directory
        .route("/api/v1/cas", get(profiles::handle_search_cas))
        .route("/api/v1/cas/:id", get(profiles::handle_get_ca))
        // Contact requests
        .route(
            "/api/v1/contact-requests",
            post(contact::handle_create).get(contact::handle_list),
        )
        .route("/api/v1/contact-requests/stats", get(contact::handle_stats))
        .route("/api/v1/contact-requests/:id", get(contact::handle_get))
        .route(
            "/api/v1/contact-requests/:id/status",
            patch(contact::handle_update_status),
        )
        .route(
            "/api/v1/contact-requests/:id/notes",
            patch(contact::handle_update_notes),
        )
        // Forum
        .route(
            "/api/v1/posts",
            get(forum::handle_list_posts).post(forum::handle_create_post),
        )
        .route("/api/v1/posts/images", post(forum::handle_upload_image))
        .route(
            "/api/v1/posts/:id",
            get(forum::handle_get_post)
                .patch(forum::handle_update_post)
                .delete(forum::handle_delete_post),
        )
        .route(
            "/api/v1/posts/:id/comments",
            get(forum::handle_list_comments).post(forum::handle_create_comment),
        )
        .route("/api/v1/comments/:id", delete(forum::handle_delete_comment))
        .route("/api/v1/categories", get(forum::handle_list_categories))
        .route("/api/v1/tags", get(forum::handle_list_tags))
        // Locations
        .route("/api/v1/states", get(locations::handle_list_states))
        .route(
            "/api/v1/states/:id/districts",
            get(locations::handle_list_districts),
        )
        // Per-user UI state
        .route("/api/v1/me/ui-state", get(ui::handle_get))
        .route(
            "/api/v1/me/ui-state/dashboard-section",
            put(ui::handle_set_section),
        )
        .route(
            "/api/v1/me/ui-state/post-draft",
            put(ui::handle_save_draft).delete(ui::handle_clear_draft),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::auth::USER_ID_HEADER;
    use crate::backend::cache::ListCache;
    use crate::config::Config;
    use crate::storage::Storage;
    use crate::ui_state::UiStateStore;

    fn make_config() -> Config {
        Config {
            database_url: "postgres://localhost/camarket_test".to_string(),
            db_max_connections: 1,
            redis_url: "redis://127.0.0.1/".to_string(),
            s3_endpoint: "http://localhost:9000".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_public_base_url: "http://localhost:9000".to_string(),
            aws_access_key_id: "test".to_string(),
            aws_secret_access_key: "test".to_string(),
            signed_url_expiry_secs: 60,
            list_cache_ttl_secs: 60,
            default_page_size: 10,
            port: 0,
            rust_log: "info".to_string(),
        }
    }

    /// State whose pool, cache and storage never connect unless a handler touches them.
    fn make_state() -> AppState {
        let config = make_config();
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let cache = ListCache::new(redis::Client::open(config.redis_url.clone()).unwrap(), 60);
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        let storage = Storage::new(
            aws_sdk_s3::Client::from_conf(s3_config),
            &config.s3_public_base_url,
            Duration::from_secs(60),
        );
        AppState {
            db,
            cache,
            storage,
            config,
            ui_state: UiStateStore::new(),
        }
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_owner_routes_require_user_header() {
        let app = build_router(make_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/me/ui-state")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_dashboard_section_round_trip() {
        let state = make_state();
        let user = Uuid::new_v4().to_string();

        let resp = build_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/v1/me/ui-state/dashboard-section")
                    .header(USER_ID_HEADER, &user)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"section":"forum"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = build_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/me/ui-state")
                    .header(USER_ID_HEADER, &user)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["dashboard_section"], "forum");
        assert!(body["post_draft"].is_null());
    }

    #[tokio::test]
    async fn test_oversized_draft_is_rejected_per_field() {
        let draft = serde_json::json!({ "title": "x".repeat(201) });
        let resp = build_router(make_state())
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/v1/me/ui-state/post-draft")
                    .header(USER_ID_HEADER, Uuid::new_v4().to_string())
                    .header("content-type", "application/json")
                    .body(Body::from(draft.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(resp).await;
        assert!(body["error"]["fields"]["title"].is_array());
    }

    #[tokio::test]
    async fn test_invalid_inbox_query_fails_before_database() {
        let resp = build_router(make_state())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/contact-requests?status=archived")
                    .header(USER_ID_HEADER, Uuid::new_v4().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
