use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use monitor::config::DEFAULT_PORT;
use monitor::{MonitorConfig, MonitorController, webhook};
use relay_core::truncate_caption;
use relay_db::Store;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "insta-relay";
const RECENT_POSTS_LIMIT: u32 = 10;
const CAPTION_DISPLAY_CHARS: usize = 100;

#[derive(Serialize)]
struct ApiError {
    error: String,
}

#[derive(Clone)]
struct AppState {
    controller: Arc<MonitorController>,
    store: Store,
    username: String,
    webhook_url: String,
    started_at: Instant,
}

#[derive(Serialize)]
struct PostSummary {
    shortcode: String,
    url: String,
    caption: Option<String>,
    sent_to_webhook: bool,
    sent_at: Option<String>,
    recorded_at: String,
}

#[derive(Deserialize)]
struct WebhookTestPayload {
    content: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = MonitorConfig::from_env();
    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let store = match std::env::var("DATABASE_PATH") {
        Ok(path) if !path.trim().is_empty() => Store::open(path),
        _ => {
            warn!("DATABASE_PATH not set, running without persistence");
            Store::degraded()
        }
    };

    let controller = Arc::new(MonitorController::new(config.clone(), store.clone()));
    controller.start().await;

    let state = AppState {
        controller: controller.clone(),
        store,
        username: config.username.clone(),
        webhook_url: config.webhook_url.clone(),
        started_at: Instant::now(),
    };
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("bind server");
    info!("{} listening on port {}", SERVICE_NAME, port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(controller))
        .await
        .expect("serve");
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}

async fn shutdown_signal(controller: Arc<MonitorController>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("shutting down, stopping monitor");
    controller.shutdown().await;
}

fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/ping", get(ping))
        .route("/stats", get(stats))
        .route("/posts", get(recent_posts))
        .route("/stop", get(stop_monitoring))
        .route("/restart", get(restart_monitoring))
        .route("/webhook/test", post(test_webhook))
        .with_state(state)
}

async fn home(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.controller.status();
    Json(serde_json::json!({
        "service": SERVICE_NAME,
        "status": "running",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "monitoring": status.running,
        "phase": status.phase,
        "instagram_user": state.username,
        "database_available": state.store.available(),
        "last_error": status.last_error,
        "stats": state.store.stats(&state.username),
    }))
}

async fn health(State(state): State<AppState>) -> &'static str {
    state.controller.status_handle().mark_ping();
    "OK"
}

async fn ping() -> &'static str {
    "pong"
}

async fn stats(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ApiError>)> {
    if state.username.is_empty() {
        return Err(to_bad_request("Instagram username not configured"));
    }
    Ok(Json(serde_json::json!({
        "username": state.username,
        "database_available": state.store.available(),
        "stats": state.store.stats(&state.username),
        "monitoring": state.controller.status().running,
    })))
}

async fn recent_posts(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ApiError>)> {
    if state.username.is_empty() || !state.store.available() {
        return Err(to_bad_request("Database not available"));
    }
    let posts: Vec<PostSummary> = state
        .store
        .recent_posts(&state.username, RECENT_POSTS_LIMIT)
        .into_iter()
        .map(|post| PostSummary {
            shortcode: post.shortcode,
            url: post.url,
            caption: post
                .caption
                .map(|caption| truncate_caption(&caption, CAPTION_DISPLAY_CHARS)),
            sent_to_webhook: post.sent_to_webhook,
            sent_at: post.sent_at,
            recorded_at: post.recorded_at,
        })
        .collect();
    Ok(Json(serde_json::json!({
        "username": state.username,
        "total_posts": posts.len(),
        "posts": posts,
    })))
}

async fn stop_monitoring(State(state): State<AppState>) -> Json<serde_json::Value> {
    let controller = state.controller.clone();
    tokio::spawn(async move { controller.stop().await });
    Json(serde_json::json!({ "message": "Monitoring stop requested" }))
}

async fn restart_monitoring(State(state): State<AppState>) -> Json<serde_json::Value> {
    let controller = state.controller.clone();
    tokio::spawn(async move { controller.restart().await });
    Json(serde_json::json!({ "message": "Monitoring restart requested" }))
}

async fn test_webhook(
    State(state): State<AppState>,
    payload: Option<Json<WebhookTestPayload>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ApiError>)> {
    if state.webhook_url.is_empty() {
        return Err(to_bad_request("Delivery target not configured"));
    }
    let content = payload
        .and_then(|Json(payload)| payload.content)
        .unwrap_or_else(|| format!("{} webhook test", SERVICE_NAME));
    webhook::send_test_message(&state.webhook_url, &content)
        .await
        .map_err(|err| {
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiError {
                    error: err.to_string(),
                }),
            )
        })?;
    Ok(Json(serde_json::json!({ "message": "Webhook test delivered" })))
}

fn to_bad_request(err: impl std::fmt::Display) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::{Request, StatusCode as HttpStatus};
    use http_body_util::BodyExt;
    use relay_core::ObservedPost;
    use relay_db::Db;
    use tower::util::ServiceExt;

    struct TestApp {
        state: AppState,
        _dir: tempfile::TempDir,
    }

    fn test_config(username: &str) -> MonitorConfig {
        MonitorConfig {
            username: username.to_string(),
            webhook_url: "https://discord.test/hook".to_string(),
            refresh_interval_secs: 1,
            message_template: None,
            credentials: None,
            checker_program: "/bin/false".to_string(),
        }
    }

    fn make_state(config: MonitorConfig, store: Store, dir: tempfile::TempDir) -> TestApp {
        let controller = Arc::new(MonitorController::new(config.clone(), store.clone()));
        TestApp {
            state: AppState {
                controller,
                store,
                username: config.username,
                webhook_url: config.webhook_url,
                started_at: Instant::now(),
            },
            _dir: dir,
        }
    }

    fn setup_state_with_data() -> TestApp {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("relay.sqlite");
        let mut db = Db::open(&db_path).expect("open db");
        db.migrate().expect("migrate db");
        db.upsert_post(&ObservedPost {
            username: "natalia".to_string(),
            shortcode: "OLD111".to_string(),
            url: relay_core::post_url("OLD111"),
            caption: Some("a".repeat(150)),
            ..ObservedPost::default()
        })
        .expect("seed post");
        db.upsert_post(&ObservedPost {
            username: "natalia".to_string(),
            shortcode: "NEW222".to_string(),
            url: relay_core::post_url("NEW222"),
            caption: Some("short caption".to_string()),
            ..ObservedPost::default()
        })
        .expect("seed post");
        db.update_cursor("natalia", Some("NEW222")).expect("cursor");

        let store = Store::open(&db_path);
        make_state(test_config("natalia"), store, dir)
    }

    async fn get_json(state: AppState, uri: &str) -> (HttpStatus, serde_json::Value) {
        let app = build_app(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let payload = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, payload)
    }

    #[tokio::test]
    async fn health_returns_plain_ok_and_marks_ping() {
        let test_app = setup_state_with_data();
        let app = build_app(test_app.state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), HttpStatus::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(&body[..], b"OK");
        assert!(test_app.state.controller.status().last_ping.is_some());
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let test_app = setup_state_with_data();
        let app = build_app(test_app.state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), HttpStatus::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(&body[..], b"pong");
    }

    #[tokio::test]
    async fn summary_reports_monitoring_and_store_state() {
        let test_app = setup_state_with_data();
        let (status, payload) = get_json(test_app.state, "/").await;
        assert_eq!(status, HttpStatus::OK);
        assert_eq!(payload["service"], SERVICE_NAME);
        assert_eq!(payload["monitoring"], false);
        assert_eq!(payload["instagram_user"], "natalia");
        assert_eq!(payload["database_available"], true);
        assert_eq!(payload["stats"]["total_posts"], 2);
    }

    #[tokio::test]
    async fn stats_returns_aggregates() {
        let test_app = setup_state_with_data();
        let (status, payload) = get_json(test_app.state, "/stats").await;
        assert_eq!(status, HttpStatus::OK);
        assert_eq!(payload["username"], "natalia");
        assert_eq!(payload["stats"]["total_posts"], 2);
        assert_eq!(payload["stats"]["sent_posts"], 2);
        assert_eq!(payload["stats"]["last_seen_shortcode"], "NEW222");
    }

    #[tokio::test]
    async fn stats_requires_configured_account() {
        let dir = tempfile::tempdir().expect("temp dir");
        let test_app = make_state(test_config(""), Store::degraded(), dir);
        let (status, payload) = get_json(test_app.state, "/stats").await;
        assert_eq!(status, HttpStatus::BAD_REQUEST);
        assert!(payload["error"].as_str().expect("error").contains("username"));
    }

    #[tokio::test]
    async fn posts_are_newest_first_with_truncated_captions() {
        let test_app = setup_state_with_data();
        let (status, payload) = get_json(test_app.state, "/posts").await;
        assert_eq!(status, HttpStatus::OK);
        assert_eq!(payload["total_posts"], 2);
        let posts = payload["posts"].as_array().expect("posts");
        assert_eq!(posts[0]["shortcode"], "NEW222");
        assert_eq!(posts[0]["caption"], "short caption");
        let truncated = posts[1]["caption"].as_str().expect("caption");
        assert_eq!(truncated.chars().count(), 103);
        assert!(truncated.ends_with("..."));
    }

    #[tokio::test]
    async fn posts_require_an_available_store() {
        let dir = tempfile::tempdir().expect("temp dir");
        let test_app = make_state(test_config("natalia"), Store::degraded(), dir);
        let (status, payload) = get_json(test_app.state, "/posts").await;
        assert_eq!(status, HttpStatus::BAD_REQUEST);
        assert_eq!(payload["error"], "Database not available");
    }

    #[tokio::test]
    async fn stop_and_restart_ack_immediately() {
        let test_app = setup_state_with_data();
        let (status, payload) = get_json(test_app.state.clone(), "/stop").await;
        assert_eq!(status, HttpStatus::OK);
        assert!(payload["message"].as_str().expect("message").contains("stop"));

        let (status, payload) = get_json(test_app.state, "/restart").await;
        assert_eq!(status, HttpStatus::OK);
        assert!(
            payload["message"]
                .as_str()
                .expect("message")
                .contains("restart")
        );
    }

    #[tokio::test]
    async fn webhook_test_requires_configured_target() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = test_config("natalia");
        config.webhook_url = String::new();
        let test_app = make_state(config, Store::degraded(), dir);
        let app = build_app(test_app.state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/test")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), HttpStatus::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_failure_maps_to_bad_gateway() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = test_config("natalia");
        config.webhook_url = "not-a-webhook-url".to_string();
        let test_app = make_state(config, Store::degraded(), dir);
        let app = build_app(test_app.state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/test")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), HttpStatus::BAD_GATEWAY);
    }
}
