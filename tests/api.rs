use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use portfolio_api::{
    api::create_app,
    app_state::AppState,
    config::Config,
    infrastructure::monitoring::CheckOutcome,
};

async fn test_app(seed: bool) -> (Router, AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.url = format!("sqlite:{}", dir.path().join("portfolio.db").display());
    config.pool.pool_size = 2;
    config.pool.max_overflow = 2;
    config.pool.timeout = Duration::from_secs(2);
    config.seed_demo_data = seed;

    let state = AppState::new(config).await.unwrap();
    (create_app(state.clone()), state, dir)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, value)
}

fn education_payload() -> Value {
    json!({
        "degree": "BTS SIO",
        "school": "Lycée Technique",
        "period": "2022 - 2024",
        "description": "Systems and networks",
        "skills": ["Linux", "Cisco"]
    })
}

#[tokio::test]
async fn test_root_carries_tracking_headers() {
    let (app, _state, _dir) = test_app(false).await;
    let (status, headers, body) = send(&app, Method::GET, "/api/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Portfolio API is running");

    let request_id = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(request_id.len(), 8);
    let process_time: f64 = headers
        .get("x-process-time")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(process_time >= 0.0);
}

#[tokio::test]
async fn test_education_crud_flow() {
    let (app, _state, _dir) = test_app(false).await;

    let (status, _, created) = send(
        &app,
        Method::POST,
        "/api/portfolio/education",
        Some(education_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["school"], "Lycée Technique");
    assert!(created["created_at"].is_string());

    let (_, _, listed) = send(&app, Method::GET, "/api/portfolio/education", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _, updated) = send(
        &app,
        Method::PUT,
        &format!("/api/portfolio/education/{}", id),
        Some(json!({ "school": "IUT" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["school"], "IUT");
    assert_eq!(updated["degree"], "BTS SIO");

    let (status, _, deleted) = send(
        &app,
        Method::DELETE,
        &format!("/api/portfolio/education/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["message"], "Education deleted successfully");

    let (status, headers, missing) = send(
        &app,
        Method::GET,
        &format!("/api/portfolio/education/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["error"], "not_found");
    assert_eq!(missing["detail"], "Education not found");
    assert_eq!(
        missing["request_id"],
        headers.get("x-request-id").unwrap().to_str().unwrap()
    );
}

#[tokio::test]
async fn test_invalid_payload_is_validation_error() {
    let (app, _state, _dir) = test_app(false).await;
    let (status, headers, body) = send(
        &app,
        Method::POST,
        "/api/portfolio/projects",
        Some(json!({ "title": "missing everything else" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert!(body["request_id"].is_string());
    assert!(headers.contains_key("x-process-time"));
}

#[tokio::test]
async fn test_personal_info_singleton() {
    let (app, _state, _dir) = test_app(false).await;
    let (status, _, body) = send(&app, Method::GET, "/api/portfolio/personal-info", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Personal info not found");

    let (app, _state, _dir) = test_app(true).await;
    let (status, _, body) = send(&app, Method::GET, "/api/portfolio/personal-info", None).await;
    assert_eq!(status, StatusCode::OK);
    let name = body["name"].clone();

    let (status, _, body) = send(
        &app,
        Method::PUT,
        "/api/portfolio/personal-info",
        Some(json!({ "title": "Cloud Engineer" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Cloud Engineer");
    assert_eq!(body["name"], name);
}

#[tokio::test]
async fn test_contact_messages_are_marked_read() {
    let (app, _state, _dir) = test_app(false).await;
    let (status, _, created) = send(
        &app,
        Method::POST,
        "/api/portfolio/contact-messages",
        Some(json!({ "name": "Sam", "email": "sam@example.com", "message": "Hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["read"], false);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &app,
        Method::PUT,
        &format!("/api/portfolio/contact-messages/{}/read", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Message marked as read");

    let (_, _, fetched) = send(
        &app,
        Method::GET,
        &format!("/api/portfolio/contact-messages/{}", id),
        None,
    )
    .await;
    assert_eq!(fetched["read"], true);

    // no edit route for messages
    let (status, headers, _) = send(
        &app,
        Method::PUT,
        &format!("/api/portfolio/contact-messages/{}", id),
        Some(json!({ "message": "edited" })),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_veille_listed_by_type() {
    let (app, _state, _dir) = test_app(true).await;
    let (status, _, body) = send(
        &app,
        Method::GET,
        "/api/portfolio/veille/type/juridique",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["type"], "juridique");
}

#[tokio::test]
async fn test_health_reports_database_and_pool() {
    let (app, _state, _dir) = test_app(false).await;
    let (status, _, body) = send(&app, Method::GET, "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["status"], "healthy");
    assert!(body["database"]["response_time"].as_f64().unwrap() >= 0.0);
    assert_eq!(body["connection_pool"]["size"], 2);
    assert_eq!(body["connection_pool"]["max_overflow"], 2);
    assert_eq!(body["circuit_breaker"]["state"], "closed");
}

#[tokio::test]
async fn test_admin_cleanup_then_requests_still_served() {
    let (app, state, _dir) = test_app(true).await;
    send(&app, Method::GET, "/api/portfolio/projects", None).await;
    assert!(state.pool.snapshot().checked_in >= 1);

    let (status, _, body) = send(&app, Method::POST, "/api/admin/cleanup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(state.pool.snapshot().checked_in, 0);

    let (status, _, body) = send(&app, Method::GET, "/api/portfolio/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let (app, _state, _dir) = test_app(false).await;
    let (status, _, body) = send(&app, Method::GET, "/nope", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_request_metrics_count_database_operations() {
    let (app, _state, _dir) = test_app(false).await;
    send(&app, Method::GET, "/api/portfolio/skills", None).await;

    let (_, _, body) = send(&app, Method::GET, "/api/monitoring/requests", None).await;
    let recent = body["recent"].as_array().unwrap();
    let skills = recent
        .iter()
        .find(|m| m["path"] == "/api/portfolio/skills")
        .unwrap();
    assert_eq!(skills["db_operations"], 1);
    assert_eq!(skills["status_code"], 200);
    assert!(body["stats"]["total_requests"].as_u64().unwrap() >= 1);

    // an update reads the record before writing it
    let (_, _, created) = send(
        &app,
        Method::POST,
        "/api/portfolio/education",
        Some(education_payload()),
    )
    .await;
    let path = format!("/api/portfolio/education/{}", created["id"].as_str().unwrap());
    send(&app, Method::PUT, &path, Some(json!({ "school": "IUT" }))).await;

    let (_, _, body) = send(&app, Method::GET, "/api/monitoring/requests", None).await;
    let update = body["recent"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["method"] == "PUT" && m["path"] == path.as_str())
        .unwrap();
    assert_eq!(update["db_operations"], 2);
}

#[tokio::test]
async fn test_monitor_checks_real_database() {
    let (app, state, _dir) = test_app(false).await;
    assert_eq!(state.monitor.run_check().await, CheckOutcome::Healthy);

    let (_, _, summary) = send(&app, Method::GET, "/api/monitoring/summary", None).await;
    // a single healthy record is not enough history for `healthy`
    assert_eq!(summary["status"], "degraded");
    assert_eq!(summary["health_percentage"], 100.0);
    assert_eq!(summary["total_records"], 1);

    let (_, _, details) = send(&app, Method::GET, "/api/monitoring/details", None).await;
    assert_eq!(details["metrics"]["healthy_records"], 1);
    assert_eq!(details["recent_records"].as_array().unwrap().len(), 1);

    state.shutdown().await;
}
