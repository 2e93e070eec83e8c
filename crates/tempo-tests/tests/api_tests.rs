//! API behavior through the full router, backed by in-memory adapters.

use axum::http::{Method, StatusCode};
use serde_json::json;
use tempo_api::idempotency::REPLAYED_HEADER;
use tempo_api::middleware::REQUEST_ID_HEADER;
use tempo_tests::{CheckinFixture, CoachFixture, MemoryApp, new_client_body, request, test_settings};
use uuid::Uuid;

fn checkins_path(client_id: &str) -> String {
    format!("/api/v1/clients/{client_id}/checkins")
}

fn insights_path(client_id: &str) -> String {
    format!("/api/v1/clients/{client_id}/insights")
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = MemoryApp::new();

    let health = app.send(request(Method::GET, "/health").build()).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["status"], "healthy");

    let ready = app.send(request(Method::GET, "/ready").build()).await;
    assert_eq!(ready.status, StatusCode::OK);
    assert_eq!(ready.body["status"], "ready");
}

#[tokio::test]
async fn test_ready_reports_unavailable_store() {
    let app = MemoryApp::new();
    app.kv.set_unavailable(true);

    let ready = app.send(request(Method::GET, "/ready").build()).await;
    assert_eq!(ready.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(ready.body["status"], "unavailable");
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = MemoryApp::new();

    let response = app.send(request(Method::GET, "/api/v1/clients").build()).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), Some("UNAUTHORIZED"));

    let garbage = app
        .send(
            request(Method::GET, "/api/v1/clients")
                .header("authorization", "Bearer not-a-jwt")
                .build(),
        )
        .await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_coach_role_is_rejected() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let athlete_token = coach.with_role("athlete");

    let response = app
        .send(
            request(Method::GET, "/api/v1/clients")
                .header("authorization", &format!("Bearer {athlete_token}"))
                .build(),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_list_and_get_client() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();

    let client_id = app.create_client(&coach, &new_client_body("Dana")).await;

    let list = app.get("/api/v1/clients", &coach).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body["clients"].as_array().map(Vec::len), Some(1));

    let one = app.get(&format!("/api/v1/clients/{client_id}"), &coach).await;
    assert_eq!(one.status, StatusCode::OK);
    assert_eq!(one.body["client"]["name"], "Dana");
}

#[tokio::test]
async fn test_invalid_client_body_is_rejected() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();

    let response = app
        .post(
            "/api/v1/clients",
            &coach,
            Some(Uuid::new_v4()),
            &json!({ "name": "", "email": "nobody" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_foreign_and_missing_clients_look_the_same() {
    let app = MemoryApp::new();
    let owner = CoachFixture::new();
    let stranger = CoachFixture::new();
    let client_id = app.create_client(&owner, &new_client_body("Eli")).await;

    let foreign = app.get(&format!("/api/v1/clients/{client_id}"), &stranger).await;
    let missing = app
        .get(&format!("/api/v1/clients/{}", Uuid::new_v4()), &stranger)
        .await;
    let malformed = app.get("/api/v1/clients/not-an-id", &stranger).await;

    assert_eq!(foreign.status, StatusCode::NOT_FOUND);
    assert_eq!(foreign.raw, missing.raw);
    assert_eq!(foreign.raw, malformed.raw);

    let foreign_checkins = app
        .get(&format!("{}?from=2026-01-01&to=2026-01-31", checkins_path(&client_id)), &stranger)
        .await;
    assert_eq!(foreign_checkins.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkin_replay_returns_identical_response() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let client_id = app.create_client(&coach, &new_client_body("Fay")).await;
    let key = Uuid::new_v4();
    let body = CheckinFixture::body("2026-01-05", json!({ "sleep": 8 }));
    let retried = CheckinFixture::body("2026-01-06", json!({ "sleep": 4 }));

    let first = app.post(&checkins_path(&client_id), &coach, Some(key), &body).await;
    let second = app.post(&checkins_path(&client_id), &coach, Some(key), &retried).await;

    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(first.raw, second.raw);
    assert!(first.header(REPLAYED_HEADER).is_none());
    assert_eq!(second.header(REPLAYED_HEADER), Some("true"));
    assert_eq!(app.checkins.len().await, 1);

    let list = app
        .get(&format!("{}?from=2026-01-01&to=2026-01-31", checkins_path(&client_id)), &coach)
        .await;
    assert_eq!(list.body["items"][0]["date"], "2026-01-05");
    assert_eq!(list.body["items"][0]["metrics"]["sleep"], 8);
}

#[tokio::test]
async fn test_checkin_replay_ignores_invalid_retry_body() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let client_id = app.create_client(&coach, &new_client_body("Ivy")).await;
    let key = Uuid::new_v4();

    let first = app
        .post(
            &checkins_path(&client_id),
            &coach,
            Some(key),
            &CheckinFixture::body("2026-01-05", json!({ "sleep": 8 })),
        )
        .await;
    let second = app
        .post(
            &checkins_path(&client_id),
            &coach,
            Some(key),
            &json!({ "date": "2026-13-99", "metrics": {} }),
        )
        .await;

    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(second.status, first.status);
    assert_eq!(second.raw, first.raw);
    assert_eq!(second.header(REPLAYED_HEADER), Some("true"));
    assert_eq!(app.checkins.len().await, 1);

    // A fresh key still gets its body checked.
    let fresh = app
        .post(
            &checkins_path(&client_id),
            &coach,
            Some(Uuid::new_v4()),
            &json!({ "date": "2026-13-99", "metrics": {} }),
        )
        .await;
    assert_eq!(fresh.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_client_create_replay_ignores_invalid_retry_body() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let key = Uuid::new_v4();

    let first = app
        .post("/api/v1/clients", &coach, Some(key), &new_client_body("Jo"))
        .await;
    let second = app
        .post("/api/v1/clients", &coach, Some(key), &json!({ "name": "" }))
        .await;

    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(second.raw, first.raw);
    assert_eq!(second.header(REPLAYED_HEADER), Some("true"));

    let list = app.get("/api/v1/clients", &coach).await;
    assert_eq!(list.body["clients"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_same_date_with_new_key_updates_in_place() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let client_id = app.create_client(&coach, &new_client_body("Gus")).await;
    let path = checkins_path(&client_id);

    let first = app
        .post(&path, &coach, Some(Uuid::new_v4()), &CheckinFixture::body("2026-01-05", json!({ "sleep": 8 })))
        .await;
    let second = app
        .post(&path, &coach, Some(Uuid::new_v4()), &CheckinFixture::body("2026-01-05", json!({ "weight": 70 })))
        .await;

    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(first.body["checkinId"], second.body["checkinId"]);

    let list = app
        .get(&format!("{path}?from=2026-01-01&to=2026-01-31"), &coach)
        .await;
    let items = list.body["items"].as_array().cloned().unwrap_or_default();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["metrics"], json!({ "sleep": 8, "weight": 70 }));
}

#[tokio::test]
async fn test_missing_or_malformed_idempotency_key() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let client_id = app.create_client(&coach, &new_client_body("Hal")).await;
    let body = CheckinFixture::body("2026-01-05", json!({ "sleep": 8 }));

    let missing = app.post(&checkins_path(&client_id), &coach, None, &body).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let malformed = app
        .send(
            request(Method::POST, &checkins_path(&client_id))
                .bearer(&coach)
                .header("idempotency-key", "not-a-uuid")
                .json(&body)
                .build(),
        )
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    assert!(app.checkins.is_empty().await);
}

#[tokio::test]
async fn test_list_reflects_writes_immediately() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let client_id = app.create_client(&coach, &new_client_body("Ivy")).await;
    let list_path = format!("{}?from=2026-01-01&to=2026-01-31", checkins_path(&client_id));

    let before = app.get(&list_path, &coach).await;
    assert_eq!(before.status, StatusCode::OK);
    assert_eq!(before.body["items"], json!([]));

    app.post(
        &checkins_path(&client_id),
        &coach,
        Some(Uuid::new_v4()),
        &CheckinFixture::body("2026-01-10", json!({ "sleep": 7.5 })),
    )
    .await;

    let after = app.get(&list_path, &coach).await;
    assert_eq!(after.body["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(after.body["items"][0]["date"], "2026-01-10");
}

#[tokio::test]
async fn test_list_pages_with_cursor() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let client_id = app.create_client(&coach, &new_client_body("Jo")).await;

    for day in 1..=3 {
        app.post(
            &checkins_path(&client_id),
            &coach,
            Some(Uuid::new_v4()),
            &CheckinFixture::body(&format!("2026-01-0{day}"), json!({ "sleep": 7 })),
        )
        .await;
    }

    let base = format!("{}?from=2026-01-01&to=2026-01-31&limit=2", checkins_path(&client_id));
    let first = app.get(&base, &coach).await;
    assert_eq!(first.body["items"][0]["date"], "2026-01-03");
    assert_eq!(first.body["items"][1]["date"], "2026-01-02");
    let cursor = first.body["nextCursor"].as_str().map(str::to_string);
    assert!(cursor.is_some());

    let second = app
        .get(&format!("{base}&cursor={}", cursor.unwrap_or_default()), &coach)
        .await;
    assert_eq!(second.body["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(second.body["items"][0]["date"], "2026-01-01");
    assert!(second.body["nextCursor"].is_null());
}

#[tokio::test]
async fn test_invalid_list_parameters() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let client_id = app.create_client(&coach, &new_client_body("Kit")).await;
    let path = checkins_path(&client_id);

    for query in [
        "from=2026-01-01&to=2026-01-31&limit=0",
        "from=2026-01-01&to=2026-01-31&limit=101",
        "from=2026-02-30&to=2026-03-01",
        "from=2026-03-01&to=2026-01-01",
        "from=2026-01-01",
    ] {
        let response = app.get(&format!("{path}?{query}"), &coach).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "query {query}");
    }
}

#[tokio::test]
async fn test_insight_request_is_deduplicated() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let client_id = app.create_client(&coach, &new_client_body("Lou")).await;
    let range = json!({ "from": "2026-01-01", "to": "2026-01-31" });

    let first = app.post(&insights_path(&client_id), &coach, None, &range).await;
    let second = app.post(&insights_path(&client_id), &coach, None, &range).await;

    assert_eq!(first.status, StatusCode::ACCEPTED);
    assert_eq!(second.status, StatusCode::ACCEPTED);
    assert_eq!(first.body["jobId"], second.body["jobId"]);
}

#[tokio::test]
async fn test_insight_missing_before_worker_runs() {
    let app = MemoryApp::new();
    let coach = CoachFixture::new();
    let client_id = app.create_client(&coach, &new_client_body("Max")).await;

    let response = app
        .get(&format!("{}?from=2026-01-01&to=2026-01-31", insights_path(&client_id)), &coach)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "Insight not found");
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests() {
    let mut settings = test_settings();
    settings.rate_limit.max_requests = 2;
    let app = MemoryApp::with_settings(settings);
    let coach = CoachFixture::new();

    let first = app.get("/api/v1/clients", &coach).await;
    let second = app.get("/api/v1/clients", &coach).await;
    let third = app.get("/api/v1/clients", &coach).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.header("x-ratelimit-remaining"), Some("1"));
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(third.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(third.body["details"]["limit"], 2);
    assert!(third.header("retry-after").is_some());

    // Budgets are per coach.
    let other = app.get("/api/v1/clients", &CoachFixture::new()).await;
    assert_eq!(other.status, StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_is_echoed_or_minted() {
    let app = MemoryApp::new();

    let echoed = app
        .send(
            request(Method::GET, "/health")
                .header(REQUEST_ID_HEADER, "trace-abc.123")
                .build(),
        )
        .await;
    assert_eq!(echoed.header(REQUEST_ID_HEADER), Some("trace-abc.123"));

    let replaced = app
        .send(
            request(Method::GET, "/health")
                .header(REQUEST_ID_HEADER, "bad id with spaces")
                .build(),
        )
        .await;
    let minted = replaced.header(REQUEST_ID_HEADER).unwrap_or_default();
    assert!(!minted.is_empty());
    assert_ne!(minted, "bad id with spaces");
}
