use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use clinic_ops_server::{
    auth::{Role, StaticTokenProvider},
    middleware::auth_context::AuthContext,
    models::AppState,
    routes,
    store::InMemoryStore,
};

const ADMIN: &str = "admin-token";
const STAFF: &str = "staff-token";
const OTHER_CLINIC: &str = "other-clinic-token";

fn app() -> Router {
    let clinic = Uuid::new_v4();
    let identity = StaticTokenProvider::new()
        .with_token(
            ADMIN,
            AuthContext {
                user_id: Uuid::new_v4(),
                tenant_id: clinic,
                role: Role::Admin,
            },
        )
        .with_token(
            STAFF,
            AuthContext {
                user_id: Uuid::new_v4(),
                tenant_id: clinic,
                role: Role::Staff,
            },
        )
        .with_token(
            OTHER_CLINIC,
            AuthContext {
                user_id: Uuid::new_v4(),
                tenant_id: Uuid::new_v4(),
                role: Role::Admin,
            },
        );

    routes::router(AppState {
        store: Arc::new(InMemoryStore::new()),
        identity: Arc::new(identity),
        page_limit_max: 50,
    })
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header("authorization", format!("Bearer {t}"));
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        // extractor rejections outside our handlers answer in plain text
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn seed(app: &Router) -> (String, String) {
    let (status, doc) = call(app, "POST", "/api/v1/doctors", Some(STAFF), Some(json!({"name": "Dr. Mensah"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, pat) = call(app, "POST", "/api/v1/patients", Some(STAFF), Some(json!({"name": "Kofi", "gender": "male"}))).await;
    assert_eq!(status, StatusCode::CREATED);

    (
        doc["data"]["id"].as_str().unwrap().to_string(),
        pat["data"]["id"].as_str().unwrap().to_string(),
    )
}

fn slot(doctor: &str, patient: &str, start: &str, end: &str) -> Value {
    json!({
        "doctor_id": doctor,
        "patient_id": patient,
        "start_time": start,
        "end_time": end,
    })
}

#[tokio::test]
async fn requests_without_a_valid_token_are_unauthorized() {
    let app = app();
    for token in [None, Some("nope")] {
        let (status, body) = call(&app, "GET", "/api/v1/appointments", token, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "SESSION_EXPIRED");
    }
}

#[tokio::test]
async fn booking_flow_over_http() {
    let app = app();
    let (doc, pat) = seed(&app).await;

    let (status, created) = call(
        &app,
        "POST",
        "/api/v1/appointments",
        Some(STAFF),
        Some(slot(&doc, &pat, "2026-03-02T10:00:00Z", "2026-03-02T10:30:00Z")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["status"], "PENDING");
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/appointments",
        Some(STAFF),
        Some(slot(&doc, &pat, "2026-03-02T10:15:00Z", "2026-03-02T10:45:00Z")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "SLOT_CONFLICT");
    assert!(body["error"]["message"].as_str().unwrap().contains(&id));

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/appointments",
        Some(STAFF),
        Some(slot(&doc, &pat, "2026-03-02T11:00:00Z", "2026-03-02T11:00:00Z")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_RANGE");

    let (status, body) = call(&app, "POST", "/api/v1/appointments", Some(STAFF), Some(json!({"doctor_id": doc}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, list) = call(&app, "GET", "/api/v1/appointments?limit=5&sort=desc", Some(STAFF), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);
    assert_eq!(list["has_next_page"], false);
    assert_eq!(list["data"][0]["id"], id.as_str());
    assert_eq!(list["data"][0]["doctor"]["display"], "Dr. Mensah");
    assert!(list["next_cursor"].is_string());

    let (status, detail) = call(&app, "GET", &format!("/api/v1/appointments/{id}"), Some(STAFF), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["patient"]["display"], "Kofi");
    assert_eq!(detail["data"]["treatments"], json!([]));

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/treatments",
        Some(STAFF),
        Some(json!({"patient_id": pat, "appointment_id": id, "description": "filling"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, detail) = call(&app, "GET", &format!("/api/v1/appointments/{id}"), Some(STAFF), None).await;
    assert_eq!(detail["data"]["status"], "COMPLETED");
    assert_eq!(detail["data"]["treatments"].as_array().unwrap().len(), 1);

    let (status, body) = call(&app, "POST", &format!("/api/v1/appointments/{id}/cancel"), Some(STAFF), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn other_clinics_get_not_found() {
    let app = app();
    let (doc, pat) = seed(&app).await;

    let (_, created) = call(
        &app,
        "POST",
        "/api/v1/appointments",
        Some(STAFF),
        Some(slot(&doc, &pat, "2026-03-02T10:00:00Z", "2026-03-02T10:30:00Z")),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "GET", &format!("/api/v1/appointments/{id}"), Some(OTHER_CLINIC), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, list) = call(&app, "GET", "/api/v1/appointments", Some(OTHER_CLINIC), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 0);
    assert_eq!(list["next_cursor"], Value::Null);
}

#[tokio::test]
async fn deleting_requires_admin_and_no_dependents() {
    let app = app();
    let (doc, pat) = seed(&app).await;

    let (status, body) = call(&app, "DELETE", &format!("/api/v1/doctors/{doc}"), Some(STAFF), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    call(
        &app,
        "POST",
        "/api/v1/appointments",
        Some(STAFF),
        Some(slot(&doc, &pat, "2026-03-02T10:00:00Z", "2026-03-02T10:30:00Z")),
    )
    .await;

    let (status, body) = call(&app, "DELETE", &format!("/api/v1/doctors/{doc}"), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "HAS_DEPENDENTS");

    let (_, other) = call(&app, "POST", "/api/v1/doctors", Some(STAFF), Some(json!({"name": "Dr. Idle"}))).await;
    let other = other["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = call(&app, "DELETE", &format!("/api/v1/doctors/{other}"), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn bad_paging_input_is_rejected() {
    let app = app();
    seed(&app).await;

    let (status, body) = call(&app, "GET", "/api/v1/doctors?limit=0", Some(STAFF), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_LIMIT");

    let (status, body) = call(&app, "GET", "/api/v1/doctors?cursor=garbage!", Some(STAFF), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CURSOR");

    let (_, page) = call(&app, "GET", "/api/v1/doctors?limit=500", Some(STAFF), None).await;
    let cursor = page["next_cursor"].as_str().unwrap().to_string();
    let (status, body) = call(&app, "GET", &format!("/api/v1/doctors?active=false&cursor={cursor}"), Some(STAFF), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CURSOR_MISMATCH");
}

#[tokio::test]
async fn unknown_query_keys_are_rejected_not_ignored() {
    let app = app();
    let (doc, pat) = seed(&app).await;
    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/appointments",
        Some(STAFF),
        Some(slot(&doc, &pat, "2026-03-02T10:00:00Z", "2026-03-02T10:30:00Z")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // camelCase is not the wire format
    let (status, body) = call(
        &app,
        "GET",
        &format!("/api/v1/appointments?doctorId={doc}"),
        Some(STAFF),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_QUERY");

    let (status, body) = call(&app, "GET", "/api/v1/patients?nmae=Kofi", Some(STAFF), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_QUERY");

    let (status, body) = call(
        &app,
        "GET",
        &format!("/api/v1/appointments?doctor_id={doc}&start_date=2026-03-02&end_date=2026-03-02"),
        Some(STAFF),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["has_next_page"], false);
}

#[tokio::test]
async fn dashboard_counts_by_period() {
    let app = app();
    let (status, body) = call(&app, "GET", "/api/v1/dashboard/appointments/week", Some(STAFF), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["period"], "week");
    assert_eq!(body["data"]["all"], 0);

    let (status, _) = call(&app, "GET", "/api/v1/dashboard/appointments/decade", Some(STAFF), None).await;
    assert!(status.is_client_error());
}
