use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Datelike, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use student_panel::auth::seed_admin;
use student_panel::config::Config;
use student_panel::rollno::{self, RollFormat};
use student_panel::store::{Backend, MemoryStore};
use student_panel::{router, AppState};

const EMAIL: &str = "admin@panel.test";
const PASSWORD: &str = "hunter22";
const CNIC: &str = "41302-1234567-1";

async fn state() -> AppState {
    let store: Arc<dyn Backend> = Arc::new(MemoryStore::new());
    seed_admin(store.as_ref(), EMAIL, PASSWORD).await.unwrap();
    AppState::new(store, Config::default())
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, body.to_vec())
}

async fn call(
    state: &AppState,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let (status, bytes) = send(state, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn login(state: &AppState) -> String {
    let (status, body) = call(
        state,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": EMAIL, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    body["session_id"].as_str().unwrap().to_string()
}

fn student(name: &str, national_id: &str, program: &str) -> Value {
    json!({
        "full_name": name,
        "guardian": "Guardian",
        "program": program,
        "batch": "2025",
        "gender": "Female",
        "national_id": national_id,
        "contact": "0300-0000000",
        "email": "student@panel.test",
        "address": "Lahore",
    })
}

#[tokio::test]
async fn health_needs_no_session() {
    let state = state().await;
    let (status, body) = call(&state, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_reject_missing_or_unknown_sessions() {
    let state = state().await;

    let (status, body) = call(&state, "GET", "/students", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "InvalidSession");

    let (status, _) = call(&state, "GET", "/dashboard", Some("not-a-session"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_is_refused() {
    let state = state().await;
    let (status, body) = call(
        &state,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": EMAIL, "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AuthenticationFailure");
    assert!(body.get("session_id").is_none());

    let (status, body) = call(
        &state,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "", "password": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MissingCredentials");
}

#[tokio::test]
async fn logout_ends_the_session() {
    let state = state().await;
    let token = login(&state).await;

    let (status, body) = call(&state, "POST", "/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["drop_success"], true);

    let (status, _) = call(&state, "GET", "/students", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_derives_roll_numbers_and_rejects_duplicates() {
    let state = state().await;
    let token = login(&state).await;
    let year = Utc::now().year();

    let (status, body) = call(
        &state,
        "POST",
        "/register",
        Some(&token),
        Some(student("Ali Khokhar", CNIC, "BSCS")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["roll_no"],
        rollno::generate(CNIC, "BSCS", year, RollFormat::Full)
    );

    let (status, body) = call(
        &state,
        "POST",
        "/students",
        Some(&token),
        Some(student("Sara Ahmed", CNIC, "BSCS")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    let (_, body) = call(&state, "GET", "/dashboard", Some(&token), None).await;
    assert_eq!(body["total_students"], 1);
    assert_eq!(body["forms_pending"], 1);
}

#[tokio::test]
async fn students_without_national_id_share_the_empty_roll_number() {
    let state = state().await;
    let token = login(&state).await;

    for name in ["First", "Second"] {
        let (status, body) = call(
            &state,
            "POST",
            "/students",
            Some(&token),
            Some(student(name, "", "BBA")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["roll_no"], "");
    }

    let (_, body) = call(&state, "GET", "/students?search=sec", Some(&token), None).await;
    let students = body["students"].as_array().unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["full_name"], "Second");
}

#[tokio::test]
async fn form_submission_moves_the_dashboard_counts() {
    let state = state().await;
    let token = login(&state).await;

    let (_, created) = call(
        &state,
        "POST",
        "/students",
        Some(&token),
        Some(student("Ali Khokhar", CNIC, "BSIT")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &state,
        "POST",
        &format!("/students/{}/form", id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["form_submitted_at"].is_string());

    let (_, body) = call(&state, "GET", "/forms", Some(&token), None).await;
    assert_eq!(body["submitted"], 1);
    assert_eq!(body["pending"], 0);

    let (_, body) = call(&state, "GET", "/panels/dashboard", Some(&token), None).await;
    assert_eq!(body["panel"], "dashboard");
    assert_eq!(body["forms_submitted"], 1);
}

#[tokio::test]
async fn second_attendance_save_edits_instead_of_duplicating() {
    let state = state().await;
    let token = login(&state).await;

    let (_, first) = call(
        &state,
        "POST",
        "/students",
        Some(&token),
        Some(student("Ali Khokhar", CNIC, "BSCS")),
    )
    .await;
    let (_, second) = call(
        &state,
        "POST",
        "/students",
        Some(&token),
        Some(student("Sara Ahmed", "", "BSSE")),
    )
    .await;
    let ali = first["id"].as_str().unwrap().to_string();
    let sara = second["id"].as_str().unwrap().to_string();

    let (_, sheet) = call(&state, "GET", "/attendance/2025-10-06", Some(&token), None).await;
    assert_eq!(sheet["mode"], "create");
    assert_eq!(sheet["rows"].as_array().unwrap().len(), 2);

    let (status, saved) = call(
        &state,
        "PUT",
        "/attendance/2025-10-06",
        Some(&token),
        Some(json!({ "statuses": { ali.clone(): "Present" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["saved_as"], "create");
    assert_eq!(saved["written"], 2);

    let (_, sheet) = call(&state, "GET", "/attendance/2025-10-06", Some(&token), None).await;
    assert_eq!(sheet["mode"], "edit");

    let (_, saved) = call(
        &state,
        "PUT",
        "/attendance/2025-10-06",
        Some(&token),
        Some(json!({ "statuses": { ali.clone(): "  Absent ", sara.clone(): "Late" } })),
    )
    .await;
    assert_eq!(saved["saved_as"], "edit");
    assert_eq!(saved["unmatched"], json!([]));

    let (_, report) = call(&state, "GET", "/attendance/report", Some(&token), None).await;
    let records = report["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    let status_of = |name: &str| {
        records
            .iter()
            .find(|r| r["full_name"] == name)
            .map(|r| r["status"].clone())
            .unwrap()
    };
    assert_eq!(status_of("Ali Khokhar"), "Absent");
    assert_eq!(status_of("Sara Ahmed"), "Late");
}

#[tokio::test]
async fn unknown_student_on_the_sheet_is_rejected() {
    let state = state().await;
    let token = login(&state).await;

    let stranger = uuid::Uuid::new_v4().to_string();
    let (status, body) = call(
        &state,
        "PUT",
        "/attendance/2025-10-06",
        Some(&token),
        Some(json!({ "statuses": { stranger: "Present" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidPayload");
}

#[tokio::test]
async fn csv_export_quotes_fields_with_commas() {
    let state = state().await;
    let token = login(&state).await;

    call(
        &state,
        "POST",
        "/students",
        Some(&token),
        Some(student("Khokhar, Ali", CNIC, "BSCS")),
    )
    .await;
    call(
        &state,
        "PUT",
        "/attendance/2025-10-06",
        Some(&token),
        Some(json!({ "statuses": {} })),
    )
    .await;

    let request = Request::builder()
        .uri("/attendance/report/export")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("attendance_report.csv"));

    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let csv = String::from_utf8(body.to_vec()).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Date,Roll No,Full Name,Program,Batch,Status");
    assert!(lines[1].starts_with("2025-10-06,"));
    assert!(lines[1].contains("\"Khokhar, Ali\""));
    assert!(lines[1].ends_with(",BSCS,2025,-"));
}

#[tokio::test]
async fn sessions_filter_by_status() {
    let state = state().await;
    let token = login(&state).await;

    for (name, status) in [("Fall Midterms", "Active"), ("Fall Finals", "Pending")] {
        let (code, _) = call(
            &state,
            "POST",
            "/sessions",
            Some(&token),
            Some(json!({
                "name": name,
                "end_date": "2025-12-01",
                "targeted_programs": ["BSCS", "BBA"],
                "status": status,
            })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
    }

    let (_, body) = call(&state, "GET", "/sessions?status=Active", Some(&token), None).await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["name"], "Fall Midterms");

    let (_, body) = call(&state, "GET", "/sessions?status=All", Some(&token), None).await;
    assert_eq!(body["sessions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_paths_fall_through_to_not_found() {
    let state = state().await;
    let (status, body) = call(&state, "GET", "/no/such/route", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let token = login(&state).await;
    let (status, _) = call(&state, "GET", "/panels/settings", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
