//! # Client Tests
//!
//! Runs the client against a one-shot HTTP server on a loopback port. The
//! server answers a single request with a canned response and hands the raw
//! request text back to the test for inspection.

use crate::client::{ClientError, PotbotClient, User};
use crate::session::{Session, SessionCache};
use crate::view::{PlantLogView, TimeWindow, ViewError};
use chrono::{TimeZone, Utc};
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Read one HTTP/1.1 request, headers and body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= header_end + 4 + content_length {
                return text;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

/// Serve exactly one request; returns the base URL and a handle yielding the request.
async fn serve_once(status: &str, extra_headers: &[&str], body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for header in extra_headers {
        response.push_str(header);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    response.push_str(body);

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });

    (format!("http://{addr}"), handle)
}

fn client(base_url: &str) -> PotbotClient {
    PotbotClient::new(base_url, Duration::from_secs(5)).unwrap()
}

fn request_body(request: &str) -> serde_json::Value {
    let (_, body) = request.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 6, 8, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

const LOGS_BODY: &str = r#"{
    "light": [
        {"val": 300, "time": "2025-06-02T12:00:00Z"},
        {"val": 120, "time": "2025-06-02T06:00:00Z"}
    ],
    "moisture": [],
    "temp": [{"val": 21.5, "time": "2025-06-02T06:00:00Z"}]
}"#;

/// Login stores the session cookie and replays nothing before it has one.
#[tokio::test]
async fn login_captures_session_cookie() {
    let (url, server) = serve_once(
        "200 OK",
        &["Set-Cookie: potbot_session=xyz789; Path=/; HttpOnly; Max-Age=86400"],
        r#"{"user_id": 7, "email": "fern@example.org", "username": "fern"}"#,
    )
    .await;

    let mut client = client(&url);
    let user = client.login("fern", "hunter2").await.unwrap();
    let request = server.await.unwrap();

    assert_eq!(user.user_id, 7);
    assert_eq!(client.session_cookie(), Some("potbot_session=xyz789"));
    assert!(request.starts_with("POST /api/login "));
    assert!(!request.to_ascii_lowercase().contains("\r\ncookie:"));
    assert_eq!(
        request_body(&request),
        serde_json::json!({ "username": "fern", "password": "hunter2" })
    );
}

/// The log query carries the cookie and the window in the backend's field names.
#[tokio::test]
async fn plant_logs_sends_window_and_session() {
    let (url, server) = serve_once("200 OK", &[], LOGS_BODY).await;

    let client = client(&url).with_session(Some("potbot_session=abc123".into()));
    let logs = client.plant_logs("plant_00042", &window()).await.unwrap();
    let request = server.await.unwrap();

    assert!(request.starts_with("POST /api/get_plant_logs "));
    assert!(request.contains("potbot_session=abc123"));
    assert_eq!(
        request_body(&request),
        serde_json::json!({
            "plantID": "plant_00042",
            "startDate": "2025-06-01T00:00:00Z",
            "endDate": "2025-06-08T00:00:00Z"
        })
    );
    assert_eq!(logs.light.as_ref().map(Vec::len), Some(2));
    assert_eq!(logs.temp.as_ref().map(Vec::len), Some(1));
}

/// A rejected session surfaces as `Unauthorized` with the server's message.
#[tokio::test]
async fn unauthorized_is_reported() {
    let (url, server) = serve_once("401 Unauthorized", &[], "unauthenticated\n").await;

    let err = client(&url).me().await.unwrap_err();
    server.await.unwrap();

    match err {
        ClientError::Unauthorized(message) => assert_eq!(message, "unauthenticated"),
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

/// Other failures keep their status code.
#[tokio::test]
async fn server_errors_keep_status() {
    let (url, server) = serve_once("403 Forbidden", &[], "you do not own this plant").await;

    let err = client(&url)
        .plant_logs("plant_00042", &window())
        .await
        .unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, ClientError::Status { status: 403, .. }));
    assert_eq!(err.to_string(), "server returned 403: you do not own this plant");
}

/// An account with no plants comes back as JSON `null`.
#[tokio::test]
async fn plants_null_is_empty() {
    let (url, server) = serve_once("200 OK", &[], "null").await;

    let plants = client(&url).plants().await.unwrap();
    let request = server.await.unwrap();

    assert!(request.starts_with("GET /api/get_all_my_plants "));
    assert!(plants.is_empty());
}

/// Full path from the view: fetch, align, expose the table.
#[tokio::test]
async fn view_refresh_aligns_fetched_logs() {
    let (url, server) = serve_once("200 OK", &[], LOGS_BODY).await;

    let client = client(&url);
    let mut view = PlantLogView::new("plant_00042", window());
    let table = view.refresh(&client).await.unwrap();

    let rows: Vec<_> = table
        .rows()
        .iter()
        .map(|r| (r.time.format("%H:%M").to_string(), r.light, r.temp))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("06:00".to_string(), Some(120.0), Some(21.5)),
            ("12:00".to_string(), Some(300.0), None),
        ]
    );
    server.await.unwrap();
}

/// Client-side validation short-circuits before any request.
#[tokio::test]
async fn view_refresh_without_plant_id() {
    let client = client("http://127.0.0.1:9");
    let mut view = PlantLogView::new("", window());
    assert_eq!(view.refresh(&client).await.unwrap_err(), ViewError::MissingPlant);
}

fn fern_session() -> Session {
    Session {
        user: User {
            user_id: 7,
            email: "fern@example.org".into(),
            username: "fern".into(),
        },
        cookie: "potbot_session=abc123".into(),
    }
}

/// A successful login ends up in the cache with the cookie the backend set.
#[tokio::test]
async fn login_session_is_cached() {
    let (url, server) = serve_once(
        "200 OK",
        &["Set-Cookie: potbot_session=xyz789; Path=/; HttpOnly; Max-Age=86400"],
        r#"{"user_id": 7, "email": "fern@example.org", "username": "fern"}"#,
    )
    .await;
    let dir = tempdir().unwrap();
    let cache = SessionCache::new(dir.path().join("session.json"), Duration::from_secs(60));

    let mut client = client(&url);
    let user = client.login("fern", "hunter2").await.unwrap();
    server.await.unwrap();
    let stored = cache.remember(&client, &user).unwrap();

    assert_eq!(stored.cookie, "potbot_session=xyz789");
    assert_eq!(cache.load().unwrap(), stored);

    // The next run picks the cookie back up
    let restored = PotbotClient::new(&url, Duration::from_secs(5))
        .unwrap()
        .with_session(cache.current().map(|s| s.cookie));
    assert_eq!(restored.session_cookie(), Some("potbot_session=xyz789"));
}

/// A session the backend no longer accepts is dropped from the cache.
#[tokio::test]
async fn rejected_session_clears_cache() {
    let (url, server) = serve_once("401 Unauthorized", &[], "unauthenticated").await;
    let dir = tempdir().unwrap();
    let cache = SessionCache::new(dir.path().join("session.json"), Duration::from_secs(60));
    cache.store(&fern_session()).unwrap();

    let client = client(&url).with_session(cache.current().map(|s| s.cookie));
    let err = cache.check(client.me().await).unwrap_err();
    let request = server.await.unwrap();

    assert!(request.contains("potbot_session=abc123"));
    assert!(matches!(err, ClientError::Unauthorized(_)));
    assert_eq!(cache.current(), None);
}

/// A backend failure that says nothing about the session keeps the cache.
#[tokio::test]
async fn server_error_keeps_cache() {
    let (url, server) = serve_once("500 Internal Server Error", &[], "database down").await;
    let dir = tempdir().unwrap();
    let cache = SessionCache::new(dir.path().join("session.json"), Duration::from_secs(60));
    cache.store(&fern_session()).unwrap();

    let client = client(&url).with_session(cache.current().map(|s| s.cookie));
    let err = cache.check(client.me().await).unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, ClientError::Status { status: 500, .. }));
    assert_eq!(cache.current(), Some(fern_session()));
}
