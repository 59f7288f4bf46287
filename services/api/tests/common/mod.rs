#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use api_lib::config::Config;
use api_lib::web::{build_router, AppState};
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;
use warga_core::memory::MemoryBackend;

pub const PASSWORD: &str = "rahasia123";

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://unused".to_string(),
        log_level: tracing::Level::INFO,
        storage_root: PathBuf::from("./target/test-storage"),
        public_base_url: "http://localhost:3000".to_string(),
        site_origin: "http://localhost:5173".to_string(),
        allowed_origin: "http://localhost:5173".to_string(),
        session_ttl_days: 30,
        profile_write_attempts: 3,
        max_upload_bytes: 1024 * 1024,
    }
}

pub struct TestApp {
    pub backend: MemoryBackend,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let backend = MemoryBackend::new();
        let state = Arc::new(AppState::new(
            backend.db.clone(),
            backend.identity.clone(),
            backend.storage.clone(),
            Arc::new(test_config()),
        ));
        let router = build_router(state).unwrap();
        Self { backend, router }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Logs in through the API and returns the session cookie pair.
    pub async fn login(&self, email: &str) -> String {
        let response = self
            .send(json_request("POST", "/auth/login", None, serde_json::json!({
                "email": email,
                "password": PASSWORD,
            })))
            .await;
        assert_eq!(response.status(), 200, "login for {email}");
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }
}

pub fn request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// A `multipart/form-data` request with text fields and `(field, file name, bytes)` files.
pub fn multipart_request(
    uri: &str,
    cookie: Option<&str>,
    fields: &[(&str, &str)],
    files: &[(&str, &str, &[u8])],
) -> Request<Body> {
    const BOUNDARY: &str = "warga-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, file_name, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
