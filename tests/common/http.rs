use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use ftprelay::common::AppConfig;
use ftprelay::remote::RemoteConnector;
use ftprelay::server::{create_router, AppState};
use http_body_util::BodyExt;

pub const TOKEN: &str = "test-token";

pub fn test_config(staging_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.api_token = TOKEN.to_string();
    config.remote.host = "ftp.invalid".to_string();
    config.staging.dir = Some(staging_dir.to_path_buf());
    config
}

//===========
// App Factory
//===========
pub fn create_test_app(remote: Arc<dyn RemoteConnector>, staging_dir: &Path) -> (Router, AppState) {
    create_test_app_with_config(test_config(staging_dir), remote)
}

pub fn create_test_app_with_config(
    config: AppConfig,
    remote: Arc<dyn RemoteConnector>,
) -> (Router, AppState) {
    let state = AppState::with_connector(config, remote).expect("build app state");
    let app = create_router(state.clone());
    (app, state)
}

//=================
// Request Builders
//=================
pub fn build_request(method: Method, uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth_header) = auth {
        builder = builder.header("Authorization", auth_header);
    }
    builder.body(Body::empty()).expect("Failed to build request")
}

pub fn authed_get(uri: &str) -> Request<Body> {
    build_request(Method::GET, uri, Some(&format!("Bearer {TOKEN}")))
}

pub fn build_json_request(uri: &str, json: serde_json::Value, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(
            serde_json::to_vec(&json).expect("Failed to serialize JSON"),
        ))
        .expect("Failed to build request")
}

pub struct MultipartFile<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

pub fn build_multipart_request(
    uri: &str,
    fields: &[(&str, &str)],
    file: Option<MultipartFile<'_>>,
    token: &str,
) -> Request<Body> {
    let boundary = "----ftprelayBoundary7MA4YWxkTrZu0gW";
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    if let Some(file) = file {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file.file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
        body.extend_from_slice(file.data);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(body))
        .expect("Failed to build request")
}

//================
// Response Helpers
//================
pub async fn extract_json(response: axum::response::Response) -> serde_json::Value {
    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect body")
        .to_bytes();
    serde_json::from_slice(&body_bytes).expect("Failed to parse JSON")
}

pub async fn extract_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect body")
        .to_bytes()
        .to_vec()
}

pub async fn assert_error_response(
    response: axum::response::Response,
    expected_status: StatusCode,
    expected_type: &str,
) -> serde_json::Value {
    assert_eq!(response.status(), expected_status);
    let json = extract_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["type"], expected_type, "body: {json}");
    json
}

/// Number of files currently in the staging directory.
pub fn staging_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
