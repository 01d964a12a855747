#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use paimon_relay::AppState;
use paimon_relay::config::Settings;
use paimon_relay::providers::{ProviderError, ProviderKind, ProviderRegistry, StorageProvider};

pub const TEST_TOKEN: &str = "good-token";
pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Always succeeds; the link embeds the filename so tests can check
/// result attribution. Asserts the staged file exists at call time.
pub struct StubProvider;

#[async_trait]
impl StorageProvider for StubProvider {
    fn id(&self) -> &'static str {
        "mega"
    }

    fn display_name(&self) -> &'static str {
        "MEGA"
    }

    async fn upload(&self, path: &Path, filename: &str) -> Result<String, ProviderError> {
        assert!(path.exists(), "staged file must exist during upload");
        Ok(format!("https://mega.nz/#!stub!{filename}"))
    }
}

/// Fault injection: always fails with internal detail that must never
/// reach the client.
pub struct FailingProvider;

#[async_trait]
impl StorageProvider for FailingProvider {
    fn id(&self) -> &'static str {
        "mega"
    }

    fn display_name(&self) -> &'static str {
        "MEGA"
    }

    async fn upload(&self, _path: &Path, _filename: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Protocol(
            "simulated outage: sid handshake refused".to_string(),
        ))
    }
}

/// Never completes within the configured provider timeout.
pub struct StallingProvider;

#[async_trait]
impl StorageProvider for StallingProvider {
    fn id(&self) -> &'static str {
        "mega"
    }

    fn display_name(&self) -> &'static str {
        "MEGA"
    }

    async fn upload(&self, _path: &Path, _filename: &str) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("https://mega.nz/#!never!".to_string())
    }
}

pub fn test_state(temp_dir: &Path, provider: Arc<dyn StorageProvider>) -> AppState {
    let settings = Settings {
        auth_token: TEST_TOKEN.to_string(),
        temp_upload_dir: temp_dir.to_path_buf(),
        provider_timeout_secs: 1,
        ..Settings::default()
    };

    let mut registry = ProviderRegistry::new();
    registry.register(ProviderKind::Mega, provider);

    AppState {
        settings: Arc::new(settings),
        providers: Arc::new(registry),
    }
}

pub fn multipart_body(filename: &str, content: &str) -> String {
    format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
        Content-Type: text/plain\r\n\r\n\
        {content}\r\n\
        --{BOUNDARY}--\r\n"
    )
}

pub fn upload_request(uri: &str, token: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header("X-Auth-Token", token);
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn temp_dir_entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}
