//! MEGA adapter. There is no stable Rust SDK for MEGA, so the adapter
//! carries its own minimal web-API client (see `client`).

mod client;
mod crypto;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::OnceCell;

use self::client::MegaSession;
use super::{ProviderError, StorageProvider};

/// Per-request HTTP timeout for API commands and chunk posts. The
/// orchestrator bounds the whole upload separately.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

pub struct MegaProvider {
    email: String,
    password: String,
    http: Client,
    session: OnceCell<MegaSession>,
}

impl MegaProvider {
    pub fn new(email: String, password: String) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("paimon-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            email,
            password,
            http,
            session: OnceCell::new(),
        })
    }

    /// The login handshake runs once per process, even under concurrent
    /// first use; a failed attempt leaves the cell empty so the next
    /// request retries.
    async fn session(&self) -> Result<&MegaSession, ProviderError> {
        self.session
            .get_or_try_init(|| async {
                if self.email.is_empty() || self.password.is_empty() {
                    return Err(ProviderError::Credentials);
                }
                MegaSession::login(self.http.clone(), &self.email, &self.password).await
            })
            .await
    }
}

#[async_trait]
impl StorageProvider for MegaProvider {
    fn id(&self) -> &'static str {
        "mega"
    }

    fn display_name(&self) -> &'static str {
        "MEGA"
    }

    async fn upload(&self, path: &Path, filename: &str) -> Result<String, ProviderError> {
        let session = self.session().await?;
        session.upload_file(path, filename).await
    }
}
