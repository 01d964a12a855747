use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod mega;

/// Error surfaced by a provider adapter. Raw detail (reqwest errors,
/// protocol payloads) never crosses into client responses; callers use
/// [`ProviderError::public_message`] for that.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider credentials are not configured")]
    Credentials,

    #[error("provider API returned error code {0}")]
    Api(i64),

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("staged file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("provider call timed out")]
    Timeout,

    #[error("provider response was malformed: {0}")]
    Protocol(String),
}

impl ProviderError {
    /// Sanitized, client-facing description.
    pub fn public_message(&self) -> String {
        match self {
            ProviderError::Credentials => {
                "Storage provider credentials are not configured".to_string()
            }
            ProviderError::Api(code) => {
                format!("Storage provider rejected the request (code {code})")
            }
            ProviderError::Http(_) => "Storage provider request failed".to_string(),
            ProviderError::Io(_) => "Could not read the staged file".to_string(),
            ProviderError::Timeout => "Storage provider did not respond in time".to_string(),
            ProviderError::Protocol(_) => {
                "Storage provider returned an unexpected response".to_string()
            }
        }
    }
}

/// The closed set of recognized service names. Only `Mega` has an
/// implementation; the others are reserved names that must be rejected
/// explicitly instead of falling back to another provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Mega,
    Dropbox,
    GoogleDrive,
}

impl ProviderKind {
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Mega => "mega",
            ProviderKind::Dropbox => "dropbox",
            ProviderKind::GoogleDrive => "google_drive",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecognized service name; carries the offending input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mega" => Ok(ProviderKind::Mega),
            "dropbox" => Ok(ProviderKind::Dropbox),
            "google_drive" => Ok(ProviderKind::GoogleDrive),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

/// Uniform upload capability over a cloud-storage backend.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Provider identifier (e.g., "mega")
    fn id(&self) -> &'static str;

    /// Human-readable name (e.g., "MEGA")
    fn display_name(&self) -> &'static str;

    /// Uploads the staged file and returns a shareable link.
    async fn upload(&self, path: &Path, filename: &str) -> Result<String, ProviderError>;
}

/// Registered provider implementations, built once at startup and shared
/// read-only across requests.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn StorageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ProviderKind, provider: Arc<dyn StorageProvider>) {
        self.providers.insert(kind, provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn StorageProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// Names of providers with a live implementation, sorted.
    pub fn supported(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.providers.keys().map(|k| k.name()).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyProvider;

    #[async_trait]
    impl StorageProvider for DummyProvider {
        fn id(&self) -> &'static str {
            "mega"
        }

        fn display_name(&self) -> &'static str {
            "MEGA"
        }

        async fn upload(&self, _path: &Path, filename: &str) -> Result<String, ProviderError> {
            Ok(format!("https://example.invalid/{filename}"))
        }
    }

    #[test]
    fn test_kind_parsing_is_case_insensitive() {
        assert_eq!("mega".parse::<ProviderKind>().unwrap(), ProviderKind::Mega);
        assert_eq!("MEGA".parse::<ProviderKind>().unwrap(), ProviderKind::Mega);
        assert_eq!(
            "Dropbox".parse::<ProviderKind>().unwrap(),
            ProviderKind::Dropbox
        );
        assert_eq!(
            "box".parse::<ProviderKind>().unwrap_err(),
            UnknownProvider("box".to_string())
        );
    }

    #[test]
    fn test_registry_lists_only_registered_providers() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.supported().is_empty());

        registry.register(ProviderKind::Mega, Arc::new(DummyProvider));
        assert_eq!(registry.supported(), vec!["mega"]);

        assert!(registry.get(ProviderKind::Mega).is_some());
        assert!(registry.get(ProviderKind::Dropbox).is_none());
    }

    #[test]
    fn test_public_messages_do_not_leak_detail() {
        let err = ProviderError::Protocol("sid handshake failed at step 3".to_string());
        assert!(!err.public_message().contains("sid"));
        assert!(
            ProviderError::Api(-9)
                .public_message()
                .contains("(code -9)")
        );
    }
}
