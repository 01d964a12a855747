use std::env;
use std::path::PathBuf;

/// Runtime settings, loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Shared secret expected in the `X-Auth-Token` header.
    pub auth_token: String,

    /// Bind address host part (default: "0.0.0.0")
    pub host: String,

    /// Bind address port (default: 8080)
    pub port: u16,

    /// MEGA account email. Without credentials the mega provider stays
    /// unregistered and upload requests are rejected.
    pub mega_email: Option<String>,

    /// MEGA account password.
    pub mega_password: Option<String>,

    /// Directory for staged uploads, created at startup if missing.
    pub temp_upload_dir: PathBuf,

    /// Log verbosity when RUST_LOG is not set (default: "info")
    pub log_level: String,

    /// Maximum accepted request body size in bytes (default: 256 MB)
    pub max_file_size: usize,

    /// Upper bound for one outbound provider call, in seconds (default: 300)
    pub provider_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auth_token: "default-secret-token".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            mega_email: None,
            mega_password: None,
            temp_upload_dir: PathBuf::from("temp_uploads"),
            log_level: "info".to_string(),
            max_file_size: 256 * 1024 * 1024, // 256 MB
            provider_timeout_secs: 300,
        }
    }
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            auth_token: env::var("AUTH_TOKEN").unwrap_or(default.auth_token),

            host: env::var("HOST").unwrap_or(default.host),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            mega_email: env::var("MEGA_EMAIL").ok().filter(|v| !v.is_empty()),

            mega_password: env::var("MEGA_PASSWORD").ok().filter(|v| !v.is_empty()),

            temp_upload_dir: env::var("TEMP_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.temp_upload_dir),

            log_level: env::var("LOG_LEVEL")
                .map(|v| v.to_lowercase())
                .unwrap_or(default.log_level),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            provider_timeout_secs: env::var("PROVIDER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.provider_timeout_secs),
        }
    }

    /// True when both MEGA credentials are present.
    pub fn has_mega_credentials(&self) -> bool {
        self.mega_email.is_some() && self.mega_password.is_some()
    }
}
