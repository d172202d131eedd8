//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STUDYFORGE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STUDYFORGE_BASE_URL` - Public URL, used for cookie security and verification links
//!
//! ## Optional
//! - `STUDYFORGE_HOST` - Bind address (default: 127.0.0.1)
//! - `STUDYFORGE_PORT` - Listen port (default: 3000)
//! - `REQUIRE_EMAIL_VERIFICATION` - Strict learner verification (default: true)
//! - `ACCOUNT_ACTIVATION_DAYS` - Verification link lifetime in days (default: 7)
//! - `SESSION_SWEEP_INTERVAL_SECS` - Expired admin session purge interval (default: 900)
//! - `LOGIN_RATE_LIMIT` - Per-IP rate limit on the login route (default: true)
//! - `LOG_FORMAT` - `json` or `text` (default: text)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! ## Optional (curriculum generation - all of URL and key, or neither)
//! - `CURRICULUM_API_URL` - Generative text endpoint
//! - `CURRICULUM_API_KEY` - API key for that endpoint
//! - `CURRICULUM_MODEL` - Model name (default: gemini-1.5-flash)
//! - `CURRICULUM_TIMEOUT_SECS` - Request timeout (default: 60)
//!
//! ## Optional (SMTP - verification mail is logged when unset)
//! - `SMTP_HOST`, `SMTP_PORT` (default 587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`
//!
//! ## Optional (TLS)
//! - `STUDYFORGE_TLS_CERT` - PEM-encoded certificate chain
//! - `STUDYFORGE_TLS_KEY` - PEM-encoded private key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;
const DEFAULT_CURRICULUM_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_ACTIVATION_DAYS: i64 = 7;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Learner/admin authentication policy
    pub auth: AuthSettings,
    /// How often expired admin sessions are purged
    pub session_sweep_interval: Duration,
    /// Whether the login route is rate limited per client IP
    pub login_rate_limit: bool,
    /// Generative curriculum service (optional)
    pub curriculum: Option<CurriculumServiceConfig>,
    /// SMTP settings (optional)
    pub email: Option<EmailConfig>,
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

/// Authentication policy shared by the login resolver and registration.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Public base URL (verification links, secure cookies)
    pub base_url: String,
    /// Strict mode: unverified learners cannot log in.
    pub require_email_verification: bool,
    /// How long a verification ticket stays valid after issue.
    pub activation_window: chrono::Duration,
}

impl AuthSettings {
    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_owned(),
            require_email_verification: true,
            activation_window: chrono::Duration::days(DEFAULT_ACTIVATION_DAYS),
        }
    }
}

/// Generative curriculum service configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct CurriculumServiceConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for CurriculumServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurriculumServiceConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CurriculumServiceConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let api_url = get_optional_env("CURRICULUM_API_URL");
        let api_key = get_optional_env("CURRICULUM_API_KEY");

        match (api_url, api_key) {
            (Some(api_url), Some(key)) => {
                url::Url::parse(&api_url).map_err(|e| {
                    ConfigError::InvalidEnvVar("CURRICULUM_API_URL".to_string(), e.to_string())
                })?;
                validate_secret_strength(&key, "CURRICULUM_API_KEY")?;
                let timeout_secs = parse_env_or_default("CURRICULUM_TIMEOUT_SECS", 60_u64)?;
                Ok(Some(Self {
                    api_url,
                    api_key: SecretString::from(key),
                    model: get_env_or_default("CURRICULUM_MODEL", DEFAULT_CURRICULUM_MODEL),
                    timeout: Duration::from_secs(timeout_secs),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "CURRICULUM_API_*".to_string(),
                "Both CURRICULUM_API_URL and CURRICULUM_API_KEY must be set together".to_string(),
            )),
        }
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl EmailConfig {
    /// SMTP is enabled by setting `SMTP_HOST`; the rest then become required.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env_or_default("SMTP_PORT", 587_u16)?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
            from_address: get_required_env("SMTP_FROM")?,
        }))
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cert_pem = get_optional_env("STUDYFORGE_TLS_CERT");
        let key_pem = get_optional_env("STUDYFORGE_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "STUDYFORGE_TLS_*".to_string(),
                "Both STUDYFORGE_TLS_CERT and STUDYFORGE_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STUDYFORGE_DATABASE_URL")?;
        let host = get_env_or_default("STUDYFORGE_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("STUDYFORGE_HOST".to_string(), e.to_string()))?;
        let port = parse_env_or_default("STUDYFORGE_PORT", 3000_u16)?;
        let base_url = get_required_env("STUDYFORGE_BASE_URL")?;
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STUDYFORGE_BASE_URL".to_string(), e.to_string())
        })?;

        let activation_days =
            parse_env_or_default("ACCOUNT_ACTIVATION_DAYS", DEFAULT_ACTIVATION_DAYS)?;
        if activation_days <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ACCOUNT_ACTIVATION_DAYS".to_string(),
                "must be a positive number of days".to_string(),
            ));
        }
        let auth = AuthSettings {
            base_url,
            require_email_verification: get_bool_env("REQUIRE_EMAIL_VERIFICATION", true)?,
            activation_window: chrono::Duration::days(activation_days),
        };

        let sweep_secs = parse_env_or_default("SESSION_SWEEP_INTERVAL_SECS", 900_u64)?;
        let log_format = match get_env_or_default("LOG_FORMAT", "text").as_str() {
            "json" => LogFormat::Json,
            "text" => LogFormat::Text,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "LOG_FORMAT".to_string(),
                    format!("expected `json` or `text`, got `{other}`"),
                ));
            }
        };

        Ok(Self {
            database_url,
            host,
            port,
            auth,
            session_sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            login_rate_limit: get_bool_env("LOGIN_RATE_LIMIT", true)?,
            curriculum: CurriculumServiceConfig::from_env()?,
            email: EmailConfig::from_env()?,
            log_format,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_optional_env("SENTRY_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            sentry_traces_sample_rate: get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.1),
            tls: TlsConfig::from_env()?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`).
fn get_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| parse_bool(&raw).ok_or_else(|| {
        ConfigError::InvalidEnvVar(key.to_string(), format!("expected a boolean, got `{raw}`"))
    }))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}
