use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub gateway: GatewayConfig,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let gateway = GatewayConfig {
            store_id: optional_var("GATEWAY_STORE_ID"),
            store_password: optional_var("GATEWAY_STORE_PASSWORD"),
            base_url: optional_var("GATEWAY_BASE_URL").map(trim_trailing_slash),
            callback_base_url: optional_var("GATEWAY_CALLBACK_BASE_URL").map(trim_trailing_slash),
            currency: optional_var("GATEWAY_CURRENCY")
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
                .to_ascii_uppercase(),
            init_timeout: timeout_var("GATEWAY_INIT_TIMEOUT_SECS", DEFAULT_INIT_TIMEOUT_SECS)?,
            validate_timeout: timeout_var(
                "GATEWAY_VALIDATE_TIMEOUT_SECS",
                DEFAULT_VALIDATE_TIMEOUT_SECS,
            )?,
        };

        let notifications = NotificationConfig {
            admin_email: optional_var("NOTIFY_ADMIN_EMAIL"),
            from_name: optional_var("NOTIFY_FROM_NAME")
                .unwrap_or_else(|| DEFAULT_FROM_NAME.to_string()),
            smtp: SmtpConfig::from_env()?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            gateway,
            notifications,
        })
    }
}

const DEFAULT_CURRENCY: &str = "BDT";
const DEFAULT_INIT_TIMEOUT_SECS: u64 = 25;
const DEFAULT_VALIDATE_TIMEOUT_SECS: u64 = 20;
const DEFAULT_FROM_NAME: &str = "Real Estate System";
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 15;

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn trim_trailing_slash(value: String) -> String {
    value.trim_end_matches('/').to_string()
}

fn timeout_var(key: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    match optional_var(key) {
        None => Ok(Duration::from_secs(default_secs)),
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidTimeout { key }),
        },
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Payment gateway merchant settings.
///
/// Credentials stay optional at load time so the manual workflow keeps working without a
/// merchant account; the gateway client checks them before every outbound call.
#[derive(Clone)]
pub struct GatewayConfig {
    pub store_id: Option<String>,
    pub store_password: Option<String>,
    pub base_url: Option<String>,
    pub callback_base_url: Option<String>,
    pub currency: String,
    pub init_timeout: Duration,
    pub validate_timeout: Duration,
}

impl GatewayConfig {
    pub fn credentials(&self) -> Result<GatewayCredentials<'_>, MissingGatewaySetting> {
        Ok(GatewayCredentials {
            store_id: required(&self.store_id, "GATEWAY_STORE_ID")?,
            store_password: required(&self.store_password, "GATEWAY_STORE_PASSWORD")?,
            base_url: required(&self.base_url, "GATEWAY_BASE_URL")?,
            callback_base_url: required(&self.callback_base_url, "GATEWAY_CALLBACK_BASE_URL")?,
        })
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            store_id: None,
            store_password: None,
            base_url: None,
            callback_base_url: None,
            currency: DEFAULT_CURRENCY.to_string(),
            init_timeout: Duration::from_secs(DEFAULT_INIT_TIMEOUT_SECS),
            validate_timeout: Duration::from_secs(DEFAULT_VALIDATE_TIMEOUT_SECS),
        }
    }
}

// Hand-written so the store password never reaches a log line.
impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("store_id", &self.store_id)
            .field(
                "store_password",
                &self.store_password.as_ref().map(|_| "<redacted>"),
            )
            .field("base_url", &self.base_url)
            .field("callback_base_url", &self.callback_base_url)
            .field("currency", &self.currency)
            .field("init_timeout", &self.init_timeout)
            .field("validate_timeout", &self.validate_timeout)
            .finish()
    }
}

fn required<'a>(
    value: &'a Option<String>,
    key: &'static str,
) -> Result<&'a str, MissingGatewaySetting> {
    value
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .ok_or(MissingGatewaySetting { key })
}

/// Borrowed view of a fully configured merchant account.
#[derive(Clone, Copy)]
pub struct GatewayCredentials<'a> {
    pub store_id: &'a str,
    pub store_password: &'a str,
    pub base_url: &'a str,
    pub callback_base_url: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingGatewaySetting {
    pub key: &'static str,
}

impl fmt::Display for MissingGatewaySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is not set", self.key)
    }
}

impl std::error::Error for MissingGatewaySetting {}

/// Outbound e-mail addressing. Without `smtp` the service only logs its notifications.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub admin_email: Option<String>,
    pub from_name: String,
    pub smtp: Option<SmtpConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            admin_email: None,
            from_name: DEFAULT_FROM_NAME.to_string(),
            smtp: None,
        }
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    /// Plain connect upgraded with STARTTLS (port 587).
    StartTls,
    /// TLS from the first byte (port 465).
    Implicit,
    /// No encryption; local relays only.
    None,
}

impl SmtpTls {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "starttls" => Some(Self::StartTls),
            "tls" | "ssl" | "implicit" => Some(Self::Implicit),
            "none" | "plain" => Some(Self::None),
            _ => None,
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Self::StartTls => 587,
            Self::Implicit => 465,
            Self::None => 25,
        }
    }
}

/// Mail relay settings, present only when `SMTP_HOST` is set.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub tls: SmtpTls,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    pub timeout: Duration,
}

impl SmtpConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(host) = optional_var("SMTP_HOST") else {
            return Ok(None);
        };

        let tls = match optional_var("SMTP_TLS_MODE") {
            None => SmtpTls::StartTls,
            Some(raw) => SmtpTls::parse(&raw).ok_or(ConfigError::InvalidSmtpTlsMode { value: raw })?,
        };
        let port = match optional_var("SMTP_PORT") {
            None => tls.default_port(),
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidSmtpPort)?,
        };
        let from_email = optional_var("SMTP_FROM_EMAIL").ok_or(ConfigError::MissingSetting {
            key: "SMTP_FROM_EMAIL",
        })?;

        Ok(Some(Self {
            host,
            port,
            tls,
            username: optional_var("SMTP_USERNAME"),
            password: optional_var("SMTP_PASSWORD"),
            from_email,
            timeout: timeout_var("SMTP_TIMEOUT_SECS", DEFAULT_SMTP_TIMEOUT_SECS)?,
        }))
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from_email", &self.from_email)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeout { key: &'static str },
    InvalidSmtpPort,
    InvalidSmtpTlsMode { value: String },
    MissingSetting { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeout { key } => {
                write!(f, "{key} must be a positive number of seconds")
            }
            ConfigError::InvalidSmtpPort => write!(f, "SMTP_PORT must be a valid u16"),
            ConfigError::InvalidSmtpTlsMode { value } => {
                write!(f, "SMTP_TLS_MODE '{value}' must be starttls, tls or none")
            }
            ConfigError::MissingSetting { key } => write!(f, "{key} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "GATEWAY_STORE_ID",
            "GATEWAY_STORE_PASSWORD",
            "GATEWAY_BASE_URL",
            "GATEWAY_CALLBACK_BASE_URL",
            "GATEWAY_CURRENCY",
            "GATEWAY_INIT_TIMEOUT_SECS",
            "GATEWAY_VALIDATE_TIMEOUT_SECS",
            "NOTIFY_ADMIN_EMAIL",
            "NOTIFY_FROM_NAME",
            "SMTP_HOST",
            "SMTP_PORT",
            "SMTP_TLS_MODE",
            "SMTP_USERNAME",
            "SMTP_PASSWORD",
            "SMTP_FROM_EMAIL",
            "SMTP_TIMEOUT_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.gateway.currency, "BDT");
        assert_eq!(config.gateway.init_timeout, Duration::from_secs(25));
        assert_eq!(config.gateway.validate_timeout, Duration::from_secs(20));
        assert!(config.notifications.admin_email.is_none());
        assert!(config.notifications.smtp.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn gateway_urls_are_normalized_and_credentials_resolve() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("GATEWAY_STORE_ID", "teststore");
        env::set_var("GATEWAY_STORE_PASSWORD", "secret@ssl");
        env::set_var("GATEWAY_BASE_URL", "https://sandbox.example.com/");
        env::set_var("GATEWAY_CALLBACK_BASE_URL", "https://estate.example.com//");
        env::set_var("GATEWAY_CURRENCY", "bdt");

        let config = AppConfig::load().expect("config loads");
        let credentials = config.gateway.credentials().expect("fully configured");
        assert_eq!(credentials.base_url, "https://sandbox.example.com");
        assert_eq!(credentials.callback_base_url, "https://estate.example.com");
        assert_eq!(config.gateway.currency, "BDT");
        assert!(!format!("{:?}", config.gateway).contains("secret@ssl"));
        reset_env();
    }

    #[test]
    fn missing_credentials_name_the_first_absent_key() {
        let config = GatewayConfig {
            store_id: Some("store".to_string()),
            ..GatewayConfig::default()
        };
        let missing = config.credentials().err().expect("incomplete config");
        assert_eq!(missing.key, "GATEWAY_STORE_PASSWORD");
    }

    #[test]
    fn rejects_non_numeric_timeouts() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("GATEWAY_INIT_TIMEOUT_SECS", "soon");
        let err = AppConfig::load().expect_err("invalid timeout");
        assert!(matches!(
            err,
            ConfigError::InvalidTimeout {
                key: "GATEWAY_INIT_TIMEOUT_SECS"
            }
        ));
        reset_env();
    }

    #[test]
    fn smtp_relay_loads_with_mode_specific_port() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SMTP_HOST", "smtp.example.com");
        env::set_var("SMTP_TLS_MODE", "ssl");
        env::set_var("SMTP_USERNAME", "mailer");
        env::set_var("SMTP_PASSWORD", "app-password");
        env::set_var("SMTP_FROM_EMAIL", "noreply@example.com");

        let config = AppConfig::load().expect("config loads");
        let smtp = config.notifications.smtp.expect("smtp configured");
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.tls, SmtpTls::Implicit);
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.timeout, Duration::from_secs(15));
        assert!(!format!("{smtp:?}").contains("app-password"));
        reset_env();
    }

    #[test]
    fn smtp_relay_requires_a_sender_and_a_known_mode() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SMTP_HOST", "smtp.example.com");
        let err = AppConfig::load().expect_err("sender missing");
        assert!(matches!(
            err,
            ConfigError::MissingSetting {
                key: "SMTP_FROM_EMAIL"
            }
        ));

        env::set_var("SMTP_FROM_EMAIL", "noreply@example.com");
        env::set_var("SMTP_TLS_MODE", "opportunistic");
        let err = AppConfig::load().expect_err("unknown mode");
        assert!(matches!(err, ConfigError::InvalidSmtpTlsMode { .. }));

        env::set_var("SMTP_TLS_MODE", "starttls");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.notifications.smtp.map(|smtp| smtp.port), Some(587));
        reset_env();
    }
}
