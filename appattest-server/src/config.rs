//! Server configuration module
//!
//! Loads boundary settings from environment variables with sensible defaults
//! and installs the configured correlation id generator.

use std::net::SocketAddr;
use std::str::FromStr;

use appattest_core::requestid::{
    GeneratorSlot, SonyflakeGenerator, SonyflakeSettings, UuidV4Generator, UuidV6Generator,
};
use appattest_core::BoxError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Body limit applied when none is configured (10 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 10 << 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown request id generator: {0}")]
    UnknownGenerator(String),

    #[error("invalid {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("failed to build request id generator: {0}")]
    Generator(#[source] BoxError),
}

/// Which generator mints correlation ids for requests without `x-request-id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestIdGeneratorKind {
    /// Random UUIDv4
    #[default]
    Uuid,
    /// Time-ordered UUIDv6
    UuidV6,
    /// Sonyflake 64-bit id in decimal
    Sonyflake,
}

impl FromStr for RequestIdGeneratorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uuid" | "uuid-v4" => Ok(Self::Uuid),
            "uuid-v6" => Ok(Self::UuidV6),
            "sonyflake" => Ok(Self::Sonyflake),
            other => Err(ConfigError::UnknownGenerator(other.to_string())),
        }
    }
}

/// Settings for the assertion middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssertionConfig {
    /// Redirect target when the device has not been attested
    pub attestation_url: String,
    /// Redirect target when a new challenge is needed. Empty falls back to the
    /// `Referer` header, then `/`.
    pub new_challenge_url: String,
    /// Maximum buffered body size in bytes. `0` means [`DEFAULT_BODY_LIMIT`].
    pub body_limit: usize,
}

impl AssertionConfig {
    /// The effective body limit.
    pub fn body_limit(&self) -> usize {
        if self.body_limit == 0 {
            DEFAULT_BODY_LIMIT
        } else {
            self.body_limit
        }
    }
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Listener port for the adopter's server (default: 3000)
    pub port: u16,
    /// Listener host for the adopter's server (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all)
    pub allowed_origins: Option<Vec<String>>,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// Maximum attestation body in bytes (default: 10 MiB)
    pub attestation_body_limit: usize,
    pub assertion: AssertionConfig,
    pub request_id_generator: RequestIdGeneratorKind,
    /// Sonyflake machine id; when unset the crate derives one from the host
    pub sonyflake_machine_id: Option<u16>,
    /// Sonyflake epoch (default: the crate's built-in epoch)
    pub sonyflake_start_time: Option<DateTime<Utc>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            attestation_body_limit: DEFAULT_BODY_LIMIT,
            assertion: AssertionConfig::default(),
            request_id_generator: RequestIdGeneratorKind::default(),
            sonyflake_machine_id: None,
            sonyflake_start_time: None,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or(defaults.host);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Enabled unless explicitly turned off
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let assertion = AssertionConfig {
            attestation_url: std::env::var("ATTESTATION_URL").unwrap_or_default(),
            new_challenge_url: std::env::var("NEW_CHALLENGE_URL").unwrap_or_default(),
            body_limit: env_parse("ASSERTION_BODY_LIMIT").unwrap_or(0),
        };

        let request_id_generator = match std::env::var("REQUEST_ID_GENERATOR") {
            Ok(v) if !v.trim().is_empty() => v.parse()?,
            _ => RequestIdGeneratorKind::default(),
        };

        let sonyflake_machine_id = match std::env::var("SONYFLAKE_MACHINE_ID") {
            Ok(v) => Some(v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: "SONYFLAKE_MACHINE_ID",
                value: v,
            })?),
            Err(_) => None,
        };

        let sonyflake_start_time = match std::env::var("SONYFLAKE_START_TIME") {
            Ok(v) => Some(
                DateTime::parse_from_rfc3339(v.trim())
                    .map_err(|_| ConfigError::InvalidValue {
                        name: "SONYFLAKE_START_TIME",
                        value: v,
                    })?
                    .with_timezone(&Utc),
            ),
            Err(_) => None,
        };

        Ok(Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            host,
            allowed_origins,
            timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            rate_limit_enabled,
            rate_limit_per_sec: env_parse("RATE_LIMIT_PER_SEC").unwrap_or(defaults.rate_limit_per_sec),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            attestation_body_limit: env_parse("ATTESTATION_BODY_LIMIT")
                .filter(|limit| *limit > 0)
                .unwrap_or(DEFAULT_BODY_LIMIT),
            assertion,
            request_id_generator,
            sonyflake_machine_id,
            sonyflake_start_time,
        })
    }

    /// Address the adopter binds its listener to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Install the configured generator into `slot`.
    pub fn install_request_id_generator(&self, slot: &GeneratorSlot) -> Result<(), ConfigError> {
        match self.request_id_generator {
            RequestIdGeneratorKind::Uuid => slot.set(UuidV4Generator),
            RequestIdGeneratorKind::UuidV6 => slot.set(UuidV6Generator::new()),
            RequestIdGeneratorKind::Sonyflake => {
                let generator = SonyflakeGenerator::new(SonyflakeSettings {
                    start_time: self.sonyflake_start_time,
                    machine_id: self.sonyflake_machine_id,
                })
                .map_err(ConfigError::Generator)?;
                slot.set(generator);
            }
        }
        tracing::info!(generator = ?self.request_id_generator, "Request id generator installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "PORT",
        "HOST",
        "ALLOWED_ORIGINS",
        "REQUEST_TIMEOUT_SECS",
        "RATE_LIMIT_ENABLED",
        "RATE_LIMIT_PER_SEC",
        "RATE_LIMIT_BURST",
        "ASSERTION_BODY_LIMIT",
        "ATTESTATION_BODY_LIMIT",
        "ATTESTATION_URL",
        "NEW_CHALLENGE_URL",
        "REQUEST_ID_GENERATOR",
        "SONYFLAKE_MACHINE_ID",
        "SONYFLAKE_START_TIME",
    ];

    /// Run `f` with exactly `vars` set among the variables read by `from_env`.
    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
        for (name, value) in vars {
            std::env::set_var(name, value);
        }
        let result = f();
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
        result
    }

    #[test]
    fn test_from_env_defaults() {
        let config = with_env(&[], Config::from_env).unwrap();

        assert_eq!(config.port, 3000);
        assert!(config.rate_limit_enabled, "rate limiting is on unless disabled");
        assert!(config.allowed_origins.is_none());
        assert_eq!(config.assertion.body_limit(), DEFAULT_BODY_LIMIT);
        assert_eq!(config.attestation_body_limit, DEFAULT_BODY_LIMIT);
        assert_eq!(config.request_id_generator, RequestIdGeneratorKind::Uuid);
        assert!(config.sonyflake_machine_id.is_none());
    }

    #[test]
    fn test_from_env_values() {
        let config = with_env(
            &[
                ("PORT", "8080"),
                ("HOST", "0.0.0.0"),
                ("ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
                ("RATE_LIMIT_ENABLED", "FALSE"),
                ("ASSERTION_BODY_LIMIT", "0"),
                ("ATTESTATION_BODY_LIMIT", "2048"),
                ("ATTESTATION_URL", "/attest/verify"),
                ("NEW_CHALLENGE_URL", "/attest/challenge"),
                ("REQUEST_ID_GENERATOR", "sonyflake"),
                ("SONYFLAKE_MACHINE_ID", "42"),
                ("SONYFLAKE_START_TIME", "2020-01-01T00:00:00Z"),
            ],
            Config::from_env,
        )
        .unwrap();

        assert_eq!(config.socket_addr(), SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(
            config.allowed_origins,
            Some(vec!["https://a.example".to_string(), "https://b.example".to_string()])
        );
        assert!(!config.rate_limit_enabled);
        assert_eq!(config.assertion.body_limit, 0);
        assert_eq!(config.assertion.body_limit(), DEFAULT_BODY_LIMIT);
        assert_eq!(config.attestation_body_limit, 2048);
        assert_eq!(config.assertion.attestation_url, "/attest/verify");
        assert_eq!(config.assertion.new_challenge_url, "/attest/challenge");
        assert_eq!(config.request_id_generator, RequestIdGeneratorKind::Sonyflake);
        assert_eq!(config.sonyflake_machine_id, Some(42));
        assert_eq!(
            config.sonyflake_start_time.map(|t| t.to_rfc3339()),
            Some("2020-01-01T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_from_env_rejects_invalid_values() {
        let err = with_env(&[("REQUEST_ID_GENERATOR", "ulid")], Config::from_env).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownGenerator(ref name) if name == "ulid"));

        let err = with_env(&[("SONYFLAKE_MACHINE_ID", "70000")], Config::from_env).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "SONYFLAKE_MACHINE_ID", ref value } if value == "70000"
        ));

        let err = with_env(&[("SONYFLAKE_START_TIME", "yesterday")], Config::from_env).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "SONYFLAKE_START_TIME", .. }
        ));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert!(!config.rate_limit_enabled);
        assert_eq!(config.attestation_body_limit, DEFAULT_BODY_LIMIT);
        assert_eq!(config.request_id_generator, RequestIdGeneratorKind::Uuid);
    }

    #[test]
    fn test_assertion_body_limit_zero_means_default() {
        let config = AssertionConfig::default();
        assert_eq!(config.body_limit(), 10 * 1024 * 1024);

        let config = AssertionConfig {
            body_limit: 512,
            ..Default::default()
        };
        assert_eq!(config.body_limit(), 512);
    }

    #[test]
    fn test_generator_kind_parse() {
        assert_eq!("uuid".parse::<RequestIdGeneratorKind>().unwrap(), RequestIdGeneratorKind::Uuid);
        assert_eq!(" UUID-V6 ".parse::<RequestIdGeneratorKind>().unwrap(), RequestIdGeneratorKind::UuidV6);
        assert_eq!(
            "sonyflake".parse::<RequestIdGeneratorKind>().unwrap(),
            RequestIdGeneratorKind::Sonyflake
        );
        assert!(matches!(
            "ulid".parse::<RequestIdGeneratorKind>(),
            Err(ConfigError::UnknownGenerator(name)) if name == "ulid"
        ));
    }

    #[test]
    fn test_install_generators() {
        for kind in [
            RequestIdGeneratorKind::Uuid,
            RequestIdGeneratorKind::UuidV6,
            RequestIdGeneratorKind::Sonyflake,
        ] {
            let config = Config {
                request_id_generator: kind,
                sonyflake_machine_id: Some(3),
                ..Default::default()
            };
            let slot = GeneratorSlot::new();
            config.install_request_id_generator(&slot).unwrap();

            let id = slot.next_id().unwrap();
            assert!(!id.is_empty(), "{kind:?} produced an empty id");
        }
    }
}
