use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the pipeline.
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
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,
    /// Optional JSON policy overriding the built-in kill-switch and tier tables.
    pub policy_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let pipeline = PipelineConfig {
            strict_prerequisites: parse_bool("APP_STRICT_PREREQUISITES", false)?,
            retry: RetryConfig {
                max_retries: parse_number("APP_MAX_RETRIES", 3)?,
                base_delay: Duration::from_millis(parse_number("APP_BACKOFF_BASE_MS", 1_000)?),
                max_delay: Duration::from_millis(parse_number("APP_BACKOFF_MAX_MS", 30_000)?),
                jitter: Duration::from_millis(parse_number("APP_BACKOFF_JITTER_MS", 250)?),
            },
        };
        if pipeline.retry.max_retries == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "APP_MAX_RETRIES",
                value: "0".to_string(),
            });
        }

        let store = StoreConfig {
            data_dir: env::var("APP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            stale_lock: Duration::from_secs(parse_number("APP_STALE_LOCK_SECS", 3_600)?),
            max_backups: parse_number("APP_MAX_BACKUPS", 10)?,
        };

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let policy_path = env::var("APP_POLICY_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            pipeline,
            store,
            telemetry: TelemetryConfig { log_level },
            policy_path,
        })
    }
}

/// Phase sequencing and retry controls.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Treat unmet prerequisites as errors instead of skipping the phase.
    pub strict_prerequisites: bool,
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strict_prerequisites: false,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts allowed per phase before it is permanently failed.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryConfig {
    /// No sleeping between attempts; used by tests and dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

/// Where work items, enrichment records, and their backups live.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub stale_lock: Duration,
    pub max_backups: usize,
}

impl StoreConfig {
    pub fn work_items_path(&self) -> PathBuf {
        self.data_dir.join("work_items.json")
    }

    pub fn enrichment_path(&self) -> PathBuf {
        self.data_dir.join("enrichment_data.json")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber { name: &'static str, value: String },
    InvalidFlag { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive integer (got '{value}')")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be true or false (got '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn parse_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { name, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const VARS: &[&str] = &[
        "APP_ENV",
        "APP_LOG_LEVEL",
        "APP_DATA_DIR",
        "APP_STRICT_PREREQUISITES",
        "APP_MAX_RETRIES",
        "APP_BACKOFF_BASE_MS",
        "APP_BACKOFF_MAX_MS",
        "APP_BACKOFF_JITTER_MS",
        "APP_STALE_LOCK_SECS",
        "APP_MAX_BACKUPS",
        "APP_POLICY_PATH",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(!config.pipeline.strict_prerequisites);
        assert_eq!(config.pipeline.retry, RetryConfig::default());
        assert_eq!(config.store.data_dir, PathBuf::from("data"));
        assert_eq!(config.store.stale_lock, Duration::from_secs(3_600));
        assert_eq!(config.store.max_backups, 10);
        assert!(config.policy_path.is_none());
    }

    #[test]
    fn reads_overrides_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "ci");
        env::set_var("APP_STRICT_PREREQUISITES", "yes");
        env::set_var("APP_MAX_RETRIES", "5");
        env::set_var("APP_BACKOFF_BASE_MS", "10");
        env::set_var("APP_DATA_DIR", "/tmp/triage");
        env::set_var("APP_POLICY_PATH", "policy.json");

        let config = AppConfig::load().expect("config loads");
        reset_env();

        assert_eq!(config.environment, AppEnvironment::Test);
        assert!(config.pipeline.strict_prerequisites);
        assert_eq!(config.pipeline.retry.max_retries, 5);
        assert_eq!(config.pipeline.retry.base_delay, Duration::from_millis(10));
        assert_eq!(
            config.store.work_items_path(),
            PathBuf::from("/tmp/triage/work_items.json")
        );
        assert_eq!(config.policy_path, Some(PathBuf::from("policy.json")));
    }

    #[test]
    fn rejects_malformed_numbers_and_flags() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_MAX_BACKUPS", "ten");
        let err = AppConfig::load().expect_err("non-numeric backups");
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                name: "APP_MAX_BACKUPS",
                ..
            }
        ));

        reset_env();
        env::set_var("APP_STRICT_PREREQUISITES", "maybe");
        let err = AppConfig::load().expect_err("bad flag");
        reset_env();
        assert!(err.to_string().contains("APP_STRICT_PREREQUISITES"));
    }
}
