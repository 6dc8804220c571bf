#[macro_use]
extern crate tracing;

mod app_config;
mod args;

use app_config::AppConfig;
pub use app_config::get_config_dir;
pub use args::Args;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    time::Duration,
};

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

/// Prefix of environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "DUMPER";

/// Queue bearer token. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<{} bytes>)", self.0.len())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Splits an InfluxQL duration literal such as `1h30m` into amount and unit pairs.
fn influx_duration_segments(literal: &str) -> Option<Vec<(&str, &str)>> {
    const UNITS: [&str; 9] = ["ns", "ms", "u", "µ", "s", "m", "h", "d", "w"];

    let mut segments = Vec::new();
    let mut rest = literal;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let (amount, tail) = rest.split_at(digits);
        let unit = UNITS.iter().find(|unit| tail.starts_with(**unit))?;
        segments.push((amount, *unit));
        rest = &tail[unit.len()..];
    }
    Some(segments).filter(|segments| !segments.is_empty())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten, skip_serializing)]
    pub app_config: AppConfig,

    pub queue_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_token: Option<Token>,
    #[serde(default)]
    pub queue_tls_verify: bool,
    pub short_queue: String,
    pub long_queue: String,
    pub pop_timeout_secs: u64,
    pub pool_max_idle: usize,
    pub pool_idle_timeout_secs: u64,
    pub refresh_url: String,

    pub store_host: String,
    pub store_port: u16,
    pub store_timeout_secs: u64,
    pub database: String,
    pub retention: String,
    pub retention_policy: String,

    pub batch_size: usize,
    #[serde(default)]
    pub key_delimiter: String,
    #[serde(default)]
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl Config {
    /// Layer defaults, the config file, `DUMPER_*` variables and `args`, then validate.
    pub fn new(args: Args) -> Result<Self, ConfigError> {
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder()
            .set_default("config_dir", config_dir.to_string_lossy().to_string())?
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        builder = match &args.config {
            Some(path) => builder.add_source(
                config::File::from(path.clone())
                    .format(config::FileFormat::Yaml)
                    .required(true),
            ),
            None => builder.add_source(
                config::File::from(config_dir.join("config.yaml"))
                    .format(config::FileFormat::Yaml)
                    .required(false),
            ),
        };

        builder = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .add_source(args);

        let mut cfg: Self = builder.build()?.try_deserialize()?;
        // An empty token means anonymous access, whichever layer set it.
        cfg.queue_token = cfg.queue_token.filter(|token| !token.expose().trim().is_empty());
        cfg.validate()?;
        debug!(config = ?cfg, "configuration loaded");
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_address.trim().is_empty() {
            return Err(invalid("queue_address", "must not be empty"));
        }
        if self.short_queue.is_empty() {
            return Err(invalid("short_queue", "must not be empty"));
        }
        if self.long_queue.is_empty() {
            return Err(invalid("long_queue", "must not be empty"));
        }
        if self.short_queue == self.long_queue {
            return Err(invalid("long_queue", "must differ from short_queue"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.pool_max_idle == 0 {
            return Err(invalid("pool_max_idle", "must be at least 1"));
        }
        if self.database.is_empty() {
            return Err(invalid("database", "must not be empty"));
        }
        if self.retention_policy.is_empty() {
            return Err(invalid("retention_policy", "must not be empty"));
        }
        if !self.retention.eq_ignore_ascii_case("INF") {
            let segments = influx_duration_segments(&self.retention).ok_or_else(|| {
                invalid(
                    "retention",
                    format!("{:?} is not an InfluxQL duration such as 5d or 1h30m", self.retention),
                )
            })?;
            let normalized = segments
                .iter()
                .map(|(amount, unit)| match *unit {
                    "u" | "µ" => format!("{amount}us"),
                    unit => format!("{amount}{unit}"),
                })
                .collect::<Vec<_>>()
                .join(" ");
            humantime::parse_duration(&normalized)
                .map_err(|err| invalid("retention", format!("{:?}: {err}", self.retention)))?;
        }
        url::Url::parse(&self.refresh_url).map_err(|err| invalid("refresh_url", err.to_string()))?;
        Ok(())
    }

    pub fn pop_timeout(&self) -> Duration {
        Duration::from_secs(self.pop_timeout_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// `None` when keys are kept verbatim.
    pub fn key_delimiter(&self) -> Option<&str> {
        Some(self.key_delimiter.as_str()).filter(|delimiter| !delimiter.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;
    use pretty_assertions::assert_eq;
    use temp_dir::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.queue_address, "127.0.0.1:6379");
        assert_eq!(config.short_queue, "statistics:300");
        assert_eq!(config.long_queue, "statistics:3600");
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.pool_max_idle, 5);
        assert_eq!(config.pool_idle_timeout(), Duration::from_secs(240));
        assert_eq!(config.retention_policy, "dumper");
        assert_eq!(config.key_delimiter(), Some("@"));
        assert!(config.queue_token.is_none());
        assert!(!config.queue_tls_verify);
    }

    #[test]
    fn rejects_bad_values() {
        let cases: [(&str, fn(&mut Config)); 9] = [
            ("queue_address", |c| c.queue_address = " ".to_string()),
            ("short_queue", |c| c.short_queue.clear()),
            ("long_queue", |c| c.long_queue = c.short_queue.clone()),
            ("batch_size", |c| c.batch_size = 0),
            ("pool_max_idle", |c| c.pool_max_idle = 0),
            ("database", |c| c.database.clear()),
            ("retention_policy", |c| c.retention_policy.clear()),
            ("retention", |c| c.retention = "five days".to_string()),
            ("refresh_url", |c| c.refresh_url = "not a url".to_string()),
        ];
        for (field, mutate) in cases {
            let mut config = Config::default();
            mutate(&mut config);
            match config.validate() {
                Err(ConfigError::Invalid { field: reported, .. }) => assert_eq!(reported, field),
                other => panic!("expected {field} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn influx_duration_literals_are_accepted() {
        for retention in ["INF", "inf", "2w", "5d", "1h30m", "500ms", "90s"] {
            let mut config = Config::default();
            config.retention = retention.to_string();
            assert!(config.validate().is_ok(), "{retention} should be accepted");
        }
    }

    #[test]
    fn durations_influx_cannot_parse_are_rejected() {
        for retention in ["5 days", "1month", "1h 30m", "d", "5", "", "-5d"] {
            let mut config = Config::default();
            config.retention = retention.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { field: "retention", .. })),
                "{retention:?} should be rejected"
            );
        }
    }

    #[test]
    fn empty_token_flag_means_no_token() {
        let args = Args::try_parse_from(["statistics-dumper", "--jwt", ""]).unwrap();
        let config = Config::new(args).unwrap();
        assert_eq!(config.queue_token, None);
    }

    #[test]
    fn empty_token_variable_means_no_token() {
        std::env::set_var("DUMPER_QUEUE_TOKEN", "");
        let result = Config::new(Args::default());
        std::env::remove_var("DUMPER_QUEUE_TOKEN");

        assert_eq!(result.unwrap().queue_token, None);
    }

    #[test]
    fn empty_delimiter_keeps_keys() {
        let mut config = Config::default();
        config.key_delimiter.clear();
        assert_eq!(config.key_delimiter(), None);
    }

    #[test]
    fn token_is_redacted() {
        let token = Token::new("eyJhbGciOiJFUzM4NCJ9.e30.sig");
        assert_eq!(format!("{token:?}"), "Token(<28 bytes>)");
    }

    #[test]
    fn file_then_args_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.child("config.yaml");
        std::fs::write(&path, "database: from_file\nbatch_size: 50\nstore_port: 9999\n").unwrap();

        let config = Config::new(Args {
            config: Some(path),
            database: Some("from_args".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(config.database, "from_args");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.store_port, 9999);
        assert_eq!(config.long_queue, "statistics:3600");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = Config::new(Args {
            config: Some(dir.child("absent.yaml")),
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn invalid_layered_value_is_rejected() {
        let result = Config::new(Args {
            batch_size: Some(0),
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::Invalid { field: "batch_size", .. })));
    }
}
