use clap::Parser;
use std::path::PathBuf;

/// Moves aggregated statistics from the queue into InfluxDB.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// YAML configuration file. Defaults to `config.yaml` in the config directory.
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address of the statistics queue.
    #[clap(long = "node", value_name = "HOST:PORT", env = "DUMPER_QUEUE_ADDRESS")]
    pub queue_address: Option<String>,

    /// Bearer token used to authenticate against the queue.
    #[clap(long = "jwt", value_name = "TOKEN", env = "DUMPER_QUEUE_TOKEN", hide_env_values = true)]
    pub queue_token: Option<String>,

    /// Verify the queue's TLS certificate.
    #[clap(long = "tls-verify", action)]
    pub tls_verify: bool,

    /// Seconds to block on an empty queue before flushing. 0 blocks forever.
    #[clap(long = "timeout", value_name = "SECONDS", env = "DUMPER_POP_TIMEOUT_SECS")]
    pub pop_timeout_secs: Option<u64>,

    /// InfluxDB host.
    #[clap(long = "ip", value_name = "HOST", env = "DUMPER_STORE_HOST")]
    pub store_host: Option<String>,

    /// InfluxDB port.
    #[clap(long = "port", value_name = "PORT", env = "DUMPER_STORE_PORT")]
    pub store_port: Option<u16>,

    /// Database to write into.
    #[clap(long = "db", value_name = "NAME", env = "DUMPER_DATABASE")]
    pub database: Option<String>,

    /// Retention duration, e.g. `5d`, or `INF`.
    #[clap(long, value_name = "DURATION", env = "DUMPER_RETENTION")]
    pub retention: Option<String>,

    /// Maximum points per write.
    #[clap(long = "batch-size", value_name = "POINTS", env = "DUMPER_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[clap(long = "verbose", action)]
    pub verbose: bool,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(address) = &self.queue_address {
                cache.insert("queue_address".to_string(), address.clone().into());
            }
            if let Some(token) = self.queue_token.as_ref().filter(|token| !token.trim().is_empty()) {
                cache.insert("queue_token".to_string(), token.clone().into());
            }
            if self.tls_verify {
                cache.insert("queue_tls_verify".to_string(), true.into());
            }
            if let Some(timeout) = self.pop_timeout_secs {
                cache.insert("pop_timeout_secs".to_string(), timeout.into());
            }
            if let Some(host) = &self.store_host {
                cache.insert("store_host".to_string(), host.clone().into());
            }
            if let Some(port) = self.store_port {
                cache.insert("store_port".to_string(), (port as u64).into());
            }
            if let Some(database) = &self.database {
                cache.insert("database".to_string(), database.clone().into());
            }
            if let Some(retention) = &self.retention {
                cache.insert("retention".to_string(), retention.clone().into());
            }
            if let Some(batch_size) = self.batch_size {
                cache.insert("batch_size".to_string(), (batch_size as u64).into());
            }
            if self.verbose {
                cache.insert("verbose".to_string(), true.into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let config_dir_path = crate::get_config_dir().display().to_string();

    format!(
        "\
Authors: {author}

Config directory: {config_dir_path}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Source as _;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_legacy_flag_names() {
        let args = Args::try_parse_from([
            "statistics-dumper",
            "--node",
            "10.0.0.5:6379",
            "--ip",
            "10.0.0.6",
            "--port",
            "8087",
            "--db",
            "metrics",
            "--retention",
            "INF",
            "--timeout",
            "10",
            "--batch-size",
            "500",
            "--tls-verify",
        ])
        .unwrap();

        assert_eq!(args.queue_address.as_deref(), Some("10.0.0.5:6379"));
        assert_eq!(args.store_host.as_deref(), Some("10.0.0.6"));
        assert_eq!(args.store_port, Some(8087));
        assert_eq!(args.database.as_deref(), Some("metrics"));
        assert_eq!(args.retention.as_deref(), Some("INF"));
        assert_eq!(args.pop_timeout_secs, Some(10));
        assert_eq!(args.batch_size, Some(500));
        assert!(args.tls_verify);
    }

    #[test]
    fn only_given_flags_are_collected() {
        let args = Args {
            database: Some("metrics".to_string()),
            ..Default::default()
        };
        let collected = args.collect().unwrap();
        assert_eq!(collected.len(), 1);
        assert!(collected.contains_key("database"));
    }

    #[test]
    fn blank_token_is_not_collected() {
        for token in ["", "  "] {
            let args = Args {
                queue_token: Some(token.to_string()),
                ..Default::default()
            };
            assert!(args.collect().unwrap().is_empty());
        }
    }
}
