use crate::{
    dumper::Dumper,
    transform::PointTransformer,
};
use color_eyre::Result;
use eyre::Context as _;
use statistics_dumper_config::{
    Args,
    Config,
};
use statistics_dumper_queue::{
    ConnectionPool,
    CredentialManager,
    HttpRefresher,
    PoolConfig,
    QueueConsumer,
    QueueNames,
    RedisConnector,
    TlsMode,
    TokenVerifier,
    DEFAULT_PUBLIC_KEY_PEM,
};
use statistics_dumper_store::{
    InfluxClient,
    RetentionPolicy,
    StoreWriter,
};
use url::Url;

pub struct App {
    config: Config,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        let config = Config::new(args).wrap_err("Failed to load configuration")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn credentials(&self) -> Result<Option<CredentialManager>> {
        let token = self.config.queue_token.as_ref().filter(|token| !token.expose().trim().is_empty());
        let Some(token) = token else {
            info!("no queue token configured, connections are only checked with PING");
            return Ok(None);
        };
        let verifier = TokenVerifier::from_pem(DEFAULT_PUBLIC_KEY_PEM)?;
        let refresh_url = Url::parse(&self.config.refresh_url).wrap_err("Invalid refresh URL")?;
        let refresher = HttpRefresher::new(refresh_url)?;
        debug!(token_len = token.expose().len(), "queue token configured");
        Ok(Some(CredentialManager::new(token.expose(), verifier, refresher)))
    }

    pub fn build_dumper(&self) -> Result<Dumper<RedisConnector>> {
        let config = &self.config;

        let connector = RedisConnector::new(&config.queue_address, TlsMode::from_verify(config.queue_tls_verify))?;
        let pool = ConnectionPool::new(
            connector,
            self.credentials()?,
            PoolConfig {
                max_idle: config.pool_max_idle,
                idle_timeout: config.pool_idle_timeout(),
            },
        );
        let consumer = QueueConsumer::new(pool, QueueNames::new(&config.short_queue, &config.long_queue));

        let transformer = PointTransformer::from_hostname(config.key_delimiter().map(str::to_string));

        let store = InfluxClient::new(&config.store_host, config.store_port, config.store_timeout())?;
        let writer = StoreWriter::new(
            store,
            &config.database,
            RetentionPolicy::new(&config.retention_policy, &config.retention),
        );

        Ok(Dumper::new(
            consumer,
            transformer,
            writer,
            config.batch_size,
            config.pop_timeout(),
        ))
    }

    /// Run until a fatal error or Ctrl-C. An interrupted run is a clean exit.
    pub async fn run(self) -> Result<()> {
        let mut dumper = self.build_dumper()?;

        let outcome = tokio::select! {
            result = dumper.run() => Some(result),
            signal = tokio::signal::ctrl_c() => {
                signal.wrap_err("Failed to listen for Ctrl-C")?;
                None
            }
        };

        let stats = dumper.stats();
        match outcome {
            Some(result) => {
                info!(?stats, "dumper stopped");
                result.wrap_err("Statistics dumper stopped")
            }
            None => {
                info!(?stats, dropped_points = dumper.pending(), "interrupted, exiting");
                Ok(())
            }
        }
    }
}
