use color_eyre::Result;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

/// Log to stderr. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)?,
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;
    Ok(())
}
