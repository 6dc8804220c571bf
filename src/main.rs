use clap::Parser;
use color_eyre::Result;
use statistics_dumper::{
    init_errors,
    init_logging,
    App,
    Args,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_errors()?;
    let app = App::new(Args::parse())?;
    init_logging(app.config().verbose)?;
    app.run().await
}
