use anyhow::Result;
use catalog_etl::config::ToucherConfig;
use catalog_etl::pipelines::toucher;
use clap::Parser;
use tracing::info;

/// Normalize the last-modified dates of URL resources across the whole
/// catalog: ONLINE datasets show the current run time, everything else is
/// pinned to the resource's creation date.
#[derive(Parser)]
#[command(name = "touch-resources")]
#[command(about = "Normalize last-modified dates of URL resources")]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();
    let _args = Args::parse();

    let config = ToucherConfig::from_env()?;
    toucher::run(&config).await?;
    info!("done");
    Ok(())
}
