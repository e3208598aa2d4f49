use anyhow::Result;
use catalog_etl::config::ApiFetchConfig;
use catalog_etl::pipelines::api_fetch;
use clap::Parser;
use tracing::info;

/// Fetch a JSON API feed, flatten its coordinates and timestamps, and
/// publish it as a dataset with CSV and GeoJSON resources.
#[derive(Parser)]
#[command(name = "api-fetch")]
#[command(about = "Publish a JSON API feed as a catalog dataset")]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();
    let _args = Args::parse();

    let config = ApiFetchConfig::from_env()?;
    api_fetch::run(&config).await?;
    info!("done");
    Ok(())
}
