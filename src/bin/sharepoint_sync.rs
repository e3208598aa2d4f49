use anyhow::Result;
use catalog_etl::config::SharepointConfig;
use catalog_etl::pipelines::sharepoint;
use clap::Parser;
use tracing::info;

/// Load the SharePoint list feed at URL, flatten it to CSV and upsert it
/// as the CSV resource of DATASET_NAME.
#[derive(Parser)]
#[command(name = "sharepoint-sync")]
#[command(about = "Sync a SharePoint list into a catalog CSV resource")]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();
    let _args = Args::parse();

    let config = SharepointConfig::from_env()?;
    sharepoint::run(&config).await?;
    info!("done");
    Ok(())
}
