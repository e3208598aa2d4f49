use anyhow::Result;
use catalog_etl::config::MirrorConfig;
use catalog_etl::pipelines::mirror;
use clap::Parser;
use tracing::info;

/// Duplicate selected resources of a local dataset to their pre-assigned
/// ids on the national portal, authenticating with a service-account
/// id-token. DATAGOV_RESOURCES maps local names to mirror resource ids.
#[derive(Parser)]
#[command(name = "mirror-upload")]
#[command(about = "Mirror local catalog resources to the national portal")]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();
    let _args = Args::parse();

    let config = MirrorConfig::from_env()?;
    mirror::run(&config).await?;
    info!("done");
    Ok(())
}
