use anyhow::Result;
use catalog_etl::config::CsvFormatsConfig;
use catalog_etl::pipelines::csv_formats;
use clap::Parser;
use tracing::info;

/// Walk every dataset on the source portal, delete duplicate resources
/// left by earlier partial runs, and derive XLSX/JSON/XML siblings for
/// each active CSV resource. Configured via CKAN_HOSTNAME + CKAN_API_KEY.
#[derive(Parser)]
#[command(name = "csv-formats")]
#[command(about = "Fan CSV resources out to XLSX, JSON and XML")]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();
    let _args = Args::parse();

    let config = CsvFormatsConfig::from_env()?;
    csv_formats::run(&config).await?;
    info!("done");
    Ok(())
}
