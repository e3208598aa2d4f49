use anyhow::Result;
use catalog_etl::config::GisConfig;
use catalog_etl::pipelines::gis;
use clap::Parser;
use tracing::info;

/// Export one SDE layer through the GIS host, convert it to
/// GeoJSON/CSV/GeoXML/KML in projected and native-grid variants, and
/// publish the dataset: resources on the catalog, the projected GeoJSON
/// to the blob container. See GisConfig for the environment surface.
#[derive(Parser)]
#[command(name = "gis-sync")]
#[command(about = "Export a geodatabase layer and publish its derived formats")]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();
    let _args = Args::parse();

    let config = GisConfig::from_env()?;
    gis::run(&config).await?;
    info!("done");
    Ok(())
}
