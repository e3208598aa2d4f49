use anyhow::Result;
use catalog_etl::config::FtpConfig;
use catalog_etl::pipelines::ftp_fetch;
use clap::Parser;
use tracing::info;

/// Pull the newest file matching FILE_PATTERN from the FTPS drop
/// directory, normalize it to CSV and upsert it as the dataset's CSV
/// resource, then archive the processed candidates under old/.
#[derive(Parser)]
#[command(name = "ftp-sync")]
#[command(about = "Sync the newest FTP drop file into a catalog CSV resource")]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();
    let _args = Args::parse();

    let config = FtpConfig::from_env()?;
    ftp_fetch::run(&config).await?;
    info!("done");
    Ok(())
}
