use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use webindex::{spider, Config, Store};

#[derive(Parser, Debug)]
#[command(
    name = "crawler",
    about = "Breadth-first web crawler populating the shared search catalog"
)]
struct CrawlerCli {
    /// Path to the configuration file
    #[arg(default_value = "config/config.ini")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = CrawlerCli::parse();
    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "crawler failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &CrawlerCli) -> Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;

    // Connect up front so a bad catalog is a startup failure, and make sure
    // the schema exists before any worker writes to it.
    let mut store = Store::connect(&config)
        .await
        .context("failed to connect to the catalog")?;
    store
        .ensure_schema()
        .await
        .context("failed to create catalog tables")?;
    drop(store);

    let stats = spider::run(&config)
        .await
        .map_err(|err| anyhow::anyhow!(err))
        .context("crawl run failed")?;

    tracing::info!(
        pages_crawled = stats.pages_crawled,
        pages_indexed = stats.pages_indexed,
        words_indexed = stats.words_indexed,
        "crawler finished"
    );
    Ok(())
}
