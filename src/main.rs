//! Distill: single-binary web scraping service

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use distill::{
    api,
    config::{Config, LogFormat, LoggingConfig},
    models::{FetchMode, OutputFormat, ScrapeRequest},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "distill")]
#[command(about = "Web scraping service: URL in, LLM-ready content out")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "distill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve,

    /// Scrape a single URL and print the response JSON to stdout
    Scrape {
        /// Target URL
        url: String,

        /// Output format (html, text)
        #[arg(short, long, default_value = "html")]
        format: String,

        /// Fetch mode (auto, http, browser)
        #[arg(short = 'm', long, default_value = "auto")]
        mode: String,

        /// Enable stealth evasions
        #[arg(long)]
        stealth: bool,

        /// Remove cookie banners and overlays before extraction
        #[arg(long)]
        remove_overlays: bool,

        /// Block known ad/tracker hosts
        #[arg(long)]
        block_ads: bool,

        /// Timeout in seconds
        #[arg(short, long, default_value_t = 30)]
        timeout: u64,
    },

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = load_config(&cli.config)?;
            init_logging(&config.logging);
            api::serve(config).await
        }
        Commands::Scrape {
            url,
            format,
            mode,
            stealth,
            remove_overlays,
            block_ads,
            timeout,
        } => {
            let config = load_config(&cli.config)?;
            init_logging(&LoggingConfig {
                level: distill::config::LogLevel::Warn,
                ..config.logging.clone()
            });
            scrape_once(
                config,
                url,
                &format,
                &mode,
                stealth,
                remove_overlays,
                block_ads,
                timeout,
            )
            .await
        }
        Commands::Init { path } => {
            let target = path.join("distill.toml");
            if target.exists() {
                anyhow::bail!("{} already exists", target.display());
            }
            std::fs::write(&target, Config::default_toml())
                .with_context(|| format!("failed to write {}", target.display()))?;
            println!("wrote {}", target.display());
            Ok(())
        }
    }
}

fn load_config(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        Ok(Config::default())
    }
}

fn init_logging(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.filter_directive()));

    match cfg.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn scrape_once(
    config: Config,
    url: String,
    format: &str,
    mode: &str,
    stealth: bool,
    remove_overlays: bool,
    block_ads: bool,
    timeout: u64,
) -> Result<()> {
    let output_format = match format {
        "html" => OutputFormat::Html,
        "text" => OutputFormat::Text,
        other => anyhow::bail!("unknown output format: {other} (expected html or text)"),
    };
    let fetch_mode = match mode {
        "auto" => FetchMode::Auto,
        "http" => FetchMode::Http,
        "browser" => FetchMode::Browser,
        other => anyhow::bail!("unknown fetch mode: {other} (expected auto, http, or browser)"),
    };

    let mut request = ScrapeRequest::for_url(url);
    request.timeout = timeout;
    request.stealth = stealth;
    request.remove_overlays = remove_overlays;
    request.block_ads = block_ads;
    request.output_format = output_format;
    request.fetch_mode = fetch_mode;
    request
        .validate(config.scraper.max_timeout_secs)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let (scraper, memory) = api::build_scraper(&config).await?;

    info!(url = %request.url, "scraping");
    let result = scraper.scrape(&request).await;

    memory.stop();
    scraper.close().await;

    match result {
        Ok(result) => {
            let json = serde_json::json!({
                "url": request.url,
                "final_url": result.final_url,
                "title": result.title,
                "status_code": result.status_code,
                "engine": result.engine_name,
                "content": match request.output_format {
                    OutputFormat::Html => result.html,
                    OutputFormat::Text => distill::content::visible_text(&result.html),
                },
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "scrape failed");
            Err(anyhow::anyhow!(err.to_string()))
        }
    }
}
