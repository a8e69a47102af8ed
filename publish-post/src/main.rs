//! publish-post - Publish a content directory to social platforms

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use libpublisher::credentials::AuthorizationPrompt;
use libpublisher::logging::{LogFormat, LoggingConfig};
use libpublisher::{Config, Content, Orientation, PublishResult, Publisher, PublisherError};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "publish-post")]
#[command(version)]
#[command(about = "Publish a content directory to one or more social platforms")]
#[command(long_about = "\
publish-post - Publish a content directory to one or more social platforms

DESCRIPTION:
    Reads a content directory (description text, optional video, cover image
    and subtitles) and publishes it to every requested platform concurrently.
    Each platform reports its own result with a step-by-step trace; one
    platform failing never stops the others.

CONTENT DIRECTORY:
    description.txt          Post text (any single .txt file also works)
    video-<orientation>.mp4  Video, falling back to video.mp4
    cover-<orientation>.jpg  Cover image, falling back to cover.jpg
    subtitles/*.<lang>.srt   Subtitles, one file per language (.vtt too)

PLATFORMS:
    youtube, facebook (meta), x (twitter), reddit, tiktok

CONFIGURATION:
    Configuration file: ~/.config/content-publisher/config.toml
    (override with CONTENT_PUBLISHER_CONFIG or --config)

EXIT CODES:
    0 - Published to every platform
    1 - At least one platform failed, or a runtime error
    2 - Authentication error during setup
    3 - Invalid input (missing directory, no description)
")]
struct Cli {
    /// Content directory
    #[arg(short, long, value_name = "DIR")]
    dir: PathBuf,

    /// Target platform(s) (comma-separated)
    #[arg(short, long, value_delimiter = ',', required = true)]
    platforms: Vec<String>,

    /// Title (defaults to a title file or the directory name)
    #[arg(short, long)]
    title: Option<String>,

    /// Video orientation variant to publish
    #[arg(short, long, default_value = "landscape")]
    orientation: Orientation,

    /// Content language code (e.g. "en" or "pt-BR")
    #[arg(short, long)]
    language: Option<String>,

    /// Use hashtags found in the description as tags
    #[arg(long)]
    extract_tags: bool,

    /// API endpoint override (only with a single platform)
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Log output format (text, json or pretty)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging.verbose = cli.verbose;
    logging.init();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<PublisherError>()
                .map(PublisherError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

/// Returns whether every platform succeeded
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let output_format = cli.format.to_lowercase();
    if output_format != "text" && output_format != "json" {
        return Err(PublisherError::InvalidInput(format!(
            "Invalid output format '{}'. Valid options: text, json",
            cli.format
        ))
        .into());
    }

    if cli.endpoint.is_some() && cli.platforms.len() != 1 {
        return Err(PublisherError::InvalidInput(
            "--endpoint can only be used with a single platform".to_string(),
        )
        .into());
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load()?,
    };

    let content = Content::from_dir(
        &cli.dir,
        cli.title.as_deref(),
        cli.orientation,
        cli.language.as_deref(),
        cli.extract_tags,
    )?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("content-publisher/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;
    let prompt: AuthorizationPrompt = Arc::new(|platform: &str, url: &url::Url| {
        eprintln!(
            "Open this URL in your browser to authorize {}:\n\n  {}\n",
            platform, url
        );
    });
    let publisher = Publisher::from_config_with_prompt(&config, http, prompt)?;

    let targets: Vec<_> = cli
        .platforms
        .iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| {
            let mut target = config.target(name);
            if let Some(endpoint) = &cli.endpoint {
                target.endpoint = Some(endpoint.clone());
            }
            target
        })
        .collect();
    if targets.is_empty() {
        return Err(PublisherError::InvalidInput("No platforms requested".to_string()).into());
    }

    info!(
        "Publishing {} to {} platform(s)",
        cli.dir.display(),
        targets.len()
    );
    let results = publisher.publish_to_many(&targets, &content).await;

    if output_format == "json" {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_text(&results, cli.verbose);
    }

    Ok(results.iter().all(PublishResult::success))
}

fn print_text(results: &[PublishResult], verbose: bool) {
    for result in results {
        let mark = if result.success() { "ok" } else { "FAILED" };
        println!("{}: {} - {}", result.platform(), mark, result.message());
        // Failed runs always show their trace
        if verbose || !result.success() {
            for step in result.trace() {
                let status = if step.ok { "ok" } else { "failed" };
                println!("  {:<16} {:<6} {}", step.name, status, step.detail);
            }
        }
    }
}
