use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use token_updater::cli::Cli;
use token_updater::config;
use token_updater::gitlab::GitlabClient;
use token_updater::rotation::TokenRotator;
use token_updater::shell::ShellExecutor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    // LOG_FORMAT=json switches stderr output to one JSON object per event.
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let (text_layer, json_layer) = if json {
        (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(text_layer)
        .with(json_layer)
        .init();

    run(args).await
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let cfg = config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    let gitlab = GitlabClient::new(&cfg.host, cfg.token.clone())
        .context("failed to initialize gitlab client")?;

    if args.force {
        tracing::warn!("force renew enabled");
    }
    if args.dry_run {
        tracing::warn!("dry run mode enabled");
    }
    if args.strict {
        tracing::warn!("strict mode enabled");
    }

    TokenRotator::new(cfg, Arc::new(gitlab), Arc::new(ShellExecutor))
        .with_force(args.force)
        .with_dry_run(args.dry_run)
        .with_strict(args.strict)
        .run()
        .await?;
    Ok(())
}
