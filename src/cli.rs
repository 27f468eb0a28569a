use std::path::PathBuf;

use clap::Parser;

/// Renew expiring GitLab repository, group and personal access tokens.
#[derive(Debug, Parser)]
#[command(name = "gitlab-token-updater", version, about)]
pub struct Cli {
    /// Path of the YAML configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(
        short,
        long,
        env = "DEBUG_MODE",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub debug: bool,

    /// Renew every configured token regardless of its expiry date
    #[arg(short, long)]
    pub force: bool,

    /// Abort on the first error instead of collecting them
    #[arg(short, long)]
    pub strict: bool,

    /// Skip every write; only read-only calls are made
    #[arg(long)]
    pub dry_run: bool,
}
