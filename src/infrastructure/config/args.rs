//! Command-line arguments.

use super::app_config::LogLevel;
use crate::domain::entities::PresentationContext;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Command-line arguments. Flags given here override the config file.
#[derive(Debug, Parser)]
#[command(
    name = "tv-artwork",
    version,
    about = "Resolve, prefetch and load media server artwork",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Media server base URL.
    #[arg(long, value_name = "URL", global = true)]
    pub server_url: Option<String>,

    /// Items prefetched on each side of the focus.
    #[arg(long, global = true)]
    pub prefetch_distance: Option<usize>,

    /// Concurrent prefetch jobs.
    #[arg(long, global = true)]
    pub prefetch_workers: Option<usize>,

    /// Cap on concurrent network fetches.
    #[arg(long, global = true)]
    pub max_concurrent_fetches: Option<usize>,

    /// Per-fetch timeout in seconds.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Items per catalog page.
    #[arg(long, global = true)]
    pub page_size: Option<usize>,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Operator commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the candidate list for an item.
    Resolve {
        /// JSON catalog file.
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,

        /// Item id.
        #[arg(long)]
        item: String,

        /// Card type; inferred from the item kind when omitted.
        #[arg(long)]
        context: Option<PresentationContext>,
    },

    /// Prefetch around a focus index on one page and print cache stats.
    Warm {
        /// JSON catalog file.
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,

        /// Focused index within the page.
        #[arg(long)]
        focus: usize,

        /// Zero-based page.
        #[arg(long, default_value_t = 0)]
        page: usize,

        /// Card type for every item; inferred per item when omitted.
        #[arg(long)]
        context: Option<PresentationContext>,
    },

    /// Load one item's artwork and print every event.
    Load {
        /// JSON catalog file.
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,

        /// Item id.
        #[arg(long)]
        item: String,

        /// Card type; inferred from the item kind when omitted.
        #[arg(long)]
        context: Option<PresentationContext>,
    },
}

impl Command {
    /// Catalog file every command reads.
    #[must_use]
    pub fn catalog(&self) -> &Path {
        match self {
            Self::Resolve { catalog, .. } | Self::Warm { catalog, .. } | Self::Load { catalog, .. } => {
                catalog
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_warm_command() {
        let args = CliArgs::parse_from([
            "tv-artwork",
            "warm",
            "--catalog",
            "items.json",
            "--focus",
            "3",
            "--context",
            "poster",
            "--log-level",
            "debug",
        ]);

        assert_eq!(args.log_level, Some(LogLevel::Debug));
        match args.command {
            Command::Warm {
                focus,
                page,
                context,
                ..
            } => {
                assert_eq!(focus, 3);
                assert_eq!(page, 0);
                assert_eq!(context, Some(PresentationContext::Poster));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_context_is_rejected() {
        let result = CliArgs::try_parse_from([
            "tv-artwork",
            "load",
            "--catalog",
            "items.json",
            "--item",
            "x",
            "--context",
            "banner",
        ]);
        assert!(result.is_err());
    }
}
