//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "retagger")]
#[command(about = "Bulk-edit submission tags on FurAffinity and Weasyl", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: $RETAGGER_CONFIG or ./retagger.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default config and create the database
    Init {
        /// Directory to initialize (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Mirror submissions from every configured service
    LoadSubmissions,

    /// List stored submissions matching a tag expression
    QueryTags {
        /// Tags to match, e.g. "dragon -sketch"
        #[arg(short, long, allow_hyphen_values = true, default_value = "")]
        search: String,
    },

    /// Add and remove tags on matching submissions
    ApplyTags {
        /// Only show what would change
        #[arg(short, long)]
        dry_run: bool,

        /// Tags to match, e.g. "dragon -sketch"
        #[arg(short, long, allow_hyphen_values = true)]
        search: String,

        /// Tags to add or remove, e.g. "+scalie -wip"
        #[arg(short, long, allow_hyphen_values = true)]
        tags: String,
    },
}
