use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "folio",
    about = "folio: validated transactions over a hierarchical object graph",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log transaction activity to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import a JSON graph description through a validated transaction
    Check(CheckArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
    /// List the built-in validators
    Validators,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Graph description to import
    pub path: PathBuf,
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Also enforce the top-level folder rule
    #[arg(long)]
    pub top_level: bool,
    /// Attribute the commit to this author
    #[arg(long)]
    pub author: Option<String>,
    /// Import without running validators
    #[arg(long)]
    pub no_validate: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// TOML configuration file; defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
}
