//! Quire CLI
//!
//! Static site generator for file-based Markdown sites.
//!
//! This is the binary entry point. The command implementations are in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

/// Command-line interface for Quire.
#[derive(Parser)]
#[command(name = "quire", version, about = "A file-based static site generator")]
struct Cli {
    /// Site root directory
    #[arg(short = 'C', long = "site", default_value = ".", global = true)]
    site: PathBuf,

    /// Path to configuration file (defaults to config.toml in the site root)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build the site
    Build {
        /// Output directory, relative to the site root
        #[arg(short, long, default_value = "dist")]
        output: PathBuf,
        /// Skip HTML and CSS minification
        #[arg(long)]
        no_minify: bool,
    },
    /// Validate configuration and content without writing output
    Check {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
    /// Create a new content file
    New {
        /// Path for the new content (e.g., blog/my-article)
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    quire::init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Build { output, no_minify } => {
            quire::cmd::build::run(&cli.site, config, &output, no_minify)?;
        }
        Commands::Check { strict } => {
            quire::cmd::check::run(&cli.site, config, strict)?;
        }
        Commands::New { path } => {
            quire::cmd::new::run(&cli.site, &path)?;
        }
    }

    Ok(())
}
