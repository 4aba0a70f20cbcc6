mod completion;
mod dispatch;
mod host;
mod logging;
mod render;


use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::completion::CliCompletionShell;
use crate::dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "gpkgswap", version)]
#[command(
    about = "Replace a GeoPackage in place, keeping a backup and reloading the project",
    long_about = None
)]
struct Cli {
    /// State directory; defaults to $GPKGSWAP_HOME or ~/.gpkgswap.
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,
    /// Disable badges, colors and progress bars.
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the layers of a .gpkg, or of the first .gpkg inside a .zip.
    Inspect {
        input: String,
        #[arg(long)]
        json: bool,
    },
    /// Show both catalogs side by side before replacing.
    Preview {
        #[arg(long)]
        origin: Option<String>,
        #[arg(long = "new", value_name = "NEW")]
        new_input: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Replace(ReplaceArgs),
    /// List the GeoPackages referenced by a project file.
    Origins {
        #[arg(long)]
        project: PathBuf,
    },
    /// List the project layers that read from a GeoPackage.
    Consumers {
        container: String,
        #[arg(long)]
        project: PathBuf,
    },
    /// List the backups kept beside a GeoPackage, newest first.
    Backups { container: PathBuf },
    /// Print the effective configuration.
    Config,
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

/// Back up the origin GeoPackage and overwrite it with a new one.
#[derive(Args, Debug)]
struct ReplaceArgs {
    #[arg(long)]
    origin: String,
    #[arg(long = "new", value_name = "NEW")]
    new_input: String,
    /// Project file whose layers use the origin.
    #[arg(long)]
    project: Option<PathBuf>,
    #[arg(long, conflicts_with = "reload")]
    no_reload: bool,
    #[arg(long)]
    reload: bool,
    #[arg(long, value_name = "MS")]
    reload_delay_ms: Option<u64>,
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run_cli(cli)
}
