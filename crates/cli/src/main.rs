use clap::Parser;
use rmx::commands::{apply_cli_overrides, Commands};
use rmx_config::ConfigLoader;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rmx")]
#[command(about = "Prometheus exporter for resource-manager clusters", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (JSON); defaults to $XDG_CONFIG_HOME/rmx/config.json when present
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:9341
    #[arg(long, global = true, value_name = "ADDR")]
    address: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let loader = match cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let mut loaded = loader.load()?;
    apply_cli_overrides(&mut loaded, cli.address, cli.log_level)?;

    cli.command.unwrap_or(Commands::Serve).execute(loaded).await
}
