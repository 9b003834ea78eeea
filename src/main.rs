//! Plansmith CLI: layered settings and plan template rendering.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "plansmith",
    version,
    about = "Resolve clients, cascade plan parameters and render plan templates"
)]
struct Cli {
    #[command(flatten)]
    global: plansmith::cli::GlobalOpts,

    #[command(subcommand)]
    command: plansmith::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.global.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = plansmith::cli::dispatch(&cli.global, cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
