//! waveio CLI - demo binaries for the waveio audio I/O library.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "waveio")]
#[command(author, version, about = "waveio audio I/O demos", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices, optionally watching for hot-plug changes
    Devices(commands::devices::DevicesArgs),

    /// Play a sine wave through an output device
    Sine(commands::sine::SineArgs),

    /// Record raw interleaved float32 samples from an input device
    Record(commands::record::RecordArgs),

    /// Print the current peak level of an input device
    Monitor(commands::monitor::MonitorArgs),
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("WAVEIO_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    tracing::debug!(command = ?std::mem::discriminant(&cli.command), "dispatching command");

    match cli.command {
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Sine(args) => commands::sine::run(args),
        Commands::Record(args) => commands::record::run(args),
        Commands::Monitor(args) => commands::monitor::run(args),
    }
}
