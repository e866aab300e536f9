use anyhow::Result;
use beanstalkd_exporter::cli;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "beanstalkd-exporter")]
#[command(version = beanstalkd_exporter::VERSION)]
#[command(about = "Prometheus exporter for beanstalkd statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the exporter
    Serve(cli::serve::ServeArgs),

    /// Validate configuration files without serving
    Check(cli::check::CheckArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => cli::serve::run(args).await,
        Commands::Check(args) => cli::check::run(args).await,
    }
}
