use crate::demo::{run_demo, run_listings_check, DemoArgs, ListingsCheckArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use estate_commission::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Estate Commission",
    about = "Run and exercise the property commission payment service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect listing exports before seeding the service with them
    Listings {
        #[command(subcommand)]
        command: ListingsCommand,
    },
    /// Walk one sold property through manual payment, approval and receipt
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum ListingsCommand {
    /// Parse a listing CSV and summarize what the service would load
    Check(ListingsCheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Listing CSV export used to seed the in-memory ledger
    #[arg(long)]
    pub(crate) listings: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Listings {
            command: ListingsCommand::Check(args),
        } => run_listings_check(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
