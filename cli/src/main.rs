mod client;
mod commands;
mod config;
mod gemini;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::ApiClient;
use crate::commands::{cmd_analyze, cmd_chat, cmd_history, cmd_log};
use crate::config::{Config, ServeArgs};

#[derive(Parser)]
#[command(
    name = "nutrisnap",
    version,
    about = "Photograph a meal, log its nutrients, and ask a nutritionist about it"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, env = "NUTRISNAP_VERBOSE")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve(ServeArgs),
    /// Upload a meal photo for analysis and log the recognized items
    Analyze {
        /// Path to the image (jpg, png, webp, gif; max 5MB)
        image: std::path::PathBuf,
        #[command(flatten)]
        server: ServerOpt,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask the nutritionist a question
    Chat {
        /// Message to send
        message: String,
        #[command(flatten)]
        server: ServerOpt,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the food log and running totals
    Log {
        #[command(flatten)]
        server: ServerOpt,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the chat history
    History {
        #[command(flatten)]
        server: ServerOpt,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct ServerOpt {
    /// URL of a running `nutrisnap serve`
    #[arg(long, env = "NUTRISNAP_SERVER", default_value = "http://127.0.0.1:8000")]
    server: String,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "nutrisnap=debug,nutrisnap_core=debug,tower_http=debug"
    } else {
        "nutrisnap=info,nutrisnap_core=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; variables may come from the environment.
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve(args) => server::start_server(Config::load(args)?).await,
        Commands::Analyze {
            image,
            server,
            json,
        } => cmd_analyze(&ApiClient::new(&server.server)?, &image, json).await,
        Commands::Chat {
            message,
            server,
            json,
        } => cmd_chat(&ApiClient::new(&server.server)?, &message, json).await,
        Commands::Log { server, json } => cmd_log(&ApiClient::new(&server.server)?, json).await,
        Commands::History { server, json } => {
            cmd_history(&ApiClient::new(&server.server)?, json).await
        }
    }
}
