mod ask;
mod config;
mod error;
mod location;
mod logging;

#[cfg(feature = "chat")]
mod chat;

use std::path::PathBuf;
use std::sync::Arc;

use argon_core::{ChatSession, GeoPoint, QueryPlan, RefreshPolicy};
use argon_gemini::GeminiConnector;
use clap::{Parser, Subcommand};

use crate::config::{Config, load_api_key, load_config};
use crate::location::{LocationProvider, Locator, parse_location};

#[derive(Parser)]
#[command(name = "arg")]
#[command(about = "Grounded chat with Gemini from the terminal", long_about = None)]
struct Cli {
    /// Fixed location as LAT,LON (overrides config)
    #[arg(long, global = true, value_parser = parse_location)]
    location: Option<GeoPoint>,

    /// Look the location up from the public IP address
    #[arg(long, global = true)]
    geolocate: bool,

    /// Rebuild the client from fresh credentials before every query
    #[arg(long, global = true)]
    per_query_refresh: bool,

    /// Log file for the chat UI
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[cfg(feature = "chat")]
    /// Start an interactive chat session
    Chat,

    /// Ask a single question and print the streamed answer
    Ask {
        /// The question
        #[arg(required = true)]
        text: Vec<String>,

        /// Print the conversation as JSON instead of streaming text
        #[arg(long)]
        json: bool,
    },

    /// Show which retrieval mode and model a question would use
    Classify {
        /// The question
        #[arg(required = true)]
        text: Vec<String>,
    },
}

fn connector(config: &Config) -> GeminiConnector {
    let mut connector = GeminiConnector::new(Arc::new(|| load_api_key().ok()));
    if let Some(ref url) = config.base_url {
        connector = connector.base_url(url.clone());
    }
    if let Some(ref instruction) = config.system_instruction {
        connector = connector.system_instruction(instruction.clone());
    }
    connector
}

fn session(cli: &Cli, config: &Config) -> ChatSession<GeminiConnector> {
    let mut session_config = config.session_config();
    if cli.per_query_refresh {
        session_config.refresh_policy = RefreshPolicy::PerQuery;
    }
    ChatSession::new(connector(config), session_config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "chat")]
        Command::Chat => {
            let log_path = cli.log_file.clone().unwrap_or_else(logging::default_log_path);
            logging::init_file(&log_path)?;

            let config = load_config();
            let session = session(&cli, &config);
            let locator = Locator::resolve(cli.location, cli.geolocate, &config.location);
            let location_rx = location::spawn_lookup(locator);

            chat::run(session, Some(location_rx)).await?;
        }
        Command::Ask { ref text, json } => {
            logging::init_stderr()?;

            let config = load_config();
            let mut session = session(&cli, &config);
            let locator = Locator::resolve(cli.location, cli.geolocate, &config.location);
            session.set_location(locator.locate().await);

            let mut stdout = std::io::stdout().lock();
            ask::run(&mut session, &text.join(" "), json, &mut stdout).await?;
        }
        Command::Classify { ref text } => {
            logging::init_stderr()?;

            let config = load_config();
            let location = cli.location.or_else(|| config.location.fixed());
            let plan = QueryPlan::for_query(&text.join(" "), location, &config.models);
            println!("mode:  {}", plan.mode);
            println!("model: {}", plan.options.model);
            println!("tool:  {:?}", plan.options.tool);
        }
    }

    Ok(())
}
