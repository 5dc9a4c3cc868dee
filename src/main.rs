use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use faceprint::config::FaceprintConfig;
use faceprint::db::NewPerson;
use faceprint::{cli, server};

#[derive(Parser)]
#[command(name = "faceprint", version, about = "Face-embedding catalogue and recognition server")]
struct Cli {
    /// Config file (defaults to ~/.faceprint/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Transport to use: stdio or http (overrides config)
        #[arg(long)]
        transport: Option<String>,
    },
    /// List enrolled faces
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show catalogue statistics
    Stats,
    /// Check the catalogue and directory for problems
    Doctor,
    /// Enroll a face from per-frame embeddings
    Enroll {
        /// Identity key to store the face under
        key: String,
        /// Owner ID in the identity directory
        #[arg(long)]
        owner: String,
        /// Display name reported on recognition
        #[arg(long)]
        name: String,
        /// JSON file with an array of embeddings
        #[arg(long)]
        samples: PathBuf,
    },
    /// Recognize one embedding
    Recognize {
        /// JSON file with a single embedding array
        #[arg(long)]
        embedding: PathBuf,
    },
    /// Delete an enrolled face, or all faces of an owner
    Delete {
        key: Option<String>,
        #[arg(long, conflicts_with = "key")]
        owner: Option<String>,
    },
    /// Export the catalogue as JSON to stdout
    Export,
    /// Import records from an export file
    Import { file: PathBuf },
    /// Manage the identity directory
    Person {
        #[command(subcommand)]
        action: PersonAction,
    },
}

#[derive(Subcommand)]
enum PersonAction {
    /// Add or update a person
    Add {
        owner_id: String,
        #[arg(long)]
        first: String,
        #[arg(long)]
        last: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        designation: Option<String>,
    },
    /// Mark a person inactive
    Deactivate { owner_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => FaceprintConfig::load_from(path)?,
        None => FaceprintConfig::load()?,
    };

    // Log to stderr so stdout stays clean for MCP JSON-RPC and exports.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            if let Some(t) = transport {
                config.server.transport = t;
                config.validate()?;
            }
            match config.server.transport.as_str() {
                "http" => server::serve_http(config).await?,
                _ => server::serve_stdio(config).await?,
            }
        }
        Command::List { json } => cli::list::list(&config, json)?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Enroll {
            key,
            owner,
            name,
            samples,
        } => cli::enroll::enroll(&config, &key, &owner, &name, &samples)?,
        Command::Recognize { embedding } => cli::recognize::recognize(&config, &embedding).await?,
        Command::Delete { key, owner } => {
            cli::delete::delete(&config, key.as_deref(), owner.as_deref())?
        }
        Command::Export => cli::export::export(&config)?,
        Command::Import { file } => cli::import::import(&config, &file)?,
        Command::Person { action } => match action {
            PersonAction::Add {
                owner_id,
                first,
                last,
                email,
                department,
                designation,
            } => cli::person::add(
                &config,
                &NewPerson {
                    owner_id,
                    first_name: first,
                    last_name: last,
                    email,
                    department,
                    designation,
                },
            )?,
            PersonAction::Deactivate { owner_id } => cli::person::deactivate(&config, &owner_id)?,
        },
    }

    Ok(())
}
