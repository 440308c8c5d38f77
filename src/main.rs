use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bson::{Bson, Document};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, LevelFilter};

use mongo_service::config::{Config, DEFAULT_CONFIG_PATH};
use mongo_service::database::{CollectionClient, MongoService};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Overrides the configured database
    #[arg(long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and report success
    Ping,
    /// Count the documents matching a JSON filter
    Count {
        collection: String,
        #[arg(long, default_value = "{}")]
        filter: String,
    },
    /// Print the documents matching a JSON filter
    Find {
        collection: String,
        #[arg(long, default_value = "{}")]
        filter: String,
        #[arg(long)]
        fields: Option<String>,
    },
    /// Print the distinct values of a field
    Distinct {
        collection: String,
        key: String,
        #[arg(long, default_value = "{}")]
        filter: String,
    },
}

fn parse_document(text: &str) -> Result<Document> {
    let value: serde_json::Value =
        serde_json::from_str(text).with_context(|| format!("Invalid JSON: {}", text))?;
    bson::to_document(&value).with_context(|| format!("Not a JSON object: {}", text))
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse command line arguments and setup logging
    let args = Args::parse();
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level.to_string())).init();

    // 2. Load configuration
    let mut config = Config::load_or_env(&args.config)?;
    if let Some(database) = args.database {
        config.database.database = database;
    }
    let descriptor = config.database.descriptor();
    info!("Connecting to {}:{}/{}", descriptor.host(), descriptor.port(), descriptor.database());

    // 3. Connect and run the command
    let service = Arc::new(MongoService::connect(&descriptor).await?);
    let database = descriptor.database().to_string();

    let outcome = run(args.command, &service, &database).await;
    service.shutdown().await;
    outcome
}

async fn run(command: Command, service: &Arc<MongoService>, database: &str) -> Result<()> {
    match command {
        Command::Ping => {
            println!("ok");
        }
        Command::Count { collection, filter } => {
            let client = CollectionClient::new(service.clone(), database, collection);
            let count = client.count(parse_document(&filter)?).await?;
            println!("{}", count);
        }
        Command::Find {
            collection,
            filter,
            fields,
        } => {
            let client = CollectionClient::new(service.clone(), database, collection);
            let fields = fields.as_deref().map(parse_document).transpose()?;
            for document in client.find(parse_document(&filter)?, fields).await? {
                println!("{}", Bson::Document(document).into_relaxed_extjson());
            }
        }
        Command::Distinct {
            collection,
            key,
            filter,
        } => {
            let client = CollectionClient::new(service.clone(), database, collection);
            let values = client.distinct(&key, parse_document(&filter)?).await?;
            println!("{}", Bson::Array(values).into_relaxed_extjson());
        }
    }

    Ok(())
}
