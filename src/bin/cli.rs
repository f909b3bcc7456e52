use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use clap::{Parser, Subcommand};
use ember_store::{
    KVReader, KVWriter, LoggingObserver, Schema, SharedStore, Snapshotter, StoreConfig,
};
use serde_json::Value;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data file (falls back to EMBER_PATH, then store.json)
    #[arg(short, long)]
    path: Option<String>,

    /// Encryption passphrase (falls back to EMBER_ENCRYPTION_KEY)
    #[arg(short, long)]
    key: Option<String>,

    /// JSON schema file applied on open (falls back to EMBER_SCHEMA)
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Log every mutation
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    Get { key: String },
    Set { key: String, value: String },
    Del { key: String },
    Has { key: String },
    Query {
        #[arg(long)]
        gt: Option<f64>,
        #[arg(long)]
        lt: Option<f64>,
        #[arg(long)]
        eq: Option<String>,
    },
    Dump,
    Backup { path: PathBuf },
    Restore { path: PathBuf },
    Version {
        #[arg(long)]
        set: Option<u64>,
    },
}

fn parse_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let path = cli.path.clone()
        .or_else(|| env::var("EMBER_PATH").ok())
        .unwrap_or_else(|| "store.json".to_string());

    let mut config = StoreConfig::new(path);

    if let Some(key) = cli.key.clone().or_else(|| env::var("EMBER_ENCRYPTION_KEY").ok()) {
        config = config.with_encryption_key(key);
    }

    let schema_path = cli.schema.clone()
        .or_else(|| env::var("EMBER_SCHEMA").ok().map(PathBuf::from));
    if let Some(schema_path) = schema_path {
        let raw: Value = serde_json::from_slice(&fs::read(&schema_path)?)?;
        config = config.with_schema(Schema::from_json(&raw)?);
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let store = SharedStore::open(load_config(&cli)?).await?;
    if cli.verbose {
        store.subscribe(Arc::new(LoggingObserver)).await?;
    }

    match cli.command {
        Commands::Get { key } => {
            let val = store.get(&key).await?.unwrap_or(Value::Null);
            println!("{}", serde_json::to_string_pretty(&val)?);
        }
        Commands::Set { key, value } => {
            store.set(&key, parse_value(value)).await?;
            println!("OK");
        }
        Commands::Del { key } => {
            store.delete(&key).await?;
            println!("OK");
        }
        Commands::Has { key } => {
            println!("{}", store.has(&key).await?);
        }
        Commands::Query { gt, lt, eq } => {
            let eq = eq.map(parse_value);
            let results = store
                .query(move |v| {
                    let n = v.as_f64();
                    gt.map_or(true, |g| n.map_or(false, |n| n > g))
                        && lt.map_or(true, |l| n.map_or(false, |n| n < l))
                        && eq.as_ref().map_or(true, |e| e == v)
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Dump => {
            let data = store.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Commands::Backup { path } => {
            store.backup(&path).await?;
            println!("OK");
        }
        Commands::Restore { path } => {
            store.restore(&path).await?;
            println!("OK");
        }
        Commands::Version { set } => {
            if let Some(version) = set {
                store.set_version(version).await?;
            }
            println!("{}", store.version().await?);
        }
    }

    Ok(())
}
