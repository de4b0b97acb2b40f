//! shopbridge-cli - operator tooling for the shopbridge adapter
//!
//! Sends a request over NATS and waits for its response, dry-runs mapping
//! rules from a seed file, and signs webhook bodies for manual testing.

use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use shopbridge::events::sign;
use shopbridge::mapping::FieldMapper;
use shopbridge::rpc::{request_topic, response_topic, RequestEnvelope};
use shopbridge::store::{MemoryStore, SeedData};
use shopbridge::{NatsBus, NatsConfig, Publisher};

#[derive(Parser)]
#[command(name = "shopbridge-cli")]
#[command(version, about = "Operator tooling for the shopbridge adapter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a request and print the response
    Send {
        /// Action to invoke (e.g. api_request, create_product)
        #[arg(short, long)]
        action: String,

        /// Platform segment for the request topic
        #[arg(short, long)]
        platform: Option<String>,

        /// Shop the request is scoped to
        #[arg(short, long, default_value = "")]
        shop_id: String,

        /// API key of a trusted service
        #[arg(short = 'k', long, env = "SHOPBRIDGE_API_KEY", default_value = "")]
        api_key: String,

        /// Request params as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        /// NATS server URL
        #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
        nats_url: String,

        /// Seconds to wait for the response
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Apply mapping rules from a seed file to a JSON document
    Map {
        /// YAML seed file holding `mappings`
        #[arg(short, long)]
        seed: PathBuf,

        /// JSON file holding the object to map
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, default_value = "default")]
        platform: String,

        #[arg(short, long)]
        entity: String,

        /// Map platform data back to the canonical schema
        #[arg(short, long)]
        reverse: bool,
    },

    /// Print the X-Webhook-Signature for a request body
    Sign {
        /// Webhook secret
        #[arg(short, long, env = "WEBHOOK_SECRET")]
        secret: String,

        /// File holding the exact body to sign
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Send {
            action,
            platform,
            shop_id,
            api_key,
            params,
            nats_url,
            timeout,
        } => {
            send_request(
                &action,
                platform.as_deref(),
                shop_id,
                api_key,
                &params,
                nats_url,
                Duration::from_secs(timeout),
            )
            .await
        }
        Commands::Map {
            seed,
            input,
            platform,
            entity,
            reverse,
        } => map_document(seed, input, &platform, &entity, reverse),
        Commands::Sign { secret, file } => sign_body(&secret, file),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn send_request(
    action: &str,
    platform: Option<&str>,
    shop_id: String,
    api_key: String,
    params: &str,
    nats_url: String,
    timeout: Duration,
) -> Result<(), Box<dyn Error>> {
    let params: Map<String, Value> = serde_json::from_str(params)?;
    let request = RequestEnvelope {
        request_id: Uuid::new_v4().to_string(),
        api_key,
        shop_id,
        platform: platform.unwrap_or_default().to_string(),
        action: action.to_string(),
        params,
    };

    let bus = Arc::new(
        NatsBus::connect(NatsConfig {
            url: nats_url,
            client_name: "shopbridge-cli".to_string(),
            ..NatsConfig::default()
        })
        .await?,
    );

    // Subscribe first so a fast response is not missed
    let mut responses = bus.subscribe(&response_topic(&request.request_id)).await?;
    let topic = request_topic(platform, action);
    bus.publish_raw(&topic, serde_json::to_vec(&request)?).await?;
    eprintln!("Sent {} to {}", request.request_id, topic);

    let message = tokio::time::timeout(timeout, responses.next())
        .await
        .map_err(|_| format!("no response within {}s", timeout.as_secs()))?
        .ok_or("subscription closed before a response arrived")?;

    let response: Value = serde_json::from_slice(&message.payload)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    bus.close().await;
    Ok(())
}

fn map_document(
    seed: PathBuf,
    input: PathBuf,
    platform: &str,
    entity: &str,
    reverse: bool,
) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::from_seed(SeedData::load_from_file(&seed)?)?);
    let mapper = FieldMapper::with_store(store);

    let data: Map<String, Value> = serde_json::from_str(&std::fs::read_to_string(&input)?)?;
    let mapped = if reverse {
        mapper.reverse_transform(platform, entity, &data)?
    } else {
        mapper.transform(platform, entity, &data)?
    };

    println!("{}", serde_json::to_string_pretty(&Value::Object(mapped))?);
    Ok(())
}

fn sign_body(secret: &str, file: PathBuf) -> Result<(), Box<dyn Error>> {
    let body = std::fs::read(&file)?;
    let signature = sign(secret, &body).ok_or("secret must not be empty")?;
    println!("{}", signature);
    Ok(())
}
