//! MQTT session command line client
//!
//! `run` subscribes to a topic and publishes a device message on an interval
//! until SIGINT or SIGTERM. `publish` sends one message. `config` validates a
//! configuration file.

use clap::{Parser, Subcommand};
use mqtt_session::observability::{init_default_logging, init_logging, parse_level, LogFormat};
use mqtt_session::{now_millis, Client, ClientConfig, Message};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Supervised MQTT publish/subscribe client
#[derive(Parser)]
#[command(name = "mqtt-session")]
#[command(about = "Supervised MQTT publish/subscribe client")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker URL, used when no configuration file is given
    #[arg(long, env = "MQTT_BROKER_URL", default_value = "tcp://127.0.0.1:1883")]
    broker_url: String,

    /// Client identifier, used when no configuration file is given
    #[arg(long, env = "MQTT_CLIENT_ID", default_value = "edgeNode1")]
    client_id: String,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to a topic and publish a device message on an interval
    Run {
        #[arg(long, default_value = "mqtt/edgeon/read/me")]
        topic: String,
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
    },
    /// Publish one message and exit
    Publish {
        #[arg(long)]
        topic: String,
        /// JSON content of the message
        #[arg(long, default_value = "{}")]
        content: String,
    },
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        1 => init_logging(parse_level("DEBUG"), LogFormat::Compact, false),
        _ => init_logging(parse_level("TRACE"), LogFormat::Compact, true),
    }

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run {
            topic,
            interval_secs,
        } => run(config, &topic, Duration::from_secs(interval_secs.max(1))).await,
        Commands::Publish { topic, content } => publish_once(config, &topic, &content).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(cli: &Cli) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ClientConfig::load_from_file(path)?)
        }
        None => {
            let config = ClientConfig::new(cli.broker_url.clone(), cli.client_id.clone());
            config.validate()?;
            Ok(config)
        }
    }
}

fn device_message(content: Value) -> Message {
    let mut message = Message {
        content,
        ..Message::default()
    };
    message
        .build_router("device", "", "twin", "twin", "Read")
        .build_header(&Uuid::new_v4().to_string(), now_millis());
    message
}

async fn run(
    config: ClientConfig,
    topic: &str,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let client_id = config.client_id.clone();
    let client: Arc<Client> = Arc::new(Client::new(config)?);
    client.start().await?;

    client
        .subscribe(topic, |topic: &str, message: Message| {
            info!(
                topic = %topic,
                id = %message.header.id,
                source = %message.router.source,
                operation = %message.router.operation,
                "Received message"
            );
        })
        .await?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut ticker = tokio::time::interval(interval);

    info!(client_id = %client_id, topic = %topic, "Publishing every {:?}", interval);

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            _ = ticker.tick() => {
                let message = device_message(json!({}));
                if let Err(e) = client.publish(topic, &message).await {
                    warn!(error = %e, recoverable = e.is_recoverable(), "Publish failed");
                }
            }
        }
    }

    client.close().await;
    info!(metrics = ?client.metrics().snapshot(), "Client stopped");
    Ok(())
}

async fn publish_once(
    config: ClientConfig,
    topic: &str,
    content: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let content: Value = serde_json::from_str(content)?;
    let client: Client = Client::new(config)?;
    client.start().await?;

    let message = device_message(content);
    let result = client.publish(topic, &message).await;
    client.close().await;
    result?;

    info!(topic = %topic, id = %message.header.id, "Message published");
    Ok(())
}

fn handle_config_command(config: &ClientConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!("Configuration is valid");

    if show {
        let mut shown = config.clone();
        if shown.password.is_some() {
            shown.password = Some("********".to_string());
        }
        println!("{}", toml::to_string_pretty(&shown)?);
    }
    Ok(())
}
