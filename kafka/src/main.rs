//! Command-line producer/consumer for a single Kafka topic.
//!
//! ```bash
//! export KAFKA_BOOTSTRAP=broker.example.com:9094
//! kafka-client --produce "hello"
//! kafka-client --consume
//! ```

use clap::Parser;
use kafka::{OffsetReset, Producer, SecurityMode, SessionConfig, Subscriber};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};

const BOOTSTRAP_INSTRUCTIONS: &str = "\
To find your Kafka bootstrap server, use one of the following commands:

For Strimzi deployment:
  kubectl get svc my-kafka-kafka-external-bootstrap -n kafka -o jsonpath='{.status.loadBalancer.ingress[0].hostname}'
  Then: export KAFKA_BOOTSTRAP=<hostname>:9094

For StatefulSet deployment:
  kubectl get svc kafka-service -n kafka -o jsonpath='{.status.loadBalancer.ingress[0].hostname}'
  Then: export KAFKA_BOOTSTRAP=<hostname>:9092

For local development:
  export KAFKA_BOOTSTRAP=localhost:9094";

#[derive(Debug, Parser)]
#[command(name = "kafka-client", version, about = "Kafka producer/consumer for a single topic")]
#[command(group = clap::ArgGroup::new("mode")
    .required(true)
    .args(["produce", "consume", "show_bootstrap"]))]
struct Cli {
    /// Message to send to Kafka
    #[arg(long, value_name = "MESSAGE")]
    produce: Option<String>,

    /// Start consuming messages
    #[arg(long)]
    consume: bool,

    /// Show instructions for finding the bootstrap server
    #[arg(long)]
    show_bootstrap: bool,

    /// Topic to produce to or consume from
    #[arg(long, env = "KAFKA_TOPIC", default_value = "test-topic")]
    topic: String,

    /// Comma-separated list of Kafka brokers
    #[arg(long, env = "KAFKA_BOOTSTRAP")]
    bootstrap: Option<String>,

    /// Security protocol (plaintext, ssl, sasl_plaintext, sasl_ssl)
    #[arg(long, default_value = "plaintext")]
    security: SecurityMode,

    /// Consumer group ID
    #[arg(long)]
    group: Option<String>,

    /// Offset reset policy when the group has no committed offset (earliest, latest)
    #[arg(long)]
    offset_reset: Option<OffsetReset>,

    /// JSON session configuration; --bootstrap, --group and --offset-reset override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.show_bootstrap {
        println!("{BOOTSTRAP_INSTRUCTIONS}");
        return ExitCode::SUCCESS;
    }

    let config = match session_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            eprintln!("Configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.produce {
        Some(message) => produce(&config, &cli.topic, message).await,
        None => consume(&config, &cli.topic).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn session_config(cli: &Cli) -> anyhow::Result<SessionConfig> {
    let mut config = match (&cli.config, &cli.bootstrap) {
        (Some(path), bootstrap) => {
            let mut config = SessionConfig::from_json_file(path)?;
            if let Some(bootstrap) = bootstrap {
                config.bootstrap = bootstrap.clone();
            }
            config
        }
        (None, Some(bootstrap)) => SessionConfig::new(bootstrap.as_str(), cli.security),
        (None, None) => {
            eprintln!("WARNING: Using default bootstrap server '{}'", kafka::LOCAL_BOOTSTRAP);
            eprintln!("{BOOTSTRAP_INSTRUCTIONS}");
            SessionConfig::local_fallback(cli.security)
        }
    };

    if let Some(group) = &cli.group {
        config = config.with_group_id(group.as_str());
    }
    if let Some(policy) = cli.offset_reset {
        config = config.with_offset_reset(policy);
    }
    Ok(config)
}

async fn produce(config: &SessionConfig, topic: &str, message: &str) -> anyhow::Result<ExitCode> {
    let producer = Producer::new(config)?;
    let outcome = producer.publish(topic, message.as_bytes()).await;
    println!("{outcome}");
    Ok(ExitCode::from(outcome.exit_code()))
}

async fn consume(config: &SessionConfig, topic: &str) -> anyhow::Result<ExitCode> {
    let subscriber = Subscriber::new(config)?;

    let shutdown_handle = subscriber.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal (Ctrl+C)");
                shutdown_handle.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    subscriber.run(topic, &mut std::io::stdout()).await?;
    Ok(ExitCode::SUCCESS)
}
