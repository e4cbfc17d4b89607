//! zone-amp - command-line control for a multi-zone amplifier

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multizone_amp::{AmpClient, AmpConfig, Attribute, CommandValue, ToneDefaults, Zone};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Control a multi-zone amplifier over its serial port
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial device (overrides SERIAL_PORT)
    #[arg(short, long)]
    port: Option<PathBuf>,

    /// Baud rate (overrides BAUD)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Reply timeout in milliseconds (overrides REPLY_TIMEOUT_MS)
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the status of one zone, or of every zone
    Status {
        zone: Option<Zone>,
    },

    /// Set an attribute (power, volume, source, mute, treble, bass, balance)
    Set {
        zone: Zone,
        attribute: String,
        /// Number, or on/off for power and mute
        value: String,
    },

    /// Apply tone defaults to every zone
    Defaults {
        #[arg(long, default_value_t = ToneDefaults::default().bass)]
        bass: u8,
        #[arg(long, default_value_t = ToneDefaults::default().treble)]
        treble: u8,
        #[arg(long, default_value_t = ToneDefaults::default().balance)]
        balance: u8,
    },

    /// Print status replies as they arrive
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = AmpConfig::from_env().context("Invalid environment configuration")?;
    if let Some(port) = args.port {
        config = config.with_port_path(port);
    }
    if let Some(baud) = args.baud {
        config = config.with_baud_rate(baud);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config = config.with_reply_timeout(Duration::from_millis(timeout_ms));
    }

    let client = AmpClient::connect(&config)
        .await
        .with_context(|| format!("Failed to open {}", config.port_path.display()))?;

    match args.command {
        Command::Status { zone: Some(zone) } => {
            let state = client.query(zone).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Status { zone: None } => {
            let states = client.query_all().await?;
            println!("{}", serde_json::to_string_pretty(&states)?);
        }
        Command::Set {
            zone,
            attribute,
            value,
        } => {
            let attribute: Attribute = attribute.parse()?;
            let value: CommandValue = value.parse()?;
            let outcome = client.set(zone, attribute, value).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Defaults {
            bass,
            treble,
            balance,
        } => {
            client
                .apply_defaults(&ToneDefaults {
                    bass,
                    treble,
                    balance,
                })
                .await?;
            println!("Done.");
        }
        Command::Watch => {
            let mut updates = client.subscribe_status();
            loop {
                tokio::select! {
                    update = updates.recv() => {
                        println!("{}", serde_json::to_string(&update?)?);
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
