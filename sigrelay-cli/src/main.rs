//! Sigrelay CLI

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use sigrelay_config::{load_config, read_config, validate_config, Config, LogFormat};
use sigrelay_runtime::{ServerBuilder, SignalHandler};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sigrelay")]
#[command(about = "Restrictive relay for OCSP, TSP and CMP trust services", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay
    Serve {
        /// Path to configuration file; built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listening port, overriding the configured one
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Log level or filter directive (trace, debug, info, warn, error)
        #[arg(short, long)]
        log_level: Option<String>,

        /// Log output format
        #[arg(long, value_enum)]
        log_format: Option<FormatArg>,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },

    /// Show whether a destination would be relayed, and how it would be labeled
    Check {
        /// Destination URL
        url: String,

        /// Path to configuration file; built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for LogFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => LogFormat::Text,
            FormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            log_level,
            log_format,
        } => {
            let mut cfg = read_config(config.as_ref())?;
            if let Some(port) = port {
                cfg.set_port(port);
            }

            let logging = &cfg.observability.logging;
            init_tracing(
                log_level.as_deref().unwrap_or(&logging.level),
                log_format.map(LogFormat::from).unwrap_or(logging.format),
            )?;

            tracing::info!("Starting sigrelay");
            if let Some(ref path) = config {
                tracing::info!("Config file: {}", path.display());
            }
            validate_config(&cfg)?;
            tracing::info!(
                listen = %cfg.server.listen,
                profile = ?cfg.relay.profile,
                "Configuration loaded"
            );

            let server = ServerBuilder::new().config(cfg).build()?;

            let shutdown_signal = server.shutdown_signal();
            tokio::spawn(async move {
                let handler = SignalHandler::new(shutdown_signal);
                handler.run().await;
            });

            server.run().await?;

            tracing::info!("Server stopped");
            Ok(())
        }

        Commands::Validate { config } => {
            tracing_subscriber::fmt().with_target(false).init();

            tracing::info!("Validating configuration: {}", config.display());

            match load_config(Some(&config)) {
                Ok(cfg) => {
                    tracing::info!("✓ Configuration is valid");
                    tracing::info!("  Listen: {}", cfg.server.listen);
                    tracing::info!("  Profile: {:?}", cfg.relay.profile);
                    tracing::info!("  Allowlisted hosts: {}", cfg.relay.allowlist.len());
                    tracing::info!(
                        "  Static dir: {}",
                        cfg.server
                            .static_dir
                            .as_ref()
                            .map(|d| d.display().to_string())
                            .unwrap_or_else(|| "none".to_string())
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Check { url, config } => {
            let cfg = load_config(config.as_ref())?;
            if !check(&cfg, &url) {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Version => {
            println!("sigrelay");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

/// Print the admission outcome for `url`; returns whether it was admitted
fn check(config: &Config, url: &str) -> bool {
    match config.relay.allowlist().admit(url) {
        Ok(destination) => {
            let content_type = config.relay.content_table().resolve(destination.path()).to_string();
            println!("admitted: {destination}");
            println!("  host: {}", destination.host());
            println!("  path: {}", destination.path());
            if content_type.is_empty() {
                println!("  content-type: (omitted)");
            } else {
                println!("  content-type: {content_type}");
            }
            true
        }
        Err(reason) => {
            println!("rejected: {reason}");
            false
        }
    }
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()?,
    }

    Ok(())
}
