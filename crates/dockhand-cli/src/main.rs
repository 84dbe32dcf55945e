#![deny(unsafe_code)]

//! Dockhand CLI: talk to the local container engine over its Unix socket.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dockhand_config::AppConfig;
use dockhand_config::credentials::CredentialsFile;
use dockhand_core::{EngineClient, PullObserver, PullProgress, StreamKind};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Dockhand, a small client for the container engine API.
#[derive(Parser)]
#[command(
    name = "dockhand",
    version = dockhand_core::build_info::LONG_VERSION,
    about,
    long_about = None
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "dockhand.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the engine answers.
    Ping,

    /// Show engine version details.
    Version,

    /// Show engine-wide information.
    Info,

    /// List images.
    Images,

    /// List containers.
    Ps {
        /// Include stopped containers.
        #[arg(short, long)]
        all: bool,
    },

    /// Pull an image, printing per-layer progress.
    Pull {
        /// Image reference, e.g. `alpine:3.20`.
        image: String,
    },

    /// Run a command in a running container.
    Exec {
        container: String,

        /// Command and arguments.
        #[arg(last = true, required = true)]
        cmd: Vec<String>,
    },

    /// Print a container's logs.
    Logs {
        container: String,

        /// Keep streaming new output.
        #[arg(short, long)]
        follow: bool,

        /// Only the last N lines.
        #[arg(long)]
        tail: Option<u32>,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose, &config))),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Config { show } = cli.command {
        return cmd_config(&cli.config, &config, show, &mut std::io::stdout());
    }

    let client = connect(&config).await?;
    let mut out = std::io::stdout();
    match cli.command {
        Commands::Ping => cmd_ping(&client, &mut out).await?,
        Commands::Version => cmd_version(&client, &mut out).await?,
        Commands::Info => cmd_info(&client, &mut out).await?,
        Commands::Images => cmd_images(&client, &mut out).await?,
        Commands::Ps { all } => cmd_ps(&client, all, &mut out).await?,
        Commands::Pull { image } => cmd_pull(&client, &image, &mut out).await?,
        Commands::Exec { container, cmd } => {
            let code = cmd_exec(&client, &container, &cmd, &mut out, &mut std::io::stderr()).await?;
            out.flush()?;
            std::process::exit(i32::try_from(code).unwrap_or(1));
        }
        Commands::Logs {
            container,
            follow,
            tail,
        } => cmd_logs(&client, &container, follow, tail, &mut out, &mut std::io::stderr()).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

/// Verbosity flags win over the configured level.
fn log_filter(verbose: u8, config: &AppConfig) -> String {
    match verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        AppConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))
    } else {
        debug!(path = %path.display(), "Config file not found, using defaults");
        Ok(AppConfig::default())
    }
}

/// Build a client, picking up registry credentials from the home directory.
async fn connect(config: &AppConfig) -> Result<EngineClient> {
    let client = EngineClient::from_config(&config.engine)?;
    let Some(home) = std::env::var_os("HOME") else {
        return Ok(client);
    };
    let path = CredentialsFile::default_path(Path::new(&home));
    match CredentialsFile::load(&path).await? {
        Some(credentials) => {
            if let Some(store) = &credentials.creds_store {
                debug!(store = %store, "Credential helpers are not consulted");
            }
            Ok(client.with_credentials(credentials))
        }
        None => Ok(client),
    }
}

// ── Commands ────────────────────────────────────────────────────────────

fn cmd_config(path: &Path, config: &AppConfig, show: bool, out: &mut impl Write) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("serializing configuration")?;
        writeln!(out, "{toml_str}")?;
    } else {
        writeln!(out, "Configuration at '{}' is valid.", path.display())?;
    }
    Ok(())
}

async fn cmd_ping(client: &EngineClient, out: &mut impl Write) -> Result<()> {
    let reply = client.ping().await?;
    writeln!(out, "{reply}")?;
    Ok(())
}

async fn cmd_version(client: &EngineClient, out: &mut impl Write) -> Result<()> {
    let v = client.version().await?;
    writeln!(out, "Client:       {}", dockhand_core::build_info::LONG_VERSION)?;
    writeln!(out, "Version:      {}", v.version)?;
    writeln!(out, "API version:  {} (minimum {})", v.api_version, v.min_api_version)?;
    writeln!(out, "OS/Arch:      {}/{}", v.os, v.arch)?;
    writeln!(out, "Kernel:       {}", v.kernel_version)?;
    Ok(())
}

async fn cmd_info(client: &EngineClient, out: &mut impl Write) -> Result<()> {
    let info = client.info().await?;
    writeln!(out, "Name:        {}", info.name)?;
    writeln!(
        out,
        "Containers:  {} (running {}, paused {}, stopped {})",
        info.containers, info.containers_running, info.containers_paused, info.containers_stopped
    )?;
    writeln!(out, "Images:      {}", info.images)?;
    Ok(())
}

async fn cmd_images(client: &EngineClient, out: &mut impl Write) -> Result<()> {
    let images = client.images().list(false).await?;
    writeln!(out, "{:<40} {:<12} {:>10}", "REPOSITORY:TAG", "IMAGE ID", "SIZE")?;
    for image in images {
        let tags = image.repo_tags.unwrap_or_default();
        let tag = tags.first().map(String::as_str).unwrap_or("<none>");
        writeln!(
            out,
            "{:<40} {:<12} {:>10}",
            tag,
            short_id(&image.id),
            human_size(image.size)
        )?;
    }
    Ok(())
}

async fn cmd_ps(client: &EngineClient, all: bool, out: &mut impl Write) -> Result<()> {
    let containers = client.containers().list(all).await?;
    writeln!(out, "{:<12} {:<24} {:<30} {}", "CONTAINER ID", "NAME", "IMAGE", "STATUS")?;
    for c in containers {
        let name = c.names.first().map(|n| n.trim_start_matches('/')).unwrap_or("");
        writeln!(
            out,
            "{:<12} {:<24} {:<30} {}",
            short_id(&c.id),
            name,
            c.image,
            c.status
        )?;
    }
    Ok(())
}

async fn cmd_pull(client: &EngineClient, image: &str, out: &mut impl Write) -> Result<()> {
    let mut printer = ProgressPrinter { out: &mut *out };
    let session = client.images().pull(image, &mut printer).await?;
    writeln!(out, "Pulled {image} ({} layers)", session.layers().len())?;
    Ok(())
}

async fn cmd_exec(
    client: &EngineClient,
    container: &str,
    cmd: &[String],
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<i64> {
    let mut stream = client.exec().run_streaming(container, cmd, &[]).await?;
    let mut stdout_open = true;
    let mut stderr_open = true;
    while stdout_open || stderr_open {
        tokio::select! {
            chunk = stream.stdout.recv(), if stdout_open => match chunk {
                Some(text) => {
                    out.write_all(text.as_bytes())?;
                    out.flush()?;
                }
                None => stdout_open = false,
            },
            chunk = stream.stderr.recv(), if stderr_open => match chunk {
                Some(text) => {
                    err.write_all(text.as_bytes())?;
                    err.flush()?;
                }
                None => stderr_open = false,
            },
        }
    }
    let code = stream.exit_code.await?;
    info!(container, code, "Exec finished");
    Ok(code)
}

async fn cmd_logs(
    client: &EngineClient,
    container: &str,
    follow: bool,
    tail: Option<u32>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<()> {
    let mut logs = client.containers().logs(container, follow, tail).await?;
    while let Some(frame) = logs.next_frame().await? {
        match frame.kind {
            StreamKind::Stdout => out.write_all(&frame.payload)?,
            StreamKind::Stderr => err.write_all(&frame.payload)?,
            StreamKind::Stdin => {}
        }
    }
    out.flush()?;
    Ok(())
}

// ── Output helpers ──────────────────────────────────────────────────────

/// Prints one line per layer event.
struct ProgressPrinter<W: Write> {
    out: W,
}

impl<W: Write> PullObserver for ProgressPrinter<W> {
    fn on_layers_discovered(&mut self, layers: &[String]) {
        let _ = writeln!(self.out, "Found {} layers", layers.len());
    }

    fn on_progress(&mut self, layer: &str, progress: &PullProgress) {
        let line = match progress {
            PullProgress::Pulling {
                bytes_total,
                bytes_pulled,
            } if *bytes_total == 0 => {
                format!("{layer}: downloading {}", human_size(*bytes_pulled as i64))
            }
            PullProgress::Pulling {
                bytes_total,
                bytes_pulled,
            } => format!(
                "{layer}: downloading {}/{}",
                human_size(*bytes_pulled as i64),
                human_size(*bytes_total as i64)
            ),
            PullProgress::Downloaded => format!("{layer}: pull complete"),
            PullProgress::Extracting { current, unit } => {
                format!("{layer}: extracting {current} {unit}")
            }
        };
        let _ = writeln!(self.out, "{line}");
    }
}

/// First 12 hex digits of an engine id.
fn short_id(id: &str) -> &str {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    match id.char_indices().nth(12) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn human_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}
