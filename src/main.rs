//! # Potbot Viewer Entry Point
//!
//! Command-line front end for the potbot backend: account management, plant
//! registration, and charting a plant's sensor logs over a time window.
//! Charts render as ASCII on stdout, as aligned JSON rows, or as a PBM image.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use potbot_lib::client::{ClientError, NewPlant, PotbotClient, Registration, User};
use potbot_lib::config::Config;
use potbot_lib::renderer::{draw_chart, render_ascii, Canvas};
use potbot_lib::session::SessionCache;
use potbot_lib::view::{PlantLogView, TimeWindow, ViewError};
use potbot_lib::Timestamp;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Plot columns for ASCII charts
const ASCII_WIDTH: usize = 72;

#[derive(Parser, Debug)]
#[command(name = "potbot-viewer", version, about = "Chart potbot plant sensor logs")]
struct Cli {
    /// Path to the configuration file [default: potbot-config.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and log in
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    /// Log in and cache the session
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// End the session
    Logout,
    /// Show the logged-in user, verifying the session with the backend
    Me,
    /// List your plants
    Plants,
    /// Claim a plant id
    AddPlant {
        #[arg(long)]
        id: String,
        /// One of: tomato, basil, succulent
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Chart a plant's sensor logs
    Logs {
        #[arg(long)]
        plant: String,
        /// Window start (RFC 3339); defaults to `window_days` before the end
        #[arg(long)]
        start: Option<Timestamp>,
        /// Window end (RFC 3339); defaults to now
        #[arg(long)]
        end: Option<Timestamp>,
        #[arg(long, value_enum, default_value_t = Format::Ascii)]
        format: Format,
        /// Output file; required for `pbm`, stdout otherwise
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Ascii,
    Json,
    Pbm,
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "potbot_viewer=info,potbot_lib=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let cache = SessionCache::new(config.session.cache_path.clone(), config.session_ttl());
    let session = cache.current();
    let mut client = PotbotClient::from_config(&config)?
        .with_session(session.as_ref().map(|s| s.cookie.clone()));

    match cli.command {
        Command::Register {
            username,
            email,
            password,
            confirm,
        } => {
            let form = Registration {
                username,
                email,
                password,
                confirm_password: confirm,
            };
            let user = client.register(&form).await?;
            remember(&cache, &client, &user);
            println!("Registered and logged in as {}", user.username);
        }
        Command::Login { username, password } => {
            let user = client.login(&username, &password).await?;
            remember(&cache, &client, &user);
            println!("Logged in as {}", user.username);
        }
        Command::Logout => {
            let result = client.logout().await;
            cache.invalidate()?;
            result?;
            println!("Logged out");
        }
        Command::Me => {
            let user = logged_in(cache.check(client.me().await))?;
            println!("{} <{}> (id {})", user.username, user.email, user.user_id);
        }
        Command::Plants => {
            let plants = logged_in(cache.check(client.plants().await))?;
            if plants.is_empty() {
                println!("No plants yet");
            }
            for plant in plants {
                println!("{:<14} {:<10} {}", plant.id, plant.kind, plant.name);
            }
        }
        Command::AddPlant { id, kind, name } => {
            let plant = NewPlant::new(&id, &kind, name.as_deref())?;
            logged_in(cache.check(client.add_plant(&plant).await))?;
            println!("Plant added successfully");
        }
        Command::Logs {
            plant,
            start,
            end,
            format,
            out,
        } => {
            let end = end.unwrap_or_else(chrono::Utc::now);
            let window = match start {
                Some(start) => TimeWindow::new(start, end)?,
                None => TimeWindow::ending_at(end, config.view.window_days)?,
            };

            let mut view = PlantLogView::new(plant, window);
            let table = match view.refresh(&client).await {
                Ok(table) => table,
                Err(ViewError::Unauthorized) => {
                    cache.forget();
                    bail!(ViewError::Unauthorized);
                }
                Err(err) => return Err(err.into()),
            };
            info!(rows = table.len(), "aligned sensor logs");

            match format {
                Format::Ascii => {
                    let text = render_ascii(table, config.view.ascii_rows, ASCII_WIDTH);
                    write_output(out, text.as_bytes())?;
                }
                Format::Json => {
                    let json = serde_json::to_string_pretty(table)?;
                    write_output(out, json.as_bytes())?;
                }
                Format::Pbm => {
                    let Some(path) = out else {
                        bail!("--out is required for pbm output");
                    };
                    let mut canvas = Canvas::new(config.view.width, config.view.height);
                    match draw_chart(table, &mut canvas) {
                        Ok(()) => {}
                        Err(never) => match never {},
                    }
                    std::fs::write(&path, canvas.to_pbm())
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Chart written to {}", path.display());
                }
            }
        }
    }

    Ok(())
}

/// Cache the session after login or registration. Failing to cache is non-fatal.
fn remember(cache: &SessionCache, client: &PotbotClient, user: &User) {
    if let Err(err) = cache.remember(client, user) {
        warn!(error = %err, "could not cache session");
    }
}

/// Point a rejected session at the login command.
fn logged_in<T>(result: Result<T, ClientError>) -> anyhow::Result<T> {
    match result {
        Err(err @ ClientError::Unauthorized(_)) => {
            Err(anyhow::Error::new(err).context("not logged in, run `potbot-viewer login`"))
        }
        other => Ok(other?),
    }
}

fn write_output(out: Option<PathBuf>, bytes: &[u8]) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))
        }
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
