//! Binary entrypoint: parse settings, start the scheduler, serve the API.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use inky_frame::display::{self, DisplayMode};
use inky_frame::widgets::text;
use inky_frame::{api, AppContext, Settings};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

/// Photo frame controller for Inky Impression e-ink displays
#[derive(Debug, Parser)]
#[command(name = "inky-frame", version, about)]
struct Cli {
    /// Directory holding config.json, photos/ and originals/
    #[arg(long, env = "DATA_DIR", default_value = "/data")]
    data_dir: PathBuf,

    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Display implementation: auto, hardware or simulated
    #[arg(long, env = "DISPLAY_MODE", default_value = "auto")]
    display_mode: DisplayMode,

    /// Panel device node
    #[arg(long, env = "DISPLAY_DEVICE", default_value = "/dev/inky")]
    display_device: PathBuf,

    /// Font file for text widgets (system fonts when unset)
    #[arg(long, env = "FONT_PATH")]
    font_path: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

impl From<Cli> for Settings {
    fn from(cli: Cli) -> Self {
        Settings {
            data_dir: cli.data_dir,
            host: cli.host,
            port: cli.port,
            display_mode: cli.display_mode,
            display_device: cli.display_device,
            font_path: cli.font_path,
        }
    }
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("inky_frame={level},tower_http={level}")))
        .context("invalid log filter")?;
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let settings = Settings::from(cli);

    text::init_font(settings.font_path.as_deref());
    let display = display::select(settings.display_mode, &settings.display_device);

    let cancel = CancellationToken::new();
    let (ctx, scheduler) = AppContext::start(&settings, display, cancel.clone())
        .with_context(|| format!("opening data dir {}", settings.data_dir.display()))?;

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, api::router(ctx))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
                _ = shutdown.cancelled() => {}
            }
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    cancel.cancel();
    scheduler.await.context("scheduler task panicked")?;
    Ok(())
}
