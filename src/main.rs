//! The iv host binary.
//!
//! Discovers the images named on the command line, prepares the view's
//! profile and runs the window's event loop with the view attached over
//! stdio. Frames go out on stdout, logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use iv::client::DEFAULT_COMPILER;
use iv::library::MAX_DEBOUNCE;
use iv::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(200);
const MAX_DEBOUNCE_MS: u64 = MAX_DEBOUNCE.as_millis() as u64;

#[derive(Parser, Debug)]
#[command(name = "iv", version, about = "A minimal image viewer")]
struct Cli {
    /// Image files or directories to display
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Directory holding the page sources (index.html, *.pyj)
    #[arg(long)]
    client_dir: Option<PathBuf>,

    /// Compiler used for the page script
    #[arg(long, default_value = DEFAULT_COMPILER)]
    compiler: String,

    /// Do not persist view cache or storage
    #[arg(long)]
    private: bool,

    /// Quiet period in milliseconds before filesystem changes are applied
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(..=MAX_DEBOUNCE_MS))]
    debounce_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("iv=info".parse()?))
        .init();

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("Unhandled error: {}", info);
        default_hook(info);
    }));

    let cli = Cli::parse();

    let collected = discover(&cli.files)?;
    tracing::info!("Showing {} images", collected.files.len());

    let dirs = AppDirs::resolve()?;
    let config = Config::load_or_default(&dirs.settings_path());

    let mut profile = if cli.private {
        Profile::private()
    } else {
        Profile::persistent(&dirs.cache_dir).with_context(|| {
            format!("Failed to prepare view storage in {}", dirs.cache_dir.display())
        })?
    };

    let mut scripts = vec![files_data(&collected.files, config.values())?];
    let url = match &cli.client_dir {
        Some(dir) => {
            let bundle = ClientBundle::new(dir, cli.compiler.as_str());
            scripts.push(bundle.load_script()?);
            Some(bundle.index_url())
        }
        None => None,
    };
    profile.insert_scripts(scripts);

    let (watcher, fs_events) = NotifyWatcher::new()?;
    let reconciler = Reconciler::new(collected, watcher, Duration::from_millis(cli.debounce_ms));
    let (view, view_events) = View::new(JsonLinesView::new(std::io::stdout()), profile, url);

    let window = MainWindow::new(reconciler, view, config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let (frame_tx, frames) = mpsc::unbounded_channel();
        spawn_stdin_reader(frame_tx);

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        window.run(fs_events, frames, view_events, shutdown).await;
    });

    // A blocked stdin read would otherwise hold the runtime open.
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    Ok(())
}
