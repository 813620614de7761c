use std::{
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use console_core::{Environment, HttpEnvironment, InMemoryEnvironment};
use crossbeam_channel::bounded;
use tracing_subscriber::EnvFilter;

mod backend_bridge;
mod controller;
mod fixture;
mod settings;
mod ui;

use crate::{backend_bridge::runtime, fixture::Fixture, settings::load_settings, ui::session::Session};

/// Headless service inspector: drives the configuration form and the
/// machine panel from a line script.
#[derive(Parser, Debug)]
struct Args {
    /// JSON fixture with charms, the service and its machines.
    #[arg(long)]
    fixture: Option<PathBuf>,
    /// Script to run; reads stdin when omitted.
    #[arg(long)]
    script: Option<PathBuf>,
    #[arg(long, default_value = "console.toml")]
    settings: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(&args.settings)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let fixture = match &args.fixture {
        Some(path) => Fixture::load(path)?,
        None => Fixture::demo(),
    };

    let env: Arc<dyn Environment> = match settings.api_url()? {
        Some(url) => {
            tracing::info!(%url, "using remote environment");
            Arc::new(HttpEnvironment::new(url.as_str())?)
        }
        None => InMemoryEnvironment::with_latency(
            fixture.environment_services(),
            settings.environment_latency(),
        ),
    };

    let (cmd_tx, cmd_rx) = bounded(settings.command_queue);
    let (ui_tx, ui_rx) = bounded(1024);
    let worker = runtime::launch(env, cmd_rx, ui_tx.clone());

    let mut session = Session::start(&fixture, &settings, cmd_tx, ui_tx, ui_rx, io::stdout())?;
    let outcome = match &args.script {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open script '{}'", path.display()))?;
            session.run(BufReader::new(file))
        }
        None => session.run(io::stdin().lock()),
    };
    session.shutdown();
    drop(session);
    worker
        .join()
        .map_err(|_| anyhow!("backend worker panicked"))?;
    outcome
}
