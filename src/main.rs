mod alarm;
mod api;
mod console;
mod logging;
mod runtime;
mod script;
mod ticker;
mod time_provider;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use crate::alarm::model::{EngineSettings, load_engine_config};
use crate::api::{ApiServer, ApiServerConfig};
use crate::console::{TerminalBell, run_console};
use crate::runtime::Runtime;
use crate::script::{load_script, run_script};
use crate::time_provider::SystemTimeProvider;

#[derive(Parser, Debug)]
#[command(
    name = "snoozeclock",
    version,
    about = "Minute-resolution alarm clock with snooze"
)]
struct Cli {
    /// Engine settings file (snooze length, snooze limit, notice and tick timing).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay a scenario against a simulated clock and exit.
    #[arg(long)]
    script: Option<PathBuf>,

    #[arg(long, default_value = "warn")]
    log_level: String,

    #[arg(long, default_value = "127.0.0.1")]
    api_bind: String,

    #[arg(long, default_value_t = 8099)]
    api_port: u16,

    #[arg(long)]
    no_api: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let settings = match &cli.config {
        Some(path) => {
            load_engine_config(path)
                .with_context(|| format!("failed to load {}", path.display()))?
                .settings
        }
        None => EngineSettings::default(),
    };

    if let Some(path) = &cli.script {
        let script =
            load_script(path).with_context(|| format!("failed to load {}", path.display()))?;
        let stdout = io::stdout();
        run_script(&script, &settings, &mut stdout.lock())?;
        return Ok(());
    }

    let runtime = Runtime::start(
        settings,
        Arc::new(SystemTimeProvider::new()),
        Box::new(TerminalBell),
    )?;

    let api_server = if cli.no_api {
        None
    } else {
        let server = ApiServer::start(
            ApiServerConfig {
                bind_addr: cli.api_bind.clone(),
                port: cli.api_port,
            },
            runtime.handle(),
        )
        .with_context(|| {
            format!(
                "failed to start local API at {}:{}",
                cli.api_bind, cli.api_port
            )
        })?;
        Some(server)
    };

    let console_result = run_console(&runtime.handle(), io::stdin().lock(), io::stdout());

    drop(api_server);
    drop(runtime);
    info!("snoozeclock exiting");
    console_result
}
