// # webhunterd - WebHunter Daemon
//
// Thin integration layer over webhunter-core. All polling, deduplication and
// dispatch logic lives in the core crate; this binary only:
// 1. Parses the command line
// 2. Loads the configuration file and sets up logging
// 3. Opens the seen store and registers the built-in plugins
// 4. Runs one cycle (`--oneshot`) or the scheduler until a signal stops it
//
// ## Usage
//
// ```bash
// webhunterd -c /etc/webhunter.json            # run until SIGTERM
// webhunterd -c /etc/webhunter.json --reseed   # mark everything seen first
// webhunterd -c ./webhunter.json -1 -v         # one verbose cycle, then exit
// ```
//
// ## Signals
//
// - `SIGHUP`: reload the configuration file
// - `SIGTERM`, `SIGINT`: flush state and exit
//
// ## Environment
//
// - `WEBHUNTER_LOG_LEVEL`: trace, debug, info, warn or error; overrides `-v`
// - `NOTIFY_SOCKET`: set by systemd for `Type=notify` units

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use webhunter_core::{
    Command, ConfigHandle, EngineEvent, FileConfigLoader, PluginRegistry, PollEngine, Scheduler,
    WebHunterConfig, liveness, open_store,
};

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WebHunterExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WebHunterExitCode> for ExitCode {
    fn from(code: WebHunterExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Watch listing sites and push a notification when something new appears
#[derive(Debug, Parser)]
#[command(name = "webhunterd", version, about)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long = "configfile", default_value = "/etc/webhunter.json")]
    configfile: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Mark every currently listed item as seen without notifying
    #[arg(long)]
    reseed: bool,

    /// Run all sources and comms once, then exit
    #[arg(short = '1', long)]
    oneshot: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration before logging: `server.debug` decides the level
    let config = match WebHunterConfig::from_file(&args.configfile) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return WebHunterExitCode::ConfigError.into();
        }
    };

    let log_level = match log_level(args.verbose || config.server.debug) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return WebHunterExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WebHunterExitCode::ConfigError.into();
    }

    info!("Starting webhunterd {}", env!("CARGO_PKG_VERSION"));
    debug!("Running in verbose mode");
    if config.server.simulate {
        info!("Server is in simulation mode, NO MESSAGES WILL BE SENT");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WebHunterExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(args, config)).into()
}

/// Log level from `WEBHUNTER_LOG_LEVEL`, else debug or info
fn log_level(verbose: bool) -> Result<Level> {
    let Ok(level) = env::var("WEBHUNTER_LOG_LEVEL") else {
        return Ok(if verbose { Level::DEBUG } else { Level::INFO });
    };

    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "WEBHUNTER_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Run the daemon
async fn run_daemon(args: Args, config: WebHunterConfig) -> WebHunterExitCode {
    let engine = match start(config).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return startup_exit_code(&e);
        }
    };

    engine.announce_startup().await;

    if args.reseed {
        info!("Reseeding seen store");
        let marked = engine.seed().await;
        info!("Reseeded {} item(s)", marked);
    }

    if args.oneshot {
        return run_once(&engine).await;
    }

    let signals = match SignalForwarder::install() {
        Ok(signals) => signals,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return WebHunterExitCode::ConfigError;
        }
    };

    let (command_tx, command_rx) = mpsc::channel(16);
    let forwarder = tokio::spawn(signals.forward(command_tx));

    let scheduler = Arc::new(
        Scheduler::new(
            Arc::clone(&engine),
            FileConfigLoader::new(args.configfile.clone()),
        )
        .with_liveness(liveness::from_env()),
    );

    let result = scheduler.run_to_completion(command_rx).await;
    forwarder.abort();

    match result {
        Ok(()) => {
            info!("Shutting down daemon");
            WebHunterExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            WebHunterExitCode::RuntimeError
        }
    }
}

/// Configuration and plugin errors are the operator's to fix; anything else
/// (an unreachable store, say) is a runtime failure
fn startup_exit_code(e: &anyhow::Error) -> WebHunterExitCode {
    match e.downcast_ref::<webhunter_core::Error>() {
        Some(core) if !core.is_fatal_at_startup() => WebHunterExitCode::RuntimeError,
        _ => WebHunterExitCode::ConfigError,
    }
}

/// Open the store, load the plugins and build the engine
async fn start(config: WebHunterConfig) -> Result<PollEngine> {
    let store = open_store(&config.server.store)
        .await
        .context("Failed to open seen store")?;

    let registry = build_registry().context("Failed to register plugins")?;
    debug!(
        "Registered sources {:?}, comms {:?}",
        registry.list_sources(),
        registry.list_comms()
    );

    let handle = ConfigHandle::new(config);
    let sources = registry.load_sources(&handle, store.clone())?;
    let comms = registry.load_comms(&handle)?;

    if sources.is_empty() {
        warn!("No active sources configured; nothing will be polled");
    }
    if comms.is_empty() {
        warn!("No active comms configured; new items will only be logged");
    }
    info!(
        "Loaded {} source(s) and {} comm(s)",
        sources.len(),
        comms.len()
    );

    let (engine, events) = PollEngine::new(sources, comms, handle, store);
    tokio::spawn(log_events(events));
    Ok(engine)
}

/// Registry with every plugin compiled into this binary
fn build_registry() -> Result<PluginRegistry> {
    #[allow(unused_mut)]
    let mut registry = PluginRegistry::new();

    #[cfg(feature = "feed")]
    {
        debug!("Registering feed sources");
        webhunter_source_feed::register(&mut registry)?;
    }

    #[cfg(feature = "http-comm")]
    {
        debug!("Registering HTTP comms");
        webhunter_comm_http::register(&mut registry)?;
    }

    Ok(registry)
}

/// One cycle, then flush and exit
async fn run_once(engine: &PollEngine) -> WebHunterExitCode {
    let report = engine.run_cycle().await;
    info!(
        "One-shot cycle done: {} new item(s), {} failed source(s)",
        report.novel_count(),
        report.failed_sources.len()
    );

    if let Err(e) = engine.flush().await {
        error!("Failed to flush seen store: {}", e);
        return WebHunterExitCode::RuntimeError;
    }
    WebHunterExitCode::CleanShutdown
}

/// Trace engine events; the engine never waits for this task
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        tracing::trace!(?event, "engine event");
    }
}

/// Turns process signals into scheduler commands
#[cfg(unix)]
struct SignalForwarder {
    sighup: Signal,
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl SignalForwarder {
    fn install() -> Result<Self> {
        Ok(Self {
            sighup: signal(SignalKind::hangup()).context("Failed to setup SIGHUP handler")?,
            sigterm: signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?,
            sigint: signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?,
        })
    }

    async fn forward(mut self, commands: mpsc::Sender<Command>) {
        loop {
            let (command, name) = tokio::select! {
                _ = self.sighup.recv() => (Command::Reload, "SIGHUP"),
                _ = self.sigterm.recv() => (Command::Shutdown, "SIGTERM"),
                _ = self.sigint.recv() => (Command::Shutdown, "SIGINT"),
            };
            info!("Received {}", name);

            if commands.send(command).await.is_err() || command == Command::Shutdown {
                break;
            }
        }
    }
}

/// Ctrl-C only; configuration reload is unavailable
#[cfg(not(unix))]
struct SignalForwarder;

#[cfg(not(unix))]
impl SignalForwarder {
    fn install() -> Result<Self> {
        info!("SIGHUP not supported by system, configuration reloading disabled");
        Ok(Self)
    }

    async fn forward(self, commands: mpsc::Sender<Command>) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL-C"),
            Err(e) => error!("Failed to wait for CTRL-C: {}", e),
        }
        let _ = commands.send(Command::Shutdown).await;
    }
}
