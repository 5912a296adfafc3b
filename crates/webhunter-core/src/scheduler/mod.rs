//! Scheduler
//!
//! Drives the [`PollEngine`] with jittered periodic polling: every tick picks
//! a fresh random delay within `[min, max]`, fixes the next deadline at
//! `now + delay`, then runs one cycle. Cycles never overlap; a slow cycle
//! only delays the next one.
//!
//! ## Commands
//!
//! Reload and shutdown requests arrive as [`Command`]s over a channel and are
//! handled between cycles, never during one. A closed channel is treated as
//! a shutdown request.
//!
//! ```rust,ignore
//! let (tx, rx) = tokio::sync::mpsc::channel(8);
//! let scheduler = Arc::new(Scheduler::new(engine, FileConfigLoader::new(path)));
//! tokio::spawn(async move { scheduler.run_to_completion(rx).await });
//! tx.send(Command::Reload).await?;
//! ```

use crate::config::WebHunterConfig;
use crate::engine::{FailureNotice, PollEngine};
use crate::error::{Error, Result};
use crate::liveness::{Liveness, LivenessState, NoLiveness};
use async_trait::async_trait;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

/// Added to `min` when the configured `max` is below it
pub const POLL_MARGIN: Duration = Duration::from_secs(5);

/// Longest accepted poll bound
pub const MAX_POLL_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Bounds of the random delay between two poll ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval {
    min: Duration,
    max: Duration,
}

impl PollInterval {
    /// Bounds in seconds; `max < min` is coerced to `min + 5s`
    pub fn from_secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    /// Bounds as durations; `max < min` is coerced to `min + 5s`
    ///
    /// Bounds above [`MAX_POLL_DELAY`] are clamped to it.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min > MAX_POLL_DELAY || max > MAX_POLL_DELAY {
            warn!(
                "Poll interval ({:?} to {:?}) exceeds {:?}, clamping",
                min, max, MAX_POLL_DELAY
            );
        }
        let min = min.min(MAX_POLL_DELAY);
        let max = max.min(MAX_POLL_DELAY);

        if max < min {
            let coerced = min.saturating_add(POLL_MARGIN);
            warn!(
                "Poll interval max ({:?}) below min ({:?}), using {:?}",
                max, min, coerced
            );
            return Self { min, max: coerced };
        }
        Self { min, max }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Uniformly random delay within the bounds
    pub fn sample(&self) -> Duration {
        let lo = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let hi = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        if lo >= hi {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

/// Requests handled by the scheduler loop between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Load a new configuration and apply it to every component, or to none
    Reload,
    /// Flush state and stop
    Shutdown,
}

/// Produces a fresh configuration snapshot on reload
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    async fn load(&self) -> Result<WebHunterConfig>;
}

/// Re-reads the configuration file the daemon started with
#[derive(Debug, Clone)]
pub struct FileConfigLoader {
    path: PathBuf,
}

impl FileConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigLoader for FileConfigLoader {
    async fn load(&self) -> Result<WebHunterConfig> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::config(format!(
                "Failed to read configuration file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        WebHunterConfig::from_json_str(&text)
    }
}

#[async_trait]
impl<F> ConfigLoader for F
where
    F: Fn() -> Result<WebHunterConfig> + Send + Sync,
{
    async fn load(&self) -> Result<WebHunterConfig> {
        self()
    }
}

/// Jittered polling loop around a [`PollEngine`]
pub struct Scheduler {
    engine: Arc<PollEngine>,
    interval: PollInterval,
    loader: Box<dyn ConfigLoader>,
    liveness: Box<dyn Liveness>,
}

impl Scheduler {
    /// Create a scheduler using the engine's configured poll interval
    ///
    /// The interval is read once; changing it takes a restart.
    pub fn new(engine: Arc<PollEngine>, loader: impl ConfigLoader + 'static) -> Self {
        let interval = engine.config().current().server.poll_interval();
        Self {
            engine,
            interval,
            loader: Box::new(loader),
            liveness: Box::new(NoLiveness),
        }
    }

    /// Override the poll interval
    pub fn with_interval(mut self, interval: PollInterval) -> Self {
        self.interval = interval;
        self
    }

    /// Report lifecycle changes to a supervisor
    pub fn with_liveness(mut self, liveness: Box<dyn Liveness>) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn interval(&self) -> PollInterval {
        self.interval
    }

    pub fn engine(&self) -> &Arc<PollEngine> {
        &self.engine
    }

    /// Poll until shutdown
    ///
    /// Returns once a [`Command::Shutdown`] arrives or the command channel
    /// closes, after flushing the seen store. Source, comm and reload errors
    /// never end the loop.
    pub async fn run(&self, mut commands: mpsc::Receiver<Command>) -> Result<()> {
        info!(
            "Polling every {:?} to {:?}",
            self.interval.min(),
            self.interval.max()
        );

        loop {
            let delay = self.interval.sample();
            let deadline = Instant::now() + delay;

            self.engine.run_cycle().await;
            debug!("Next poll in {:?}", deadline.saturating_duration_since(Instant::now()));

            loop {
                tokio::select! {
                    _ = sleep_until(deadline) => break,
                    command = commands.recv() => match command {
                        Some(Command::Reload) => {
                            if let Err(e) = self.reload().await {
                                warn!("Reload failed, keeping current configuration: {}", e);
                            }
                        }
                        Some(Command::Shutdown) => {
                            info!("Shutdown requested");
                            return self.engine.flush().await;
                        }
                        None => {
                            info!("Command channel closed, shutting down");
                            return self.engine.flush().await;
                        }
                    },
                }
            }
        }
    }

    /// Load a new snapshot and hand it to the engine
    ///
    /// The supervisor sees `Reloading` before and `Ready` after, whatever the
    /// outcome.
    pub async fn reload(&self) -> Result<()> {
        info!("Reloading configuration");
        self.liveness.notify(LivenessState::reloading_now()).await;

        let result = match self.loader.load().await {
            Ok(config) => self.engine.reload(config).await,
            Err(e) => {
                error!("Failed to load new configuration: {}", e);
                Err(e)
            }
        };

        self.liveness.notify(LivenessState::Ready).await;
        result
    }

    /// Report readiness, run the loop, and handle its end
    ///
    /// The loop runs in its own task so that a panic inside a cycle is caught
    /// here. On any abnormal end every comm gets a [`FailureNotice`]; a notice
    /// that cannot be delivered is logged and does not replace the original
    /// error.
    pub async fn run_to_completion(self: Arc<Self>, commands: mpsc::Receiver<Command>) -> Result<()> {
        self.liveness.notify(LivenessState::Ready).await;

        let scheduler = Arc::clone(&self);
        let outcome = tokio::spawn(async move { scheduler.run(commands).await }).await;

        self.liveness.notify(LivenessState::Stopping).await;

        let (notice, err) = match outcome {
            Ok(Ok(())) => {
                info!("Scheduler stopped");
                return Ok(());
            }
            Ok(Err(e)) => {
                error!("Scheduler failed: {}", e);
                (FailureNotice::from_error(&e), e)
            }
            Err(join_err) if join_err.is_panic() => {
                let notice = FailureNotice::from_panic(join_err.into_panic().as_ref());
                error!("Scheduler panicked: {}", notice.trace);
                let err = Error::Other(format!("scheduler panicked: {}", notice.trace));
                (notice, err)
            }
            Err(join_err) => {
                error!("Scheduler task cancelled: {}", join_err);
                let err = Error::Other(format!("scheduler task cancelled: {}", join_err));
                (FailureNotice::from_error(&err), err)
            }
        };

        let undelivered = self
            .engine
            .notify_failure(&notice)
            .await
            .into_iter()
            .filter(|record| {
                !matches!(
                    record.outcome,
                    crate::engine::DeliveryOutcome::Delivered { .. }
                        | crate::engine::DeliveryOutcome::Simulated
                )
            })
            .count();
        if undelivered > 0 {
            warn!("Failure notice not delivered to {} comm(s)", undelivered);
        }

        Err(err)
    }
}
