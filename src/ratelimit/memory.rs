//! In-process sliding-window limiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::backend::Limiter;
use super::clock::{Clock, SystemClock};
use super::limit::{LimitConfig, Outcome};
use super::window::WindowLog;
use crate::error::{Result, ShieldError};

/// Tuning knobs for [`MemoryLimiter`].
#[derive(Clone)]
pub struct MemoryLimiterOptions {
    /// How often stale identifiers are reclaimed. Defaults to twice the window.
    pub reclaim_interval: Option<Duration>,
    /// Time source for admission decisions
    pub clock: Arc<dyn Clock>,
}

impl Default for MemoryLimiterOptions {
    fn default() -> Self {
        Self {
            reclaim_interval: None,
            clock: Arc::new(SystemClock),
        }
    }
}

/// State shared between the limiter handle and its reclamation task.
struct Shared {
    config: LimitConfig,
    /// Window logs indexed by identifier
    logs: DashMap<String, WindowLog>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn admit(&self, identifier: &str) -> Outcome {
        let window = self.config.window_millis();
        let limit = self.config.limit;

        // The entry guard is held across prune, decide and append, and `now`
        // is read under it so each log stays ascending.
        let outcome = match self.logs.get_mut(identifier) {
            Some(mut log) => {
                let now = self.clock.now_millis();
                log.admit(now, now - window, limit)
            }
            None => {
                let mut log = self.logs.entry(identifier.to_owned()).or_default();
                let now = self.clock.now_millis();
                log.admit(now, now - window, limit)
            }
        };

        if outcome.allowed {
            trace!(
                identifier = %identifier,
                remaining = outcome.remaining,
                "Admission allowed"
            );
        } else {
            debug!(identifier = %identifier, limit = limit, "Rate limit exceeded");
        }
        outcome
    }

    fn reclaim(&self) -> usize {
        let boundary = self.clock.now_millis() - self.config.window_millis();
        let mut removed = 0;

        // `retain` write-locks one shard at a time.
        self.logs.retain(|_, log| {
            let keep = !log.is_stale(boundary);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

/// A sliding-window log limiter whose state lives in process memory.
///
/// Identifiers are spread across the shards of a [`DashMap`]; every admission
/// holds its identifier's shard lock for the whole check-and-record step, so
/// counts are exact under any amount of concurrency. A background task removes
/// identifiers with no events inside the window.
pub struct MemoryLimiter {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    /// Held across the join so overlapping `close` calls all wait for the same stop
    reclaimer: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryLimiter {
    /// Create a limiter with default options.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: LimitConfig) -> Result<Self> {
        Self::with_options(config, MemoryLimiterOptions::default())
    }

    /// Create a limiter with explicit options.
    pub fn with_options(config: LimitConfig, options: MemoryLimiterOptions) -> Result<Self> {
        config.validate()?;

        let period = options
            .reclaim_interval
            .unwrap_or_else(|| config.window.saturating_mul(2));
        if period.is_zero() {
            return Err(ShieldError::InvalidConfig(
                "reclaim interval must be non-zero".to_string(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()?;

        let shared = Arc::new(Shared {
            config,
            logs: DashMap::new(),
            clock: options.clock,
        });
        let (shutdown, signal) = watch::channel(false);
        let reclaimer = runtime.spawn(run_reclaimer(Arc::clone(&shared), period, signal));

        info!(
            limit = config.limit,
            window = ?config.window,
            reclaim_interval = ?period,
            "Memory limiter initialized"
        );

        Ok(Self {
            shared,
            shutdown,
            reclaimer: Mutex::new(Some(reclaimer)),
        })
    }

    /// Run one reclamation pass now.
    ///
    /// Returns the number of identifiers removed.
    pub fn reclaim(&self) -> usize {
        self.shared.reclaim()
    }

    /// Number of identifiers currently holding state.
    pub fn tracked_identifiers(&self) -> usize {
        self.shared.logs.len()
    }

    /// Number of events retained for `identifier`, if it is tracked.
    pub fn retained_events(&self, identifier: &str) -> Option<usize> {
        self.shared.logs.get(identifier).map(|log| log.len())
    }
}

impl std::fmt::Debug for MemoryLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLimiter")
            .field("config", &self.shared.config)
            .field("tracked_identifiers", &self.shared.logs.len())
            .finish()
    }
}

#[async_trait]
impl Limiter for MemoryLimiter {
    async fn allow(&self, identifier: &str) -> Result<Outcome> {
        Ok(self.shared.admit(identifier))
    }

    async fn close(&self, deadline: Duration) -> Result<()> {
        self.shutdown.send_replace(true);

        // The handle is only cleared once the join completes; a timed-out
        // caller leaves it in place for the next one.
        let join = async {
            let mut slot = self.reclaimer.lock().await;
            match slot.as_mut() {
                Some(handle) => {
                    let joined = handle.await;
                    *slot = None;
                    joined.map(|()| true)
                }
                None => Ok(false),
            }
        };

        match tokio::time::timeout(deadline, join).await {
            Ok(Ok(true)) => {
                info!("Memory limiter closed");
                Ok(())
            }
            Ok(Ok(false)) => Ok(()),
            Ok(Err(e)) => {
                warn!(error = %e, "Reclamation task ended abnormally");
                Err(ShieldError::TaskFailed(e))
            }
            Err(_) => {
                warn!(deadline = ?deadline, "Reclamation task did not stop in time");
                Err(ShieldError::ShutdownTimeout(deadline))
            }
        }
    }

    fn config(&self) -> &LimitConfig {
        &self.shared.config
    }
}

/// Periodically drop identifiers whose newest event has left the window.
///
/// Exits when shutdown is signalled or the limiter handle is dropped.
async fn run_reclaimer(shared: Arc<Shared>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let removed = shared.reclaim();
                if removed > 0 {
                    debug!(removed = removed, remaining = shared.logs.len(), "Reclaimed stale identifiers");
                }
            }
        }
    }

    debug!("Reclamation task stopped");
}
