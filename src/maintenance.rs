// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Background maintainers.
//!
//! Three periodic, best-effort tasks keep the engine's state fresh:
//! threat intelligence refresh, stale pattern sweep and system load
//! sampling. Failures are logged and the task waits for its next tick.

use crate::engine::IntelligentRateLimiter;
use crate::load::LoadSource;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Owns the running maintainers. Dropping the handle without calling
/// [`MaintenanceHandle::shutdown`] also stops them at their next wake-up.
pub struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Signal every task to stop and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(error = %err, "Maintenance task ended abnormally");
            }
        }
        info!("Maintenance tasks stopped");
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Run `tick` every `period` until shutdown. The first run happens one full
/// period after start.
fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(task = name, ?period, "Maintenance task started");

        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(task = name, "Maintenance task stopped");
    })
}

/// Start the maintainers for `engine` using its maintenance configuration.
pub fn spawn(engine: Arc<IntelligentRateLimiter>, source: Arc<dyn LoadSource>) -> MaintenanceHandle {
    let config = engine.maintenance_config().clone();
    let (shutdown, receiver) = watch::channel(false);
    let mut tasks = Vec::with_capacity(3);

    let refresh_engine = engine.clone();
    tasks.push(spawn_periodic(
        "threat_intel_refresh",
        config.intel_refresh_interval(),
        receiver.clone(),
        move || {
            let engine = refresh_engine.clone();
            async move {
                match engine.refresh_threat_intelligence().await {
                    Ok(flagged) => debug!(flagged, "Threat intelligence refreshed"),
                    Err(err) => error!(error = %err, "Threat intelligence refresh failed"),
                }
            }
        },
    ));

    let sweep_engine = engine.clone();
    tasks.push(spawn_periodic(
        "pattern_sweep",
        config.pattern_sweep_interval(),
        receiver.clone(),
        move || {
            let engine = sweep_engine.clone();
            async move {
                engine.sweep_stale_patterns().await;
            }
        },
    ));

    tasks.push(spawn_periodic(
        "load_sampling",
        config.load_sample_interval(),
        receiver,
        move || {
            let engine = engine.clone();
            let source = source.clone();
            async move {
                if let Err(err) = engine.sample_system_load(source.as_ref()).await {
                    error!(error = %err, "System load sampling failed");
                }
            }
        },
    ));

    MaintenanceHandle { shutdown, tasks }
}
