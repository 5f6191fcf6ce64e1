//! The lifecycle worker: runs the dispatch sweep, the time-derived trigger sweep and the
//! segment refresh on fixed intervals until interrupted.

use async_trait::async_trait;
use domain::Engine;
use events::{EngineEvent, EventHandler, EventPublisher};
use log::*;
use migration::{Migrator, MigratorTrait};
use service::{config::Config, logging::Logger};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Writes every engine event to the log.
struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn handle(&self, event: &EngineEvent) {
        match event {
            EngineEvent::SegmentRefreshed {
                segment_id,
                membership_version,
                joined,
                left,
                ..
            } => debug!(
                "segment_refreshed: segment={segment_id} version={membership_version} joined={} left={}",
                joined.len(),
                left.len()
            ),
            EngineEvent::ExecutionScheduled { execution_id, .. } => {
                debug!("execution_scheduled: execution={execution_id}")
            }
            EngineEvent::ExecutionResolved {
                execution_id,
                status,
                reason,
                ..
            } => debug!(
                "execution_resolved: execution={execution_id} status={status} reason={}",
                reason.as_deref().unwrap_or("-")
            ),
        }
    }
}

fn ticker(secs: u64) -> tokio::time::Interval {
    let mut ticker = interval(Duration::from_secs(secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!(
        "Starting lifecycle worker ({} environment)",
        config.runtime_env()
    );

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = Migrator::up(db.as_ref(), None).await {
        error!("Failed to apply database migrations: {e}");
        std::process::exit(1);
    }

    let publisher = EventPublisher::new().with_handler(Arc::new(LogEventHandler));
    let engine = Engine::from_database(db, &config, publisher);

    let mut dispatch = ticker(config.dispatch_interval_secs);
    let mut trigger_sweep = ticker(config.trigger_sweep_interval_secs);
    let mut segment_refresh = ticker(config.segment_refresh_interval_secs);

    info!(
        "Sweeping every {}s (dispatch), {}s (time triggers), {}s (segments)",
        config.dispatch_interval_secs,
        config.trigger_sweep_interval_secs,
        config.segment_refresh_interval_secs
    );

    loop {
        tokio::select! {
            _ = dispatch.tick() => {
                if let Err(e) = engine.run_dispatch_sweep().await {
                    error!("Dispatch sweep failed: {e}");
                }
            }
            _ = trigger_sweep.tick() => {
                if let Err(e) = engine.run_time_trigger_sweep().await {
                    error!("Time trigger sweep failed: {e}");
                }
            }
            _ = segment_refresh.tick() => {
                match engine.refresh_all_profiles().await {
                    Ok(reports) => info!("Refreshed {} segment(s)", reports.len()),
                    Err(e) => error!("Segment refresh failed: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down lifecycle worker");
                break;
            }
        }
    }
}
