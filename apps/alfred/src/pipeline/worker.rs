//! Long-running loops: one polling worker per stage slot, a periodic fetch,
//! and the reconciliation sweep.
//!
//! Every loop checks the cancellation token only between items, so an item
//! that has been claimed always runs to `complete` or `fail`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{worker_id, Pipeline, StageOutcome};
use crate::models::queue::Stage;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub workers_per_stage: usize,
    pub poll_interval: Duration,
    pub fetch_interval: Duration,
    pub reconcile_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            workers_per_stage: 1,
            poll_interval: Duration::from_secs(5),
            fetch_interval: Duration::from_secs(3600),
            reconcile_interval: Duration::from_secs(60),
        }
    }
}

/// Spawns every background loop. The fetch loop is skipped when no job
/// source is configured.
pub fn spawn_all(
    pipeline: &Pipeline,
    settings: &WorkerSettings,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for stage in Stage::ALL {
        for _ in 0..settings.workers_per_stage {
            handles.push(tokio::spawn(run_stage_worker(
                pipeline.clone(),
                stage,
                worker_id(stage.as_str()),
                settings.poll_interval,
                cancel.child_token(),
            )));
        }
    }

    if pipeline.has_source() {
        handles.push(tokio::spawn(run_fetch_loop(
            pipeline.clone(),
            settings.fetch_interval,
            cancel.child_token(),
        )));
    }

    handles.push(tokio::spawn(run_reconcile_loop(
        pipeline.clone(),
        settings.reconcile_interval,
        cancel.child_token(),
    )));

    info!(
        workers_per_stage = settings.workers_per_stage,
        fetch = pipeline.has_source(),
        "Background workers started"
    );
    handles
}

/// Sleeps for `period` unless cancelled first. Returns false on cancellation.
async fn pause(period: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}

pub async fn run_stage_worker(
    pipeline: Pipeline,
    stage: Stage,
    worker: String,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    debug!(worker = %worker, "Stage worker started");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match pipeline.work_next(stage, &worker).await {
            // Keep draining while there is work.
            Ok(Some(outcome)) => {
                if let StageOutcome::Failed { job_id, error } = &outcome {
                    debug!(worker = %worker, %job_id, error = %error, "Item failed");
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => error!(worker = %worker, error = %e, "Queue access failed"),
        }
        if !pause(poll_interval, &cancel).await {
            break;
        }
    }
    debug!(worker = %worker, "Stage worker stopped");
}

pub async fn run_fetch_loop(pipeline: Pipeline, interval: Duration, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(e) = pipeline.run_fetch().await {
            error!(error = %e, "Fetch run failed");
        }
        if !pause(interval, &cancel).await {
            break;
        }
    }
    debug!("Fetch loop stopped");
}

pub async fn run_reconcile_loop(pipeline: Pipeline, interval: Duration, cancel: CancellationToken) {
    loop {
        if !pause(interval, &cancel).await {
            break;
        }
        if let Err(e) = pipeline.reconcile().await {
            error!(error = %e, "Reconciliation sweep failed");
        }
    }
    debug!("Reconcile loop stopped");
}
