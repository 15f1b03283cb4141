//! Per-job polling loop.
//!
//! One cooperative task per active job drives its adapter until a terminal
//! state: fixed-interval ticks, hard attempt cap, cancellation token. Every
//! failure is captured into the job record; nothing unwinds into the
//! scheduler, so one job's bad day never stops another's polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vgen_models::{JobId, JobPatch};

use crate::adapter::Operation;
use crate::notifier::ProgressHub;
use crate::store::JobStore;

/// Polling schedule configuration.
#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Fixed delay between polls
    pub interval: Duration,
    /// Hard cap on polls before the job times out
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 60,
        }
    }
}

impl PollerConfig {
    /// Maximum lifetime of a job under this schedule.
    pub fn max_lifetime(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

pub(crate) struct PollContext {
    pub store: Arc<JobStore>,
    pub hub: Arc<ProgressHub>,
    pub job_id: JobId,
    pub config: PollerConfig,
    pub cancel: CancellationToken,
}

/// Drive one job's operation to a terminal state.
pub(crate) async fn drive(ctx: PollContext, op: Arc<dyn Operation>) {
    let job_id = ctx.job_id.clone();

    // pending -> processing happens before submission, matching the store's
    // transition chain even when start fails immediately
    if ctx
        .store
        .update(&job_id, JobPatch::processing())
        .await
        .is_err()
    {
        // Cancelled or deleted before we got going
        return;
    }
    ctx.hub.log(&job_id, "Submitting operation").await;

    let handle = match op.start().await {
        Ok(handle) => handle,
        Err(e) => {
            let msg = format!("Failed to start operation: {}", e);
            warn!(job_id = %job_id, "{}", msg);
            finalize_failed(&ctx, &msg).await;
            return;
        }
    };

    debug!(job_id = %job_id, handle = %handle, "Operation started");

    let mut ticker = interval(ctx.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick resolves immediately; consume it so poll N happens
    // at N * interval
    ticker.tick().await;

    let mut last_progress: u8 = 0;

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                if let Err(e) = op.cancel(&handle).await {
                    warn!(job_id = %job_id, "Upstream cancel failed (continuing): {}", e);
                }
                finalize_failed(&ctx, "cancelled by client").await;
                return;
            }
            _ = ticker.tick() => {
                match op.poll(&handle).await {
                    Ok(outcome) if outcome.done => {
                        match outcome.output {
                            Some(output) => {
                                if ctx
                                    .store
                                    .update(&job_id, JobPatch::completed(output.clone()))
                                    .await
                                    .is_ok()
                                {
                                    info!(job_id = %job_id, "Job completed");
                                    ctx.hub.done(&job_id, output).await;
                                }
                            }
                            None => {
                                let msg = outcome
                                    .error
                                    .unwrap_or_else(|| "operation failed without details".to_string());
                                let mut patch = JobPatch::failed(msg.clone());
                                patch.record_attempt = true;
                                if ctx.store.update(&job_id, patch).await.is_ok() {
                                    info!(job_id = %job_id, error = %msg, "Job failed");
                                    ctx.hub.error(&job_id, msg).await;
                                }
                            }
                        }
                        return;
                    }
                    Ok(outcome) => {
                        // Providers can report a lower reading after an
                        // estimate revision; clamp so the monotonic rule
                        // never aborts polling
                        let progress = outcome.progress.map(|p| p.max(last_progress));
                        let job = match ctx
                            .store
                            .update(&job_id, JobPatch::progress(progress))
                            .await
                        {
                            Ok(job) => job,
                            // Gone or finalized underneath us (cancel,
                            // delete); stop polling
                            Err(_) => return,
                        };
                        last_progress = job.progress;
                        if let Some(value) = progress {
                            ctx.hub.progress(&job_id, value).await;
                        }
                        if job.attempts >= ctx.config.max_attempts {
                            finalize_timed_out(&ctx).await;
                            return;
                        }
                    }
                    Err(e) => {
                        // Transient infrastructure trouble: burn an attempt,
                        // retry on the next tick
                        warn!(job_id = %job_id, "Poll attempt failed: {}", e);
                        let job = match ctx
                            .store
                            .update(&job_id, JobPatch::progress(None))
                            .await
                        {
                            Ok(job) => job,
                            Err(_) => return,
                        };
                        if job.attempts >= ctx.config.max_attempts {
                            finalize_timed_out(&ctx).await;
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn finalize_failed(ctx: &PollContext, reason: &str) {
    // Lost race against another finalizer is fine; the job is terminal
    if ctx
        .store
        .update(&ctx.job_id, JobPatch::failed(reason))
        .await
        .is_ok()
    {
        ctx.hub.error(&ctx.job_id, reason).await;
    }
}

async fn finalize_timed_out(ctx: &PollContext) {
    let msg = format!(
        "operation timed out after {} polls",
        ctx.config.max_attempts
    );
    if ctx
        .store
        .update(&ctx.job_id, JobPatch::timed_out(msg.clone()))
        .await
        .is_ok()
    {
        info!(job_id = %ctx.job_id, "Job timed out");
        ctx.hub.error(&ctx.job_id, msg).await;
    }
}
