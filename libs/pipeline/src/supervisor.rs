use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::FollowConfig;
use crate::error::PipelineError;
use crate::forward::ForwardPipeline;
use crate::outcome::PipelineOutcome;

/// Итог цикла `--follow`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FollowSummary {
    pub runs: u64,
    pub forwarded: u64,
    pub idle: u64,
    pub failed: u64,
}

impl FollowSummary {
    fn record(&mut self, outcome: &PipelineOutcome) {
        self.runs += 1;
        match outcome {
            PipelineOutcome::Forwarded { .. } => self.forwarded += 1,
            PipelineOutcome::FetchTimedOut => self.idle += 1,
            PipelineOutcome::Cancelled { .. } => {}
            _ => self.failed += 1,
        }
    }
}

/// Перезапускать pipeline, пока не отменён token.
///
/// Каждый прогон независим: неудачный прогон оставляет offset
/// незакоммиченным, и следующий прогон получает ту же запись.
/// После неудачи ждём по `follow.backoff`; после FetchTimedOut: `follow.idle`.
pub async fn follow(
    pipeline: &ForwardPipeline,
    timeout: Duration,
    follow: &FollowConfig,
    token: &CancellationToken,
) -> Result<FollowSummary, PipelineError> {
    let mut summary = FollowSummary::default();
    let mut consecutive_failures = 0u32;

    while !token.is_cancelled() {
        if follow.max_runs.is_some_and(|max| summary.runs >= max) {
            break;
        }

        let outcome = pipeline.run(timeout, token).await;
        summary.record(&outcome);

        let pause = match &outcome {
            PipelineOutcome::Forwarded { .. } => {
                consecutive_failures = 0;
                Duration::ZERO
            }
            PipelineOutcome::FetchTimedOut => {
                consecutive_failures = 0;
                follow.idle()
            }
            PipelineOutcome::Cancelled { .. } => break,
            _ => {
                consecutive_failures += 1;
                if follow.max_consecutive_failures > 0
                    && consecutive_failures >= follow.max_consecutive_failures
                {
                    return Err(PipelineError::GaveUp {
                        failures: consecutive_failures,
                        last: outcome,
                    });
                }
                follow.backoff.delay_for(consecutive_failures)
            }
        };

        if !pause.is_zero() {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    tracing::info!(
        group = %pipeline.route().group_id,
        runs = summary.runs,
        forwarded = summary.forwarded,
        failed = summary.failed,
        "follow loop stopped"
    );
    Ok(summary)
}
