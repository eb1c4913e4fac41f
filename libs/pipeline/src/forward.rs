use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use relay_api::{
    CommitError, Deadline, FetchError, OffsetCommitter, Record, RecordTransformer, SourceReader,
    TargetWriter, WriteError,
};

use crate::outcome::PipelineOutcome;
use crate::retry::RetryPolicy;
use crate::state::{PipelineState, Stage, StateTracker};

// ═══════════════════════════════════════════════════════════════
//  Route / Stages
// ═══════════════════════════════════════════════════════════════

/// Откуда читать, куда писать и под какой consumer group'ой.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub group_id: String,
    pub source_topic: String,
    pub target_topic: String,
}

/// Реализации стадий. Reader и committer обычно один объект
/// (позиция group'ы принадлежит source стороне), но передаются раздельно.
///
/// Один экземпляр ForwardPipeline обслуживает одну партицию: committer
/// нельзя разделять между pipeline'ами разных партиций.
#[derive(Clone)]
pub struct Stages {
    pub reader: Arc<dyn SourceReader>,
    pub transformer: Arc<dyn RecordTransformer>,
    pub writer: Arc<dyn TargetWriter>,
    pub committer: Arc<dyn OffsetCommitter>,
}

// ═══════════════════════════════════════════════════════════════
//  Bounded broker calls
// ═══════════════════════════════════════════════════════════════

enum Bounded<T> {
    Done(T),
    Expired,
    Cancelled,
}

/// Ждать `fut` не дольше deadline; отмена token'а прерывает ожидание сразу.
async fn within<T>(
    deadline: Deadline,
    token: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Bounded<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Bounded::Cancelled,
        res = tokio::time::timeout_at(deadline.instant(), fut) => match res {
            Ok(value) => Bounded::Done(value),
            Err(_) => Bounded::Expired,
        },
    }
}

enum WriteFailure {
    Failed(WriteError),
    Cancelled,
}

// ═══════════════════════════════════════════════════════════════
//  ForwardPipeline
// ═══════════════════════════════════════════════════════════════

/// fetch → transform → append → commit для одной записи.
///
/// Commit выполняется только после подтверждённой записи в target.
/// Внутри прогона повторов нет (кроме опционального retry записи);
/// повторный запуск: забота вызывающего и всегда безопасен.
pub struct ForwardPipeline {
    stages: Stages,
    route: Route,
    write_retry: RetryPolicy,
}

impl ForwardPipeline {
    pub fn new(stages: Stages, route: Route) -> Self {
        Self {
            stages,
            route,
            write_retry: RetryPolicy::none(),
        }
    }

    /// Повторять транзиентные ошибки записи, пока позволяет deadline.
    pub fn with_write_retry(mut self, policy: RetryPolicy) -> Self {
        self.write_retry = policy;
        self
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Один прогон с общим timeout'ом на fetch, append и commit.
    pub async fn run(&self, timeout: Duration, token: &CancellationToken) -> PipelineOutcome {
        self.run_until(Deadline::after(timeout), token).await
    }

    pub async fn run_until(&self, deadline: Deadline, token: &CancellationToken) -> PipelineOutcome {
        let mut tracker = StateTracker::new();
        let outcome = self.drive(&mut tracker, deadline, token).await;
        debug_assert!(tracker.state().is_terminal());
        outcome.log(
            &self.route.group_id,
            &self.route.source_topic,
            &self.route.target_topic,
        );
        outcome
    }

    async fn drive(
        &self,
        tracker: &mut StateTracker,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> PipelineOutcome {
        let Route {
            group_id,
            source_topic,
            target_topic,
        } = &self.route;

        // --- Fetching ---
        tracker.enter(PipelineState::Fetching);
        let fetch = self.stages.reader.fetch(group_id, source_topic, deadline);
        let record = match within(deadline, token, fetch).await {
            Bounded::Done(Ok(record)) => record,
            Bounded::Done(Err(FetchError::Timeout)) | Bounded::Expired => {
                tracker.fail(Stage::Fetching, "timeout");
                return PipelineOutcome::FetchTimedOut;
            }
            Bounded::Done(Err(cause)) => {
                tracker.fail(Stage::Fetching, cause.to_string());
                return PipelineOutcome::FetchFailed { cause };
            }
            Bounded::Cancelled => {
                tracker.fail(Stage::Fetching, "cancelled");
                return PipelineOutcome::Cancelled {
                    stage: Stage::Fetching,
                };
            }
        };
        let Some((partition, offset)) = record.source_position() else {
            let cause = FetchError::BrokerUnavailable(format!(
                "record from '{source_topic}' has no partition/offset"
            ));
            tracker.fail(Stage::Fetching, cause.to_string());
            return PipelineOutcome::FetchFailed { cause };
        };
        tracing::debug!(
            topic = %source_topic,
            partition,
            offset,
            key = %record.key_lossy(),
            value = %record.value_lossy(),
            "fetched record"
        );

        // --- Transforming ---
        tracker.enter(PipelineState::Transforming);
        let target = self
            .stages
            .transformer
            .apply(&record)
            .with_topic(target_topic.as_str());

        // --- Writing ---
        tracker.enter(PipelineState::Writing);
        match self.write(&target, deadline, token).await {
            Ok(()) => {}
            Err(WriteFailure::Failed(cause)) => {
                tracker.fail(Stage::Writing, cause.to_string());
                return PipelineOutcome::WriteFailed {
                    partition,
                    offset,
                    cause,
                };
            }
            Err(WriteFailure::Cancelled) => {
                tracker.fail(Stage::Writing, "cancelled");
                return PipelineOutcome::Cancelled {
                    stage: Stage::Writing,
                };
            }
        }

        // --- Committing ---
        // Запись подтверждена; commit ограничен тем же deadline'ом.
        tracker.enter(PipelineState::Committing);
        let commit = self
            .stages
            .committer
            .commit(group_id, source_topic, partition, offset);
        let committed = match within(deadline, token, commit).await {
            Bounded::Done(res) => Some(res),
            Bounded::Expired => Some(Err(CommitError::Timeout)),
            Bounded::Cancelled => None,
        };
        match committed {
            Some(Ok(())) => {
                tracker.enter(PipelineState::Done);
                PipelineOutcome::Forwarded {
                    partition,
                    offset,
                    committed_offset: offset + 1,
                }
            }
            Some(Err(cause)) => {
                tracker.fail(Stage::Committing, cause.to_string());
                PipelineOutcome::CommitFailed {
                    partition,
                    offset,
                    cause,
                }
            }
            None => {
                tracker.fail(Stage::Committing, "cancelled");
                PipelineOutcome::Cancelled {
                    stage: Stage::Committing,
                }
            }
        }
    }

    async fn write(
        &self,
        target: &Record,
        deadline: Deadline,
        token: &CancellationToken,
    ) -> Result<(), WriteFailure> {
        let topic = self.route.target_topic.as_str();
        let mut attempt = 1;
        loop {
            let append = self.stages.writer.append(topic, target, deadline);
            let err = match within(deadline, token, append).await {
                Bounded::Done(Ok(())) => return Ok(()),
                Bounded::Done(Err(e)) => e,
                Bounded::Expired => WriteError::Timeout,
                Bounded::Cancelled => return Err(WriteFailure::Cancelled),
            };

            let delay = self.write_retry.delay_for(attempt);
            if !err.is_retryable()
                || !self.write_retry.allows_another(attempt)
                || deadline.remaining() <= delay
            {
                return Err(WriteFailure::Failed(err));
            }
            tracing::warn!(
                topic = %topic,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "write failed, retrying"
            );
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(WriteFailure::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
