use std::fmt::{self, Display};

use serde::{Serialize, Serializer};

use relay_api::{CommitError, FetchError, WriteError};

use crate::state::Stage;

/// Результат одного прогона pipeline.
///
/// `partition`/`offset`: позиция source записи; `committed_offset`:
/// новая позиция group'ы (`offset + 1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Forwarded {
        partition: i32,
        offset: i64,
        committed_offset: i64,
    },
    /// Записи не появилось до deadline. Ничего не изменено.
    FetchTimedOut,
    FetchFailed {
        #[serde(serialize_with = "as_display")]
        cause: FetchError,
    },
    /// Offset не закоммичен: запись будет доставлена повторно.
    WriteFailed {
        partition: i32,
        offset: i64,
        #[serde(serialize_with = "as_display")]
        cause: WriteError,
    },
    /// Запись в target уже сделана: повторный прогон создаст дубликат.
    CommitFailed {
        partition: i32,
        offset: i64,
        #[serde(serialize_with = "as_display")]
        cause: CommitError,
    },
    /// Прогон отменён извне. Отмена во время записи не гарантирует,
    /// что broker не успел её сохранить.
    Cancelled { stage: Stage },
}

fn as_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl PipelineOutcome {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, PipelineOutcome::Forwarded { .. })
    }

    /// Стадия, на которой прогон остановился (None для Forwarded).
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineOutcome::Forwarded { .. } => None,
            PipelineOutcome::FetchTimedOut | PipelineOutcome::FetchFailed { .. } => {
                Some(Stage::Fetching)
            }
            PipelineOutcome::WriteFailed { .. } => Some(Stage::Writing),
            PipelineOutcome::CommitFailed { .. } => Some(Stage::Committing),
            PipelineOutcome::Cancelled { stage } => Some(*stage),
        }
    }

    /// Записан ли target, но не закоммичен source (будущий дубликат).
    pub fn may_duplicate(&self) -> bool {
        matches!(
            self,
            PipelineOutcome::CommitFailed { .. }
                | PipelineOutcome::Cancelled {
                    stage: Stage::Writing | Stage::Committing
                }
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Единственное итоговое событие прогона.
    pub(crate) fn log(&self, group_id: &str, source: &str, target: &str) {
        match self {
            PipelineOutcome::Forwarded {
                partition,
                offset,
                committed_offset,
            } => tracing::info!(
                group = %group_id, source = %source, target = %target,
                partition, offset, committed_offset,
                "forwarded"
            ),
            PipelineOutcome::FetchTimedOut => tracing::info!(
                group = %group_id, source = %source, stage = %Stage::Fetching,
                "no record before deadline"
            ),
            PipelineOutcome::FetchFailed { cause } => tracing::error!(
                group = %group_id, source = %source, stage = %Stage::Fetching,
                error = %cause,
                "fetch failed"
            ),
            PipelineOutcome::WriteFailed {
                partition,
                offset,
                cause,
            } => tracing::error!(
                group = %group_id, source = %source, target = %target,
                stage = %Stage::Writing, partition, offset, error = %cause,
                "write failed, offset left uncommitted"
            ),
            PipelineOutcome::CommitFailed {
                partition,
                offset,
                cause,
            } => tracing::error!(
                group = %group_id, source = %source, target = %target,
                stage = %Stage::Committing, partition, offset, error = %cause,
                "commit failed after write, rerun will duplicate"
            ),
            PipelineOutcome::Cancelled { stage } => tracing::warn!(
                group = %group_id, source = %source, stage = %stage,
                may_duplicate = self.may_duplicate(),
                "cancelled"
            ),
        }
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOutcome::Forwarded {
                partition,
                offset,
                committed_offset,
            } => write!(
                f,
                "forwarded {partition}/{offset}, committed offset {committed_offset}"
            ),
            PipelineOutcome::FetchTimedOut => f.write_str("no record before deadline"),
            PipelineOutcome::FetchFailed { cause } => write!(f, "fetch failed: {cause}"),
            PipelineOutcome::WriteFailed {
                partition,
                offset,
                cause,
            } => write!(f, "write of {partition}/{offset} failed: {cause}"),
            PipelineOutcome::CommitFailed {
                partition,
                offset,
                cause,
            } => write!(f, "commit of {partition}/{offset} failed: {cause}"),
            PipelineOutcome::Cancelled { stage } => write!(f, "cancelled during {stage}"),
        }
    }
}
