use serde::Serialize;

/// Стадия, на которой pipeline может остановиться.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Transforming,
    Writing,
    Committing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetching => f.write_str("fetch"),
            Stage::Transforming => f.write_str("transform"),
            Stage::Writing => f.write_str("write"),
            Stage::Committing => f.write_str("commit"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  PipelineState
// ═══════════════════════════════════════════════════════════════

/// Состояние одного прогона:
///
/// ```text
/// Idle → Fetching → Transforming → Writing → Committing → Done
///           ↓                         ↓          ↓
///         Failed                    Failed     Failed
/// ```
///
/// Transform тотален, поэтому из Transforming в Failed перехода нет.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Fetching,
    Transforming,
    Writing,
    Committing,
    Done,
    Failed { stage: Stage, cause: String },
}

impl PipelineState {
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState as S;
        match (self, next) {
            (S::Idle, S::Fetching) => true,
            (S::Fetching, S::Transforming) => true,
            (S::Transforming, S::Writing) => true,
            (S::Writing, S::Committing) => true,
            (S::Committing, S::Done) => true,
            (S::Fetching, S::Failed { stage: Stage::Fetching, .. }) => true,
            (S::Writing, S::Failed { stage: Stage::Writing, .. }) => true,
            (S::Committing, S::Failed { stage: Stage::Committing, .. }) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed { .. })
    }
}

/// Текущее состояние прогона с проверкой переходов.
#[derive(Debug)]
pub(crate) struct StateTracker {
    state: PipelineState,
}

impl StateTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: PipelineState::Idle,
        }
    }

    pub(crate) fn enter(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }

    pub(crate) fn fail(&mut self, stage: Stage, cause: impl Into<String>) {
        self.enter(PipelineState::Failed {
            stage,
            cause: cause.into(),
        });
    }

    pub(crate) fn state(&self) -> &PipelineState {
        &self.state
    }
}
