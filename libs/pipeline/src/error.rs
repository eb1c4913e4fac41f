use crate::outcome::PipelineOutcome;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Цикл `--follow` исчерпал лимит неудачных прогонов подряд.
    #[error("giving up after {failures} consecutive failed runs, last: {last}")]
    GaveUp { failures: u32, last: PipelineOutcome },
}
