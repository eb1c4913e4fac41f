pub mod config;
pub mod error;
mod forward;
mod outcome;
mod provision;
mod retry;
mod state;
mod supervisor;
mod transform;

pub use error::PipelineError;
pub use forward::{ForwardPipeline, Route, Stages};
pub use outcome::PipelineOutcome;
pub use provision::{ProvisionReport, provision_topics};
pub use retry::{RetryError, RetryPolicy, retry_with_backoff};
pub use state::{PipelineState, Stage};
pub use supervisor::{FollowSummary, follow};
pub use transform::{DEFAULT_PREFIX, PrefixTransformer};
