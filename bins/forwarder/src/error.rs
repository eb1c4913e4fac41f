use kafka_client::ClientError;
use pipeline::{PipelineError, RetryError};
use relay_api::{ProvisionError, WriteError};

#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("topic spec: {0}")]
    TopicSpec(#[from] ProvisionError),

    #[error("startup: {0}")]
    Startup(#[from] RetryError<ClientError>),

    #[error("publish: {0}")]
    Publish(WriteError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("output: {0}")]
    Json(#[from] serde_json::Error),
}
