mod deadline;
mod error;
mod record;
mod topic;

pub use deadline::Deadline;
pub use error::{CommitError, FetchError, ProvisionError, WriteError};
pub use record::{ConsumerPosition, Record, RecordTransformer, TopicSpec};
pub use topic::{OffsetCommitter, SourceReader, TargetWriter, TopicProvisioner};
