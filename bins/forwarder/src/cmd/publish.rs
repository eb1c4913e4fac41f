use std::time::{Duration, SystemTime, UNIX_EPOCH};

use relay_api::{Deadline, Record, TargetWriter};

use super::{Exit, connect};
use crate::config::{Effective, PublishArgs};
use crate::error::ForwarderError;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: PublishArgs) -> Result<Exit, ForwarderError> {
    let eff = Effective::new(&args.common)?;
    let kafka = connect(&eff).await?;
    pipeline::provision_topics(&kafka.provisioner, &[eff.source_spec()?], &eff.startup_retry).await;

    let value = args.value.unwrap_or_else(default_value);
    publish_one(kafka.writer.as_ref(), &eff.source_topic, &args.key, &value).await?;
    Ok(Exit::Success)
}

/// Записать одно сообщение и дождаться подтверждения.
pub(crate) async fn publish_one(
    writer: &dyn TargetWriter,
    topic: &str,
    key: &str,
    value: &str,
) -> Result<(), ForwarderError> {
    let record = Record::outgoing(topic, key, value);
    writer
        .append(topic, &record, Deadline::after(PUBLISH_TIMEOUT))
        .await
        .map_err(ForwarderError::Publish)?;
    tracing::info!(topic = %topic, key = %key, value = %value, "published");
    Ok(())
}

pub(crate) fn default_value() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("hello from rust at {secs}")
}
