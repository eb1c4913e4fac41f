use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use broker_memory::MemoryBroker;
use pipeline::{ForwardPipeline, Stages, provision_topics};
use relay_api::TopicProvisioner;

use super::publish::{default_value, publish_one};
use super::{Exit, connect};
use crate::config::{DemoArgs, Effective};
use crate::error::ForwarderError;

/// Сценарий целиком: topic'и → сообщение в source → один прогон.
pub async fn run(args: DemoArgs) -> Result<Exit, ForwarderError> {
    let eff = Effective::new(&args.common)?;

    let memory = args.memory.then(|| Arc::new(MemoryBroker::new()));
    let (provisioner, stages): (Arc<dyn TopicProvisioner>, Stages) = match &memory {
        Some(broker) => {
            tracing::info!("demo against in-process broker");
            let stages = Stages {
                reader: broker.clone(),
                transformer: Arc::new(eff.transform.transformer()),
                writer: broker.clone(),
                committer: broker.clone(),
            };
            let provisioner: Arc<dyn TopicProvisioner> = broker.clone();
            (provisioner, stages)
        }
        None => {
            let kafka = connect(&eff).await?;
            let stages = kafka.stages(&eff);
            let provisioner: Arc<dyn TopicProvisioner> = Arc::new(kafka.provisioner);
            (provisioner, stages)
        }
    };

    provision_topics(provisioner.as_ref(), &eff.topic_specs()?, &eff.startup_retry).await;

    let value = args.value.unwrap_or_else(default_value);
    publish_one(stages.writer.as_ref(), &eff.source_topic, &args.key, &value).await?;

    let pipeline = ForwardPipeline::new(stages, eff.route()).with_write_retry(eff.write_retry.clone());
    let outcome = pipeline.run(eff.timeout, &CancellationToken::new()).await;

    if let Some(broker) = &memory {
        for record in broker.records(&eff.target_topic).await {
            tracing::info!(
                topic = %record.topic,
                key = %record.key_lossy(),
                value = %record.value_lossy(),
                "target record"
            );
        }
    }
    if args.json {
        println!("{}", outcome.to_json()?);
    }
    Ok(if outcome.is_forwarded() {
        Exit::Success
    } else {
        Exit::Incomplete
    })
}
