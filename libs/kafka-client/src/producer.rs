use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::producer::{FutureProducer, FutureRecord};

use relay_api::{Deadline, Record, TargetWriter, WriteError};

use crate::config::KafkaSettings;
use crate::error::{ClientError, write_error};

/// Target сторона: запись с ожиданием `acks=all`.
pub struct KafkaWriter {
    producer: FutureProducer,
}

impl KafkaWriter {
    /// `delivery_timeout`: верхняя граница ожидания ack'а внутри librdkafka;
    /// обычно равна общему timeout'у прогона.
    pub fn new(settings: &KafkaSettings, delivery_timeout: Duration) -> Result<Self, ClientError> {
        let producer: FutureProducer = settings.producer_config(delivery_timeout).create()?;
        Ok(Self { producer })
    }
}

impl TargetWriter for KafkaWriter {
    fn append<'a>(
        &'a self,
        topic: &'a str,
        record: &'a Record,
        deadline: Deadline,
    ) -> Pin<Box<dyn Future<Output = Result<(), WriteError>> + Send + 'a>> {
        Box::pin(async move {
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Err(WriteError::Timeout);
            }

            let message = FutureRecord::to(topic)
                .key(record.key.as_slice())
                .payload(record.value.as_slice());

            match self.producer.send(message, remaining).await {
                Ok((partition, offset)) => {
                    tracing::debug!(topic = %topic, partition, offset, "write acknowledged");
                    Ok(())
                }
                Err((e, _message)) => Err(write_error(topic, e)),
            }
        })
    }
}
