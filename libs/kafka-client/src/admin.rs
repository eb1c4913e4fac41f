use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::RDKafkaErrorCode;

use relay_api::{ProvisionError, TopicProvisioner, TopicSpec};

use crate::config::KafkaSettings;
use crate::error::{ClientError, provision_error};

/// Создание topic'ов через controller кластера.
pub struct KafkaProvisioner {
    admin: Arc<AdminClient<DefaultClientContext>>,
    brokers: String,
    request_timeout: Duration,
}

impl KafkaProvisioner {
    pub fn new(settings: &KafkaSettings) -> Result<Self, ClientError> {
        let admin: AdminClient<DefaultClientContext> = settings.client_config().create()?;
        Ok(Self {
            admin: Arc::new(admin),
            brokers: settings.brokers.clone(),
            request_timeout: settings.request_timeout,
        })
    }

    /// Запросить metadata кластера. Возвращает число брокеров.
    pub async fn probe(&self) -> Result<usize, ClientError> {
        let admin = Arc::clone(&self.admin);
        let timeout = self.request_timeout;
        let metadata = tokio::task::spawn_blocking(move || admin.inner().fetch_metadata(None, timeout))
            .await
            .map_err(|e| ClientError::Task(e.to_string()))??;

        let brokers = metadata.brokers().len();
        if brokers == 0 {
            return Err(ClientError::NoBrokers(self.brokers.clone()));
        }
        tracing::debug!(brokers, bootstrap = %self.brokers, "cluster metadata fetched");
        Ok(brokers)
    }
}

impl TopicProvisioner for KafkaProvisioner {
    fn ensure<'a>(
        &'a self,
        spec: &'a TopicSpec,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProvisionError>> + Send + 'a>> {
        Box::pin(async move {
            let topic = NewTopic::new(
                spec.name(),
                spec.partition_count(),
                TopicReplication::Fixed(spec.replication_factor()),
            );
            let opts = AdminOptions::new().operation_timeout(Some(self.request_timeout));

            let results = self
                .admin
                .create_topics([&topic], &opts)
                .await
                .map_err(|e| ProvisionError::Unreachable(e.to_string()))?;

            for result in results {
                match result {
                    Ok(name) => tracing::info!(topic = %name, "topic created"),
                    Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                        tracing::debug!(topic = %name, "topic already exists")
                    }
                    Err((name, code)) => return Err(provision_error(&name, code)),
                }
            }
            Ok(())
        })
    }
}
