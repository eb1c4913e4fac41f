use relay_api::{ProvisionError, TopicProvisioner, TopicSpec};

use crate::retry::{RetryError, RetryPolicy, retry_with_backoff};

/// Результат стартового provisioning'а.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub ready: Vec<String>,
    pub failed: Vec<(String, RetryError<ProvisionError>)>,
}

impl ProvisionReport {
    pub fn all_ready(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Убедиться, что topic'и существуют.
///
/// Недоступность controller'а повторяется по `policy`; прочие ошибки
/// сразу попадают в report. Ошибки не фатальны: вызывающий решает сам,
/// продолжать ли (topic мог быть создан заранее).
pub async fn provision_topics(
    provisioner: &dyn TopicProvisioner,
    specs: &[TopicSpec],
    policy: &RetryPolicy,
) -> ProvisionReport {
    let mut report = ProvisionReport::default();
    for spec in specs {
        let operation = format!("ensure topic '{}'", spec.name());
        let result = retry_with_backoff(policy, &operation, ProvisionError::is_retryable, || {
            provisioner.ensure(spec)
        })
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    topic = %spec.name(),
                    partitions = spec.partition_count(),
                    replication = spec.replication_factor(),
                    "topic ready"
                );
                report.ready.push(spec.name().to_string());
            }
            Err(e) => {
                tracing::warn!(topic = %spec.name(), error = %e, "topic provisioning failed, continuing");
                report.failed.push((spec.name().to_string(), e));
            }
        }
    }
    report
}
