pub mod demo;
pub mod forward;
pub mod provision;
pub mod publish;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use kafka_client::{ClientError, KafkaProvisioner, KafkaSource, KafkaWriter};
use pipeline::{Stages, retry_with_backoff};

use crate::config::Effective;
use crate::error::ForwarderError;

/// Итог команды для кода возврата.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    /// Работа не доведена до конца; повторный запуск безопасен.
    Incomplete,
}

// ═══════════════════════════════════════════════════════════════
//  Kafka stack
// ═══════════════════════════════════════════════════════════════

pub struct KafkaStack {
    pub provisioner: KafkaProvisioner,
    pub source: Arc<KafkaSource>,
    pub writer: Arc<KafkaWriter>,
}

impl KafkaStack {
    pub fn stages(&self, eff: &Effective) -> Stages {
        Stages {
            reader: self.source.clone(),
            transformer: Arc::new(eff.transform.transformer()),
            writer: self.writer.clone(),
            committer: self.source.clone(),
        }
    }
}

/// Подключиться к кластеру с повторами по `startup_retry`.
///
/// Повторяется только недоступность кластера; ошибки конфигурации
/// клиента завершают запуск сразу.
pub async fn connect(eff: &Effective) -> Result<KafkaStack, ForwarderError> {
    let settings = eff.kafka_settings();
    let policy = &eff.startup_retry;

    let provisioner = KafkaProvisioner::new(&settings).map_err(permanent("create admin client"))?;
    let brokers = retry_with_backoff(policy, "connect to cluster", ClientError::is_retryable, || {
        provisioner.probe()
    })
    .await?;
    tracing::info!(bootstrap = %eff.brokers, brokers, "cluster reachable");

    let source = KafkaSource::new(settings.clone());
    retry_with_backoff(policy, "subscribe source", ClientError::is_retryable, || {
        source.connect(&eff.group_id, &eff.source_topic)
    })
    .await?;

    let writer = retry_with_backoff(policy, "create producer", ClientError::is_retryable, || async {
        KafkaWriter::new(&settings, eff.timeout)
    })
    .await?;

    Ok(KafkaStack {
        provisioner,
        source: Arc::new(source),
        writer: Arc::new(writer),
    })
}

fn permanent(operation: &'static str) -> impl Fn(ClientError) -> ForwarderError {
    move |last| {
        ForwarderError::Startup(pipeline::RetryError::Permanent {
            operation: operation.to_string(),
            last,
        })
    }
}

/// Token, отменяемый по Ctrl+C.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl+C received, cancelling");
                on_signal.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl+C"),
        }
    });
    token
}
