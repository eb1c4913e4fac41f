use rdkafka::error::{KafkaError, RDKafkaErrorCode};

use relay_api::{CommitError, FetchError, ProvisionError, WriteError};

/// Ошибка создания клиента или проверки доступности кластера.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("kafka: {0}")]
    Kafka(#[from] KafkaError),

    #[error("no brokers in metadata from {0}")]
    NoBrokers(String),

    #[error("background task: {0}")]
    Task(String),
}

impl ClientError {
    /// Недоступность кластера повторяется, ошибки конфигурации: нет.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Kafka(KafkaError::ClientCreation(_)) => false,
            ClientError::Kafka(e) => e.rdkafka_error_code().is_none_or(is_transient),
            ClientError::NoBrokers(_) => true,
            ClientError::Task(_) => false,
        }
    }
}

/// Коды, после которых повтор имеет смысл.
pub(crate) fn is_transient(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::Resolve
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::BrokerNotAvailable
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::CoordinatorNotAvailable
            | RDKafkaErrorCode::CoordinatorLoadInProgress
            | RDKafkaErrorCode::NotCoordinator
    )
}

fn is_timeout(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::RequestTimedOut
    )
}

// ═══════════════════════════════════════════════════════════════
//  KafkaError → stage errors
// ═══════════════════════════════════════════════════════════════

pub(crate) fn provision_error(topic: &str, code: RDKafkaErrorCode) -> ProvisionError {
    if is_transient(code) {
        ProvisionError::Unreachable(code.to_string())
    } else {
        ProvisionError::Rejected {
            topic: topic.to_string(),
            reason: code.to_string(),
        }
    }
}

pub(crate) fn fetch_error(err: KafkaError) -> FetchError {
    FetchError::BrokerUnavailable(err.to_string())
}

pub(crate) fn write_error(topic: &str, err: KafkaError) -> WriteError {
    match err.rdkafka_error_code() {
        Some(code) if is_timeout(code) => WriteError::Timeout,
        Some(RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic) => {
            WriteError::UnknownTopic(topic.to_string())
        }
        Some(code) if is_transient(code) => WriteError::Unreachable(err.to_string()),
        _ => WriteError::Rejected(err.to_string()),
    }
}

pub(crate) fn commit_error(err: KafkaError) -> CommitError {
    match err.rdkafka_error_code() {
        Some(code) if is_timeout(code) => CommitError::Timeout,
        _ => CommitError::Broker(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_errors_by_code() {
        let timeout = write_error("t", KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut));
        assert_eq!(timeout, WriteError::Timeout);

        let unknown = write_error(
            "demo-topic-forwarded",
            KafkaError::MessageProduction(RDKafkaErrorCode::UnknownTopicOrPartition),
        );
        assert_eq!(unknown, WriteError::UnknownTopic("demo-topic-forwarded".into()));

        let down = write_error("t", KafkaError::MessageProduction(RDKafkaErrorCode::AllBrokersDown));
        assert!(matches!(down, WriteError::Unreachable(_)));
        assert!(down.is_retryable());

        let too_large = write_error("t", KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge));
        assert!(matches!(too_large, WriteError::Rejected(_)));
        assert!(!too_large.is_retryable());
    }

    #[test]
    fn test_commit_timeout_is_distinguished() {
        assert_eq!(
            commit_error(KafkaError::ConsumerCommit(RDKafkaErrorCode::RequestTimedOut)),
            CommitError::Timeout
        );
        assert!(matches!(
            commit_error(KafkaError::ConsumerCommit(RDKafkaErrorCode::RebalanceInProgress)),
            CommitError::Broker(_)
        ));
    }

    #[test]
    fn test_provision_classification() {
        assert!(matches!(
            provision_error("demo-topic", RDKafkaErrorCode::TopicAuthorizationFailed),
            ProvisionError::Rejected { .. }
        ));
        assert!(provision_error("demo-topic", RDKafkaErrorCode::BrokerTransportFailure).is_retryable());
    }

    #[test]
    fn test_client_error_retryability() {
        assert!(!ClientError::Kafka(KafkaError::ClientCreation("bad config".into())).is_retryable());
        assert!(ClientError::Kafka(KafkaError::MetadataFetch(RDKafkaErrorCode::AllBrokersDown)).is_retryable());
        assert!(ClientError::NoBrokers("localhost:9092".into()).is_retryable());
    }
}
