use std::future::Future;
use std::pin::Pin;

use crate::{
    CommitError, ConsumerPosition, Deadline, FetchError, ProvisionError, Record,
    TopicSpec, WriteError,
};

// ════════════════════════════════════════════════════════════════
//  Broker Traits
// ════════════════════════════════════════════════════════════════
//
// Четыре стадии, через которые pipeline общается с broker'ом.
// Реализации: kafka-client (rdkafka), broker-memory (in-process).

/// Создание topic'ов. Вызывается один раз при старте.
pub trait TopicProvisioner: Send + Sync {
    /// Создать topic, если его нет. "Уже существует": успех.
    fn ensure<'a>(
        &'a self,
        spec: &'a TopicSpec,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProvisionError>> + Send + 'a>>;
}

/// Чтение следующей незакоммиченной записи consumer group'ы.
///
/// Чтение никогда не двигает committed offset: commit: отдельная
/// явная операция (`OffsetCommitter`). Повторный fetch без commit'а
/// возвращает ту же запись.
pub trait SourceReader: Send + Sync {
    /// Блокирует до появления записи или до `deadline` (`FetchError::Timeout`).
    fn fetch<'a>(
        &'a self,
        group_id: &'a str,
        topic: &'a str,
        deadline: Deadline,
    ) -> Pin<Box<dyn Future<Output = Result<Record, FetchError>> + Send + 'a>>;
}

/// Запись в target topic с ожиданием подтверждения broker'а.
pub trait TargetWriter: Send + Sync {
    /// Ok только после подтверждённой persistence, не после "отправлено".
    fn append<'a>(
        &'a self,
        topic: &'a str,
        record: &'a Record,
        deadline: Deadline,
    ) -> Pin<Box<dyn Future<Output = Result<(), WriteError>> + Send + 'a>>;
}

/// Продвижение durable позиции consumer group'ы.
pub trait OffsetCommitter: Send + Sync {
    /// Установить committed offset в `offset + 1`. Вызывается только
    /// после подтверждённой записи соответствующей target записи.
    fn commit<'a>(
        &'a self,
        group_id: &'a str,
        topic: &'a str,
        partition: i32,
        offset: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), CommitError>> + Send + 'a>>;

    /// Текущая durable позиция group'ы в партиции.
    fn committed<'a>(
        &'a self,
        group_id: &'a str,
        topic: &'a str,
        partition: i32,
    ) -> Pin<Box<dyn Future<Output = Result<ConsumerPosition, CommitError>> + Send + 'a>>;
}
