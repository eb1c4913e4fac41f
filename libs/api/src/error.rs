// ════════════════════════════════════════════════════════════════
//  Stage errors
// ════════════════════════════════════════════════════════════════
//
// Каждая стадия pipeline возвращает свой тип ошибки, чтобы оркестратор
// различал, на каком шаге произошёл отказ. `is_retryable()` отделяет
// транзиентные сбои (сеть, недоступный broker) от постоянных (конфиг,
// отказ broker'а), аналогично `ErrorKind::Io` / `ErrorKind::Config`.

/// Ошибка создания topic'а. "Topic уже существует" ошибкой не считается.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    /// Некорректный TopicSpec: отклонён до обращения к broker'у.
    #[error("invalid topic spec: {0}")]
    InvalidSpec(String),

    /// Controller/broker недоступен.
    #[error("controller unreachable: {0}")]
    Unreachable(String),

    /// Broker отклонил запрос (авторизация, число партиций и т.д.).
    #[error("topic '{topic}' rejected: {reason}")]
    Rejected { topic: String, reason: String },
}

impl ProvisionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisionError::Unreachable(_))
    }
}

/// Ошибка получения записи из source topic'а.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Deadline истёк до появления записи.
    #[error("no record before deadline")]
    Timeout,

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::BrokerUnavailable(_))
    }
}

/// Ошибка записи в target topic. После неё commit не выполняется.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// Подтверждение не получено до deadline. Запись могла дойти до broker'а.
    #[error("no acknowledgement before deadline")]
    Timeout,

    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("topic '{0}' does not exist")]
    UnknownTopic(String),

    /// Broker отклонил запись (partition недоступна, размер и т.д.).
    #[error("rejected: {0}")]
    Rejected(String),
}

impl WriteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, WriteError::Timeout | WriteError::Unreachable(_))
    }
}

/// Ошибка commit'а offset'а. Запись в target к этому моменту уже сделана.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("commit timed out")]
    Timeout,

    #[error("commit rejected: {0}")]
    Broker(String),
}

impl CommitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommitError::Timeout)
    }
}
