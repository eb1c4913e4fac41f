use std::borrow::Cow;

use crate::ProvisionError;

// ════════════════════════════════════════════════════════════════
//  Record
// ════════════════════════════════════════════════════════════════

/// Запись topic'а. Key и value: непрозрачные байты.
///
/// `partition` и `offset` заполнены только у записей, прочитанных из
/// source topic'а; у записей, готовящихся к отправке, они `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub topic: String,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

impl Record {
    /// Исходящая запись (без partition/offset).
    pub fn outgoing(topic: impl Into<String>, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            topic: topic.into(),
            partition: None,
            offset: None,
        }
    }

    /// Запись, прочитанная из broker'а.
    pub fn delivered(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            topic: topic.into(),
            partition: Some(partition),
            offset: Some(offset),
        }
    }

    /// Перенаправить запись в другой topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// (partition, offset) для записей из source topic'а.
    pub fn source_position(&self) -> Option<(i32, i64)> {
        Some((self.partition?, self.offset?))
    }

    pub fn key_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    pub fn value_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Чистое преобразование source записи в target запись.
///
/// Реализация обязана быть детерминированной и без side effects:
/// повторная доставка той же записи даёт побайтно ту же target запись.
pub trait RecordTransformer: Send + Sync {
    fn apply(&self, src: &Record) -> Record;
}

// ════════════════════════════════════════════════════════════════
//  TopicSpec
// ════════════════════════════════════════════════════════════════

/// Раскладка topic'а: имя, число партиций, replication factor.
/// Неизменяем после создания.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicSpec {
    name: String,
    partition_count: i32,
    replication_factor: i32,
}

impl TopicSpec {
    pub fn new(
        name: impl Into<String>,
        partition_count: i32,
        replication_factor: i32,
    ) -> Result<Self, ProvisionError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ProvisionError::InvalidSpec("empty topic name".into()));
        }
        if partition_count < 1 {
            return Err(ProvisionError::InvalidSpec(format!(
                "topic '{name}': partition count must be >= 1, got {partition_count}"
            )));
        }
        if replication_factor < 1 {
            return Err(ProvisionError::InvalidSpec(format!(
                "topic '{name}': replication factor must be >= 1, got {replication_factor}"
            )));
        }
        Ok(Self {
            name,
            partition_count,
            replication_factor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_count(&self) -> i32 {
        self.partition_count
    }

    pub fn replication_factor(&self) -> i32 {
        self.replication_factor
    }
}

// ════════════════════════════════════════════════════════════════
//  ConsumerPosition
// ════════════════════════════════════════════════════════════════

/// Durable позиция consumer group'ы в партиции. Принадлежит broker'у.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerPosition {
    pub group_id: String,
    pub topic: String,
    pub partition: i32,
    /// Offset следующей записи к чтению. None: group ещё ничего не commit'ила.
    pub committed_offset: Option<i64>,
}

impl ConsumerPosition {
    /// Offset, с которого group продолжит чтение (0, если commit'ов не было).
    pub fn next_offset(&self) -> i64 {
        self.committed_offset.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_spec_rejects_zero_partitions() {
        let err = TopicSpec::new("demo-topic", 0, 1).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidSpec(_)));
        assert!(TopicSpec::new("demo-topic", 1, 0).is_err());
        assert!(TopicSpec::new("", 1, 1).is_err());
    }

    #[test]
    fn test_topic_spec_accessors() {
        let spec = TopicSpec::new("demo-topic", 3, 1).unwrap();
        assert_eq!(spec.name(), "demo-topic");
        assert_eq!(spec.partition_count(), 3);
        assert_eq!(spec.replication_factor(), 1);
    }

    #[test]
    fn test_source_position_only_for_delivered() {
        let out = Record::outgoing("t", "k1", "hello");
        assert_eq!(out.source_position(), None);

        let got = Record::delivered("t", 0, 42, "k1", "hello");
        assert_eq!(got.source_position(), Some((0, 42)));
        assert_eq!(got.key_lossy(), "k1");
    }

    #[test]
    fn test_next_offset_defaults_to_zero() {
        let pos = ConsumerPosition {
            group_id: "forwarder-group".into(),
            topic: "demo-topic".into(),
            partition: 0,
            committed_offset: None,
        };
        assert_eq!(pos.next_offset(), 0);
    }
}
