use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::Message;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use tokio::sync::Mutex;

use relay_api::{
    CommitError, ConsumerPosition, Deadline, FetchError, OffsetCommitter, Record, SourceReader,
};

use crate::config::KafkaSettings;
use crate::error::{ClientError, commit_error, fetch_error};

// ═══════════════════════════════════════════════════════════════
//  PendingOffsets: выданные, но не закоммиченные записи
// ═══════════════════════════════════════════════════════════════

/// Самый ранний незакоммиченный offset по каждой партиции.
#[derive(Debug, Default)]
struct PendingOffsets {
    by_partition: HashMap<i32, i64>,
}

impl PendingOffsets {
    /// Запомнить выданную запись. Более ранний offset партиции не перезаписывается.
    fn remember(&mut self, partition: i32, offset: i64) {
        self.by_partition.entry(partition).or_insert(offset);
    }

    /// Снять партицию, если commit покрыл её pending offset.
    fn forget(&mut self, partition: i32, committed: i64) {
        if self.by_partition.get(&partition).is_some_and(|&o| o <= committed) {
            self.by_partition.remove(&partition);
        }
    }

    /// Забрать все позиции для seek'а; после вызова набор пуст.
    fn drain(&mut self) -> Vec<(i32, i64)> {
        let mut positions: Vec<_> = self.by_partition.drain().collect();
        positions.sort_unstable();
        positions
    }
}

// ═══════════════════════════════════════════════════════════════
//  GroupConsumer: подписка одной group'ы на один topic
// ═══════════════════════════════════════════════════════════════

/// Долгоживущий consumer `group_id` → `topic`.
///
/// librdkafka двигает fetch-позицию при доставке, поэтому offset'ы
/// выданных, но не закоммиченных записей запоминаются в `pending`,
/// и перед следующим fetch партиция откатывается к ним.
struct GroupConsumer {
    consumer: StreamConsumer,
    topic: String,
    pending: Mutex<PendingOffsets>,
}

impl GroupConsumer {
    fn subscribe(settings: &KafkaSettings, group_id: &str, topic: &str) -> Result<Self, ClientError> {
        let consumer: StreamConsumer = settings.consumer_config(group_id).create()?;
        consumer.subscribe(&[topic])?;
        tracing::info!(group = %group_id, topic = %topic, "consumer subscribed");
        Ok(Self {
            consumer,
            topic: topic.to_string(),
            pending: Mutex::new(PendingOffsets::default()),
        })
    }

    /// Вернуть fetch-позицию к незакоммиченным записям.
    async fn rewind(&self) {
        let positions = self.pending.lock().await.drain();
        for (partition, offset) in positions {
            // Партиция могла уйти при rebalance: тогда позицию задаст committed offset.
            if let Err(e) = self
                .consumer
                .seek(&self.topic, partition, Offset::Offset(offset), Duration::ZERO)
            {
                tracing::debug!(topic = %self.topic, partition, offset, error = %e, "seek back skipped");
            }
        }
    }

    async fn remember(&self, partition: i32, offset: i64) {
        self.pending.lock().await.remember(partition, offset);
    }

    async fn forget(&self, partition: i32, committed: i64) {
        self.pending.lock().await.forget(partition, committed);
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaSource
// ═══════════════════════════════════════════════════════════════

/// Source сторона: чтение и commit offset'ов одной consumer group'ы.
///
/// Consumer на пару (group, topic) создаётся при первом обращении и
/// живёт вместе с KafkaSource.
pub struct KafkaSource {
    settings: KafkaSettings,
    groups: Mutex<HashMap<(String, String), Arc<GroupConsumer>>>,
}

impl KafkaSource {
    pub fn new(settings: KafkaSettings) -> Self {
        Self {
            settings,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Создать подписку заранее, чтобы ошибки конфигурации всплыли при старте.
    pub async fn connect(&self, group_id: &str, topic: &str) -> Result<(), ClientError> {
        self.group(group_id, topic).await.map(|_| ())
    }

    async fn group(&self, group_id: &str, topic: &str) -> Result<Arc<GroupConsumer>, ClientError> {
        let mut groups = self.groups.lock().await;
        let key = (group_id.to_string(), topic.to_string());
        if let Some(existing) = groups.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let created = Arc::new(GroupConsumer::subscribe(&self.settings, group_id, topic)?);
        groups.insert(key, Arc::clone(&created));
        Ok(created)
    }
}

impl SourceReader for KafkaSource {
    fn fetch<'a>(
        &'a self,
        group_id: &'a str,
        topic: &'a str,
        deadline: Deadline,
    ) -> Pin<Box<dyn Future<Output = Result<Record, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let group = self
                .group(group_id, topic)
                .await
                .map_err(|e| FetchError::BrokerUnavailable(e.to_string()))?;
            group.rewind().await;
            if deadline.is_expired() {
                return Err(FetchError::Timeout);
            }

            let record = match tokio::time::timeout_at(deadline.instant(), group.consumer.recv()).await {
                Err(_) => return Err(FetchError::Timeout),
                Ok(Err(e)) => return Err(fetch_error(e)),
                Ok(Ok(msg)) => Record::delivered(
                    msg.topic(),
                    msg.partition(),
                    msg.offset(),
                    msg.key().unwrap_or_default(),
                    msg.payload().unwrap_or_default(),
                ),
            };

            if let Some((partition, offset)) = record.source_position() {
                group.remember(partition, offset).await;
            }
            Ok(record)
        })
    }
}

impl OffsetCommitter for KafkaSource {
    fn commit<'a>(
        &'a self,
        group_id: &'a str,
        topic: &'a str,
        partition: i32,
        offset: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), CommitError>> + Send + 'a>> {
        Box::pin(async move {
            let group = self
                .group(group_id, topic)
                .await
                .map_err(|e| CommitError::Broker(e.to_string()))?;

            let mut tpl = TopicPartitionList::new();
            tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1))
                .map_err(|e| CommitError::Broker(e.to_string()))?;

            // CommitMode::Sync блокирует поток до ответа coordinator'а.
            let committer = Arc::clone(&group);
            let task =
                tokio::task::spawn_blocking(move || committer.consumer.commit(&tpl, CommitMode::Sync));
            tokio::time::timeout(self.settings.request_timeout, task)
                .await
                .map_err(|_| CommitError::Timeout)?
                .map_err(|e| CommitError::Broker(format!("commit task: {e}")))?
                .map_err(commit_error)?;

            group.forget(partition, offset).await;
            tracing::debug!(group = %group_id, topic = %topic, partition, next = offset + 1, "offset committed");
            Ok(())
        })
    }

    fn committed<'a>(
        &'a self,
        group_id: &'a str,
        topic: &'a str,
        partition: i32,
    ) -> Pin<Box<dyn Future<Output = Result<ConsumerPosition, CommitError>> + Send + 'a>> {
        Box::pin(async move {
            let group = self
                .group(group_id, topic)
                .await
                .map_err(|e| CommitError::Broker(e.to_string()))?;

            let mut tpl = TopicPartitionList::new();
            tpl.add_partition(topic, partition);
            let timeout = self.settings.request_timeout;
            let reader = Arc::clone(&group);
            let committed = tokio::task::spawn_blocking(move || reader.consumer.committed_offsets(tpl, timeout))
                .await
                .map_err(|e| CommitError::Broker(format!("committed task: {e}")))?
                .map_err(commit_error)?;

            let committed_offset = committed
                .find_partition(topic, partition)
                .and_then(|elem| match elem.offset() {
                    Offset::Offset(o) => Some(o),
                    _ => None,
                });
            Ok(ConsumerPosition {
                group_id: group_id.to_string(),
                topic: topic.to_string(),
                partition,
                committed_offset,
            })
        })
    }
}
