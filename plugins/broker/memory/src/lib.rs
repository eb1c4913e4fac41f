use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use relay_api::{
    CommitError, ConsumerPosition, Deadline, FetchError, OffsetCommitter, ProvisionError,
    Record, SourceReader, TargetWriter, TopicProvisioner, TopicSpec, WriteError,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryBrokerConfig
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct MemoryBrokerConfig {
    /// Создавать topic (1 партиция) при записи в несуществующий topic.
    pub auto_create_topics: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Journal
// ═══════════════════════════════════════════════════════════════

/// Наблюдаемое действие broker'а, в порядке выполнения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    Created { topic: String },
    Fetched { topic: String, partition: i32, offset: i64 },
    Appended { topic: String, partition: i32, offset: i64 },
    Committed { group_id: String, topic: String, partition: i32, offset: i64 },
}

// ═══════════════════════════════════════════════════════════════
//  Fault injection
// ═══════════════════════════════════════════════════════════════

/// Очереди ошибок и задержки. Каждая ошибка срабатывает один раз.
#[derive(Debug, Default)]
struct FaultPlan {
    provision: VecDeque<ProvisionError>,
    fetch: VecDeque<FetchError>,
    write: VecDeque<WriteError>,
    commit: VecDeque<CommitError>,
    fetch_latency: Duration,
    write_latency: Duration,
}

// ═══════════════════════════════════════════════════════════════
//  State
// ═══════════════════════════════════════════════════════════════

struct TopicLog {
    spec: TopicSpec,
    partitions: Vec<Vec<(Vec<u8>, Vec<u8>)>>,
}

impl TopicLog {
    fn new(spec: TopicSpec) -> Self {
        let partitions = (0..spec.partition_count()).map(|_| Vec::new()).collect();
        Self { spec, partitions }
    }

    fn partition_for(&self, key: &[u8]) -> i32 {
        if key.is_empty() || self.partitions.len() == 1 {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as i32
    }
}

type GroupKey = (String, String, i32);

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicLog>,
    /// (group, topic, partition) → offset следующей записи к чтению.
    offsets: HashMap<GroupKey, i64>,
    faults: FaultPlan,
    journal: Vec<BrokerEvent>,
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBroker
// ═══════════════════════════════════════════════════════════════

/// In-process broker: topics с партициями, committed offsets consumer
/// group'ов, симулированная задержка и инъекция отказов.
///
/// Реализует все четыре broker трейта. Чтение всегда идёт с committed
/// offset'а, поэтому незакоммиченная запись доставляется повторно.
#[derive(Default)]
pub struct MemoryBroker {
    config: MemoryBrokerConfig,
    state: Mutex<BrokerState>,
    appended: Notify,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MemoryBrokerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub async fn fail_next_provision(&self, err: ProvisionError) {
        self.state.lock().await.faults.provision.push_back(err);
    }

    pub async fn fail_next_fetch(&self, err: FetchError) {
        self.state.lock().await.faults.fetch.push_back(err);
    }

    pub async fn fail_next_write(&self, err: WriteError) {
        self.state.lock().await.faults.write.push_back(err);
    }

    pub async fn fail_next_commit(&self, err: CommitError) {
        self.state.lock().await.faults.commit.push_back(err);
    }

    /// Задержка перед выдачей записи из fetch.
    pub async fn set_fetch_latency(&self, latency: Duration) {
        self.state.lock().await.faults.fetch_latency = latency;
    }

    /// Задержка перед подтверждением append.
    pub async fn set_write_latency(&self, latency: Duration) {
        self.state.lock().await.faults.write_latency = latency;
    }

    /// Все записи topic'а: партиции по порядку, внутри: по offset'у.
    pub async fn records(&self, topic: &str) -> Vec<Record> {
        let state = self.state.lock().await;
        let Some(log) = state.topics.get(topic) else {
            return Vec::new();
        };
        log.partitions
            .iter()
            .enumerate()
            .flat_map(|(p, records)| {
                records.iter().enumerate().map(move |(o, (key, value))| {
                    Record::delivered(topic, p as i32, o as i64, key.clone(), value.clone())
                })
            })
            .collect()
    }

    pub async fn topic_spec(&self, topic: &str) -> Option<TopicSpec> {
        self.state.lock().await.topics.get(topic).map(|t| t.spec.clone())
    }

    pub async fn journal(&self) -> Vec<BrokerEvent> {
        self.state.lock().await.journal.clone()
    }

    /// Следующая незакоммиченная запись group'ы (первая партиция с данными).
    async fn next_uncommitted(&self, group_id: &str, topic: &str) -> Result<Option<Record>, FetchError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.faults.fetch.pop_front() {
            return Err(err);
        }
        let Some(log) = state.topics.get(topic) else {
            return Ok(None);
        };
        let mut found = None;
        for (p, records) in log.partitions.iter().enumerate() {
            let partition = p as i32;
            let next = state
                .offsets
                .get(&(group_id.to_string(), topic.to_string(), partition))
                .copied()
                .unwrap_or(0);
            if let Some((key, value)) = records.get(next as usize) {
                found = Some(Record::delivered(topic, partition, next, key.clone(), value.clone()));
                break;
            }
        }
        if let Some(ref record) = found {
            state.journal.push(BrokerEvent::Fetched {
                topic: topic.to_string(),
                partition: record.partition.unwrap_or_default(),
                offset: record.offset.unwrap_or_default(),
            });
        }
        Ok(found)
    }
}

/// Подождать `latency`, но не дольше deadline. false: deadline истёк.
async fn simulate_latency(latency: Duration, deadline: Deadline) -> bool {
    if latency.is_zero() {
        return true;
    }
    tokio::time::timeout_at(deadline.instant(), tokio::time::sleep(latency))
        .await
        .is_ok()
}

impl TopicProvisioner for MemoryBroker {
    fn ensure<'a>(
        &'a self,
        spec: &'a TopicSpec,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProvisionError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if let Some(err) = state.faults.provision.pop_front() {
                return Err(err);
            }
            if let Some(existing) = state.topics.get(spec.name()) {
                if existing.spec != *spec {
                    tracing::debug!(
                        topic = %spec.name(),
                        partitions = existing.spec.partition_count(),
                        "topic exists with different layout, keeping it"
                    );
                }
                return Ok(());
            }
            state.topics.insert(spec.name().to_string(), TopicLog::new(spec.clone()));
            state.journal.push(BrokerEvent::Created {
                topic: spec.name().to_string(),
            });
            Ok(())
        })
    }
}

impl SourceReader for MemoryBroker {
    fn fetch<'a>(
        &'a self,
        group_id: &'a str,
        topic: &'a str,
        deadline: Deadline,
    ) -> Pin<Box<dyn Future<Output = Result<Record, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let latency = self.state.lock().await.faults.fetch_latency;
            if !simulate_latency(latency, deadline).await {
                return Err(FetchError::Timeout);
            }

            loop {
                // Регистрируемся до проверки, чтобы не пропустить notify от append.
                let notified = self.appended.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(record) = self.next_uncommitted(group_id, topic).await? {
                    return Ok(record);
                }
                if tokio::time::timeout_at(deadline.instant(), notified).await.is_err() {
                    return Err(FetchError::Timeout);
                }
            }
        })
    }
}

impl TargetWriter for MemoryBroker {
    fn append<'a>(
        &'a self,
        topic: &'a str,
        record: &'a Record,
        deadline: Deadline,
    ) -> Pin<Box<dyn Future<Output = Result<(), WriteError>> + Send + 'a>> {
        Box::pin(async move {
            let latency = self.state.lock().await.faults.write_latency;
            if !simulate_latency(latency, deadline).await {
                return Err(WriteError::Timeout);
            }

            let mut state = self.state.lock().await;
            if let Some(err) = state.faults.write.pop_front() {
                return Err(err);
            }
            if !state.topics.contains_key(topic) {
                if !self.config.auto_create_topics {
                    return Err(WriteError::UnknownTopic(topic.to_string()));
                }
                let spec = TopicSpec::new(topic, 1, 1)
                    .map_err(|e| WriteError::Rejected(e.to_string()))?;
                state.topics.insert(topic.to_string(), TopicLog::new(spec));
                state.journal.push(BrokerEvent::Created {
                    topic: topic.to_string(),
                });
            }

            let (partition, offset) = {
                let Some(log) = state.topics.get_mut(topic) else {
                    return Err(WriteError::UnknownTopic(topic.to_string()));
                };
                let partition = log.partition_for(&record.key);
                let records = &mut log.partitions[partition as usize];
                records.push((record.key.clone(), record.value.clone()));
                (partition, records.len() as i64 - 1)
            };
            state.journal.push(BrokerEvent::Appended {
                topic: topic.to_string(),
                partition,
                offset,
            });
            drop(state);

            self.appended.notify_waiters();
            Ok(())
        })
    }
}

impl OffsetCommitter for MemoryBroker {
    fn commit<'a>(
        &'a self,
        group_id: &'a str,
        topic: &'a str,
        partition: i32,
        offset: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), CommitError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if let Some(err) = state.faults.commit.pop_front() {
                return Err(err);
            }
            let known = state
                .topics
                .get(topic)
                .is_some_and(|log| (partition as usize) < log.partitions.len() && partition >= 0);
            if !known {
                return Err(CommitError::Broker(format!(
                    "unknown topic or partition {topic}/{partition}"
                )));
            }
            state
                .offsets
                .insert((group_id.to_string(), topic.to_string(), partition), offset + 1);
            state.journal.push(BrokerEvent::Committed {
                group_id: group_id.to_string(),
                topic: topic.to_string(),
                partition,
                offset,
            });
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
            let state = self.state.lock().await;
            let committed_offset = state
                .offsets
                .get(&(group_id.to_string(), topic.to_string(), partition))
                .copied();
            Ok(ConsumerPosition {
                group_id: group_id.to_string(),
                topic: topic.to_string(),
                partition,
                committed_offset,
            })
        })
    }
}
