use std::collections::BTreeMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;

/// Параметры подключения к кластеру.
///
/// `extra`: произвольные librdkafka свойства (секция `[kafka]` конфига:
/// security.protocol, sasl.*, client.id, ...). Ключи, от которых зависит
/// порядок fetch → append → commit, переопределить нельзя.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub brokers: String,
    /// Timeout для синхронных запросов: metadata, commit, committed offsets.
    pub request_timeout: Duration,
    pub extra: BTreeMap<String, String>,
}

impl KafkaSettings {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            request_timeout: Duration::from_secs(10),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_properties(mut self, props: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra.extend(props);
        self
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);
        for (key, value) in &self.extra {
            config.set(key, value);
        }
        config
    }

    /// Consumer с ручным commit'ом: ни auto-commit, ни auto-store offset'ов.
    pub fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("auto.offset.reset", "earliest");
        for (key, value) in &self.extra {
            config.set(key, value);
        }
        config
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false");
        config
    }

    /// Producer, отвечающий только после подтверждения всех ISR.
    ///
    /// `delivery_timeout` ограничивает ожидание ack'а внутри librdkafka.
    pub fn producer_config(&self, delivery_timeout: Duration) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", delivery_timeout.as_millis().to_string());
        for (key, value) in &self.extra {
            config.set(key, value);
        }
        config.set("acks", "all");
        config
    }
}
