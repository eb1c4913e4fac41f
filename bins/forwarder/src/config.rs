use std::collections::BTreeMap;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use kafka_client::KafkaSettings;
use pipeline::config::{FollowConfig, TransformConfig};
use pipeline::{RetryPolicy, Route};
use relay_api::TopicSpec;

use crate::error::ForwarderError;

#[derive(Parser)]
#[command(name = "forwarder", about = "Пересылка записей между Kafka topic'ами с ручным commit'ом")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Переслать одну запись source → target и закоммитить offset
    Forward(ForwardArgs),
    /// Опубликовать одно сообщение в source topic
    Publish(PublishArgs),
    /// Создать source и target topic'и
    Provision(ProvisionArgs),
    /// provision + publish + forward за один запуск
    Demo(DemoArgs),
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct CommonArgs {
    /// Путь к TOML конфиг файлу (отсутствующий файл = значения по умолчанию)
    #[arg(long, default_value = "forwarder.toml", env = "FORWARDER_CONFIG")]
    pub config: String,

    /// Список брокеров (host:port[,host:port])
    #[arg(long, env = "KAFKA_BROKERS")]
    pub brokers: Option<String>,

    #[arg(long, env = "SOURCE_TOPIC")]
    pub source_topic: Option<String>,

    #[arg(long, env = "TARGET_TOPIC")]
    pub target_topic: Option<String>,

    #[arg(long, env = "GROUP_ID")]
    pub group_id: Option<String>,

    /// Число партиций при создании topic'ов
    #[arg(long)]
    pub partitions: Option<i32>,

    #[arg(long)]
    pub replication_factor: Option<i32>,

    /// Общий deadline одного прогона, секунды
    #[arg(long, env = "FORWARD_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Префикс value target записи
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ForwardArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Повторять прогоны до Ctrl+C
    #[arg(long)]
    pub follow: bool,

    /// Ограничить число прогонов в режиме --follow
    #[arg(long, requires = "follow")]
    pub max_runs: Option<u64>,

    /// Напечатать итог в stdout одной JSON строкой
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug)]
pub struct PublishArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, default_value = "key-1")]
    pub key: String,

    /// Value сообщения (по умолчанию: приветствие с меткой времени)
    #[arg(long)]
    pub value: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Clone, Debug)]
pub struct DemoArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// In-process broker вместо Kafka
    #[arg(long)]
    pub memory: bool,

    #[arg(long, default_value = "key-1")]
    pub key: String,

    #[arg(long)]
    pub value: Option<String>,

    #[arg(long)]
    pub json: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub brokers: Option<String>,
    pub source_topic: Option<String>,
    pub target_topic: Option<String>,
    pub group_id: Option<String>,
    pub partitions: Option<i32>,
    pub replication_factor: Option<i32>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub transform: TransformConfig,
    pub startup_retry: Option<RetryPolicy>,
    pub write_retry: Option<RetryPolicy>,
    #[serde(default)]
    pub follow: FollowConfig,
    /// Дополнительные librdkafka свойства.
    #[serde(default)]
    pub kafka: BTreeMap<String, toml::Value>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ForwarderError> {
        let content = std::fs::read_to_string(path).map_err(|e| ForwarderError::Config {
            context: "read",
            detail: format!("'{path}': {e}"),
        })?;
        toml::from_str(&content).map_err(|e| ForwarderError::Config {
            context: "parse",
            detail: format!("'{path}': {e}"),
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

const DEFAULT_BROKERS: &str = "localhost:9092";
const DEFAULT_SOURCE_TOPIC: &str = "demo-topic";
const DEFAULT_TARGET_TOPIC: &str = "demo-topic-forwarded";
const DEFAULT_GROUP_ID: &str = "forwarder-group";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Итоговая конфигурация после мержа: config.toml < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub brokers: String,
    pub source_topic: String,
    pub target_topic: String,
    pub group_id: String,
    pub partitions: i32,
    pub replication_factor: i32,
    pub timeout: Duration,
    pub transform: TransformConfig,
    pub startup_retry: RetryPolicy,
    pub write_retry: RetryPolicy,
    pub follow: FollowConfig,
    pub kafka: BTreeMap<String, String>,
}

impl Effective {
    pub fn new(args: &CommonArgs) -> Result<Self, ForwarderError> {
        let cfg = match Config::load(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };
        Self::merge(args, cfg)
    }

    pub fn merge(args: &CommonArgs, cfg: Config) -> Result<Self, ForwarderError> {
        let mut transform = cfg.transform;
        if let Some(prefix) = &args.prefix {
            transform.prefix = prefix.clone();
        }

        let eff = Self {
            brokers: args.brokers.clone().or(cfg.brokers).unwrap_or_else(|| DEFAULT_BROKERS.into()),
            source_topic: args
                .source_topic
                .clone()
                .or(cfg.source_topic)
                .unwrap_or_else(|| DEFAULT_SOURCE_TOPIC.into()),
            target_topic: args
                .target_topic
                .clone()
                .or(cfg.target_topic)
                .unwrap_or_else(|| DEFAULT_TARGET_TOPIC.into()),
            group_id: args.group_id.clone().or(cfg.group_id).unwrap_or_else(|| DEFAULT_GROUP_ID.into()),
            partitions: args.partitions.or(cfg.partitions).unwrap_or(1),
            replication_factor: args.replication_factor.or(cfg.replication_factor).unwrap_or(1),
            timeout: Duration::from_secs(
                args.timeout_secs.or(cfg.timeout_secs).unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            transform,
            startup_retry: cfg.startup_retry.unwrap_or_default(),
            write_retry: cfg.write_retry.unwrap_or_else(RetryPolicy::none),
            follow: cfg.follow,
            kafka: cfg
                .kafka
                .into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        toml::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, value)
                })
                .collect(),
        };
        eff.validate()?;
        Ok(eff)
    }

    fn validate(&self) -> Result<(), ForwarderError> {
        let invalid = |detail: String| ForwarderError::Config {
            context: "validate",
            detail,
        };
        if self.brokers.trim().is_empty() {
            return Err(invalid("brokers is empty".into()));
        }
        if self.group_id.is_empty() {
            return Err(invalid("group_id is empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout_secs must be > 0".into()));
        }
        if self.source_topic == self.target_topic {
            return Err(invalid(format!(
                "source and target topic are both '{}'",
                self.source_topic
            )));
        }
        Ok(())
    }

    pub fn route(&self) -> Route {
        Route {
            group_id: self.group_id.clone(),
            source_topic: self.source_topic.clone(),
            target_topic: self.target_topic.clone(),
        }
    }

    pub fn source_spec(&self) -> Result<TopicSpec, ForwarderError> {
        Ok(TopicSpec::new(&self.source_topic, self.partitions, self.replication_factor)?)
    }

    pub fn topic_specs(&self) -> Result<Vec<TopicSpec>, ForwarderError> {
        Ok(vec![
            self.source_spec()?,
            TopicSpec::new(&self.target_topic, self.partitions, self.replication_factor)?,
        ])
    }

    pub fn kafka_settings(&self) -> KafkaSettings {
        KafkaSettings::new(&self.brokers)
            .with_request_timeout(self.timeout)
            .with_properties(self.kafka.clone())
    }
}
