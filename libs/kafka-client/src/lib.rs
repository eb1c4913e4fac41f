//! rdkafka реализации стадий pipeline'а.

mod admin;
mod config;
mod consumer;
mod error;
mod producer;

pub use admin::KafkaProvisioner;
pub use config::KafkaSettings;
pub use consumer::KafkaSource;
pub use error::ClientError;
pub use producer::KafkaWriter;
