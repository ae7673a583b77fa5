//! Output sinks for emitted records.
//!
//! Every enabled sink in the spec's `outputs` list receives each committed
//! event. Sinks run on their own worker tasks behind bounded queues (see
//! [`SinkSet`]); a slow sink applies back-pressure to the scheduler without
//! starving the others, and a failing sink is logged and eventually marked
//! unhealthy while the run continues.

mod fanout;
mod file;
mod kafka;
mod stdout;

pub use fanout::SinkSet;
pub use file::FileSink;
pub use kafka::{KafkaSink, KafkaSinkConfig};
pub use stdout::StdoutSink;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use resinker_core::spec::OutputConfig;
use resinker_core::Event;

/// Errors raised by sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// A destination for emitted records.
#[async_trait]
pub trait Sink: Send {
    /// Short name for logs ("stdout", "file", "kafka").
    fn name(&self) -> &'static str;

    /// Delivers one record.
    async fn emit(&mut self, event: &Event) -> Result<(), SinkError>;

    /// Flushes buffered records; called once on shutdown.
    async fn flush(&mut self) -> Result<(), SinkError>;
}

/// Builds one sink per enabled output configuration, preserving spec order.
/// Disabled sinks are skipped entirely (no connection is established).
pub fn build_sinks(outputs: &[OutputConfig]) -> Result<Vec<Box<dyn Sink>>, SinkError> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    for config in outputs {
        if !config.enabled() {
            info!(kind = config.kind(), "skipping disabled sink");
            continue;
        }
        match config {
            OutputConfig::Stdout { format, .. } => {
                sinks.push(Box::new(StdoutSink::new(*format)));
            }
            OutputConfig::File {
                file_path, format, ..
            } => {
                sinks.push(Box::new(FileSink::create(file_path, *format)?));
            }
            OutputConfig::Kafka {
                topic_mapping,
                default_topic,
                kafka_brokers,
                security_protocol,
                sasl_mechanism,
                sasl_plain_username,
                sasl_plain_password,
                ..
            } => {
                let sink = KafkaSink::connect(kafka::KafkaSinkConfig {
                    brokers: kafka_brokers.clone(),
                    topic_mapping: topic_mapping.clone(),
                    default_topic: default_topic.clone(),
                    security_protocol: security_protocol.clone(),
                    sasl_mechanism: sasl_mechanism.clone(),
                    sasl_plain_username: sasl_plain_username.clone(),
                    sasl_plain_password: sasl_plain_password.clone(),
                })?;
                sinks.push(Box::new(sink));
            }
        }
    }
    Ok(sinks)
}
