//! Kafka sink.
//!
//! Each record is produced to `topic_mapping[event_type]`, falling back to
//! `default_topic`. Broker and SASL settings pass straight through to
//! librdkafka's client configuration.

use async_trait::async_trait;
use indexmap::IndexMap;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::debug;

use resinker_core::Event;

use crate::{Sink, SinkError};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TOPIC: &str = "events";

/// Connection settings for a Kafka sink.
pub struct KafkaSinkConfig {
    pub brokers: String,
    pub topic_mapping: IndexMap<String, String>,
    pub default_topic: Option<String>,
    pub security_protocol: Option<String>,
    pub sasl_mechanism: Option<String>,
    pub sasl_plain_username: Option<String>,
    pub sasl_plain_password: Option<String>,
}

pub struct KafkaSink {
    producer: FutureProducer,
    topic_mapping: IndexMap<String, String>,
    default_topic: String,
}

impl KafkaSink {
    /// Creates the producer. Connection problems surface on first delivery,
    /// not here.
    pub fn connect(config: KafkaSinkConfig) -> Result<Self, SinkError> {
        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &config.brokers);
        if let Some(protocol) = &config.security_protocol {
            client_config.set("security.protocol", protocol);
        }
        if let Some(mechanism) = &config.sasl_mechanism {
            client_config.set("sasl.mechanism", mechanism);
        }
        if let Some(username) = &config.sasl_plain_username {
            client_config.set("sasl.username", username);
        }
        if let Some(password) = &config.sasl_plain_password {
            client_config.set("sasl.password", password);
        }

        let producer: FutureProducer = client_config.create()?;
        Ok(Self {
            producer,
            topic_mapping: config.topic_mapping,
            default_topic: config
                .default_topic
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
        })
    }

    fn topic_for(&self, event_type: &str) -> &str {
        self.topic_mapping
            .get(event_type)
            .map(String::as_str)
            .unwrap_or(&self.default_topic)
    }
}

#[async_trait]
impl Sink for KafkaSink {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn emit(&mut self, event: &Event) -> Result<(), SinkError> {
        let topic = self.topic_for(&event.event_type);
        let payload = serde_json::to_string(&event.to_json())?;
        let record = FutureRecord::to(topic)
            .key(event.event_type.as_str())
            .payload(payload.as_str());

        match self.producer.send(record, DELIVERY_TIMEOUT).await {
            Ok((partition, offset)) => {
                debug!(topic, partition, offset, "delivered record");
                Ok(())
            }
            Err((error, _record)) => Err(SinkError::Kafka(error)),
        }
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.producer.flush(Timeout::After(DELIVERY_TIMEOUT))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_mapping_fallback() {
        let mut topic_mapping = IndexMap::new();
        topic_mapping.insert("UserRegistered".to_string(), "users".to_string());

        let sink = KafkaSink::connect(KafkaSinkConfig {
            brokers: "localhost:9092".to_string(),
            topic_mapping,
            default_topic: Some("firehose".to_string()),
            security_protocol: None,
            sasl_mechanism: None,
            sasl_plain_username: None,
            sasl_plain_password: None,
        })
        .unwrap();

        assert_eq!(sink.topic_for("UserRegistered"), "users");
        assert_eq!(sink.topic_for("SomethingElse"), "firehose");
    }
}
