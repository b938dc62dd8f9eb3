use serde::Serialize;

use snafu::Snafu;
use snafu::prelude::*;

use crate::hass::{DeviceIdentity, Discovery, StateReading, TopicSet};

/// At most once: a lost reading is replaced by the next one.
pub const QOS: i32 = 0;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("MQTT error: {source}"))]
    Mqtt { source: paho_mqtt::Error },

    #[snafu(display("Connection closed"))]
    Closed,
}

#[derive(Debug, Snafu)]
pub enum PublishError {
    #[snafu(display("Cannot serialize payload for '{topic}': {source}"))]
    Serialize { topic: String, source: serde_json::Error },

    #[snafu(display("Cannot publish to '{topic}': {source}"))]
    Transport { topic: String, source: TransportError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub topic: String,
    pub payload: String,
    pub qos: i32,
}

/// Outgoing side of a broker session.
///
/// `publish` returns only once the transport has acknowledged the message, so
/// callers block for as long as the broker stalls.
pub trait Transport {
    fn publish(&self, envelope: Envelope) -> Result<(), TransportError>;
}

fn send<T: Transport, P: Serialize>(
    transport: &T,
    topic: &str,
    payload: &P,
) -> Result<(), PublishError> {
    let payload = serde_json::to_string(payload)
        .context(SerializeSnafu { topic })?;
    log::debug!("Sending message to {topic}: {payload}");
    // Sent without the retained flag, discovery is announced again on every connect.
    transport
        .publish(Envelope {
            topic: topic.to_string(),
            payload,
            qos: QOS,
        })
        .context(TransportSnafu { topic })
}

pub fn publish_discovery<T: Transport>(
    transport: &T,
    identity: &DeviceIdentity,
    topics: &TopicSet,
) -> Result<(), PublishError> {
    send(transport, &topics.config, &Discovery::new(identity, topics))?;
    log::info!("Home Assistant discovery config sent to {}", topics.config);
    Ok(())
}

pub fn publish_state<T: Transport>(
    transport: &T,
    temperature: f64,
    identity: &DeviceIdentity,
    topics: &TopicSet,
) -> Result<(), PublishError> {
    send(transport, &topics.state, &StateReading::new(temperature, identity))?;
    log::info!("Temperature {temperature}°C sent to {}", topics.state);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use crate::hass::TopicSet;
    use crate::hass::tests::identity;
    use super::{
        Envelope,
        PublishError,
        Transport,
        TransportError,
        publish_discovery,
        publish_state,
    };

    /// Records every envelope, clones share the same log.
    #[derive(Clone, Default)]
    pub(crate) struct TestTransport {
        pub(crate) sent: Arc<Mutex<Vec<Envelope>>>,
        pub(crate) closed: bool,
    }

    impl TestTransport {
        pub(crate) fn sent(&self) -> Vec<Envelope> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn sent_to(&self, topic: &str) -> Vec<Envelope> {
            self.sent().into_iter().filter(|e| e.topic == topic).collect()
        }
    }

    impl Transport for TestTransport {
        fn publish(&self, envelope: Envelope) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::Closed);
            }
            self.sent.lock().unwrap().push(envelope);
            Ok(())
        }
    }

    #[test]
    fn test_publish_discovery() {
        let transport = TestTransport::default();
        let topics = TopicSet::derive("My CPU Sensor");
        publish_discovery(&transport, &identity(), &topics).unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "homeassistant/sensor/my_cpu_sensor/config");
        assert_eq!(sent[0].qos, 0);
        let payload: serde_json::Value = serde_json::from_str(&sent[0].payload).unwrap();
        assert_eq!(payload["device"]["identifiers"], serde_json::json!(["cpu_temperature_sensor_device"]));
    }

    #[test]
    fn test_publish_state() {
        let transport = TestTransport::default();
        let topics = TopicSet::derive("My CPU Sensor");
        publish_state(&transport, 45.2, &identity(), &topics).unwrap();

        assert_eq!(
            transport.sent(),
            vec![Envelope {
                topic: "homeassistant/sensor/my_cpu_sensor/state".to_string(),
                payload: r#"{"temperature":45.2,"cpu_model":"Intel(R) Core(TM) i7","cpu_manufacturer":"GenuineIntel"}"#.to_string(),
                qos: 0,
            }]
        );
    }

    #[test]
    fn test_publish_state_transport_error() {
        let transport = TestTransport { closed: true, ..Default::default() };
        let topics = TopicSet::derive("My CPU Sensor");
        let err = publish_state(&transport, 45.2, &identity(), &topics).unwrap_err();
        assert!(matches!(
            err,
            PublishError::Transport { source: TransportError::Closed, .. }
        ));
        assert!(transport.sent().is_empty());
    }
}
