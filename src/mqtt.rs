use std::sync::mpsc::Sender;
use std::time::Duration;

use paho_mqtt as mqtt;
use snafu::prelude::*;

use crate::config::MqttSettings;
use crate::lifecycle::LinkEvent;
use crate::publish::{Envelope, MqttSnafu, Transport, TransportError};

/// Fixed delay between reconnect attempts, retried forever.
pub const MQTT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);
const MQTT_MIN_KEEP_ALIVE: Duration = Duration::from_secs(20);
const MQTT_MAX_KEEP_ALIVE: Duration = Duration::from_secs(u16::MAX as u64);

/// Twice the sampling interval, within what the CONNECT packet can carry.
fn keep_alive(interval: Duration) -> Duration {
    interval
        .checked_mul(2)
        .unwrap_or(MQTT_MAX_KEEP_ALIVE)
        .clamp(MQTT_MIN_KEEP_ALIVE, MQTT_MAX_KEEP_ALIVE)
}

/// Broker session backed by the paho client.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct MqttLink {
    client: mqtt::AsyncClient,
}

impl MqttLink {
    /// Creates the client and forwards its connection callbacks to `events`.
    pub fn new(cfg: &MqttSettings, events: Sender<LinkEvent>) -> Result<Self, TransportError> {
        let create_opts = mqtt::CreateOptionsBuilder::new()
            .server_uri(&cfg.broker)
            .client_id(&cfg.client_id)
            .finalize();
        let client = mqtt::AsyncClient::new(create_opts)
            .context(MqttSnafu)?;

        let connected = events.clone();
        client.set_connected_callback(move |_| {
            let _ = connected.send(LinkEvent::Connected);
        });
        client.set_connection_lost_callback(move |_| {
            let _ = events.send(LinkEvent::ConnectionLost);
        });

        Ok(Self { client })
    }

    /// Blocks until the first connection succeeds or fails.
    pub fn connect(&self, cfg: &MqttSettings, interval: Duration) -> Result<(), TransportError> {
        let mut conn_opts_builder = mqtt::ConnectOptionsBuilder::new();
        conn_opts_builder
            .keep_alive_interval(keep_alive(interval))
            .automatic_reconnect(MQTT_RECONNECT_INTERVAL, MQTT_RECONNECT_INTERVAL)
            .clean_session(true);
        if let Some(auth) = &cfg.auth {
            conn_opts_builder
                .user_name(&auth.user)
                .password(&auth.password);
        }
        let conn_opts = conn_opts_builder.finalize();

        log::info!("Connecting to MQTT broker {}", cfg.broker);
        self.client.connect(conn_opts)
            .wait()
            .context(MqttSnafu)?;
        Ok(())
    }
}

impl Transport for MqttLink {
    fn publish(&self, envelope: Envelope) -> Result<(), TransportError> {
        if !self.client.is_connected() {
            return Err(TransportError::Closed);
        }
        let Envelope { topic, payload, qos } = envelope;
        self.client.publish(mqtt::Message::new(topic, payload, qos))
            .wait()
            .context(MqttSnafu)
    }
}
