use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};

use crate::hass::{DeviceIdentity, TopicSet};
use crate::publish::{Transport, publish_discovery};

/// Notifications emitted by the transport from its own threads.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected,
    ConnectionLost,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Tracks the broker session and announces the sensor each time it comes up.
pub struct Lifecycle<T: Transport> {
    transport: T,
    identity: Arc<DeviceIdentity>,
    topics: Arc<TopicSet>,
    state: LinkState,
}

impl<T: Transport> Lifecycle<T> {
    pub fn new(transport: T, identity: Arc<DeviceIdentity>, topics: Arc<TopicSet>) -> Self {
        Self {
            transport,
            identity,
            topics,
            state: LinkState::Disconnected,
        }
    }

    /// Called right before the first connection attempt.
    pub fn connecting(&mut self) {
        self.state = LinkState::Connecting;
    }

    pub fn handle(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => {
                if self.state == LinkState::Connected {
                    log::debug!("Connected again without a connection loss");
                } else {
                    log::info!("Connected to MQTT broker");
                }
                self.state = LinkState::Connected;
                if let Err(e) = publish_discovery(&self.transport, &self.identity, &self.topics) {
                    log::error!("Error when announcing sensor: {e}");
                }
            }
            LinkEvent::ConnectionLost => {
                log::warn!("Connection to MQTT broker lost. Attempting to reconnect...");
                self.state = LinkState::Connecting;
            }
        }
    }

    /// Handles events until every sender is gone.
    ///
    /// `announced` is signalled once, after the first discovery publish.
    pub fn run(mut self, events: Receiver<LinkEvent>, announced: Sender<()>) {
        let mut announced = Some(announced);
        for event in events {
            let connected = event == LinkEvent::Connected;
            self.handle(event);
            if connected {
                if let Some(tx) = announced.take() {
                    let _ = tx.send(());
                }
            }
        }
        log::debug!("Link event channel closed");
    }
}
