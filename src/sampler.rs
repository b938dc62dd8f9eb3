use std::sync::Arc;
use std::time::Duration;

use crate::hass::{DeviceIdentity, TopicSet};
use crate::publish::{Transport, publish_state};
use crate::sensors::TemperatureSource;

pub struct Sampler<S, T, P>
where
    S: TemperatureSource,
    T: Transport,
    P: FnMut(Duration),
{
    source: S,
    transport: T,
    identity: Arc<DeviceIdentity>,
    topics: Arc<TopicSet>,
    interval: Duration,
    pause: P,
}

impl<S, T, P> Sampler<S, T, P>
where
    S: TemperatureSource,
    T: Transport,
    P: FnMut(Duration),
{
    pub fn new(
        source: S,
        transport: T,
        identity: Arc<DeviceIdentity>,
        topics: Arc<TopicSet>,
        interval: Duration,
        pause: P,
    ) -> Self {
        Self {
            source,
            transport,
            identity,
            topics,
            interval,
            pause,
        }
    }

    /// One tick: read, publish on success, then wait a full interval.
    ///
    /// Failures are logged and the tick ends with the same pause, so the next
    /// reading is the retry.
    pub fn step(&mut self) {
        match self.source.read_celsius() {
            Ok(temperature) => {
                if let Err(e) = publish_state(&self.transport, temperature, &self.identity, &self.topics) {
                    log::warn!("Cannot publish temperature: {e}");
                }
            }
            Err(e) => log::error!("Error getting temperature: {e}"),
        }
        (self.pause)(self.interval);
    }

    pub fn run(&mut self) -> ! {
        log::info!("Sampling every {:?}", self.interval);
        loop {
            self.step();
        }
    }
}
