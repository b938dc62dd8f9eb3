use std::sync::Arc;
use std::sync::mpsc::channel;
use std::thread::{self, sleep};

use clap::Parser;

use snafu::{Whatever, whatever, ResultExt};

mod config;
use crate::config::{Args, Settings};
mod cpuinfo;
use crate::cpuinfo::{CpuInfo, CPUINFO_PATH};
mod hass;
use crate::hass::{DeviceIdentity, TopicSet};
mod lifecycle;
use crate::lifecycle::Lifecycle;
mod mqtt;
use crate::mqtt::MqttLink;
mod publish;
mod sampler;
use crate::sampler::Sampler;
mod sensors;
use crate::sensors::LmSensors;

fn init_logger(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .init();
}

fn main() -> Result<(), Whatever> {
    let args = Args::parse();
    let settings = Settings::load(args)
        .with_whatever_context(|e| format!("Invalid configuration: {e}"))?;
    init_logger(settings.debug);
    log::debug!("Using {settings:?}");

    let source = LmSensors::locate()
        .with_whatever_context(|e| format!("Sensors command not found: {e}"))?;
    let cpu = CpuInfo::read(CPUINFO_PATH)
        .with_whatever_context(|e| format!("Error getting CPU information: {e}"))?;
    log::info!("Monitoring {} ({})", cpu.model, cpu.manufacturer);

    let identity = Arc::new(DeviceIdentity {
        display_name: settings.device.name.clone(),
        unique_id: settings.device.unique_id.clone(),
        device_id: settings.device.id.clone(),
        model: cpu.model,
        manufacturer: cpu.manufacturer,
    });
    let topics = Arc::new(TopicSet::derive(&identity.display_name));

    let (events_tx, events_rx) = channel();
    let link = MqttLink::new(&settings.mqtt, events_tx)
        .with_whatever_context(|e| format!("Error creating mqtt client: {e}"))?;

    let mut lifecycle = Lifecycle::new(link.clone(), Arc::clone(&identity), Arc::clone(&topics));
    lifecycle.connecting();
    let (announced_tx, announced_rx) = channel();
    thread::Builder::new()
        .name("mqtt-lifecycle".to_string())
        .spawn(move || lifecycle.run(events_rx, announced_tx))
        .with_whatever_context(|e| format!("Cannot start lifecycle thread: {e}"))?;

    link.connect(&settings.mqtt, settings.interval)
        .with_whatever_context(|e| format!("Failed to connect to MQTT broker: {e}"))?;
    if announced_rx.recv().is_err() {
        whatever!("Lifecycle thread stopped before announcing the sensor");
    }

    let mut sampler = Sampler::new(
        source,
        link,
        identity,
        topics,
        settings.interval,
        sleep,
    );
    sampler.run()
}
