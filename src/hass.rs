use serde::{Deserialize, Serialize};

const DISCOVERY_PREFIX: &str = "homeassistant/sensor";
const DEVICE_CLASS: &str = "temperature";
const UNIT_OF_MEASUREMENT: &str = "°C";
const VALUE_TEMPLATE: &str = "{{ value_json.temperature }}";

/// Static description of the monitored host, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    pub display_name: String,
    pub unique_id: String,
    pub device_id: String,
    pub model: String,
    pub manufacturer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicSet {
    /// Also used as the attributes topic.
    pub state: String,
    pub config: String,
}

impl TopicSet {
    /// Only lower-cases and replaces spaces, any other character is kept as is.
    pub fn derive(display_name: &str) -> Self {
        let slug = display_name.to_lowercase().replace(' ', "_");
        Self {
            state: format!("{DISCOVERY_PREFIX}/{slug}/state"),
            config: format!("{DISCOVERY_PREFIX}/{slug}/config"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Discovery {
    pub name: String,
    pub state_topic: String,
    pub unique_id: String,
    pub device_class: &'static str,
    pub unit_of_measurement: &'static str,
    pub value_template: &'static str,
    pub json_attributes_topic: String,
    pub device: Device,
}

impl Discovery {
    pub fn new(identity: &DeviceIdentity, topics: &TopicSet) -> Self {
        Self {
            name: format!("{} Temperature", identity.display_name),
            state_topic: topics.state.clone(),
            unique_id: identity.unique_id.clone(),
            device_class: DEVICE_CLASS,
            unit_of_measurement: UNIT_OF_MEASUREMENT,
            value_template: VALUE_TEMPLATE,
            json_attributes_topic: topics.state.clone(),
            device: Device {
                identifiers: vec![identity.device_id.clone()],
                name: identity.display_name.clone(),
                model: identity.model.clone(),
                manufacturer: identity.manufacturer.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct StateReading {
    pub temperature: f64,
    pub cpu_model: String,
    pub cpu_manufacturer: String,
}

impl StateReading {
    pub fn new(temperature: f64, identity: &DeviceIdentity) -> Self {
        Self {
            temperature,
            cpu_model: identity.model.clone(),
            cpu_manufacturer: identity.manufacturer.clone(),
        }
    }
}
