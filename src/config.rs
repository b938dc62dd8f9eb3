use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use snafu::Snafu;
use snafu::prelude::*;

const DEFAULT_BROKER: &str = "tcp://localhost:1883";
const DEFAULT_CLIENT_ID: &str = "cputemp2mqtt";
const DEFAULT_DEVICE_NAME: &str = "CPU Sensor";
const DEFAULT_UNIQUE_ID: &str = "cpu_temperature_sensor";
const DEFAULT_DEVICE_ID: &str = "cpu_temperature_sensor_device";
const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
/// Twice this must fit the 16-bit MQTT keep-alive.
pub const MAX_INTERVAL: Duration = Duration::from_secs(u16::MAX as u64 / 2);

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Cannot open config file {path}: {source}"))]
    Open { path: String, source: std::io::Error },

    #[snafu(display("Error when parsing config file {path}: {source}"))]
    Parse { path: String, source: serde_yaml::Error },

    #[snafu(display("Invalid interval '{value}', expected e.g. 500ms, 10s, 5m or 1h"))]
    InvalidInterval { value: String },

    #[snafu(display("Interval must be greater than zero"))]
    ZeroInterval,

    #[snafu(display("Interval '{value}' is longer than {}s", MAX_INTERVAL.as_secs()))]
    IntervalTooLong { value: String },

    #[snafu(display("MQTT password given without a user"))]
    PasswordWithoutUser,
}

/// Publishes the CPU temperature to MQTT with Home Assistant autodiscovery.
///
/// Flags override values from the config file, which override the defaults.
#[derive(Parser, Debug, Default)]
#[command(version, after_help = "Example:\n  cputemp2mqtt --mqtt-broker tcp://192.168.1.100:1883 --device-name \"My CPU Sensor\" --interval 30s")]
pub struct Args {
    /// YAML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// MQTT broker URL [default: tcp://localhost:1883]
    #[arg(long)]
    pub mqtt_broker: Option<String>,

    /// MQTT client ID [default: cputemp2mqtt]
    #[arg(long)]
    pub client_id: Option<String>,

    #[arg(long)]
    pub mqtt_user: Option<String>,

    #[arg(long)]
    pub mqtt_password: Option<String>,

    /// Name of the device [default: CPU Sensor]
    #[arg(long)]
    pub device_name: Option<String>,

    /// Unique ID for the sensor [default: cpu_temperature_sensor]
    #[arg(long)]
    pub unique_id: Option<String>,

    /// Device ID [default: cpu_temperature_sensor_device]
    #[arg(long)]
    pub device_id: Option<String>,

    /// Interval between temperature readings [default: 10s]
    #[arg(long, value_parser = parse_interval)]
    pub interval: Option<Duration>,

    /// Log every payload sent to the broker
    #[arg(long)]
    pub debug: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub mqtt: FileMqttConfig,
    #[serde(default)]
    pub device: FileDeviceConfig,
    pub interval: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileMqttConfig {
    pub broker: Option<String>,
    pub client_id: Option<String>,
    pub auth: Option<MqttAuth>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileDeviceConfig {
    pub name: Option<String>,
    pub unique_id: Option<String>,
    pub id: Option<String>,
}

#[derive(Deserialize, Clone, PartialEq)]
pub struct MqttAuth {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for MqttAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttAuth")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub broker: String,
    pub client_id: String,
    pub auth: Option<MqttAuth>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub name: String,
    pub unique_id: String,
    pub id: String,
}

/// Fully resolved configuration, built once in `main`.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub device: DeviceSettings,
    pub interval: Duration,
    pub debug: bool,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let file = File::open(path)
            .context(OpenSnafu { path: display.clone() })?;
        serde_yaml::from_reader(BufReader::new(file))
            .context(ParseSnafu { path: display })
    }
}

impl Settings {
    pub fn load(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    pub fn resolve(args: Args, file: FileConfig) -> Result<Self, ConfigError> {
        let interval = match (args.interval, file.interval) {
            (Some(interval), _) => interval,
            (None, Some(value)) => parse_interval(&value)?,
            (None, None) => DEFAULT_INTERVAL,
        };
        let auth = match (args.mqtt_user, args.mqtt_password) {
            (Some(user), password) => Some(MqttAuth {
                user,
                password: password.unwrap_or_default(),
            }),
            (None, Some(_)) => return Err(ConfigError::PasswordWithoutUser),
            (None, None) => file.mqtt.auth,
        };

        Ok(Self {
            mqtt: MqttSettings {
                broker: pick(args.mqtt_broker, file.mqtt.broker, DEFAULT_BROKER),
                client_id: pick(args.client_id, file.mqtt.client_id, DEFAULT_CLIENT_ID),
                auth,
            },
            device: DeviceSettings {
                name: pick(args.device_name, file.device.name, DEFAULT_DEVICE_NAME),
                unique_id: pick(args.unique_id, file.device.unique_id, DEFAULT_UNIQUE_ID),
                id: pick(args.device_id, file.device.id, DEFAULT_DEVICE_ID),
            },
            interval,
            debug: args.debug || file.debug,
        })
    }
}

fn pick(flag: Option<String>, file: Option<String>, default: &str) -> String {
    flag.or(file).unwrap_or_else(|| default.to_string())
}

/// Accepts `500ms`, `10s`, `5m`, `1h` or a bare number of seconds.
pub fn parse_interval(value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount
        .parse()
        .ok()
        .context(InvalidIntervalSnafu { value })?;
    let interval = match unit {
        "ms" => Some(Duration::from_millis(amount)),
        "" | "s" => Some(Duration::from_secs(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        "h" => amount.checked_mul(3600).map(Duration::from_secs),
        _ => return InvalidIntervalSnafu { value }.fail(),
    };
    let interval = interval
        .filter(|i| *i <= MAX_INTERVAL)
        .context(IntervalTooLongSnafu { value })?;
    ensure!(!interval.is_zero(), ZeroIntervalSnafu);
    Ok(interval)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::{Args, ConfigError, FileConfig, MAX_INTERVAL, MqttAuth, Settings, parse_interval};

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(Args::default(), FileConfig::default()).unwrap();
        assert_eq!(settings.mqtt.broker, "tcp://localhost:1883");
        assert_eq!(settings.mqtt.client_id, "cputemp2mqtt");
        assert_eq!(settings.mqtt.auth, None);
        assert_eq!(settings.device.name, "CPU Sensor");
        assert_eq!(settings.device.unique_id, "cpu_temperature_sensor");
        assert_eq!(settings.device.id, "cpu_temperature_sensor_device");
        assert_eq!(settings.interval, Duration::from_secs(10));
        assert!(!settings.debug);
    }

    #[test]
    fn test_flags_override_file() {
        let args = Args::parse_from([
            "cputemp2mqtt",
            "--device-name", "My CPU Sensor",
            "--interval", "30s",
        ]);
        let file: FileConfig = serde_yaml::from_str(
            "
mqtt:
  broker: tcp://192.168.1.100:1883
  auth:
    user: hass
    password: secret
device:
  name: Server
  id: server_01
interval: 1m
debug: true
"
        ).unwrap();

        let settings = Settings::resolve(args, file).unwrap();
        assert_eq!(settings.mqtt.broker, "tcp://192.168.1.100:1883");
        assert_eq!(
            settings.mqtt.auth,
            Some(MqttAuth { user: "hass".to_string(), password: "secret".to_string() })
        );
        assert_eq!(settings.device.name, "My CPU Sensor");
        assert_eq!(settings.device.unique_id, "cpu_temperature_sensor");
        assert_eq!(settings.device.id, "server_01");
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert!(settings.debug);
    }

    #[test]
    fn test_auth_debug_hides_password() {
        let auth = MqttAuth { user: "hass".to_string(), password: "secret".to_string() };
        assert_eq!(format!("{auth:?}"), r#"MqttAuth { user: "hass", password: "***" }"#);
    }

    #[test]
    fn test_unknown_file_key() {
        let res: Result<FileConfig, _> = serde_yaml::from_str("broker: tcp://localhost:1883\n");
        assert!(res.is_err());
    }

    #[test]
    fn test_password_without_user() {
        let args = Args::parse_from(["cputemp2mqtt", "--mqtt-password", "secret"]);
        assert!(matches!(
            Settings::resolve(args, FileConfig::default()).unwrap_err(),
            ConfigError::PasswordWithoutUser
        ));
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_interval("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_interval("15").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_interval("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_interval("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_invalid_interval() {
        assert!(matches!(parse_interval("ten"), Err(ConfigError::InvalidInterval { .. })));
        assert!(matches!(parse_interval("10d"), Err(ConfigError::InvalidInterval { .. })));
        assert!(matches!(parse_interval("0s"), Err(ConfigError::ZeroInterval)));
    }

    #[test]
    fn test_parse_interval_too_long() {
        assert_eq!(parse_interval("32767s").unwrap(), MAX_INTERVAL);
        assert_eq!(parse_interval("9h").unwrap(), Duration::from_secs(32400));
        for value in ["32768s", "10h", "9999999999999999999s", "9999999999999999999h"] {
            assert!(matches!(
                parse_interval(value),
                Err(ConfigError::IntervalTooLong { .. })
            ));
        }
    }

    #[test]
    fn test_huge_interval_flag_is_rejected() {
        let res = Args::try_parse_from(["cputemp2mqtt", "--interval", "9999999999999999999s"]);
        assert!(res.is_err());
    }
}
