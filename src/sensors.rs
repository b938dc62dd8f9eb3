use std::env;
use std::ffi::OsStr;
use std::io;
use std::num::ParseFloatError;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::Utf8Error;

use regex::Regex;

use snafu::Snafu;
use snafu::prelude::*;

const SENSORS_COMMAND: &str = "sensors";
// Compiled by `test_package_pattern_compiles`.
const PACKAGE_PATTERN: &str = r"(?m)Package id 0:\s+\+([0-9.]+)°C";

#[derive(Debug, Snafu)]
pub enum SensorError {
    #[snafu(display("'sensors' command not found, install the 'lm-sensors' package"))]
    CommandNotFound,

    #[snafu(display("Cannot run 'sensors': {source}"))]
    Spawn { source: io::Error },

    #[snafu(display("'sensors' exited with {status}"))]
    Status { status: std::process::ExitStatus },

    #[snafu(display("Expected UTF-8 output: {source}"))]
    ExpectedUtf8 { source: Utf8Error },

    #[snafu(display("Temperature not found in 'sensors' output"))]
    MissingReading,

    #[snafu(display("Expected float temperature, got '{value}': {source}"))]
    ExpectedFloat { value: String, source: ParseFloatError },
}

/// Something that yields one CPU temperature in degrees Celsius per call.
pub trait TemperatureSource {
    fn read_celsius(&mut self) -> Result<f64, SensorError>;
}

/// Reads the package temperature reported by lm-sensors.
pub struct LmSensors {
    command: PathBuf,
    pattern: Regex,
}

impl LmSensors {
    /// Fails when the `sensors` executable is not on `PATH`.
    pub fn locate() -> Result<Self, SensorError> {
        let command = find_in_path(SENSORS_COMMAND).context(CommandNotFoundSnafu)?;
        log::debug!("Using {}", command.display());
        Ok(Self {
            command,
            pattern: package_pattern(),
        })
    }
}

impl TemperatureSource for LmSensors {
    fn read_celsius(&mut self) -> Result<f64, SensorError> {
        let output = Command::new(&self.command)
            .output()
            .context(SpawnSnafu)?;
        if !output.status.success() {
            return Err(SensorError::Status { status: output.status });
        }
        let output = std::str::from_utf8(&output.stdout)
            .context(ExpectedUtf8Snafu)?;
        log::trace!("Read sensors output: {output}");
        parse_package_temperature(&self.pattern, output)
    }
}

fn package_pattern() -> Regex {
    Regex::new(PACKAGE_PATTERN).expect("valid package temperature pattern")
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    find_executable(&env::var_os("PATH")?, name)
}

fn find_executable(paths: &OsStr, name: &str) -> Option<PathBuf> {
    env::split_paths(paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// The whole reading fails if the package line is missing or malformed.
fn parse_package_temperature(pattern: &Regex, output: &str) -> Result<f64, SensorError> {
    let value = pattern
        .captures(output)
        .and_then(|c| c.get(1))
        .context(MissingReadingSnafu)?
        .as_str();
    value
        .parse::<f64>()
        .context(ExpectedFloatSnafu { value })
}
