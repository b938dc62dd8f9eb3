use std::fs;
use std::io;
use std::path::Path;

use snafu::Snafu;
use snafu::prelude::*;

pub const CPUINFO_PATH: &str = "/proc/cpuinfo";

#[derive(Debug, Snafu)]
pub enum CpuInfoError {
    #[snafu(display("Error reading {path}: {source}"))]
    Read { path: String, source: io::Error },

    #[snafu(display("Could not find '{field}' in {path}"))]
    MissingField { field: &'static str, path: String },
}

#[derive(Debug, PartialEq)]
pub struct CpuInfo {
    pub model: String,
    pub manufacturer: String,
}

impl CpuInfo {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, CpuInfoError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = fs::read_to_string(path)
            .context(ReadSnafu { path: display.clone() })?;
        Self::parse(&content, &display)
    }

    fn parse(content: &str, path: &str) -> Result<Self, CpuInfoError> {
        let model = field(content, "model name")
            .context(MissingFieldSnafu { field: "model name", path })?;
        let manufacturer = field(content, "vendor_id")
            .context(MissingFieldSnafu { field: "vendor_id", path })?;
        Ok(Self {
            model: model.to_string(),
            manufacturer: manufacturer.to_string(),
        })
    }
}

/// First non-empty value of a `key : value` line.
fn field<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim())
        .find(|v| !v.is_empty())
}
