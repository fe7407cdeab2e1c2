/*
 * This file is part of Thermoreg.
 *
 * Copyright (C) 2025 Thermoreg contributors
 *
 * Thermoreg is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Thermoreg is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Thermoreg. If not, see <https://www.gnu.org/licenses/>.
 */

//! Temperature input.
//!
//! The w1-therm driver exposes each DS18B20 as a two-line text record:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line ends in `YES` when the CRC matched. The second carries the
//! temperature in millidegrees Celsius.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

pub use tr_error::SensorError;

use crate::constants::sensor as w1;

/// Degrees Celsius
pub type Temperature = f64;

/// Anything the controller can poll for a temperature
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource {
    /// Take one reading. `Invalid` is retried by the caller; `Unavailable` is fatal.
    fn poll(&mut self) -> Result<Temperature, SensorError>;
}

/// One decoded w1_slave record, before validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub crc_ok: bool,
    pub millidegrees: i32,
}

impl RawSample {
    /// Parse a w1_slave record. A record with a missing or unparsable
    /// payload is `Invalid`, same as a CRC failure.
    pub fn parse(record: &str) -> Result<Self, SensorError> {
        let mut lines = record.lines();
        let status = lines
            .next()
            .ok_or_else(|| SensorError::invalid("empty record"))?;
        let crc_ok = status.trim_end().ends_with(w1::CRC_OK_MARKER);

        let data = lines
            .next()
            .ok_or_else(|| SensorError::invalid("record has no data line"))?;
        let (_, payload) = data
            .rsplit_once(w1::TEMPERATURE_PREFIX)
            .ok_or_else(|| SensorError::invalid(format!("no '{}' in '{}'", w1::TEMPERATURE_PREFIX, data.trim())))?;
        let millidegrees = payload
            .trim()
            .parse::<i32>()
            .map_err(|e| SensorError::invalid(format!("bad payload '{}': {}", payload.trim(), e)))?;

        Ok(Self { crc_ok, millidegrees })
    }

    /// Validate and convert to degrees Celsius
    pub fn decode(self) -> Result<Temperature, SensorError> {
        if !self.crc_ok {
            return Err(SensorError::invalid("CRC check failed"));
        }
        Ok(f64::from(self.millidegrees) / w1::MILLIDEGREE_DIVISOR)
    }
}

/// A DS18B20 read through `/sys/bus/w1/devices/28-*/w1_slave`
#[derive(Debug)]
pub struct W1Sensor {
    slave_path: PathBuf,
}

impl W1Sensor {
    /// Use a known record path directly
    pub fn new(slave_path: impl Into<PathBuf>) -> Self {
        Self { slave_path: slave_path.into() }
    }

    /// Locate a thermometer under `devices_dir`.
    ///
    /// With `device_id` set, that exact directory must exist. Otherwise the
    /// first `28*` entry in name order is used.
    pub fn discover(devices_dir: &Path, device_id: Option<&str>) -> Result<Self, SensorError> {
        let device_dir = match device_id {
            Some(id) => {
                let dir = devices_dir.join(id);
                if !dir.is_dir() {
                    return Err(SensorError::unavailable(format!(
                        "configured sensor {} not found",
                        dir.display()
                    )));
                }
                dir
            }
            None => find_first_device(devices_dir)?,
        };

        let slave_path = device_dir.join(w1::W1_SLAVE_FILE);
        if !slave_path.exists() {
            return Err(SensorError::unavailable(format!(
                "{} has no {} record",
                device_dir.display(),
                w1::W1_SLAVE_FILE
            )));
        }

        info!("Temperature sensor found: {}", slave_path.display());
        Ok(Self { slave_path })
    }

    pub fn path(&self) -> &Path {
        &self.slave_path
    }
}

fn find_first_device(devices_dir: &Path) -> Result<PathBuf, SensorError> {
    let entries = fs::read_dir(devices_dir).map_err(|e| {
        SensorError::unavailable(format!("cannot list {}: {}", devices_dir.display(), e))
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .filter(|ent| {
            ent.file_name()
                .to_string_lossy()
                .starts_with(w1::DS18B20_FAMILY_PREFIX)
        })
        .map(|ent| ent.path())
        .collect();
    candidates.sort();

    if candidates.len() > 1 {
        debug!("{} DS18B20 devices present, using the first", candidates.len());
    }
    candidates.into_iter().next().ok_or_else(|| {
        SensorError::unavailable(format!("no DS18B20 sensor under {}", devices_dir.display()))
    })
}

impl SensorSource for W1Sensor {
    fn poll(&mut self) -> Result<Temperature, SensorError> {
        let record = fs::read_to_string(&self.slave_path).map_err(|e| match e.kind() {
            // Device node gone: the sensor was unplugged or the driver unloaded
            io::ErrorKind::NotFound => SensorError::unavailable(format!(
                "{} disappeared",
                self.slave_path.display()
            )),
            // Bus glitches surface as EIO; the next read usually succeeds
            _ => SensorError::invalid(format!("read {}: {}", self.slave_path.display(), e)),
        })?;
        RawSample::parse(&record)?.decode()
    }
}
