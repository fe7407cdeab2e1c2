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

//! Startup configuration.
//!
//! Settings are layered: built-in defaults, then the JSON file, then
//! environment variables, then command-line flags. The result is validated
//! once into an immutable [`ThresholdConfig`] that the controller owns for
//! the lifetime of the process.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tr_error::{Result, ThermoError};

use crate::constants::{control, env as env_vars, event_log, paths, pwm};

/// Immutable regulation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdConfig {
    lower: f64,
    upper: f64,
    duty_cycle: u8,
    sample_interval: Duration,
    retry_backoff: Duration,
    max_invalid_retries: u32,
}

impl ThresholdConfig {
    /// Validate and build. `duty_cycle` must be 1-100: a zero heating duty
    /// would command the same output for `On` and `Off`.
    pub fn new(lower: f64, upper: f64, duty_cycle: u8, sample_interval: Duration) -> Result<Self> {
        if !lower.is_finite() {
            return Err(ThermoError::invalid_config("lower", "must be a finite temperature"));
        }
        if !upper.is_finite() {
            return Err(ThermoError::invalid_config("upper", "must be a finite temperature"));
        }
        if lower >= upper {
            return Err(ThermoError::invalid_config(
                "lower",
                format!("lower threshold {lower}°C must be below upper threshold {upper}°C"),
            ));
        }
        if duty_cycle == 0 || duty_cycle > pwm::MAX_DUTY_PCT {
            return Err(ThermoError::invalid_config(
                "duty_cycle",
                format!("{duty_cycle}% is outside 1-100"),
            ));
        }
        if sample_interval.is_zero() {
            return Err(ThermoError::invalid_config("sample_interval", "must be greater than zero"));
        }
        Ok(Self {
            lower,
            upper,
            duty_cycle,
            sample_interval,
            retry_backoff: Duration::from_millis(control::DEFAULT_RETRY_BACKOFF_MS),
            max_invalid_retries: control::DEFAULT_MAX_INVALID_RETRIES,
        })
    }

    /// Override the wait between invalid reads
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Result<Self> {
        if backoff.is_zero() {
            return Err(ThermoError::invalid_config("retry_backoff", "must be greater than zero"));
        }
        self.retry_backoff = backoff;
        Ok(self)
    }

    /// Override how many consecutive invalid reads a cycle tolerates
    pub fn with_max_invalid_retries(mut self, retries: u32) -> Self {
        self.max_invalid_retries = retries;
        self
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn duty_cycle(&self) -> u8 {
        self.duty_cycle
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn max_invalid_retries(&self) -> u32 {
        self.max_invalid_retries
    }
}

/// Sensor discovery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SensorSettings {
    #[serde(default = "default_w1_devices_dir")]
    pub w1_devices_dir: PathBuf,
    /// Specific device directory name (e.g. `28-0316a2794cff`); first match if unset
    #[serde(default)]
    pub device_id: Option<String>,
    /// Run `modprobe w1-gpio w1-therm` before discovery
    #[serde(default = "default_true")]
    pub load_modules: bool,
}

/// PWM output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PwmSettings {
    #[serde(default = "default_pwm_class_dir")]
    pub class_dir: PathBuf,
    #[serde(default = "default_pwm_chip")]
    pub chip: u32,
    #[serde(default = "default_pwm_channel")]
    pub channel: u32,
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: u32,
}

/// JSON-lines event log settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EventLogSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_event_log_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_backups")]
    pub backups: u32,
}

/// Everything read at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_lower")]
    pub lower_c: f64,
    #[serde(default = "default_upper")]
    pub upper_c: f64,
    #[serde(default = "default_duty")]
    pub duty_cycle_pct: u8,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_invalid_retries")]
    pub max_invalid_retries: u32,
    #[serde(default)]
    pub sensor: SensorSettings,
    #[serde(default)]
    pub pwm: PwmSettings,
    #[serde(default)]
    pub event_log: EventLogSettings,
}

fn default_lower() -> f64 { control::DEFAULT_LOWER_C }
fn default_upper() -> f64 { control::DEFAULT_UPPER_C }
fn default_duty() -> u8 { control::DEFAULT_DUTY_PCT }
fn default_sample_interval_ms() -> u64 { control::DEFAULT_SAMPLE_INTERVAL_MS }
fn default_retry_backoff_ms() -> u64 { control::DEFAULT_RETRY_BACKOFF_MS }
fn default_max_invalid_retries() -> u32 { control::DEFAULT_MAX_INVALID_RETRIES }
fn default_w1_devices_dir() -> PathBuf { PathBuf::from(paths::W1_DEVICES_DIR) }
fn default_true() -> bool { true }
fn default_pwm_class_dir() -> PathBuf { PathBuf::from(paths::PWM_CLASS_DIR) }
fn default_pwm_chip() -> u32 { pwm::DEFAULT_CHIP }
fn default_pwm_channel() -> u32 { pwm::DEFAULT_CHANNEL }
fn default_frequency_hz() -> u32 { pwm::DEFAULT_FREQUENCY_HZ }
fn default_event_log_path() -> PathBuf { PathBuf::from(paths::EVENT_LOG) }
fn default_max_bytes() -> u64 { event_log::DEFAULT_MAX_BYTES }
fn default_backups() -> u32 { event_log::DEFAULT_BACKUPS }

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            w1_devices_dir: default_w1_devices_dir(),
            device_id: None,
            load_modules: true,
        }
    }
}

impl Default for PwmSettings {
    fn default() -> Self {
        Self {
            class_dir: default_pwm_class_dir(),
            chip: default_pwm_chip(),
            channel: default_pwm_channel(),
            frequency_hz: default_frequency_hz(),
        }
    }
}

impl Default for EventLogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_event_log_path(),
            max_bytes: default_max_bytes(),
            backups: default_backups(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lower_c: default_lower(),
            upper_c: default_upper(),
            duty_cycle_pct: default_duty(),
            sample_interval_ms: default_sample_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_invalid_retries: default_max_invalid_retries(),
            sensor: SensorSettings::default(),
            pwm: PwmSettings::default(),
            event_log: EventLogSettings::default(),
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub lower_c: Option<f64>,
    pub upper_c: Option<f64>,
    pub duty_cycle_pct: Option<u8>,
    pub sample_interval_ms: Option<u64>,
    pub event_log: bool,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(paths::CONFIG_FILE)
}

impl Settings {
    /// Read settings from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|source| ThermoError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_json::from_str(&data)?;
        Ok(settings)
    }

    /// Build the full layered configuration.
    ///
    /// A missing default config file is fine; a missing file that was asked
    /// for explicitly is an error.
    pub fn load(cli: &CliOverrides) -> Result<Self> {
        let mut settings = match &cli.config_path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    debug!("No config file at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };
        settings.apply_env()?;
        settings.apply_cli(cli);
        Ok(settings)
    }

    /// Apply `THERMOREG_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_value::<f64>(env_vars::LOWER)? {
            self.lower_c = v;
        }
        if let Some(v) = env_value::<f64>(env_vars::UPPER)? {
            self.upper_c = v;
        }
        if let Some(v) = env_value::<u8>(env_vars::DUTY)? {
            self.duty_cycle_pct = v;
        }
        if let Some(v) = env_value::<u64>(env_vars::INTERVAL_MS)? {
            self.sample_interval_ms = v;
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(v) = cli.lower_c {
            self.lower_c = v;
        }
        if let Some(v) = cli.upper_c {
            self.upper_c = v;
        }
        if let Some(v) = cli.duty_cycle_pct {
            self.duty_cycle_pct = v;
        }
        if let Some(v) = cli.sample_interval_ms {
            self.sample_interval_ms = v;
        }
        if cli.event_log {
            self.event_log.enabled = true;
        }
    }

    /// Validate the regulation parameters
    pub fn threshold_config(&self) -> Result<ThresholdConfig> {
        let config = ThresholdConfig::new(
            self.lower_c,
            self.upper_c,
            self.duty_cycle_pct,
            Duration::from_millis(self.sample_interval_ms),
        )?
        .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))?
        .with_max_invalid_retries(self.max_invalid_retries);

        if self.pwm.frequency_hz == 0 {
            return Err(ThermoError::invalid_config("pwm.frequency_hz", "must be greater than zero"));
        }
        Ok(config)
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ThermoError::invalid_config(name, format!("cannot parse '{}'", raw.trim()))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ThermoError::config(format!("{} is not valid UTF-8", name))),
    }
}
