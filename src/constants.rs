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

//! Defaults, paths and hardware constants.
//!
//! Every magic number used elsewhere in the crate is defined here.

/// System paths
pub mod paths {
    /// Default JSON configuration file
    pub const CONFIG_FILE: &str = "/etc/thermoreg/config.json";

    /// Directory the w1-therm driver populates with one entry per device
    pub const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";

    /// Base directory for sysfs PWM chips
    pub const PWM_CLASS_DIR: &str = "/sys/class/pwm";

    /// Default event log location
    pub const EVENT_LOG: &str = "/var/log/thermoreg/events.jsonl";

    /// Used when the event log directory cannot be created
    pub const EVENT_LOG_FALLBACK: &str = "/tmp/thermoreg_events.jsonl";

    /// systemd journal socket; its presence selects the journald log layer
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// DS18B20 on the 1-Wire bus
pub mod sensor {
    /// Family code prefix of DS18B20 device directories (`28-xxxxxxxxxxxx`)
    pub const DS18B20_FAMILY_PREFIX: &str = "28";

    /// Per-device record exposed by w1-therm
    pub const W1_SLAVE_FILE: &str = "w1_slave";

    /// Token at the end of the first record line when the CRC matched
    pub const CRC_OK_MARKER: &str = "YES";

    /// Prefix of the temperature payload on the second record line
    pub const TEMPERATURE_PREFIX: &str = "t=";

    /// Raw readings are in millidegrees Celsius
    pub const MILLIDEGREE_DIVISOR: f64 = 1000.0;

    /// Kernel modules that bring up the bus and the thermometer driver
    pub const W1_MODULES: &[&str] = &["w1-gpio", "w1-therm"];
}

/// Sysfs PWM output
pub mod pwm {
    pub const DEFAULT_CHIP: u32 = 0;
    pub const DEFAULT_CHANNEL: u32 = 0;

    /// Switching frequency of the heater MOSFET
    pub const DEFAULT_FREQUENCY_HZ: u32 = 1000;

    pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

    /// Highest accepted duty cycle in percent
    pub const MAX_DUTY_PCT: u8 = 100;

    /// Period in nanoseconds for a switching frequency
    pub fn period_ns(frequency_hz: u32) -> u64 {
        NANOS_PER_SECOND / u64::from(frequency_hz.max(1))
    }

    /// Duty time in nanoseconds for a percentage of `period_ns`
    pub fn duty_ns(period_ns: u64, percent: u8) -> u64 {
        period_ns * u64::from(percent.min(MAX_DUTY_PCT)) / u64::from(MAX_DUTY_PCT)
    }
}

/// Control loop defaults
pub mod control {
    /// Heater turns on below this (°C)
    pub const DEFAULT_LOWER_C: f64 = 25.0;

    /// Heater turns off above this (°C)
    pub const DEFAULT_UPPER_C: f64 = 27.0;

    /// Heater duty cycle while on
    pub const DEFAULT_DUTY_PCT: u8 = 50;

    pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 2000;

    /// Wait between reads of a record that failed its CRC check
    pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;

    /// Consecutive invalid reads tolerated within one cycle (10 s at the default backoff)
    pub const DEFAULT_MAX_INVALID_RETRIES: u32 = 50;
}

/// Event log rotation
pub mod event_log {
    /// Rotate once the active file reaches this size
    pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

    /// Rotated files kept next to the active one
    pub const DEFAULT_BACKUPS: u32 = 10;
}

/// Environment variables
pub mod env {
    pub const LOG_LEVEL: &str = "THERMOREG_LOG";
    pub const LOWER: &str = "THERMOREG_LOWER";
    pub const UPPER: &str = "THERMOREG_UPPER";
    pub const DUTY: &str = "THERMOREG_DUTY";
    pub const INTERVAL_MS: &str = "THERMOREG_INTERVAL_MS";
}
