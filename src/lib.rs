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

//! Thermoreg - hysteresis heater regulator for Linux
//!
//! Reads a DS18B20 over the kernel 1-Wire bus and drives a heater through a
//! sysfs PWM channel, switching it on below a lower threshold and off above
//! an upper one.

pub mod actuator;
pub mod config;
pub mod constants;
pub mod controller;
pub mod logger;
pub mod sensor;
pub mod service;
pub mod shutdown;
pub mod system;

#[cfg(test)]
pub mod test_utils;

pub use actuator::{ActuatorDriver, SysfsPwm};
pub use config::{CliOverrides, Settings, ThresholdConfig};
pub use controller::{decide, ActuatorState, ThermostatController};
pub use logger::{CycleEvent, EventSink, JsonEventLog};
pub use sensor::{SensorSource, Temperature, W1Sensor};
pub use shutdown::{ShutdownHandle, ShutdownSignal};
pub use tr_error::{ActuatorError, Result, SensorError, ThermoError};
