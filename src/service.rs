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

//! Startup sequencing around the control loop.
//!
//! The PWM output is claimed first and parked at 0 %, then the sensor is
//! located. If discovery fails the output is released before the error is
//! returned, so a missing sensor never leaves the heater claimed.

use tracing::{error, info, warn};

use tr_error::{Result, SensorError};

use crate::actuator::{ActuatorDriver, SysfsPwm};
use crate::config::{Settings, ThresholdConfig};
use crate::controller::ThermostatController;
use crate::logger::{EventSink, JsonEventLog};
use crate::sensor::{SensorSource, W1Sensor};
use crate::shutdown::ShutdownSignal;
use crate::system;

/// Locate the sensor with `discover`, then run the control loop until
/// termination. `actuator` must already be acquired; it is stopped exactly
/// once on every path out of this function.
pub async fn run_with<S, A, F>(
    config: ThresholdConfig,
    mut actuator: A,
    discover: F,
    sinks: Vec<Box<dyn EventSink + Send>>,
    shutdown: &mut ShutdownSignal,
) -> Result<()>
where
    S: SensorSource,
    A: ActuatorDriver,
    F: FnOnce() -> std::result::Result<S, SensorError>,
{
    let sensor = match discover() {
        Ok(sensor) => sensor,
        Err(e) => {
            error!("Temperature sensor not found: {}", e);
            if let Err(stop_err) = actuator.stop() {
                warn!("Failed to release PWM after sensor discovery failure: {}", stop_err);
            }
            return Err(e.into());
        }
    };

    let mut controller = ThermostatController::new(config, sensor, actuator);
    for sink in sinks {
        controller = controller.with_sink(sink);
    }
    controller.run(shutdown).await
}

/// Bring up the real hardware described by `settings` and regulate until
/// termination
pub async fn run_service(settings: &Settings, shutdown: &mut ShutdownSignal) -> Result<()> {
    let config = settings.threshold_config()?;
    system::warn_if_unprivileged();

    let mut sinks: Vec<Box<dyn EventSink + Send>> = Vec::new();
    if settings.event_log.enabled {
        let log = JsonEventLog::open_with_fallback(&settings.event_log)?;
        info!("Event log: {}", log.path().display());
        sinks.push(Box::new(log));
    }

    let pwm = &settings.pwm;
    let actuator = SysfsPwm::open(&pwm.class_dir, pwm.chip, pwm.channel, pwm.frequency_hz)?;

    if settings.sensor.load_modules {
        system::load_w1_modules();
    }

    let sensor_settings = &settings.sensor;
    run_with(
        config,
        actuator,
        || W1Sensor::discover(&sensor_settings.w1_devices_dir, sensor_settings.device_id.as_deref()),
        sinks,
        shutdown,
    )
    .await
}
