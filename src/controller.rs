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

//! Heater control loop.
//!
//! Two-state hysteresis: the heater switches on below the lower threshold
//! and off above the upper one. Inside the band it keeps whatever state it
//! had, which is what stops it chattering around a single setpoint.
//!
//! # Safety
//! - Every exit path (termination, sensor loss, actuator failure) goes
//!   through [`ThermostatController::run`], which calls `stop()` exactly once.
//! - A failed actuator command is fatal and leaves the recorded state as it was.
//! - Invalid reads are retried with a fixed backoff, at most
//!   `max_invalid_retries` times in a row.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use tr_error::{Result, SensorError, ThermoError};

use crate::actuator::ActuatorDriver;
use crate::config::ThresholdConfig;
use crate::logger::{CycleEvent, EventSink};
use crate::sensor::{SensorSource, Temperature};
use crate::shutdown::ShutdownSignal;

/// Heater state as last commanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorState {
    #[default]
    Off,
    On,
}

impl ActuatorState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

/// Hysteresis decision for one validated reading
pub fn decide(current: ActuatorState, temperature: Temperature, config: &ThresholdConfig) -> ActuatorState {
    match current {
        ActuatorState::Off if temperature < config.lower() => ActuatorState::On,
        ActuatorState::On if temperature > config.upper() => ActuatorState::Off,
        unchanged => unchanged,
    }
}

/// Owns the sensor, the heater output and the heater state for the lifetime
/// of the loop
pub struct ThermostatController<S, A> {
    config: ThresholdConfig,
    sensor: S,
    actuator: A,
    state: ActuatorState,
    sinks: Vec<Box<dyn EventSink + Send>>,
    stopped: bool,
}

impl<S: SensorSource, A: ActuatorDriver> ThermostatController<S, A> {
    /// The actuator is assumed to be at 0 % duty (state `Off`)
    pub fn new(config: ThresholdConfig, sensor: S, actuator: A) -> Self {
        Self {
            config,
            sensor,
            actuator,
            state: ActuatorState::Off,
            sinks: Vec::new(),
            stopped: false,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn EventSink + Send>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Run until termination or a fatal error, then stop the actuator.
    ///
    /// Returns `Ok(())` for a requested shutdown.
    pub async fn run(mut self, shutdown: &mut ShutdownSignal) -> Result<()> {
        info!(
            "Control loop starting: on below {:.2}C, off above {:.2}C, {}% duty, every {:?}",
            self.config.lower(),
            self.config.upper(),
            self.config.duty_cycle(),
            self.config.sample_interval()
        );

        let result = self.control_loop(shutdown).await;
        match &result {
            Ok(()) => info!("Control loop stopping on request"),
            Err(e) => {
                error!("Control loop failed: {}", e);
                self.emit(CycleEvent::failure(self.state, e.to_string()));
            }
        }

        let stopped = self.shutdown_actuator();
        // The loop error is the root cause; a stop failure is secondary
        result.and(stopped)
    }

    async fn control_loop(&mut self, shutdown: &mut ShutdownSignal) -> Result<()> {
        loop {
            if shutdown.is_requested() {
                return Ok(());
            }

            let Some(temperature) = self.read_validated(shutdown).await? else {
                return Ok(());
            };

            // A reading that arrived after termination is not acted on
            if shutdown.is_requested() {
                return Ok(());
            }
            self.apply_reading(temperature)?;

            if shutdown.sleep(self.config.sample_interval()).await {
                return Ok(());
            }
        }
    }

    /// Poll until a valid reading. `None` means termination was requested
    /// during a backoff.
    async fn read_validated(&mut self, shutdown: &mut ShutdownSignal) -> Result<Option<Temperature>> {
        let mut invalid_reads: u32 = 0;
        loop {
            match self.sensor.poll() {
                Ok(temperature) => {
                    if invalid_reads > 0 {
                        debug!("Valid reading after {} invalid read(s)", invalid_reads);
                    }
                    return Ok(Some(temperature));
                }
                Err(SensorError::Invalid(reason)) => {
                    invalid_reads += 1;
                    if invalid_reads > self.config.max_invalid_retries() {
                        return Err(ThermoError::SensorRetriesExhausted { attempts: invalid_reads });
                    }
                    debug!("Invalid reading ({}), retry {}", reason, invalid_reads);
                    if shutdown.sleep(self.config.retry_backoff()).await {
                        return Ok(None);
                    }
                }
                Err(SensorError::Unavailable(reason)) => {
                    return Err(ThermoError::SensorUnavailable(reason));
                }
            }
        }
    }

    /// Feed one validated reading through the hysteresis decision and
    /// command the actuator if the state changes. Returns the new state
    /// when a transition happened.
    pub fn apply_reading(&mut self, temperature: Temperature) -> Result<Option<ActuatorState>> {
        if self.stopped {
            return Err(ThermoError::Stopped);
        }
        info!("Current temperature: {:.2}C", temperature);

        let next = decide(self.state, temperature, &self.config);
        let transition = if next == self.state {
            None
        } else {
            let duty = match next {
                ActuatorState::On => {
                    info!("Turning heater ON at {}% duty cycle", self.config.duty_cycle());
                    self.config.duty_cycle()
                }
                ActuatorState::Off => {
                    info!("Turning heater OFF");
                    0
                }
            };
            // State only follows a successful command
            self.actuator.set_duty(duty)?;
            self.state = next;
            Some(next)
        };

        self.emit(CycleEvent::reading(temperature, self.state, transition.is_some()));
        Ok(transition)
    }

    fn emit(&mut self, event: CycleEvent) {
        for sink in &mut self.sinks {
            sink.record(&event);
        }
    }

    fn shutdown_actuator(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        info!("SHUTDOWN: Switching heater off and releasing PWM");
        match self.actuator.stop() {
            Ok(()) => {
                self.state = ActuatorState::Off;
                Ok(())
            }
            Err(e) => {
                warn!("SHUTDOWN: Failed to stop actuator: {}", e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ActuatorError, MockActuatorDriver};
    use crate::sensor::MockSensorSource;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn config() -> ThresholdConfig {
        ThresholdConfig::new(25.0, 27.0, 50, Duration::from_secs(2)).unwrap()
    }

    struct BufferSink(Arc<Mutex<Vec<CycleEvent>>>);

    impl EventSink for BufferSink {
        fn record(&mut self, event: &CycleEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_decide_hysteresis() {
        let cfg = config();
        assert_eq!(decide(ActuatorState::Off, 24.9, &cfg), ActuatorState::On);
        assert_eq!(decide(ActuatorState::Off, 25.0, &cfg), ActuatorState::Off);
        assert_eq!(decide(ActuatorState::Off, 28.0, &cfg), ActuatorState::Off);
        assert_eq!(decide(ActuatorState::On, 27.0, &cfg), ActuatorState::On);
        assert_eq!(decide(ActuatorState::On, 27.1, &cfg), ActuatorState::Off);
        assert_eq!(decide(ActuatorState::On, 20.0, &cfg), ActuatorState::On);
    }

    #[test]
    fn test_decide_ignores_nan() {
        let cfg = config();
        assert_eq!(decide(ActuatorState::Off, f64::NAN, &cfg), ActuatorState::Off);
        assert_eq!(decide(ActuatorState::On, f64::NAN, &cfg), ActuatorState::On);
    }

    #[test]
    fn test_scenario_commands_only_on_transitions() {
        let mut seq = Sequence::new();
        let mut actuator = MockActuatorDriver::new();
        actuator
            .expect_set_duty()
            .with(eq(50))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        actuator
            .expect_set_duty()
            .with(eq(0))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut ctl = ThermostatController::new(config(), MockSensorSource::new(), actuator);
        let transitions: Vec<_> = [28.0, 26.0, 24.0, 24.5, 27.5]
            .into_iter()
            .map(|t| ctl.apply_reading(t).unwrap())
            .collect();

        assert_eq!(
            transitions,
            vec![None, None, Some(ActuatorState::On), None, Some(ActuatorState::Off)]
        );
        assert_eq!(ctl.state(), ActuatorState::Off);
    }

    #[test]
    fn test_failed_command_keeps_state() {
        let mut actuator = MockActuatorDriver::new();
        actuator.expect_set_duty().times(1).returning(|_| {
            Err(ActuatorError::write(
                "/sys/class/pwm/pwmchip0/pwm0/duty_cycle",
                std::io::Error::new(std::io::ErrorKind::Other, "EIO"),
            ))
        });

        let mut ctl = ThermostatController::new(config(), MockSensorSource::new(), actuator);
        assert!(matches!(ctl.apply_reading(20.0), Err(ThermoError::Actuator(_))));
        assert_eq!(ctl.state(), ActuatorState::Off);
    }

    #[test]
    fn test_events_emitted_per_reading() {
        let mut actuator = MockActuatorDriver::new();
        actuator.expect_set_duty().returning(|_| Ok(()));
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut ctl = ThermostatController::new(config(), MockSensorSource::new(), actuator)
            .with_sink(Box::new(BufferSink(events.clone())));
        ctl.apply_reading(26.0).unwrap();
        ctl.apply_reading(24.0).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].temperature, Some(26.0));
        assert_eq!(events[0].actuator_state, ActuatorState::Off);
        assert!(!events[0].transition);
        assert_eq!(events[1].actuator_state, ActuatorState::On);
        assert!(events[1].transition);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_mid_run_stops_once() {
        let mut seq = Sequence::new();
        let mut sensor = MockSensorSource::new();
        sensor
            .expect_poll()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(24.0));
        sensor
            .expect_poll()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(SensorError::unavailable("w1_slave disappeared")));

        let mut actuator = MockActuatorDriver::new();
        actuator.expect_set_duty().with(eq(50)).times(1).returning(|_| Ok(()));
        actuator.expect_stop().times(1).returning(|| Ok(()));

        let mut shutdown = ShutdownSignal::new();
        let result = ThermostatController::new(config(), sensor, actuator)
            .run(&mut shutdown)
            .await;
        assert!(matches!(result, Err(ThermoError::SensorUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_is_fatal() {
        let mut sensor = MockSensorSource::new();
        sensor
            .expect_poll()
            .times(4)
            .returning(|| Err(SensorError::invalid("crc")));
        let mut actuator = MockActuatorDriver::new();
        actuator.expect_set_duty().never();
        actuator.expect_stop().times(1).returning(|| Ok(()));

        let cfg = config().with_max_invalid_retries(3);
        let mut shutdown = ShutdownSignal::new();
        let start = tokio::time::Instant::now();
        let result = ThermostatController::new(cfg, sensor, actuator)
            .run(&mut shutdown)
            .await;

        assert!(matches!(result, Err(ThermoError::SensorRetriesExhausted { attempts: 4 })));
        // Three backoffs before the fourth read gave up
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600) && elapsed < Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_failure_is_reported_after_clean_shutdown() {
        let mut shutdown = ShutdownSignal::new();
        shutdown.handle().request();

        let mut sensor = MockSensorSource::new();
        sensor.expect_poll().never();
        let mut actuator = MockActuatorDriver::new();
        actuator.expect_stop().times(1).returning(|| {
            Err(ActuatorError::NotFound("/sys/class/pwm/pwmchip0/pwm0".into()))
        });

        let result = ThermostatController::new(config(), sensor, actuator)
            .run(&mut shutdown)
            .await;
        assert!(matches!(result, Err(ThermoError::Actuator(_))));
    }

    #[test]
    fn test_apply_after_stop_is_rejected() {
        let mut actuator = MockActuatorDriver::new();
        actuator.expect_stop().times(1).returning(|| Ok(()));
        actuator.expect_set_duty().never();

        let mut ctl = ThermostatController::new(config(), MockSensorSource::new(), actuator);
        ctl.shutdown_actuator().unwrap();
        ctl.shutdown_actuator().unwrap();
        assert!(matches!(ctl.apply_reading(10.0), Err(ThermoError::Stopped)));
    }
}
