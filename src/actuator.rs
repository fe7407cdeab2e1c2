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

//! Heater output through the Linux sysfs PWM interface.
//!
//! # Sysfs layout
//!
//! ```text
//! /sys/class/pwm/pwmchip0/export        write channel number to claim it
//! /sys/class/pwm/pwmchip0/unexport      write channel number to release it
//! /sys/class/pwm/pwmchip0/pwm0/period       nanoseconds
//! /sys/class/pwm/pwmchip0/pwm0/duty_cycle   nanoseconds, must not exceed period
//! /sys/class/pwm/pwmchip0/pwm0/enable       0 or 1
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

pub use tr_error::ActuatorError;

use crate::constants::pwm;

/// Anything the controller can drive with a duty cycle
#[cfg_attr(test, mockall::automock)]
pub trait ActuatorDriver {
    /// Set the output duty cycle in percent (0 disables the heater)
    fn set_duty(&mut self, percent: u8) -> Result<(), ActuatorError>;

    /// Drive the output to zero and release the hardware. Safe to call more
    /// than once; later calls do nothing.
    fn stop(&mut self) -> Result<(), ActuatorError>;
}

/// One exported sysfs PWM channel
#[derive(Debug)]
pub struct SysfsPwm {
    chip_dir: PathBuf,
    channel: u32,
    channel_dir: PathBuf,
    period_ns: u64,
    duty_pct: u8,
    exported_by_us: bool,
    released: bool,
}

impl SysfsPwm {
    /// Claim `pwmchip<chip>/pwm<channel>`, program the period for
    /// `frequency_hz` and enable it at 0 % duty.
    ///
    /// If configuration fails after the channel was claimed, it is released
    /// again before the error is returned.
    pub fn open(class_dir: &Path, chip: u32, channel: u32, frequency_hz: u32) -> Result<Self, ActuatorError> {
        let chip_dir = class_dir.join(format!("pwmchip{}", chip));
        if !chip_dir.is_dir() {
            return Err(ActuatorError::NotFound(chip_dir));
        }

        let channel_dir = chip_dir.join(format!("pwm{}", channel));
        let exported_by_us = if channel_dir.is_dir() {
            debug!("PWM channel {} already exported", channel_dir.display());
            false
        } else {
            write_attr(&chip_dir.join("export"), channel)?;
            true
        };

        let mut output = Self {
            chip_dir,
            channel,
            channel_dir,
            period_ns: pwm::period_ns(frequency_hz),
            duty_pct: 0,
            exported_by_us,
            released: false,
        };

        if let Err(e) = output.configure() {
            if let Err(cleanup) = output.stop() {
                warn!("PWM cleanup after failed setup also failed: {}", cleanup);
            }
            return Err(e);
        }

        info!(
            "PWM {} enabled at {} Hz, 0% duty",
            output.channel_dir.display(),
            frequency_hz
        );
        Ok(output)
    }

    fn configure(&mut self) -> Result<(), ActuatorError> {
        if !self.channel_dir.is_dir() {
            return Err(ActuatorError::NotFound(self.channel_dir.clone()));
        }
        // duty_cycle may never exceed period, so clear it before changing period
        self.write("duty_cycle", 0)?;
        self.write("period", self.period_ns)?;
        self.write("enable", 1)
    }

    fn write(&self, attr: &str, value: u64) -> Result<(), ActuatorError> {
        write_attr(&self.channel_dir.join(attr), value)
    }

    /// Duty cycle last written, in percent
    pub fn duty(&self) -> u8 {
        self.duty_pct
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

fn write_attr(path: &Path, value: impl ToString) -> Result<(), ActuatorError> {
    fs::write(path, value.to_string()).map_err(|e| ActuatorError::write(path, e))
}

impl ActuatorDriver for SysfsPwm {
    fn set_duty(&mut self, percent: u8) -> Result<(), ActuatorError> {
        if self.released {
            return Err(ActuatorError::Released(self.channel_dir.clone()));
        }
        if percent > pwm::MAX_DUTY_PCT {
            return Err(ActuatorError::InvalidDuty(percent));
        }
        self.write("duty_cycle", pwm::duty_ns(self.period_ns, percent))?;
        self.duty_pct = percent;
        debug!("PWM duty set to {}%", percent);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // Try every step even if one fails; the first error is reported
        let mut first_err = None;
        let mut steps = vec![
            write_attr(&self.channel_dir.join("duty_cycle"), 0),
            write_attr(&self.channel_dir.join("enable"), 0),
        ];
        if self.exported_by_us {
            steps.push(write_attr(&self.chip_dir.join("unexport"), self.channel));
        }
        for result in steps {
            if let Err(e) = result {
                warn!("PWM release step failed: {}", e);
                first_err.get_or_insert(e);
            }
        }
        self.duty_pct = 0;

        match first_err {
            Some(e) => Err(e),
            None => {
                info!("PWM {} stopped and released", self.channel_dir.display());
                Ok(())
            }
        }
    }
}

impl Drop for SysfsPwm {
    fn drop(&mut self) {
        if !self.released {
            warn!("PWM dropped without stop(), forcing heater off");
            let _ = self.stop();
        }
    }
}
