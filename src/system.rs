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

use std::process::Command;

use tracing::{debug, info, warn};

use crate::constants::sensor::W1_MODULES;

/// Load the 1-Wire bus and thermometer drivers.
///
/// Failures are logged only: the modules may be built in, or already loaded
/// through a device-tree overlay. Discovery decides whether a sensor exists.
pub fn load_w1_modules() {
    for module in W1_MODULES {
        match Command::new("modprobe").arg(module).output() {
            Ok(output) if output.status.success() => info!("Loaded kernel module: {}", module),
            Ok(output) => warn!(
                "modprobe {} failed: {}",
                module,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => debug!("Could not run modprobe for {}: {}", module, e),
        }
    }
}

/// Sysfs writes need root; running unprivileged is allowed (udev rules may
/// grant access) but almost always a mistake.
pub fn warn_if_unprivileged() {
    // SAFETY: geteuid is always safe - it just returns the effective user ID of the process.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!("Running as uid {} - PWM and module loading usually require root", euid);
    }
}
