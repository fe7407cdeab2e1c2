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

//! Per-cycle event records and the JSON-lines event log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::warn;

use crate::config::EventLogSettings;
use crate::constants::paths;
use crate::controller::ActuatorState;

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// One record per control cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleEvent {
    pub ts_ms: u128,
    /// Validated reading; absent when the cycle failed before one was obtained
    pub temperature: Option<f64>,
    /// Actuator state after the cycle
    pub actuator_state: ActuatorState,
    /// Whether this cycle switched the heater
    pub transition: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleEvent {
    pub fn reading(temperature: f64, actuator_state: ActuatorState, transition: bool) -> Self {
        Self {
            ts_ms: now_millis(),
            temperature: Some(temperature),
            actuator_state,
            transition,
            error: None,
        }
    }

    pub fn failure(actuator_state: ActuatorState, error: impl Into<String>) -> Self {
        Self {
            ts_ms: now_millis(),
            temperature: None,
            actuator_state,
            transition: false,
            error: Some(error.into()),
        }
    }
}

/// Consumer of cycle events. Sinks deal with their own I/O failures; a
/// broken log must never stop the heater loop.
pub trait EventSink {
    fn record(&mut self, event: &CycleEvent);
}

/// Appends events as JSON lines, rotating by size
/// (`events.jsonl` → `events.jsonl.1` → … → `events.jsonl.<backups>`)
#[derive(Debug)]
pub struct JsonEventLog {
    path: PathBuf,
    max_bytes: u64,
    backups: u32,
    file: File,
    size: u64,
}

impl JsonEventLog {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: u32) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self { path, max_bytes, backups, file, size })
    }

    /// Open the configured log, falling back to /tmp if that fails
    pub fn open_with_fallback(settings: &EventLogSettings) -> io::Result<Self> {
        match Self::open(&settings.path, settings.max_bytes, settings.backups) {
            Ok(log) => Ok(log),
            Err(e) => {
                warn!(
                    "Cannot open event log {}: {} - using {}",
                    settings.path.display(),
                    e,
                    paths::EVENT_LOG_FALLBACK
                );
                Self::open(paths::EVENT_LOG_FALLBACK, settings.max_bytes, settings.backups)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        if self.backups == 0 {
            self.file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
            self.size = 0;
            return Ok(());
        }
        for n in (1..self.backups).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.size = 0;
        Ok(())
    }

    fn append(&mut self, event: &CycleEvent) -> io::Result<()> {
        let mut line = serde_json::to_string(event).map_err(io::Error::other)?;
        line.push('\n');
        let len = line.len() as u64;
        if self.max_bytes > 0 && self.size > 0 && self.size + len > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(line.as_bytes())?;
        self.size += len;
        Ok(())
    }
}

impl EventSink for JsonEventLog {
    fn record(&mut self, event: &CycleEvent) {
        if let Err(e) = self.append(event) {
            warn!("Failed to write event log {}: {}", self.path.display(), e);
        }
    }
}
