//! Error handling for thermoreg
//!
//! Three error types live here:
//!
//! - [`SensorError`] is what a sensor poll returns. `Invalid` is transient and
//!   retried by the controller, `Unavailable` is fatal.
//! - [`ActuatorError`] is what a PWM write returns. Always fatal to the loop.
//! - [`ThermoError`] is the unified error that ends the control loop or aborts
//!   startup.

use std::io;
use std::path::PathBuf;

/// Result type alias using ThermoError
pub type Result<T> = std::result::Result<T, ThermoError>;

/// Outcome of a single failed sensor poll
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The record was read but failed its validity check (CRC marker missing,
    /// truncated record, unparsable payload)
    #[error("invalid sensor reading: {0}")]
    Invalid(String),

    /// The device cannot be located or opened
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}

impl SensorError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Whether the controller should retry after a backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

/// Failure while commanding the PWM output
#[derive(thiserror::Error, Debug)]
pub enum ActuatorError {
    #[error("Failed to write PWM attribute {path}: {source}")]
    Write {
        path: PathBuf,
        source: io::Error,
    },

    #[error("PWM channel not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid duty cycle: {0}% (must be 0-100)")]
    InvalidDuty(u8),

    #[error("PWM channel {0} already released")]
    Released(PathBuf),
}

impl ActuatorError {
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

/// Unified error type for everything that stops the regulator
#[derive(thiserror::Error, Debug)]
pub enum ThermoError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Hardware Errors
    // ============================================================================
    #[error("Temperature sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Sensor returned invalid data {attempts} times in a row")]
    SensorRetriesExhausted {
        attempts: u32,
    },

    #[error("Actuator failure: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Controller already shut down")]
    Stopped,
}

impl ThermoError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config value error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// A sensor error that escapes the retry loop is fatal. `Invalid` only gets here
// when it is reported outside the loop (e.g. during discovery).
impl From<SensorError> for ThermoError {
    fn from(e: SensorError) -> Self {
        match e {
            SensorError::Invalid(reason) | SensorError::Unavailable(reason) => {
                Self::SensorUnavailable(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_is_transient() {
        assert!(SensorError::invalid("crc").is_transient());
        assert!(!SensorError::unavailable("gone").is_transient());
    }

    #[test]
    fn sensor_error_converts_to_fatal() {
        let err: ThermoError = SensorError::unavailable("no 28-* device").into();
        assert!(matches!(err, ThermoError::SensorUnavailable(ref r) if r == "no 28-* device"));
    }

    #[test]
    fn actuator_error_display_names_path() {
        let err = ActuatorError::write(
            "/sys/class/pwm/pwmchip0/pwm0/duty_cycle",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = ThermoError::from(err).to_string();
        assert!(msg.contains("duty_cycle"));
        assert!(msg.contains("denied"));
    }
}
