//! Per-connection configuration.

use thiserror::Error;

use crate::segment::MAX_SEG_DATA_SIZE;

/// Tunable parameters for one connection.
///
/// Window sizes are given in segments; the engine scales them by
/// [`MAX_SEG_DATA_SIZE`] to obtain byte budgets.
#[derive(Debug, Clone)]
pub struct Config {
    /// Send window in segments (≥ 1).  A window of 1 degenerates to
    /// stop-and-wait.
    pub send_window: u32,
    /// Receive window in segments (≥ 1).
    pub recv_window: u32,
    /// Retransmission timeout in milliseconds.
    pub rt_timeout_ms: i64,
    /// Granularity at which the environment drives the tick entry point.
    pub timer_ms: i64,
    /// Transmission attempts for the oldest unacked segment before the
    /// connection is torn down.
    pub max_retransmits: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            send_window: 1,
            recv_window: 1,
            rt_timeout_ms: 2000,
            timer_ms: 40,
            max_retransmits: 5,
        }
    }
}

impl Config {
    /// Send window scaled to bytes.
    pub fn send_window_bytes(&self) -> u32 {
        self.send_window * MAX_SEG_DATA_SIZE as u32
    }

    /// Receive window scaled to bytes.
    pub fn recv_window_bytes(&self) -> u32 {
        self.recv_window * MAX_SEG_DATA_SIZE as u32
    }

    /// Check every parameter against its legal range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_window == 0 || self.recv_window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.rt_timeout_ms <= 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.timer_ms <= 0 || self.timer_ms > self.rt_timeout_ms {
            return Err(ConfigError::BadTickInterval);
        }
        if self.max_retransmits == 0 {
            return Err(ConfigError::ZeroRetransmits);
        }
        Ok(())
    }
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window sizes must be at least one segment")]
    ZeroWindow,
    #[error("rt_timeout_ms must be positive")]
    ZeroTimeout,
    #[error("timer_ms must be positive and no larger than rt_timeout_ms")]
    BadTickInterval,
    #[error("max_retransmits must be at least 1")]
    ZeroRetransmits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn windows_scale_by_segment_size() {
        let cfg = Config {
            send_window: 4,
            ..Config::default()
        };
        assert_eq!(cfg.send_window_bytes(), 4 * 1440);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let base = Config::default();

        let cfg = Config { send_window: 0, ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroWindow));

        let cfg = Config { rt_timeout_ms: 0, ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));

        let cfg = Config { timer_ms: 5000, ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::BadTickInterval));

        let cfg = Config { max_retransmits: 0, ..base };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroRetransmits));
    }
}
