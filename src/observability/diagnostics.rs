use log::{Level, LevelFilter};

use crate::error::Result;

pub const COMMAND_TARGET: &str = "sdrcore::command";
pub const STREAM_TARGET: &str = "sdrcore::stream";

/// Per-device diagnostic sink.
///
/// Records go through the `log` facade; `level` gates them per device on top
/// of whatever filter the installed logger applies.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    device: String,
    level: LevelFilter,
}

impl Diagnostics {
    pub fn new(device: impl Into<String>, level: LevelFilter) -> Self {
        Self {
            device: device.into(),
            level,
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn set_level(&mut self, level: LevelFilter) {
        self.level = level;
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    /// Log the outcome of one command-path operation
    pub fn record<T>(&self, op: &str, result: &Result<T>) {
        match result {
            Ok(_) if self.enabled(Level::Debug) => {
                log::debug!(target: COMMAND_TARGET, "[{}] {}: ok", self.device, op);
            }
            Err(err) if self.enabled(Level::Warn) => {
                log::warn!(
                    target: COMMAND_TARGET,
                    "[{}] {}: {} ({})",
                    self.device,
                    op,
                    err,
                    err.kind().code()
                );
            }
            _ => {}
        }
    }

    pub fn info(&self, message: &str) {
        if self.enabled(Level::Info) {
            log::info!(target: COMMAND_TARGET, "[{}] {}", self.device, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_level_gating() {
        let diagnostics = Diagnostics::new("abc", LevelFilter::Warn);
        assert!(diagnostics.enabled(Level::Error));
        assert!(diagnostics.enabled(Level::Warn));
        assert!(!diagnostics.enabled(Level::Debug));

        let silent = Diagnostics::new("abc", LevelFilter::Off);
        assert!(!silent.enabled(Level::Error));
        silent.record::<()>("set_gain", &Err(Error::Range("gain".into())));
    }
}
