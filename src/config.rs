use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::hal::types::{Channel, GainMode, Loopback};

/// Settings applied when a device is opened
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOptions {
    /// Ask the backend to reset the device before use
    pub reset_on_open: bool,
    /// Per-device diagnostic verbosity
    pub verbosity: LevelFilter,
    /// Applied right after the board has been initialized
    pub profile: Option<DeviceProfile>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            reset_on_open: false,
            verbosity: LevelFilter::Info,
            profile: None,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_on_open(mut self, reset: bool) -> Self {
        self.reset_on_open = reset;
        self
    }

    pub fn verbosity(mut self, level: LevelFilter) -> Self {
        self.verbosity = level;
        self
    }

    pub fn profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// Settings for one channel. Unset fields keep the board default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain_mode: Option<GainMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rf_port: Option<String>,
}

impl ChannelSettings {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            frequency: None,
            sample_rate: None,
            bandwidth: None,
            gain_mode: None,
            gain: None,
            rf_port: None,
        }
    }
}

/// Persisted per-device configuration, stored as JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    #[serde(default)]
    pub channels: Vec<ChannelSettings>,
    /// FPGA bitstream to load before the channels are configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fpga_image: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loopback: Option<Loopback>,
    /// Applied to every stream that is already configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_timeout_ms: Option<u32>,
}

impl DeviceProfile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let profile = serde_json::from_str(&json)?;
        Ok(profile)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Settings for `channel`, if the profile has any
    pub fn channel(&self, channel: Channel) -> Option<&ChannelSettings> {
        self.channels.iter().find(|settings| settings.channel == channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_profile() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device.json");

        let mut rx = ChannelSettings::new(Channel::RX0);
        rx.frequency = Some(915_000_000);
        rx.gain_mode = Some(GainMode::Manual);
        rx.gain = Some(30);
        let profile = DeviceProfile {
            channels: vec![rx],
            loopback: Some(Loopback::Firmware),
            stream_timeout_ms: Some(1000),
            ..DeviceProfile::default()
        };

        profile.save(&path).unwrap();
        let loaded = DeviceProfile::load(&path).unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(loaded.channel(Channel::RX0).and_then(|c| c.gain), Some(30));
        assert!(loaded.channel(Channel::TX0).is_none());
    }

    #[test]
    fn test_channel_names_in_json() {
        let json = r#"{ "channels": [ { "channel": "tx1", "frequency": 2400000000 } ] }"#;
        let profile: DeviceProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.channels[0].channel, Channel::TX1);
        assert_eq!(profile.fpga_image, None);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let missing = DeviceProfile::load(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(Error::NoFile(_))));

        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(DeviceProfile::load(&path), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_open_options_builder() {
        let options = OpenOptions::new()
            .reset_on_open(true)
            .verbosity(LevelFilter::Debug);
        assert!(options.reset_on_open);
        assert_eq!(options.verbosity, LevelFilter::Debug);
        assert!(options.profile.is_none());
    }
}
