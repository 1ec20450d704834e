use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Transport backend classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Wildcard, only meaningful in a [`DeviceSelector`]
    Any,
    LibUsb,
    Cypress,
    /// In-process simulated hardware
    Sim,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Any => "*",
            BackendKind::LibUsb => "libusb",
            BackendKind::Cypress => "cypress",
            BackendKind::Sim => "sim",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "*" => Ok(BackendKind::Any),
            "libusb" => Ok(BackendKind::LibUsb),
            "cypress" => Ok(BackendKind::Cypress),
            "sim" | "dummy" => Ok(BackendKind::Sim),
            other => Err(Error::InvalidParameter(format!("unknown backend '{}'", other))),
        }
    }
}

/// USB vendor/product pair used for board probing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbIds {
    pub vendor: u16,
    pub product: u16,
}

impl fmt::Display for UsbIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.product)
    }
}

/// Negotiated USB link speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsbSpeed {
    High,
    Super,
}

/// Device discovery information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub backend: BackendKind,
    pub serial: String,
    pub usb_bus: u8,
    pub usb_addr: u8,
    pub instance: u32,
    pub ids: UsbIds,
    pub manufacturer: String,
    pub product: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:device={}:{},instance={},serial={} ({})",
            self.backend, self.usb_bus, self.usb_addr, self.instance, self.serial, self.product
        )
    }
}

/// Criteria for choosing a device at open time. Unset fields are wildcards.
///
/// Parsed from identifier strings of the form
/// `<backend>:serial=<prefix>,instance=<n>,device=<bus>:<addr>`; every part
/// is optional and an empty string or `*` matches any device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceSelector {
    pub backend: Option<BackendKind>,
    pub serial: Option<String>,
    pub usb_bus: Option<u8>,
    pub usb_addr: Option<u8>,
    pub instance: Option<u32>,
}

impl DeviceSelector {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_serial(serial: impl Into<String>) -> Self {
        Self {
            serial: Some(serial.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, info: &DeviceInfo) -> bool {
        if let Some(backend) = self.backend {
            if backend != BackendKind::Any && backend != info.backend {
                return false;
            }
        }
        if let Some(serial) = &self.serial {
            let wanted = serial.to_ascii_lowercase();
            if !info.serial.to_ascii_lowercase().starts_with(&wanted) {
                return false;
            }
        }
        if self.usb_bus.map_or(false, |bus| bus != info.usb_bus) {
            return false;
        }
        if self.usb_addr.map_or(false, |addr| addr != info.usb_addr) {
            return false;
        }
        if self.instance.map_or(false, |inst| inst != info.instance) {
            return false;
        }
        true
    }

    fn apply_option(&mut self, key: &str, value: &str) -> Result<()> {
        let bad = |what: &str| Error::InvalidParameter(format!("bad {} '{}'", what, value));
        match key {
            "serial" => {
                if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(bad("serial"));
                }
                self.serial = Some(value.to_string());
            }
            "instance" => {
                self.instance = Some(value.parse().map_err(|_| bad("instance"))?);
            }
            "device" => {
                let (bus, addr) = value.split_once(':').ok_or_else(|| bad("device"))?;
                self.usb_bus = Some(bus.parse().map_err(|_| bad("device"))?);
                self.usb_addr = Some(addr.parse().map_err(|_| bad("device"))?);
            }
            other => {
                return Err(Error::InvalidParameter(format!(
                    "unknown device identifier key '{}'",
                    other
                )))
            }
        }
        Ok(())
    }
}

impl FromStr for DeviceSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut selector = DeviceSelector::default();
        if s.is_empty() || s == "*" {
            return Ok(selector);
        }

        let options = match s.split_once(':') {
            Some((backend, rest)) if !backend.contains('=') => {
                selector.backend = Some(backend.parse()?);
                rest
            }
            _ => s,
        };

        for option in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = option.split_once('=').ok_or_else(|| {
                Error::InvalidParameter(format!("malformed device identifier option '{}'", option))
            })?;
            selector.apply_option(key.trim(), value.trim())?;
        }

        Ok(selector)
    }
}
