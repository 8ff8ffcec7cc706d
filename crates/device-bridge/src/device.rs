//! Device Types and State
//!
//! A device as reported by one `adb devices -l` listing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection state reported by adb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// Device is online and ready
    Online,
    Offline,
    /// Debugging not yet accepted on the device
    Unauthorized,
    Bootloader,
    Recovery,
    Sideload,
    /// Any other state string, kept verbatim
    Unknown(String),
}

impl DeviceStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "device" => DeviceStatus::Online,
            "offline" => DeviceStatus::Offline,
            "unauthorized" => DeviceStatus::Unauthorized,
            "bootloader" => DeviceStatus::Bootloader,
            "recovery" => DeviceStatus::Recovery,
            "sideload" => DeviceStatus::Sideload,
            other => DeviceStatus::Unknown(other.to_string()),
        }
    }

    /// The state string as adb prints it
    pub fn as_str(&self) -> &str {
        match self {
            DeviceStatus::Online => "device",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Unauthorized => "unauthorized",
            DeviceStatus::Bootloader => "bootloader",
            DeviceStatus::Recovery => "recovery",
            DeviceStatus::Sideload => "sideload",
            DeviceStatus::Unknown(raw) => raw,
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, DeviceStatus::Online)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device serial number
    pub serial: String,
    pub status: DeviceStatus,
    /// Device model (e.g., "Pixel_7")
    pub model: Option<String>,
    pub product: Option<String>,
    /// API level (`ro.build.version.sdk`)
    pub sdk_version: Option<String>,
    /// Release name (`ro.build.version.release`)
    pub android_version: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(serial: impl Into<String>, status: DeviceStatus) -> Self {
        Self {
            serial: serial.into(),
            status,
            model: None,
            product: None,
            sdk_version: None,
            android_version: None,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.status.is_usable()
    }

    /// Check if this is an emulator
    pub fn is_emulator(&self) -> bool {
        self.serial.starts_with("emulator-")
    }

    /// Model and serial, e.g. `Pixel 7 (R58M12345)`
    pub fn display_name(&self) -> String {
        match &self.model {
            Some(model) => format!("{} ({})", model.replace('_', " "), self.serial),
            None => self.serial.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_keeps_raw_string() {
        assert_eq!(DeviceStatus::parse("device"), DeviceStatus::Online);
        assert!(DeviceStatus::parse("device").is_usable());
        let odd = DeviceStatus::parse("no permissions");
        assert_eq!(odd, DeviceStatus::Unknown("no permissions".into()));
        assert_eq!(odd.to_string(), "no permissions");
    }

    #[test]
    fn test_display_name() {
        let mut device = DeviceDescriptor::new("emulator-5554", DeviceStatus::Online);
        assert_eq!(device.display_name(), "emulator-5554");
        assert!(device.is_emulator());

        device.model = Some("sdk_gphone64_arm64".into());
        assert_eq!(device.display_name(), "sdk gphone64 arm64 (emulator-5554)");
    }
}
