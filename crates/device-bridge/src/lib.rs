//! Android Device Bridge
//!
//! Lists attached devices and installs APKs through adb.

pub mod adb;
pub mod device;
pub mod install;
pub mod listing;

pub use adb::{AdbClient, AdbError};
pub use device::{DeviceDescriptor, DeviceStatus};
pub use install::InstallApk;
pub use listing::{parse_device_list, ListDevices};
