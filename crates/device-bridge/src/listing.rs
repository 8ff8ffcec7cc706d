//! Device Listing
//!
//! Parses `adb devices -l` and backfills model and Android version through
//! `getprop` queries on each listed device.

use apkshell_android_toolchain::ToolContext;
use apkshell_core::{spawn_worker, WorkerHandle};
use regex::Regex;
use tracing::{debug, info};

use crate::adb::{AdbClient, AdbError};
use crate::device::{DeviceDescriptor, DeviceStatus};

const HEADER: &str = "List of devices";
const LINE_PATTERN: &str = r"^(\S+)\s+(\S+)(?:\s+(.+))?$";
const ATTRIBUTE_PATTERN: &str = r"(\w+):(\S+)";

pub const PROP_MODEL: &str = "ro.product.model";
pub const PROP_SDK: &str = "ro.build.version.sdk";
pub const PROP_RELEASE: &str = "ro.build.version.release";

/// Parse one device line, e.g.
/// `emulator-5554  device product:sdk_gphone64 model:Pixel_7 transport_id:1`
pub fn parse_device_line(line: &str) -> Option<DeviceDescriptor> {
    let line_re = Regex::new(LINE_PATTERN).ok()?;
    let caps = line_re.captures(line.trim())?;

    let serial = caps.get(1)?.as_str();
    let mut device = DeviceDescriptor::new(serial, DeviceStatus::parse(caps.get(2)?.as_str()));

    if let Some(attributes) = caps.get(3) {
        let attr_re = Regex::new(ATTRIBUTE_PATTERN).ok()?;
        for attr in attr_re.captures_iter(attributes.as_str()) {
            match &attr[1] {
                "model" => device.model = Some(attr[2].to_string()),
                "product" => device.product = Some(attr[2].to_string()),
                _ => {}
            }
        }
    }
    Some(device)
}

/// Parse the output of `adb devices -l`.
///
/// Everything up to and including the `List of devices` header is skipped,
/// which drops daemon start-up chatter.
pub fn parse_device_list<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<DeviceDescriptor> {
    let mut found_header = false;
    let mut devices = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !found_header {
            found_header = trimmed.starts_with(HEADER);
            continue;
        }
        match parse_device_line(trimmed) {
            Some(device) => devices.push(device),
            None => debug!("Unparsed device line: {}", trimmed),
        }
    }
    devices
}

/// Lists attached devices
pub struct ListDevices {
    context: ToolContext,
}

impl ListDevices {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }

    pub async fn run(&self) -> Result<Vec<DeviceDescriptor>, AdbError> {
        let adb = AdbClient::from_context(&self.context).await?;
        let result = adb
            .run_checked(&["devices".to_string(), "-l".to_string()])
            .await
            .map_err(|e| match e {
                AdbError::CommandFailed(detail) => AdbError::CommandFailed(format!("querying devices failed: {}", detail)),
                other => other,
            })?;

        let mut devices = parse_device_list(result.output.iter().map(String::as_str));
        for device in &mut devices {
            backfill(&adb, device).await;
        }
        info!("Found {} device(s)", devices.len());
        Ok(devices)
    }

    pub fn spawn(self) -> WorkerHandle<Vec<DeviceDescriptor>> {
        spawn_worker("list-devices", move |sink| async move {
            sink.progress(0, "Querying devices...");
            let devices = self.run().await?;
            sink.progress(100, format!("{} device(s)", devices.len()));
            Ok::<_, AdbError>(devices)
        })
    }
}

async fn backfill(adb: &AdbClient, device: &mut DeviceDescriptor) {
    if device.model.is_none() {
        device.model = adb.get_prop(&device.serial, PROP_MODEL).await;
    }
    device.sdk_version = adb.get_prop(&device.serial, PROP_SDK).await;
    device.android_version = adb.get_prop(&device.serial, PROP_RELEASE).await;
}
