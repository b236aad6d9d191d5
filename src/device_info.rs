// src/device_info.rs
use std::fs;

use lazy_static::lazy_static;
use serde::Serialize;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model_number: String,
    pub software_revision: String,
    pub firmware_revision: String,
    pub hardware_revision: String,
    pub serial_number: String,
}

lazy_static! {
    // Derived once per process; every consumer gets the same &'static.
    pub static ref DEVICE_INFO: DeviceInfo = DeviceInfo::new(&host_identity());
}

impl DeviceInfo {
    pub fn new(identity: &[u8]) -> Self {
        DeviceInfo {
            manufacturer: "NFC Bridge Project".into(),
            model_number: "NfcBleBridge".into(),
            software_revision: concat!("v", env!("CARGO_PKG_VERSION")).into(),
            firmware_revision: "1000".into(),
            hardware_revision: "1000".into(),
            serial_number: hex::encode(identity),
        }
    }
}

fn host_identity() -> Vec<u8> {
    ["/etc/machine-id", "/var/lib/dbus/machine-id", "/etc/hostname"]
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
        .map(|text| match hex::decode(&text) {
            Ok(bytes) => bytes,
            Err(_) => text.into_bytes(),
        })
        .unwrap_or_default()
}
