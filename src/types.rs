// src/types.rs
use serde::Serialize;

use crate::device_info::DeviceInfo;

/// Identity of a detected tag. Two ids are equal iff both uid and serial match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TagId {
    pub uid: Vec<u8>, // 4..=10 bytes from anticollision
    pub serial_number: Vec<u8>, // first 9 bytes of pages 0-2
}

impl TagId {
    pub fn new(uid: &[u8], serial_number: &[u8]) -> Self {
        TagId {
            uid: uid.to_vec(),
            serial_number: serial_number.to_vec(),
        }
    }

    /// `<hex-uid>:<hex-serial>`, two lowercase digits per byte.
    pub fn display_hex(&self) -> String {
        format!(
            "{}:{}",
            hex::encode(&self.uid),
            hex::encode(&self.serial_number)
        )
    }
}

/// What the peer can observe about the tag currently on the reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagSnapshot {
    pub id: TagId,
    pub ndef_text: Option<Vec<u8>>,
}

/// NDEF message bytes with the TLV header and terminator stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NdefEnvelope {
    pub length: usize,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: u8, // Type Name Format (How to interpret the type)
    pub record_type: Vec<u8>,
    pub id: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Payload of a well-known "T" record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextRecord {
    pub utf16: bool,
    pub language_code: Vec<u8>,
    pub text: Vec<u8>,
}

/// Reader chip identity as reported by PN532 GetFirmwareVersion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub ic: u8,
    pub ver: u8,
    pub rev: u8,
    pub support: u8,
}

// Messages pushed to status clients (the BLE characteristic projection)
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusMessage {
    DeviceInfo { info: DeviceInfo },
    TagAppeared { uid: String },
    TagContent { uid: String, text: String },
    TagRemoved { uid: String },
    Battery { percent: u8 },
}

// Everything the engine thread hands over to the async side
#[derive(Clone, Debug)]
pub enum Outbound {
    Uart(Vec<u8>),
    Status(StatusMessage),
}

pub const NTAG_CC_MAGIC: u8 = 0xE1; // NFC Forum Type 2, NDEF capable
pub const CC_PAGE: u8 = 3;
pub const FIRST_DATA_PAGE: u8 = 4;
pub const PAGE_SIZE: usize = 4;
pub const SERIAL_NUMBER_LEN: usize = 9;

pub const TLV_NDEF: u8 = 0x03;
pub const TLV_TERMINATOR: u8 = 0xFE;
pub const TLV_LONG_LENGTH: u8 = 0xFF;
