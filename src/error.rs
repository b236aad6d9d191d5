// src/error.rs
use thiserror::Error;

use crate::config::InterfaceKind;

/// Failures of the tag decode layers. None of these stop the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("capability container magic is {0:#04x}, not an NDEF Type 2 tag")]
    BadCapabilityContainer(u8),
    #[error("tag data truncated: need {needed} bytes, read {available}")]
    Truncated { needed: usize, available: usize },
    #[error("first TLV is {0:#04x}, no NDEF message")]
    NotNdef(u8),
    #[error("expected terminator TLV, found {0:#04x}")]
    BadTerminator(u8),
    #[error("malformed NDEF record: {0}")]
    Malformed(&'static str),
    #[error("reader timed out")]
    ReadTimeout,
}

impl TagError {
    /// Whether another read of the same tag could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TagError::NotNdef(_) | TagError::BadCapabilityContainer(_))
    }
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),
    #[error("no NFC reader attached")]
    NoReader,
    #[error("reader returned status {0:02X} {1:02X}")]
    BadStatus(u8, u8),
    #[error("short response from reader: {0:02X?}")]
    ShortResponse(Vec<u8>),
    #[error("{0:?} bus is not available on this host")]
    BusUnavailable(InterfaceKind),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}
