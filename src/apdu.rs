// src/apdu.rs
use std::ffi::CStr;

use pcsc::{Card, Context, Protocols, ShareMode};

use crate::error::ReaderError;
use crate::types::FirmwareVersion;

/// Sends an APDU and returns the response without its status word.
/// Anything other than 90 00 is an error.
fn transmit(card: &Card, apdu: &[u8]) -> Result<Vec<u8>, ReaderError> {
    let mut recv_buffer = [0u8; 256];
    let resp = card.transmit(apdu, &mut recv_buffer)?;
    match resp {
        [data @ .., 0x90, 0x00] => Ok(data.to_vec()),
        [.., sw1, sw2] => Err(ReaderError::BadStatus(*sw1, *sw2)),
        _ => Err(ReaderError::ShortResponse(resp.to_vec())),
    }
}

// Get Data (UID): FF CA 00 00 00
pub fn get_uid(card: &Card) -> Result<Vec<u8>, ReaderError> {
    transmit(card, &[0xFF, 0xCA, 0x00, 0x00, 0x00])
}

// Read: FF B0 00 Page Len
// NTAG answers READ with 16 bytes (4 pages) starting at `page`
pub fn read_binary(card: &Card, page: u8, length: u8) -> Result<Vec<u8>, ReaderError> {
    transmit(card, &[0xFF, 0xB0, 0x00, page, length])
}

/// PN532 GetFirmwareVersion (D4 02) tunnelled through the reader's escape
/// command. Needs a direct connection, so it works without a tag present.
pub fn firmware_version(ctx: &Context, reader: &CStr) -> Result<FirmwareVersion, ReaderError> {
    let card = ctx.connect(reader, ShareMode::Direct, Protocols::UNDEFINED)?;

    // Direct Transmit: FF 00 00 00 Len [PN532 frame], over the escape
    // control code SCARD_CTL_CODE(3500)
    let command = [0xFF, 0x00, 0x00, 0x00, 0x02, 0xD4, 0x02];
    let mut recv_buffer = [0u8; 64];
    let resp = card.control(pcsc::ctl_code(3500), &command, &mut recv_buffer)?;

    // D5 03 IC Ver Rev Support [90 00]
    match resp {
        [0xD5, 0x03, ic, ver, rev, support, ..] => Ok(FirmwareVersion {
            ic: *ic,
            ver: *ver,
            rev: *rev,
            support: *support,
        }),
        _ => Err(ReaderError::ShortResponse(resp.to_vec())),
    }
}
