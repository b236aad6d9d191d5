// src/ndef.rs
use log::debug;

use crate::error::TagError;
use crate::tag_memory::RawTagMemory;
use crate::types::{
    NdefEnvelope, NdefRecord, TLV_LONG_LENGTH, TLV_NDEF, TLV_TERMINATOR, TextRecord,
};

// Record header flags
const FLAG_MB: u8 = 0x80; // Message Begin
const FLAG_SR: u8 = 0x10; // Short Record
const FLAG_IL: u8 = 0x08; // ID Length present
const TNF_MASK: u8 = 0x07;

pub const TNF_WELL_KNOWN: u8 = 0x01;
pub const RTD_TEXT: &[u8] = b"T";

const TEXT_UTF16: u8 = 0x80;
const TEXT_LANG_LEN_MASK: u8 = 0x3F;

/// Locates the NDEF TLV value: returns `(payload_offset, length)`.
///
/// Lengths below 0xFF are one byte; 0xFF announces a big-endian u16
/// and moves the value from offset 2 to offset 4.
pub fn tlv_header(data: &[u8]) -> Result<(usize, usize), TagError> {
    let tag = *data.first().ok_or(TagError::Truncated {
        needed: 2,
        available: 0,
    })?;
    if tag != TLV_NDEF {
        return Err(TagError::NotNdef(tag));
    }

    match data.get(1) {
        None => Err(TagError::Truncated {
            needed: 2,
            available: data.len(),
        }),
        Some(&len) if len < TLV_LONG_LENGTH => Ok((2, len as usize)),
        Some(_) => match data.get(2..4) {
            Some(long) => Ok((4, u16::from_be_bytes([long[0], long[1]]) as usize)),
            None => Err(TagError::Truncated {
                needed: 4,
                available: data.len(),
            }),
        },
    }
}

/// Strips the TLV envelope from raw tag memory.
pub fn decode(memory: &RawTagMemory) -> Result<NdefEnvelope, TagError> {
    decode_tlv(&memory.data())
}

/// Only the first NDEF TLV is honored; anything after its terminator is ignored.
pub fn decode_tlv(data: &[u8]) -> Result<NdefEnvelope, TagError> {
    let (offset, length) = tlv_header(data)?;

    // value plus the mandatory terminator byte
    let needed = offset + length + 1;
    if data.len() < needed {
        return Err(TagError::Truncated {
            needed,
            available: data.len(),
        });
    }

    let terminator = data[offset + length];
    if terminator != TLV_TERMINATOR {
        return Err(TagError::BadTerminator(terminator));
    }

    Ok(NdefEnvelope {
        length,
        payload: data[offset..offset + length].to_vec(),
    })
}

/// Small cursor that refuses to read past the end of the record.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], TagError> {
        let end = self.pos.checked_add(len).ok_or(TagError::Malformed(what))?;
        let bytes = self.data.get(self.pos..end).ok_or(TagError::Malformed(what))?;
        self.pos = end;
        Ok(bytes)
    }

    fn byte(&mut self, what: &'static str) -> Result<u8, TagError> {
        Ok(self.take(1, what)?[0])
    }
}

/// Decodes the first record of an NDEF message. Further records are not
/// looked at.
pub fn parse_first_record(message: &[u8]) -> Result<NdefRecord, TagError> {
    let mut cursor = Cursor {
        data: message,
        pos: 0,
    };

    let header = cursor.byte("record header")?;
    let tnf = header & TNF_MASK;
    if header & FLAG_MB == 0 {
        debug!("First record lacks the Message Begin flag ({:#04x})", header);
    }

    // 1. Type Length
    let type_len = cursor.byte("type length")? as usize;

    // 2. Payload Length (1 byte for Short Record, 4 bytes otherwise)
    let payload_len = if header & FLAG_SR != 0 {
        cursor.byte("payload length")? as usize
    } else {
        let raw = cursor.take(4, "payload length")?;
        u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
    };

    // 3. ID Length (if present)
    let id_len = if header & FLAG_IL != 0 {
        Some(cursor.byte("id length")? as usize)
    } else {
        None
    };

    // 4. Type, ID, Payload in that order
    let record_type = cursor.take(type_len, "type")?.to_vec();
    let id = match id_len {
        Some(len) => Some(cursor.take(len, "id")?.to_vec()),
        None => None,
    };
    let payload = cursor.take(payload_len, "payload")?.to_vec();

    Ok(NdefRecord {
        tnf,
        record_type,
        id,
        payload,
    })
}

impl NdefRecord {
    pub fn is_text(&self) -> bool {
        self.tnf == TNF_WELL_KNOWN && self.record_type == RTD_TEXT
    }
}

/// Splits a text record payload: status byte, IANA language code, text.
pub fn parse_text_payload(payload: &[u8]) -> Result<TextRecord, TagError> {
    let status = *payload
        .first()
        .ok_or(TagError::Malformed("empty text payload"))?;
    let lang_len = (status & TEXT_LANG_LEN_MASK) as usize;

    let text_start = 1 + lang_len;
    if text_start > payload.len() {
        return Err(TagError::Malformed("language code"));
    }

    Ok(TextRecord {
        utf16: status & TEXT_UTF16 != 0,
        language_code: payload[1..text_start].to_vec(),
        text: payload[text_start..].to_vec(),
    })
}

/// Text of the first record if it is a well-known text record.
///
/// An empty message or a first record of another type is `Ok(None)`.
pub fn parse_first_text_record(message: &[u8]) -> Result<Option<Vec<u8>>, TagError> {
    if message.is_empty() {
        return Ok(None);
    }

    let record = parse_first_record(message)?;
    if !record.is_text() {
        debug!(
            "First record is not text (tnf={}, type={:?}, id={:?})",
            record.tnf, record.record_type, record.id
        );
        return Ok(None);
    }

    let text = parse_text_payload(&record.payload)?;
    debug!(
        "Text record, language {:?}{}",
        String::from_utf8_lossy(&text.language_code),
        if text.utf16 { ", UTF-16" } else { "" }
    );
    Ok(Some(text.text))
}
