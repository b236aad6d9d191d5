// src/tag_memory.rs
use log::debug;

use crate::error::TagError;
use crate::ndef;
use crate::reader::TagReader;
use crate::types::{CC_PAGE, FIRST_DATA_PAGE, NTAG_CC_MAGIC, PAGE_SIZE, TLV_NDEF};

/// User memory of an NTAG2xx tag, as far as it could be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTagMemory {
    pub capability_container: [u8; PAGE_SIZE],
    pub pages: Vec<[u8; PAGE_SIZE]>,
    /// pages declared by the capability container
    pub page_count: usize,
    /// bytes declared by the capability container
    pub declared_size: usize,
    /// every declared page was read
    pub complete: bool,
}

impl RawTagMemory {
    pub fn data(&self) -> Vec<u8> {
        self.pages.concat()
    }
}

/// Reads every page the capability container declares (raw dump).
pub fn assemble<R: TagReader + ?Sized>(reader: &mut R) -> Result<RawTagMemory, TagError> {
    assemble_until(reader, |_| false)
}

/// Like [`assemble`], but stops as soon as the first NDEF TLV including its
/// terminator is covered, or right after page 4 if there is no NDEF TLV.
pub fn assemble_ndef<R: TagReader + ?Sized>(reader: &mut R) -> Result<RawTagMemory, TagError> {
    assemble_until(reader, ndef_span_covered)
}

fn ndef_span_covered(data: &[u8]) -> bool {
    match data.first() {
        None => false,
        Some(&tag) if tag != TLV_NDEF => true,
        Some(_) => match ndef::tlv_header(data) {
            Ok((offset, length)) => data.len() > offset + length,
            Err(_) => false,
        },
    }
}

fn assemble_until<R, F>(reader: &mut R, done: F) -> Result<RawTagMemory, TagError>
where
    R: TagReader + ?Sized,
    F: Fn(&[u8]) -> bool,
{
    let cc = reader.read_page(CC_PAGE).ok_or(TagError::ReadTimeout)?;
    if cc[0] != NTAG_CC_MAGIC {
        return Err(TagError::BadCapabilityContainer(cc[0]));
    }

    // CC byte 2 is the data area size in units of 8 bytes
    let page_count = cc[2] as usize * 2;
    let mut pages = Vec::with_capacity(page_count);
    let mut data = Vec::with_capacity(page_count * PAGE_SIZE);

    for offset in 0..page_count {
        let page = u8::try_from(FIRST_DATA_PAGE as usize + offset)
            .ok()
            .and_then(|index| reader.read_page(index));

        match page {
            Some(page) => {
                pages.push(page);
                data.extend_from_slice(&page);
            }
            None => {
                debug!("Tag read stopped after {} of {} pages", pages.len(), page_count);
                break;
            }
        }

        if done(&data) {
            break;
        }
    }

    let complete = pages.len() == page_count;
    Ok(RawTagMemory {
        capability_container: cc,
        pages,
        page_count,
        declared_size: page_count * PAGE_SIZE,
        complete,
    })
}
