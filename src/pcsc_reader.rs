// src/pcsc_reader.rs
use std::ffi::CString;
use std::time::Duration;

use log::{debug, error, info, warn};
use pcsc::{Card, Context, Protocols, ReaderState, Scope, ShareMode, State};

use crate::apdu;
use crate::error::ReaderError;
use crate::reader::TagReader;
use crate::types::{FirmwareVersion, PAGE_SIZE, SERIAL_NUMBER_LEN, TagId};

/// PC/SC attached reader (ACR122U class, PN532 inside).
pub struct PcscReader {
    ctx: Context,
    name: CString,
    states: [ReaderState; 1],
    card: Option<Card>,
    firmware: FirmwareVersion,
}

impl PcscReader {
    /// Picks the first reader, or the first whose name contains `preferred`.
    pub fn open(preferred: Option<&str>) -> Result<Self, ReaderError> {
        let ctx = Context::establish(Scope::User)?;

        let mut readers_buf = [0; 2048];
        let names: Vec<CString> = match ctx.list_readers(&mut readers_buf) {
            Ok(iter) => iter.map(CString::from).collect(),
            Err(pcsc::Error::NoReadersAvailable) => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let name = names
            .into_iter()
            .find(|name| preferred.is_none_or(|p| name.to_string_lossy().contains(p)))
            .ok_or(ReaderError::NoReader)?;
        info!("Using reader {:?}", name);

        let firmware = match apdu::firmware_version(&ctx, &name) {
            Ok(version) => {
                info!("Reader firmware: {:?}", version);
                version
            }
            Err(err) => {
                warn!("Could not query reader firmware version: {}", err);
                FirmwareVersion::default()
            }
        };

        let states = [ReaderState::new(name.clone(), State::UNAWARE)];
        Ok(PcscReader {
            ctx,
            name,
            states,
            card: None,
            firmware,
        })
    }

    fn card_present(&mut self, timeout: Duration) -> bool {
        match self.ctx.get_status_change(timeout, &mut self.states) {
            Ok(()) => {
                // new card or card gone: any open connection is stale
                self.card = None;
                self.states[0].sync_current_state();
            }
            Err(pcsc::Error::Timeout) => {}
            Err(err) => {
                error!("PCSC Error: {}", err);
                self.card = None;
                std::thread::sleep(Duration::from_secs(1));
                return false;
            }
        }

        let current = self.states[0].current_state();
        current.intersects(State::PRESENT) && !current.intersects(State::MUTE)
    }

    fn identify(&mut self) -> Result<TagId, ReaderError> {
        if self.card.is_none() {
            let card = self.ctx.connect(&self.name, ShareMode::Shared, Protocols::ANY)?;
            self.card = Some(card);
        }
        let card = self.card.as_ref().ok_or(ReaderError::NoReader)?;

        let uid = apdu::get_uid(card)?;
        // pages 0-3: serial number, lock bytes, capability container
        let header = apdu::read_binary(card, 0, 16)?;
        let serial = header
            .get(..SERIAL_NUMBER_LEN)
            .ok_or_else(|| ReaderError::ShortResponse(header.clone()))?;
        Ok(TagId::new(&uid, serial))
    }
}

impl TagReader for PcscReader {
    fn detect(&mut self, timeout: Duration) -> Option<TagId> {
        if !self.card_present(timeout) {
            self.card = None;
            return None;
        }

        match self.identify() {
            Ok(id) => Some(id),
            Err(err) => {
                debug!("Tag present but not identified: {}", err);
                self.card = None;
                None
            }
        }
    }

    fn read_page(&mut self, index: u8) -> Option<[u8; PAGE_SIZE]> {
        let card = self.card.as_ref()?;
        match apdu::read_binary(card, index, PAGE_SIZE as u8) {
            Ok(data) => data.get(..PAGE_SIZE)?.try_into().ok(),
            Err(err) => {
                debug!("Reading page {} failed: {}", index, err);
                None
            }
        }
    }

    fn firmware_version(&self) -> FirmwareVersion {
        self.firmware
    }
}
