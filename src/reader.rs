// src/reader.rs
use std::time::Duration;

use log::{info, warn};

use crate::config::{Config, InterfaceKind};
use crate::error::ReaderError;
use crate::pcsc_reader::PcscReader;
use crate::types::{FirmwareVersion, PAGE_SIZE, TagId};

/// The page-level view of an NFC reader the engine drives.
///
/// Both calls are bounded: `detect` waits at most `timeout`, and a
/// `read_page` that the chip cannot answer returns `None`.
pub trait TagReader {
    fn detect(&mut self, timeout: Duration) -> Option<TagId>;

    fn read_page(&mut self, index: u8) -> Option<[u8; PAGE_SIZE]>;

    fn firmware_version(&self) -> FirmwareVersion;
}

impl<R: TagReader + ?Sized> TagReader for Box<R> {
    fn detect(&mut self, timeout: Duration) -> Option<TagId> {
        (**self).detect(timeout)
    }

    fn read_page(&mut self, index: u8) -> Option<[u8; PAGE_SIZE]> {
        (**self).read_page(index)
    }

    fn firmware_version(&self) -> FirmwareVersion {
        (**self).firmware_version()
    }
}

/// Builds the reader for the configured interface. The config has already
/// been validated, so the pins each bus needs are known to be present.
pub fn open(config: &Config) -> Result<Box<dyn TagReader>, ReaderError> {
    let nfc = &config.nfc;
    match nfc.interface {
        InterfaceKind::Pcsc => {
            let reader = PcscReader::open(nfc.reader_name.as_deref())?;
            Ok(Box::new(reader))
        }
        InterfaceKind::I2c => {
            if let Some(bus) = &config.interfaces.i2c {
                info!("PN532 over I2C (scl={}, sda={})", bus.scl, bus.sda);
            }
            bus_unavailable(config, InterfaceKind::I2c)
        }
        InterfaceKind::Spi => {
            if let Some(bus) = &config.interfaces.spi {
                info!(
                    "PN532 over SPI (sck={}, mosi={}, miso={}, cs={:?})",
                    bus.sck, bus.mosi, bus.miso, nfc.cs_pin
                );
            }
            bus_unavailable(config, InterfaceKind::Spi)
        }
        InterfaceKind::Uart => {
            if let Some(bus) = &config.interfaces.uart {
                info!(
                    "PN532 over UART (tx={}, rx={}, {} baud, timeout {} ms)",
                    bus.tx, bus.rx, bus.baudrate, bus.timeout_ms
                );
            }
            bus_unavailable(config, InterfaceKind::Uart)
        }
    }
}

fn bus_unavailable(
    config: &Config,
    kind: InterfaceKind,
) -> Result<Box<dyn TagReader>, ReaderError> {
    info!(
        "Reader pins: reset={:?} req={:?}",
        config.nfc.reset_pin, config.nfc.req_pin
    );
    warn!("{:?} bus bring-up belongs to the board support layer", kind);
    Err(ReaderError::BusUnavailable(kind))
}

#[cfg(test)]
pub mod mock {
    use std::collections::VecDeque;

    use super::*;

    /// Scripted reader: one detect outcome per tick, memory pages by index.
    #[derive(Default)]
    pub struct MockReader {
        pub detections: VecDeque<Option<TagId>>,
        pub pages: Vec<[u8; PAGE_SIZE]>,
        /// pages at or past this index fail to read
        pub fail_from: Option<u8>,
        pub reads: Vec<u8>,
        pub firmware: FirmwareVersion,
    }

    impl MockReader {
        /// Memory image starting at page 0; `data` lands at page 4 onwards.
        pub fn with_memory(cc: [u8; 4], data: &[u8]) -> Self {
            let mut pages = vec![[0u8; PAGE_SIZE]; 3];
            pages.push(cc);
            for chunk in data.chunks(PAGE_SIZE) {
                let mut page = [0u8; PAGE_SIZE];
                page[..chunk.len()].copy_from_slice(chunk);
                pages.push(page);
            }
            MockReader {
                pages,
                ..Default::default()
            }
        }

        pub fn script(&mut self, ticks: impl IntoIterator<Item = Option<TagId>>) {
            self.detections.extend(ticks);
        }
    }

    impl TagReader for MockReader {
        fn detect(&mut self, _timeout: Duration) -> Option<TagId> {
            self.detections.pop_front().flatten()
        }

        fn read_page(&mut self, index: u8) -> Option<[u8; PAGE_SIZE]> {
            self.reads.push(index);
            if self.fail_from.is_some_and(|limit| index >= limit) {
                return None;
            }
            self.pages.get(index as usize).copied()
        }

        fn firmware_version(&self) -> FirmwareVersion {
            self.firmware
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_interfaces_report_unavailable() {
        let json = r#"{
            "nfc": { "interface": "uart" },
            "interfaces": { "uart": { "enabled": true, "tx": "TX", "rx": "RX", "baudrate": 115200 } }
        }"#;
        let config = Config::from_json(json).unwrap();
        match open(&config) {
            Err(ReaderError::BusUnavailable(kind)) => assert_eq!(kind, InterfaceKind::Uart),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("uart reader should not open on host"),
        }
    }
}
