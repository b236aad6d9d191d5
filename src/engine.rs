// src/engine.rs
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::battery::{BatteryMonitor, VoltageSource};
use crate::config::ReadMode;
use crate::error::TagError;
use crate::presence::{PresenceEvent, PresenceTracker};
use crate::projection::StatusProjection;
use crate::protocol::{self, CommandBuffer};
use crate::reader::TagReader;
use crate::transport::Transport;
use crate::{ndef, tag_memory};

pub const OVERFLOW_RESPONSE: &[u8] = b"ERR\tBUFFER_OVERFLOW\n";

/// Single cooperative loop owning the reader, the serial channel and all
/// tag state. Nothing here is shared with other threads.
pub struct Engine<R, T, P> {
    reader: R,
    transport: T,
    projection: P,
    commands: CommandBuffer,
    presence: PresenceTracker,
    detect_timeout: Duration,
    read_mode: ReadMode,
    battery: Option<BatteryMonitor<Box<dyn VoltageSource>>>,
}

impl<R, T, P> Engine<R, T, P>
where
    R: TagReader,
    T: Transport,
    P: StatusProjection,
{
    pub fn new(reader: R, transport: T, projection: P, detect_timeout: Duration) -> Self {
        Engine {
            reader,
            transport,
            projection,
            commands: CommandBuffer::new(),
            presence: PresenceTracker::new(),
            detect_timeout,
            read_mode: ReadMode::Ndef,
            battery: None,
        }
    }

    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    pub fn with_battery(mut self, monitor: BatteryMonitor<Box<dyn VoltageSource>>) -> Self {
        self.battery = Some(monitor);
        self
    }

    pub fn run(mut self) {
        info!("Starting NFC engine (poll timeout {:?})", self.detect_timeout);
        loop {
            self.tick(Instant::now());
        }
    }

    /// One poll cycle: serial input, one tag poll, presence update, pushes.
    pub fn tick(&mut self, now: Instant) {
        self.update_battery(now);
        self.process_input(now);
        self.poll_tag();
    }

    fn update_battery(&mut self, now: Instant) {
        if let Some(level) = self.battery.as_mut().and_then(|b| b.update(now)) {
            self.projection.on_battery(level);
        }
    }

    fn process_input(&mut self, now: Instant) {
        while let Some(data) = self.transport.try_read() {
            let overflow = self.commands.push(&data, now).is_err();
            // lines completed before the runaway tail are still answered
            self.answer_lines(now);
            if overflow {
                self.transport.write(OVERFLOW_RESPONSE);
            }
        }
        self.answer_lines(now);
    }

    fn answer_lines(&mut self, now: Instant) {
        let firmware = self.reader.firmware_version();
        while let Some(line) = self.commands.next_line(now) {
            debug!("Command: {:?}", String::from_utf8_lossy(&line));
            let resp = protocol::respond(&line, firmware, self.presence.snapshot());
            self.transport.write(&resp);
        }
    }

    fn poll_tag(&mut self) {
        let detected = self.reader.detect(self.detect_timeout);
        let seen = detected.is_some();

        for event in self.presence.observe(detected) {
            self.publish(event);
        }

        // only read while the tag answered this tick
        if seen && self.presence.needs_read() {
            let event = match self.read_text() {
                Ok(text) => self.presence.record_content(text),
                Err(err) => {
                    warn!("Tag read failed: {}", err);
                    self.presence.record_read_failure(err.is_transient())
                }
            };
            if let Some(event) = event {
                self.publish(event);
            }
        }
    }

    fn read_text(&mut self) -> Result<Option<Vec<u8>>, TagError> {
        let memory = match self.read_mode {
            ReadMode::Ndef => tag_memory::assemble_ndef(&mut self.reader)?,
            ReadMode::Raw => tag_memory::assemble(&mut self.reader)?,
        };
        debug!(
            "CC {:02x?}: read {} of {} pages ({} bytes declared)",
            memory.capability_container,
            memory.pages.len(),
            memory.page_count,
            memory.declared_size
        );
        if self.read_mode == ReadMode::Raw && !memory.complete {
            debug!("Raw read ended early");
        }

        let envelope = match ndef::decode(&memory) {
            Ok(envelope) => {
                debug!("NDEF message of {} bytes", envelope.length);
                envelope
            }
            Err(TagError::NotNdef(tlv)) => {
                info!("Tag has no NDEF message (first TLV {:#04x})", tlv);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        ndef::parse_first_text_record(&envelope.payload)
    }

    fn publish(&mut self, event: PresenceEvent) {
        match event {
            PresenceEvent::Appeared(id) => self.projection.on_appeared(&id),
            PresenceEvent::ContentUpdated(snapshot) => {
                if let Some(text) = &snapshot.ndef_text {
                    info!("Tag text: {:?}", String::from_utf8_lossy(text));
                    self.projection.on_content(&snapshot.id, text);
                }
                self.transport.write(&protocol::format_scan(Some(&snapshot)));
            }
            PresenceEvent::Removed(id) => {
                self.projection.on_removed(&id);
                self.transport.write(&protocol::format_scan(None));
            }
        }
    }
}
