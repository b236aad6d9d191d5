// src/protocol.rs
//! Line oriented command protocol spoken over the serial channel.
//!
//! Requests are `COMMAND[\targ...]\n`. Responses are tab separated and
//! newline terminated:
//!
//! | Request | Response |
//! |---------|----------|
//! | `HWVER` | `HWVER\t<ic>\t<ver>\t<rev>\t<support>` |
//! | `VER`   | `VER\t<major>\t<minor>` |
//! | `SCAN`  | `SCAN` or `SCAN\tremovable=yes\tuid=<uid>:<serial>\ttext=<text>` |
//! | other   | `ERR\tUNKNOWN_CMD\t<command>` |

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::types::{FirmwareVersion, TagSnapshot};

pub const PROTOCOL_VERSION: (u8, u8) = (0, 1);

/// Idle time after which a partial line is taken as complete.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Longest partial line kept before the buffer is reset.
pub const MAX_COMMAND_BUFFER: usize = 256;

const TAB: u8 = b'\t';
const NEWLINE: u8 = b'\n';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOverflow;

/// Inbound bytes waiting to form a line.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    bytes: Vec<u8>,
    last_activity: Option<Instant>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a read. If the unterminated tail grows past
    /// [`MAX_COMMAND_BUFFER`] the tail is discarded; complete lines stay.
    pub fn push(&mut self, data: &[u8], now: Instant) -> Result<(), BufferOverflow> {
        if data.is_empty() {
            return Ok(());
        }
        self.bytes.extend_from_slice(data);
        self.last_activity = Some(now);

        let tail_start = self
            .bytes
            .iter()
            .rposition(|&b| b == NEWLINE)
            .map_or(0, |nl| nl + 1);
        if self.bytes.len() - tail_start > MAX_COMMAND_BUFFER {
            warn!(
                "Command buffer overflow ({} bytes unterminated), dropping",
                self.bytes.len() - tail_start
            );
            self.bytes.truncate(tail_start);
            return Err(BufferOverflow);
        }
        Ok(())
    }

    /// Takes the next complete line, without its `\n`. A partial line
    /// counts as complete once the peer has been idle for [`TIMEOUT`].
    pub fn next_line(&mut self, now: Instant) -> Option<Vec<u8>> {
        if self.bytes.is_empty() {
            return None;
        }

        if let Some(nl) = self.bytes.iter().position(|&b| b == NEWLINE) {
            let line = self.bytes[..nl].to_vec();
            self.bytes.drain(..=nl);
            return Some(line);
        }

        let idle = self
            .last_activity
            .is_none_or(|last| now.saturating_duration_since(last) >= TIMEOUT);
        if idle {
            debug!("No newline after {:?}, taking buffered input as a line", TIMEOUT);
            return Some(std::mem::take(&mut self.bytes));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    HwVer,
    Ver,
    Scan,
    Unknown(&'a [u8]),
}

/// A line split on tabs. Arguments are not used by any command yet.
#[derive(Debug, PartialEq, Eq)]
pub struct Request<'a> {
    pub command: Command<'a>,
    pub args: Vec<&'a [u8]>,
}

pub fn parse_line(line: &[u8]) -> Request<'_> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let mut fields = line.splitn(2, |&b| b == TAB);
    let token = fields.next().unwrap_or_default();
    let args = match fields.next() {
        Some(rest) => rest.split(|&b| b == TAB).collect(),
        None => Vec::new(),
    };

    let command = match token {
        b"HWVER" => Command::HwVer,
        b"VER" => Command::Ver,
        b"SCAN" => Command::Scan,
        other => Command::Unknown(other),
    };
    Request { command, args }
}

/// Renders the response to one request line.
pub fn respond(line: &[u8], firmware: FirmwareVersion, snapshot: Option<&TagSnapshot>) -> Vec<u8> {
    let request = parse_line(line);
    if !request.args.is_empty() {
        debug!("Ignoring {} argument(s)", request.args.len());
    }

    match request.command {
        Command::HwVer => format!(
            "HWVER\t{}\t{}\t{}\t{}\n",
            firmware.ic, firmware.ver, firmware.rev, firmware.support
        )
        .into_bytes(),
        Command::Ver => {
            format!("VER\t{}\t{}\n", PROTOCOL_VERSION.0, PROTOCOL_VERSION.1).into_bytes()
        }
        Command::Scan => format_scan(snapshot),
        Command::Unknown(token) => error_response("UNKNOWN_CMD", token),
    }
}

/// The `SCAN` line, shared by explicit requests and pushed updates.
///
/// A present tag without text still reports its uid with an empty `text=`,
/// and is pushed once its content resolves. Peers written against the bare
/// `SCAN` reply for unreadable tags must treat an empty `text=` the same way.
pub fn format_scan(snapshot: Option<&TagSnapshot>) -> Vec<u8> {
    let Some(snapshot) = snapshot else {
        return b"SCAN\n".to_vec();
    };

    let mut resp = b"SCAN\tremovable=yes\tuid=".to_vec();
    resp.extend_from_slice(snapshot.id.display_hex().as_bytes());
    resp.extend_from_slice(b"\ttext=");
    if let Some(text) = &snapshot.ndef_text {
        resp.extend_from_slice(text);
    }
    resp.push(NEWLINE);
    resp
}

pub fn error_response(kind: &str, detail: &[u8]) -> Vec<u8> {
    let mut resp = format!("ERR\t{}\t", kind).into_bytes();
    resp.extend_from_slice(detail);
    resp.push(NEWLINE);
    resp
}
