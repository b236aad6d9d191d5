// src/transport.rs
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::debug;

use crate::types::Outbound;

/// Byte oriented duplex channel to the remote peer.
pub trait Transport {
    /// Non-blocking; `None` when nothing is waiting.
    fn try_read(&mut self) -> Option<Vec<u8>>;

    /// Best effort. Writes with no peer attached are dropped silently.
    fn write(&mut self, data: &[u8]);
}

/// Serial channel backed by the WebSocket bridge.
pub struct ChannelTransport {
    inbound: Receiver<Vec<u8>>,
    outbound: Sender<Outbound>,
}

impl ChannelTransport {
    pub fn new(inbound: Receiver<Vec<u8>>, outbound: Sender<Outbound>) -> Self {
        ChannelTransport { inbound, outbound }
    }
}

impl Transport for ChannelTransport {
    fn try_read(&mut self) -> Option<Vec<u8>> {
        match self.inbound.try_recv() {
            Ok(data) => Some(data),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                debug!("Serial inbound channel closed");
                None
            }
        }
    }

    fn write(&mut self, data: &[u8]) {
        let _ = self.outbound.send(Outbound::Uart(data.to_vec()));
    }
}

#[cfg(test)]
pub mod mock {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Default)]
    pub struct MockTransport {
        pub inbound: VecDeque<Vec<u8>>,
        pub written: Vec<Vec<u8>>,
    }

    impl MockTransport {
        pub fn send(&mut self, data: &[u8]) {
            self.inbound.push_back(data.to_vec());
        }

        pub fn take_written(&mut self) -> Vec<Vec<u8>> {
            std::mem::take(&mut self.written)
        }
    }

    impl Transport for MockTransport {
        fn try_read(&mut self) -> Option<Vec<u8>> {
            self.inbound.pop_front()
        }

        fn write(&mut self, data: &[u8]) {
            self.written.push(data.to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;

    #[test]
    fn channel_transport_moves_bytes_both_ways() {
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let mut transport = ChannelTransport::new(in_rx, out_tx);

        assert_eq!(transport.try_read(), None);
        in_tx.send(b"VER\n".to_vec()).unwrap();
        assert_eq!(transport.try_read(), Some(b"VER\n".to_vec()));

        transport.write(b"VER\t0\t1\n");
        match out_rx.try_recv().unwrap() {
            Outbound::Uart(data) => assert_eq!(data, b"VER\t0\t1\n"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn writes_without_a_listener_are_dropped() {
        let (_in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        drop(out_rx);
        let mut transport = ChannelTransport::new(in_rx, out_tx);
        transport.write(b"SCAN\n");
    }
}
