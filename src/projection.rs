// src/projection.rs
use crossbeam_channel::Sender;

use crate::device_info::DeviceInfo;
use crate::types::{Outbound, StatusMessage, TagId};

/// The only way tag and battery state leave the engine for the
/// status characteristics. Fire and forget.
pub trait StatusProjection {
    fn on_appeared(&mut self, id: &TagId);
    fn on_content(&mut self, id: &TagId, text: &[u8]);
    fn on_removed(&mut self, id: &TagId);
    fn on_battery(&mut self, percent: u8);
}

/// Renders events as JSON status messages for the `/status` clients.
pub struct BroadcastProjection {
    tx: Sender<Outbound>,
}

impl BroadcastProjection {
    /// Announces `device` once, then forwards tag and battery events.
    pub fn new(device: &'static DeviceInfo, tx: Sender<Outbound>) -> Self {
        let projection = BroadcastProjection { tx };
        projection.send(StatusMessage::DeviceInfo {
            info: device.clone(),
        });
        projection
    }

    fn send(&self, msg: StatusMessage) {
        let _ = self.tx.send(Outbound::Status(msg));
    }
}

impl StatusProjection for BroadcastProjection {
    fn on_appeared(&mut self, id: &TagId) {
        self.send(StatusMessage::TagAppeared {
            uid: id.display_hex(),
        });
    }

    fn on_content(&mut self, id: &TagId, text: &[u8]) {
        self.send(StatusMessage::TagContent {
            uid: id.display_hex(),
            text: String::from_utf8_lossy(text).into_owned(),
        });
    }

    fn on_removed(&mut self, id: &TagId) {
        self.send(StatusMessage::TagRemoved {
            uid: id.display_hex(),
        });
    }

    fn on_battery(&mut self, percent: u8) {
        self.send(StatusMessage::Battery { percent });
    }
}


#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::device_info::DEVICE_INFO;

    #[test]
    fn announces_device_then_forwards_events() {
        let (tx, rx) = unbounded();
        let mut projection = BroadcastProjection::new(&DEVICE_INFO, tx);
        let id = TagId::new(&[0xAB, 0xCD, 0xEF, 0x01], &[0; 9]);

        projection.on_content(&id, b"hi");
        projection.on_battery(77);

        let messages: Vec<_> = rx
            .try_iter()
            .map(|msg| match msg {
                Outbound::Status(status) => status,
                Outbound::Uart(_) => panic!("status projection wrote to uart"),
            })
            .collect();

        assert!(matches!(messages[0], StatusMessage::DeviceInfo { .. }));
        assert_eq!(
            messages[1],
            StatusMessage::TagContent {
                uid: "abcdef01:000000000000000000".into(),
                text: "hi".into(),
            }
        );
        assert_eq!(messages[2], StatusMessage::Battery { percent: 77 });
    }
}
