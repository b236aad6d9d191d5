// src/presence.rs
use log::{debug, info};

use crate::types::{TagId, TagSnapshot};

/// Consecutive missed polls before a present tag is declared gone.
/// The reader drops single polls even with the tag stationary, so one
/// miss is tolerated and the second one removes.
pub const REMOVAL_THRESHOLD: u8 = 2;

/// Content reads attempted per tag presence before giving up on it.
pub const MAX_CONTENT_READ_ATTEMPTS: u8 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresenceEvent {
    Appeared(TagId),
    ContentUpdated(TagSnapshot),
    Removed(TagId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ContentState {
    Pending { attempts: u8 },
    Resolved,
}

#[derive(Clone, Debug)]
struct Present {
    snapshot: TagSnapshot,
    content: ContentState,
    misses: u8,
}

/// Debounces per-tick detection results into stable presence events.
#[derive(Clone, Debug, Default)]
pub struct PresenceTracker {
    current: Option<Present>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<&TagSnapshot> {
        self.current.as_ref().map(|p| &p.snapshot)
    }

    /// Feeds one poll result. An empty result means "unchanged".
    pub fn observe(&mut self, detected: Option<TagId>) -> Vec<PresenceEvent> {
        let mut events = Vec::new();

        match (self.current.as_mut(), detected) {
            (None, None) => {}
            (None, Some(id)) => {
                events.push(self.appear(id));
            }
            (Some(present), Some(id)) if present.snapshot.id == id => {
                present.misses = 0;
            }
            (Some(_), Some(id)) => {
                // swap without an observed gap: remove, then add
                if let Some(event) = self.remove() {
                    events.push(event);
                }
                events.push(self.appear(id));
            }
            (Some(present), None) => {
                present.misses = (present.misses + 1).min(REMOVAL_THRESHOLD);
                if present.misses >= REMOVAL_THRESHOLD {
                    if let Some(event) = self.remove() {
                        events.push(event);
                    }
                } else {
                    debug!("Tag missed a poll ({}/{})", present.misses, REMOVAL_THRESHOLD);
                }
            }
        }

        events
    }

    /// Whether the present tag still needs its memory read.
    pub fn needs_read(&self) -> bool {
        matches!(
            self.current.as_ref().map(|p| &p.content),
            Some(ContentState::Pending { attempts }) if *attempts < MAX_CONTENT_READ_ATTEMPTS
        )
    }

    /// Records the outcome of a successful read. `None` means the tag has
    /// no text to show; that still resolves the content.
    pub fn record_content(&mut self, text: Option<Vec<u8>>) -> Option<PresenceEvent> {
        let present = self.current.as_mut()?;
        present.snapshot.ndef_text = text;
        present.content = ContentState::Resolved;
        Some(PresenceEvent::ContentUpdated(present.snapshot.clone()))
    }

    /// Records a failed read. The tag stays present; once the retry budget
    /// is spent the content resolves as absent.
    pub fn record_read_failure(&mut self, retry: bool) -> Option<PresenceEvent> {
        let present = self.current.as_mut()?;
        let ContentState::Pending { attempts } = &mut present.content else {
            return None;
        };
        *attempts += 1;
        if retry && *attempts < MAX_CONTENT_READ_ATTEMPTS {
            return None;
        }
        self.record_content(None)
    }

    fn appear(&mut self, id: TagId) -> PresenceEvent {
        info!("Tag appeared: {}", id.display_hex());
        self.current = Some(Present {
            snapshot: TagSnapshot {
                id: id.clone(),
                ndef_text: None,
            },
            content: ContentState::Pending { attempts: 0 },
            misses: 0,
        });
        PresenceEvent::Appeared(id)
    }

    fn remove(&mut self) -> Option<PresenceEvent> {
        let present = self.current.take()?;
        info!("Tag removed: {}", present.snapshot.id.display_hex());
        Some(PresenceEvent::Removed(present.snapshot.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(n: u8) -> TagId {
        TagId::new(&[n, n, n, n], &[n; 9])
    }

    #[test]
    fn appears_once_and_stays_quiet() {
        let mut tracker = PresenceTracker::new();
        assert_eq!(tracker.observe(None), vec![]);
        assert_eq!(tracker.observe(Some(tag(1))), vec![PresenceEvent::Appeared(tag(1))]);
        assert_eq!(tracker.observe(Some(tag(1))), vec![]);
        assert_eq!(tracker.snapshot().unwrap().id, tag(1));
        assert_eq!(tracker.snapshot().unwrap().ndef_text, None);
    }

    #[test]
    fn single_miss_is_debounced() {
        let mut tracker = PresenceTracker::new();
        tracker.observe(Some(tag(1)));

        assert_eq!(tracker.observe(None), vec![]);
        assert!(tracker.snapshot().is_some());

        // detection resets the counter
        assert_eq!(tracker.observe(Some(tag(1))), vec![]);
        assert_eq!(tracker.observe(None), vec![]);
        assert!(tracker.snapshot().is_some());
    }

    #[test]
    fn two_consecutive_misses_remove() {
        let mut tracker = PresenceTracker::new();
        tracker.observe(Some(tag(1)));

        assert_eq!(tracker.observe(None), vec![]);
        assert_eq!(tracker.observe(None), vec![PresenceEvent::Removed(tag(1))]);
        assert!(tracker.snapshot().is_none());
        assert_eq!(tracker.observe(None), vec![]);
    }

    #[test]
    fn swap_is_remove_then_appear() {
        let mut tracker = PresenceTracker::new();
        tracker.observe(Some(tag(1)));
        tracker.record_content(Some(b"one".to_vec()));

        assert_eq!(
            tracker.observe(Some(tag(2))),
            vec![PresenceEvent::Removed(tag(1)), PresenceEvent::Appeared(tag(2))]
        );
        let snapshot = tracker.snapshot().unwrap();
        assert_eq!(snapshot.id, tag(2));
        assert_eq!(snapshot.ndef_text, None);
        assert!(tracker.needs_read());
    }

    #[test]
    fn content_resolves_once() {
        let mut tracker = PresenceTracker::new();
        tracker.observe(Some(tag(1)));
        assert!(tracker.needs_read());

        let event = tracker.record_content(Some(b"Hello".to_vec())).unwrap();
        assert_eq!(
            event,
            PresenceEvent::ContentUpdated(TagSnapshot {
                id: tag(1),
                ndef_text: Some(b"Hello".to_vec()),
            })
        );
        assert!(!tracker.needs_read());
        tracker.observe(Some(tag(1)));
        assert!(!tracker.needs_read());
    }

    #[test]
    fn failed_reads_keep_presence_and_retry() {
        let mut tracker = PresenceTracker::new();
        tracker.observe(Some(tag(1)));

        assert_eq!(tracker.record_read_failure(true), None);
        assert!(tracker.needs_read());
        assert_eq!(tracker.record_read_failure(true), None);
        assert!(tracker.needs_read());

        // budget spent: content resolves as absent, tag still present
        let event = tracker.record_read_failure(true).unwrap();
        assert!(matches!(event, PresenceEvent::ContentUpdated(ref s) if s.ndef_text.is_none()));
        assert!(!tracker.needs_read());
        assert_eq!(tracker.snapshot().unwrap().id, tag(1));
    }

    #[test]
    fn permanent_failure_resolves_immediately() {
        let mut tracker = PresenceTracker::new();
        tracker.observe(Some(tag(1)));
        assert!(tracker.record_read_failure(false).is_some());
        assert!(!tracker.needs_read());
    }

    #[test]
    fn nothing_to_record_without_a_tag() {
        let mut tracker = PresenceTracker::new();
        assert_eq!(tracker.record_content(Some(b"x".to_vec())), None);
        assert_eq!(tracker.record_read_failure(true), None);
        assert!(!tracker.needs_read());
    }
}
