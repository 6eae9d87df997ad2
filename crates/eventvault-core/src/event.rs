//! Events and event identifiers

use std::cmp::Ordering;
use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Maximum length of an event type in UTF-8 bytes
///
/// The data file stores every type in a buffer of exactly this width.
pub const MAX_EVENT_TYPE_LENGTH: usize = 64;

/// Unique, totally ordered identifier of an event within a stream
///
/// Ordered by `timestamp`, then `sequence`. `sequence` breaks ties between
/// events generated within the same clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId {
    /// Monotonic clock ticks
    pub timestamp: i64,
    /// Tie-break sequence within a tick
    pub sequence: u16,
}

impl EventId {
    /// Create a new event ID
    pub fn new(timestamp: i64, sequence: u16) -> Self {
        Self {
            timestamp,
            sequence,
        }
    }

    /// The first id of a stream generated at `now`
    pub fn first(now: i64) -> Self {
        Self::new(now, 0)
    }

    /// The id following `self` given the current clock reading
    ///
    /// Strictly greater than `self` even when the clock stalls or runs
    /// backwards; the sequence rolls into the next tick when exhausted.
    pub fn next_after(&self, now: i64) -> Self {
        if now > self.timestamp {
            return Self::new(now, 0);
        }
        match self.sequence.checked_add(1) {
            Some(sequence) => Self::new(self.timestamp, sequence),
            None => Self::new(self.timestamp + 1, 0),
        }
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.timestamp, self.sequence)
    }
}

/// An immutable event in a stream
///
/// Equality is by id.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Application-defined event type
    pub event_type: String,
    /// Opaque payload
    pub data: Bytes,
}

impl Event {
    /// Create a new event
    pub fn new(id: EventId, event_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            data: data.into(),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// A client-supplied event awaiting an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub event_type: String,
    pub data: Bytes,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }

    /// Attach an id, producing a stored event
    pub fn with_id(self, id: EventId) -> Event {
        Event {
            id,
            event_type: self.event_type,
            data: self.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_ordering() {
        assert!(EventId::new(1, 5) < EventId::new(2, 0));
        assert!(EventId::new(2, 0) < EventId::new(2, 1));
        assert_eq!(EventId::new(3, 3), EventId::new(3, 3));
    }

    #[test]
    fn test_next_after_advancing_clock() {
        let id = EventId::new(100, 7);
        assert_eq!(id.next_after(150), EventId::new(150, 0));
    }

    #[test]
    fn test_next_after_same_tick() {
        let id = EventId::new(100, 7);
        assert_eq!(id.next_after(100), EventId::new(100, 8));
    }

    #[test]
    fn test_next_after_clock_regression() {
        let id = EventId::new(100, 7);
        let next = id.next_after(42);
        assert_eq!(next, EventId::new(100, 8));
        assert!(next > id);
    }

    #[test]
    fn test_next_after_sequence_overflow() {
        let id = EventId::new(100, u16::MAX);
        let next = id.next_after(100);
        assert_eq!(next, EventId::new(101, 0));
        assert!(next > id);
    }

    #[test]
    fn test_event_equality_is_by_id() {
        let a = Event::new(EventId::new(1, 0), "created", Bytes::from_static(b"a"));
        let b = Event::new(EventId::new(1, 0), "renamed", Bytes::from_static(b"b"));
        let c = Event::new(EventId::new(1, 1), "created", Bytes::from_static(b"a"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
    }

    #[test]
    fn test_new_event_with_id() {
        let event = NewEvent::new("created", Bytes::from_static(b"payload")).with_id(EventId::new(9, 1));
        assert_eq!(event.id, EventId::new(9, 1));
        assert_eq!(event.event_type, "created");
        assert_eq!(&event.data[..], b"payload");
    }
}
