use std::collections::HashMap;

/// Proof that a request was issued for a slot, and in which order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    slot: String,
    seq: u64,
}

impl RequestTicket {
    /// View slot the request was issued for.
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Sequence number within the slot.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Monotonic request numbering per view slot.
///
/// Only the response for the most recently issued ticket of a slot may be
/// committed. Cancelling a slot advances its number without issuing a ticket,
/// which invalidates whatever is still in flight.
///
/// The sequencer holds no lock of its own: keep it next to the state it
/// guards, so that checking a ticket and committing happen under one lock.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: HashMap<String, u64>,
}

impl RequestSequencer {
    /// Create a sequencer with no slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket for `slot`, superseding all earlier ones.
    pub fn issue(&mut self, slot: &str) -> RequestTicket {
        let seq = self.latest.entry(slot.to_string()).or_insert(0);
        *seq += 1;
        RequestTicket {
            slot: slot.to_string(),
            seq: *seq,
        }
    }

    /// Whether `ticket` is still the latest for its slot.
    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.latest.get(&ticket.slot).copied() == Some(ticket.seq)
    }

    /// Invalidate every outstanding ticket for `slot`.
    pub fn cancel(&mut self, slot: &str) {
        *self.latest.entry(slot.to_string()).or_insert(0) += 1;
    }

    /// Invalidate every outstanding ticket for every slot.
    pub fn cancel_all(&mut self) {
        for seq in self.latest.values_mut() {
            *seq += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_ticket_supersedes_older() {
        let mut seq = RequestSequencer::new();
        let a = seq.issue("search");
        let b = seq.issue("search");
        assert!(!seq.is_current(&a));
        assert!(seq.is_current(&b));
        assert!(b.seq() > a.seq());
    }

    #[test]
    fn test_slots_are_independent() {
        let mut seq = RequestSequencer::new();
        let search = seq.issue("search");
        let trace = seq.issue("trace");
        assert!(seq.is_current(&search));
        assert!(seq.is_current(&trace));
        assert_eq!(trace.slot(), "trace");
    }

    #[test]
    fn test_cancel_invalidates_in_flight() {
        let mut seq = RequestSequencer::new();
        let a = seq.issue("trace");
        seq.cancel("trace");
        assert!(!seq.is_current(&a));

        let b = seq.issue("trace");
        assert!(seq.is_current(&b));

        let c = seq.issue("search");
        seq.cancel_all();
        assert!(!seq.is_current(&b));
        assert!(!seq.is_current(&c));
    }
}
