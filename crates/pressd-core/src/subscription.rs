// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subscription/event engine data model. Only the pull method ("ippget") is
// supported; push is rejected at the dispatch layer. Events are append-only
// with strictly monotonic, dense sequence numbers per subscription.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, PrinterId, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionOwner {
    System,
    Printer(PrinterId),
    Job(JobId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    JobCreated,
    JobStateChanged,
    JobCompleted,
    PrinterStateChanged,
    PrinterCreated,
    PrinterDeleted,
}

impl EventKind {
    pub fn keyword(self) -> &'static str {
        match self {
            EventKind::JobCreated => "job-created",
            EventKind::JobStateChanged => "job-state-changed",
            EventKind::JobCompleted => "job-completed",
            EventKind::PrinterStateChanged => "printer-state-changed",
            EventKind::PrinterCreated => "printer-created",
            EventKind::PrinterDeleted => "printer-deleted",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "job-created" => EventKind::JobCreated,
            "job-state-changed" => EventKind::JobStateChanged,
            "job-completed" => EventKind::JobCompleted,
            "printer-state-changed" => EventKind::PrinterStateChanged,
            "printer-created" => EventKind::PrinterCreated,
            "printer-deleted" => EventKind::PrinterDeleted,
            _ => return None,
        })
    }
}

/// A single published event, appended to every matching subscription's ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    pub kind: EventKind,
    pub owner: SubscriptionOwner,
    pub occurred_at: DateTime<Utc>,
    pub attributes: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub owner: SubscriptionOwner,
    pub events: BTreeSet<EventKind>,
    pub notify_user_data: Vec<u8>,
    pub lease_expiry: Option<DateTime<Utc>>,
    pub username: String,

    /// Sequence number of the oldest event still in `ring`.
    pub first_sequence: u64,
    /// Sequence number of the newest event in `ring`.
    pub last_sequence: u64,
    ring: VecDeque<Event>,
    capacity: usize,
}

const MAX_USER_DATA_BYTES: usize = 63;

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        owner: SubscriptionOwner,
        events: BTreeSet<EventKind>,
        notify_user_data: Vec<u8>,
        lease_expiry: Option<DateTime<Utc>>,
        username: impl Into<String>,
        capacity: usize,
    ) -> Self {
        Self {
            id,
            owner,
            events,
            notify_user_data,
            lease_expiry,
            username: username.into(),
            first_sequence: 1,
            last_sequence: 0,
            ring: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn validate_user_data(data: &[u8]) -> bool {
        data.len() <= MAX_USER_DATA_BYTES
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lease_expiry, Some(expiry) if now >= expiry)
    }

    /// Append an event to the ring, dropping the oldest if full. Sequence
    /// numbers are strictly monotonic and dense: `events[i].sequence ==
    /// first_sequence + i`.
    pub fn publish(&mut self, mut event: Event) {
        self.last_sequence += 1;
        event.sequence = self.last_sequence;
        self.ring.push_back(event);
        while self.ring.len() > self.capacity {
            self.ring.pop_front();
            self.first_sequence += 1;
        }
        if self.ring.is_empty() {
            self.first_sequence = self.last_sequence + 1;
        }
    }

    /// All events with `sequence >= since`.
    pub fn events_since(&self, since: u64) -> Vec<Event> {
        self.ring
            .iter()
            .filter(|e| e.sequence >= since)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(kind: EventKind) -> Event {
        Event {
            sequence: 0,
            kind,
            owner: SubscriptionOwner::System,
            occurred_at: Utc::now(),
            attributes: Default::default(),
        }
    }

    #[test]
    fn sequence_numbers_are_dense_and_monotonic() {
        let mut sub = Subscription::new(
            SubscriptionId(1),
            SubscriptionOwner::System,
            BTreeSet::from([EventKind::JobStateChanged]),
            vec![],
            None,
            "alice",
            100,
        );
        for _ in 0..5 {
            sub.publish(make_event(EventKind::JobStateChanged));
        }
        let events = sub.events_since(0);
        for (i, e) in events.iter().enumerate() {
            assert_eq!(e.sequence, sub.first_sequence + i as u64);
        }
        assert_eq!(sub.last_sequence, 5);
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let mut sub = Subscription::new(
            SubscriptionId(1),
            SubscriptionOwner::System,
            BTreeSet::from([EventKind::JobStateChanged]),
            vec![],
            None,
            "alice",
            3,
        );
        for _ in 0..10 {
            sub.publish(make_event(EventKind::JobStateChanged));
        }
        assert_eq!(sub.last_sequence - sub.first_sequence + 1, 3);
        assert_eq!(sub.len(), 3);
    }

    #[test]
    fn user_data_limit_enforced() {
        assert!(Subscription::validate_user_data(&[0u8; 63]));
        assert!(!Subscription::validate_user_data(&[0u8; 64]));
    }

    #[test]
    fn events_since_filters_correctly() {
        let mut sub = Subscription::new(
            SubscriptionId(1),
            SubscriptionOwner::System,
            BTreeSet::from([EventKind::JobStateChanged]),
            vec![],
            None,
            "alice",
            100,
        );
        for _ in 0..5 {
            sub.publish(make_event(EventKind::JobStateChanged));
        }
        assert_eq!(sub.events_since(4).len(), 2);
    }
}
