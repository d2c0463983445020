//! Recently-applied event cache.
//!
//! A bounded FIFO set in front of the store's idempotency marker. A hit skips
//! the store round-trip; a miss says nothing, and the marker inside
//! `apply_event` stays the authority.

use std::collections::{HashSet, VecDeque};

use typhoon_types::EventKey;

pub struct RecentlyApplied {
    set: HashSet<EventKey>,
    order: VecDeque<EventKey>,
    capacity: usize,
}

impl RecentlyApplied {
    pub fn new(capacity: usize) -> Self {
        Self {
            set: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Remember `key`, evicting the oldest entry when full.
    pub fn insert(&mut self, key: EventKey) {
        if self.capacity == 0 || self.set.contains(&key) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        self.set.insert(key);
        self.order.push_back(key);
    }

    pub fn already_applied(&self, key: &EventKey) -> bool {
        self.set.contains(key)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
