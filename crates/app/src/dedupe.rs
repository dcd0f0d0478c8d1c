//! Bounded, time-bucketed memory of recently raised alerts.
//!
//! Entries are grouped into buckets of `cooldown / BUCKETS` width. Whole
//! buckets expire once they fall out of the cooldown window, and the oldest
//! buckets are evicted early when the window holds more than `capacity`
//! keys. Forgetting early is safe: the persisted alert log remains the
//! long-term source of truth.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::TimeDelta;

use brewlink_domain::alert::AlertKind;
use brewlink_domain::id::DeviceId;
use brewlink_domain::time::{Timestamp, window_start};

const BUCKETS: u32 = 6;

/// Dedupe key of an alert.
pub type AlertKey = (DeviceId, AlertKind);

#[derive(Debug)]
struct Bucket {
    start: Timestamp,
    keys: Vec<AlertKey>,
}

/// In-memory cooldown window keyed by `(device, kind)`.
#[derive(Debug)]
pub struct DedupeWindow {
    cooldown: Duration,
    width: TimeDelta,
    capacity: usize,
    latest: HashMap<AlertKey, Timestamp>,
    buckets: VecDeque<Bucket>,
}

impl DedupeWindow {
    #[must_use]
    pub fn new(cooldown: Duration, capacity: usize) -> Self {
        let width = TimeDelta::from_std(cooldown / BUCKETS)
            .unwrap_or(TimeDelta::MAX)
            .max(TimeDelta::milliseconds(1));
        Self {
            cooldown,
            width,
            capacity: capacity.max(1),
            latest: HashMap::new(),
            buckets: VecDeque::new(),
        }
    }

    /// Number of keys currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Whether `key` was recorded within the cooldown window ending at `at`.
    #[must_use]
    pub fn contains(&self, key: &AlertKey, at: Timestamp) -> bool {
        let since = window_start(at, self.cooldown);
        self.latest.get(key).is_some_and(|seen| *seen > since)
    }

    /// Record `key` at `at` unless it is still inside the window.
    ///
    /// Returns `true` when the caller now holds the reservation and should
    /// go on to raise the alert.
    pub fn reserve(&mut self, key: AlertKey, at: Timestamp) -> bool {
        self.expire(at);
        if self.contains(&key, at) {
            return false;
        }
        self.latest.insert(key, at);
        self.push(key, at);
        self.enforce_capacity();
        true
    }

    /// Drop a reservation, e.g. after the alert could not be persisted.
    pub fn forget(&mut self, key: &AlertKey) {
        self.latest.remove(key);
    }

    fn push(&mut self, key: AlertKey, at: Timestamp) {
        match self.buckets.back_mut() {
            Some(bucket) if at < bucket.start + self.width && at >= bucket.start => {
                bucket.keys.push(key);
            }
            _ => self.buckets.push_back(Bucket {
                start: at,
                keys: vec![key],
            }),
        }
    }

    fn expire(&mut self, at: Timestamp) {
        let since = window_start(at, self.cooldown);
        while self
            .buckets
            .front()
            .is_some_and(|bucket| bucket.start + self.width <= since)
        {
            self.evict_front();
        }
    }

    fn enforce_capacity(&mut self) {
        while self.latest.len() > self.capacity && self.buckets.len() > 1 {
            self.evict_front();
        }
    }

    fn evict_front(&mut self) {
        let Some(bucket) = self.buckets.pop_front() else {
            return;
        };
        let end = bucket.start + self.width;
        for key in bucket.keys {
            // keys refreshed in a later bucket stay
            if self.latest.get(&key).is_some_and(|seen| *seen < end) {
                self.latest.remove(&key);
            }
        }
    }
}
