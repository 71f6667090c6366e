//! Organization cache: process-lifetime sender → classification mapping.

use std::collections::{HashMap, VecDeque};

use crate::record::Classification;

/// Eviction policy for the organization cache.
///
/// The cache only ever saves work; losing an entry costs a redundant
/// decrypt and classifier call, never incorrect data. "Never evict" is the
/// explicit default rather than implicit unbounded growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Keep every entry for the life of the process.
    #[default]
    NeverEvict,
    /// Keep at most this many senders, evicting the oldest first.
    MaxEntries(usize),
}

/// In-memory cache of classification results keyed by exact sender string.
///
/// Populated on the first successful classification of a sender and
/// consulted before any decrypt or classifier call for later records from
/// the same sender. Process-local: restart loses it, by design.
#[derive(Debug, Default)]
pub struct OrgCache {
    policy: EvictionPolicy,
    entries: HashMap<String, Classification>,
    insertion_order: VecDeque<String>,
}

impl OrgCache {
    /// Create a cache with the given eviction policy.
    #[must_use]
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    /// Look up a sender.
    #[must_use]
    pub fn get(&self, sender: &str) -> Option<&Classification> {
        self.entries.get(sender)
    }

    /// Insert or update a sender's classification.
    pub fn insert(&mut self, sender: &str, classification: Classification) {
        if self
            .entries
            .insert(sender.to_string(), classification)
            .is_none()
        {
            self.insertion_order.push_back(sender.to_string());
        }

        if let EvictionPolicy::MaxEntries(max) = self.policy {
            while self.entries.len() > max {
                let Some(oldest) = self.insertion_order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
            }
        }
    }

    /// Number of cached senders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
