//! Filter to callback registry shared by transport sessions

use super::MessageCallback;
use crate::protocol::{topic_matches_filter, QosLevel};
use std::sync::{PoisonError, RwLock};

struct Entry {
    filter: String,
    qos: QosLevel,
    callback: MessageCallback,
}

/// Registered subscriptions, at most one per filter
#[derive(Default)]
pub struct SubscriptionTable {
    entries: RwLock<Vec<Entry>>,
}

/// Previous registration returned by [`SubscriptionTable::insert`]
pub struct Replaced(Option<(QosLevel, MessageCallback)>);

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `filter`, replacing any earlier registration
    pub fn insert(&self, filter: &str, qos: QosLevel, callback: MessageCallback) -> Replaced {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.iter_mut().find(|entry| entry.filter == filter) {
            let old_qos = std::mem::replace(&mut entry.qos, qos);
            let old_callback = std::mem::replace(&mut entry.callback, callback);
            return Replaced(Some((old_qos, old_callback)));
        }
        entries.push(Entry {
            filter: filter.to_string(),
            qos,
            callback,
        });
        Replaced(None)
    }

    /// Undo an [`insert`](Self::insert) whose broker request failed
    pub fn restore(&self, filter: &str, replaced: Replaced) {
        match replaced.0 {
            Some((qos, callback)) => {
                self.insert(filter, qos, callback);
            }
            None => {
                self.remove(filter);
            }
        }
    }

    /// Remove the registration for `filter`, returning whether one existed
    pub fn remove(&self, filter: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|entry| entry.filter != filter);
        entries.len() != before
    }

    /// Callbacks whose filter matches `topic`, in registration order
    pub fn matching(&self, topic: &str) -> Vec<MessageCallback> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| topic_matches_filter(topic, &entry.filter))
            .map(|entry| entry.callback.clone())
            .collect()
    }

    /// Registered filters with their QoS
    pub fn filters(&self) -> Vec<(String, QosLevel)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| (entry.filter.clone(), entry.qos))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}
