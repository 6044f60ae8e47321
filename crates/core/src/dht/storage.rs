/// DHT storage for IntroSets
///
/// Sets are keyed by the publishing service's address and indexed by their
/// topic tag, if any.
use crate::service::{IntroSet, ServiceAddress, Tag};
use hiddenmesh_common::TimeMs;
use std::collections::{HashMap, HashSet};

/// IntroSet storage implementation
#[derive(Debug)]
pub struct IntroStorage {
    by_address: HashMap<ServiceAddress, IntroSet>,

    by_tag: HashMap<Tag, HashSet<ServiceAddress>>,

    /// Maximum number of sets to store
    max_sets: usize,
}

impl IntroStorage {
    pub fn new(max_sets: usize) -> Self {
        Self {
            by_address: HashMap::new(),
            by_tag: HashMap::new(),
            max_sets,
        }
    }

    /// Store a set, replacing any older one for the same address
    ///
    /// A set that expires no later than the one already stored is ignored.
    pub fn store(&mut self, address: ServiceAddress, set: IntroSet) -> Result<bool, StorageError> {
        if let Some(existing) = self.by_address.get(&address) {
            if existing.expires_at() >= set.expires_at() {
                return Ok(false);
            }
            let old_topic = existing.topic;
            self.unindex(&old_topic, &address);
        } else if self.by_address.len() >= self.max_sets {
            return Err(StorageError::StorageFull);
        }

        if !set.topic.is_zero() {
            self.by_tag.entry(set.topic).or_default().insert(address);
        }
        self.by_address.insert(address, set);
        Ok(true)
    }

    fn unindex(&mut self, topic: &Tag, address: &ServiceAddress) {
        if let Some(addresses) = self.by_tag.get_mut(topic) {
            addresses.remove(address);
            if addresses.is_empty() {
                self.by_tag.remove(topic);
            }
        }
    }

    /// Unexpired set published by `address`
    pub fn get_by_address(&self, address: &ServiceAddress, now: TimeMs) -> Option<IntroSet> {
        self.by_address
            .get(address)
            .filter(|set| !set.is_expired(now))
            .cloned()
    }

    /// Unexpired sets advertised under `tag`
    pub fn get_by_tag(&self, tag: &Tag, now: TimeMs) -> Vec<IntroSet> {
        self.by_tag
            .get(tag)
            .map(|addresses| {
                addresses
                    .iter()
                    .filter_map(|addr| self.get_by_address(addr, now))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove expired sets
    pub fn cleanup_expired(&mut self, now: TimeMs) -> usize {
        let expired: Vec<(ServiceAddress, Tag)> = self
            .by_address
            .iter()
            .filter(|(_, set)| set.is_expired(now))
            .map(|(addr, set)| (*addr, set.topic))
            .collect();

        for (address, topic) in &expired {
            self.by_address.remove(address);
            self.unindex(topic, address);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage is full")]
    StorageFull,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RouterId;
    use crate::service::Introduction;

    fn set(topic: &str, expires_at: TimeMs) -> IntroSet {
        IntroSet {
            intros: vec![Introduction {
                router: RouterId::from_bytes([1u8; 32]),
                expires_at,
                ..Default::default()
            }],
            topic: Tag::from_name(topic),
            ..Default::default()
        }
    }

    #[test]
    fn test_store_and_lookup() {
        let mut storage = IntroStorage::new(10);
        let addr = ServiceAddress([1u8; 32]);
        assert!(storage.store(addr, set("chat", 100)).unwrap());

        assert!(storage.get_by_address(&addr, 50).is_some());
        assert_eq!(storage.get_by_tag(&Tag::from_name("chat"), 50).len(), 1);

        // expired sets are never served
        assert!(storage.get_by_address(&addr, 100).is_none());
        assert!(storage.get_by_tag(&Tag::from_name("chat"), 100).is_empty());
    }

    #[test]
    fn test_newer_set_replaces_older() {
        let mut storage = IntroStorage::new(10);
        let addr = ServiceAddress([1u8; 32]);
        storage.store(addr, set("chat", 100)).unwrap();

        assert!(!storage.store(addr, set("other", 90)).unwrap());
        assert!(storage.store(addr, set("news", 200)).unwrap());

        assert!(storage.get_by_tag(&Tag::from_name("chat"), 0).is_empty());
        assert_eq!(storage.get_by_tag(&Tag::from_name("news"), 0).len(), 1);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_capacity() {
        let mut storage = IntroStorage::new(1);
        storage.store(ServiceAddress([1u8; 32]), set("", 100)).unwrap();
        assert!(matches!(
            storage.store(ServiceAddress([2u8; 32]), set("", 100)),
            Err(StorageError::StorageFull)
        ));
    }

    #[test]
    fn test_cleanup_expired() {
        let mut storage = IntroStorage::new(10);
        storage.store(ServiceAddress([1u8; 32]), set("chat", 100)).unwrap();
        storage.store(ServiceAddress([2u8; 32]), set("chat", 300)).unwrap();

        assert_eq!(storage.cleanup_expired(200), 1);
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get_by_tag(&Tag::from_name("chat"), 200).len(), 1);
    }
}
