use super::{IntroSet, ServiceAddress, Tag};
use crate::bencode::{Encode, EncodeError};
use crate::dht::FindIntro;
use crate::path::{Path, PathId};
use crate::routing::RoutingMessage;
use hiddenmesh_common::{dht, TimeMs};
use std::collections::HashMap;
use tracing::{debug, error};

/// What a lookup is searching for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Address(ServiceAddress),
    Tag(Tag),
}

/// One in-flight client lookup
///
/// Lives in its holder's [`LookupTable`] under its txid until a reply, a
/// timeout sweep or a path teardown removes it. A lookup never cancels
/// itself.
#[derive(Debug, Clone)]
pub struct ServiceLookup {
    txid: u64,
    created: TimeMs,
    kind: LookupKind,
    path: Option<PathId>,
}

/// What a finished lookup hands back to its holder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub txid: u64,
    pub kind: LookupKind,
    /// Empty means "not found" (including timeouts)
    pub intro_sets: Vec<IntroSet>,
}

impl ServiceLookup {
    pub fn new(kind: LookupKind, txid: u64, now: TimeMs) -> Self {
        Self {
            txid,
            created: now,
            kind,
            path: None,
        }
    }

    pub fn txid(&self) -> u64 {
        self.txid
    }

    pub fn kind(&self) -> LookupKind {
        self.kind
    }

    pub fn created(&self) -> TimeMs {
        self.created
    }

    /// Path the request went out on, once sent
    pub fn path(&self) -> Option<PathId> {
        self.path
    }

    /// Routing message carrying the FindIntro for this lookup
    pub fn build_request(&self) -> RoutingMessage {
        let find = match self.kind {
            LookupKind::Address(address) => {
                FindIntro::by_address(address, self.txid, dht::DEFAULT_RECURSION)
            }
            LookupKind::Tag(tag) => FindIntro::by_tag(tag, self.txid, dht::DEFAULT_RECURSION),
        };
        RoutingMessage::dht(vec![find.into()], 0)
    }

    /// Build the request and hand it to `path` for onion transmission
    pub fn send_request_via_path(&mut self, path: &dyn Path) -> Result<(), LookupError> {
        let bytes = self.build_request().to_bytes()?;
        if !path.send(&bytes) {
            return Err(LookupError::SendFailed(path.id()));
        }
        self.path = Some(path.id());
        debug!("Lookup {} sent via path {}", self.txid, path.id());
        Ok(())
    }

    /// Pure function of the creation time; false while `now` is not past it
    pub fn is_timed_out(&self, now: TimeMs, timeout: u64) -> bool {
        if now <= self.created {
            return false;
        }
        now - self.created > timeout
    }

    /// Finish the lookup; consuming it means it can only fire once
    pub fn handle_response(self, intro_sets: Vec<IntroSet>) -> LookupResult {
        LookupResult {
            txid: self.txid,
            kind: self.kind,
            intro_sets,
        }
    }
}

/// Something that owns in-flight lookups
pub trait LookupHolder {
    /// Take ownership of a lookup under its txid
    fn put_lookup(&mut self, lookup: ServiceLookup) -> Result<(), LookupError>;
}

/// Lookups awaiting a reply, keyed by txid
#[derive(Debug, Default)]
pub struct LookupTable {
    lookups: HashMap<u64, ServiceLookup>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, txid: u64) -> bool {
        self.lookups.contains_key(&txid)
    }

    pub fn get(&self, txid: u64) -> Option<&ServiceLookup> {
        self.lookups.get(&txid)
    }

    /// Remove a lookup so its reply can be applied
    pub fn take(&mut self, txid: u64) -> Option<ServiceLookup> {
        self.lookups.remove(&txid)
    }

    /// Remove every timed-out lookup, answering each with an empty result
    pub fn sweep(&mut self, now: TimeMs, timeout: u64) -> Vec<LookupResult> {
        let expired: Vec<u64> = self
            .lookups
            .values()
            .filter(|l| l.is_timed_out(now, timeout))
            .map(|l| l.txid)
            .collect();

        expired
            .into_iter()
            .filter_map(|txid| self.lookups.remove(&txid))
            .map(|lookup| {
                debug!("Lookup {} timed out", lookup.txid);
                lookup.handle_response(Vec::new())
            })
            .collect()
    }

    /// Drop lookups sent over a path that no longer exists, without firing
    pub fn purge_path(&mut self, path: &PathId) -> usize {
        let before = self.lookups.len();
        self.lookups.retain(|_, l| l.path.as_ref() != Some(path));
        before - self.lookups.len()
    }

    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }
}

impl LookupHolder for LookupTable {
    fn put_lookup(&mut self, lookup: ServiceLookup) -> Result<(), LookupError> {
        if self.lookups.contains_key(&lookup.txid) {
            error!("Lookup txid collision: {}", lookup.txid);
            return Err(LookupError::TxidCollision(lookup.txid));
        }
        self.lookups.insert(lookup.txid, lookup);
        Ok(())
    }
}

/// Lookup errors
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Transaction id {0} is already in flight")]
    TxidCollision(u64),

    #[error("Path {0} refused the request")]
    SendFailed(PathId),

    #[error("No path available")]
    NoPath,

    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::Decode;
    use crate::dht::DhtMessage;
    use crate::identity::RouterId;
    use std::sync::Mutex;

    struct MockPath {
        id: PathId,
        accept: bool,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl MockPath {
        fn new(accept: bool) -> Self {
            Self {
                id: PathId([1u8; 16]),
                accept,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl Path for MockPath {
        fn id(&self) -> PathId {
            self.id
        }

        fn endpoint(&self) -> RouterId {
            RouterId::from_bytes([2u8; 32])
        }

        fn send(&self, routing_msg: &[u8]) -> bool {
            self.sent.lock().unwrap().push(routing_msg.to_vec());
            self.accept
        }

        fn recv(&self, _nonce: &crate::crypto::TunnelNonce, payload: &[u8]) -> Option<Vec<u8>> {
            Some(payload.to_vec())
        }

        fn expires_at(&self) -> TimeMs {
            1_000
        }
    }

    fn lookup(txid: u64, created: TimeMs) -> ServiceLookup {
        ServiceLookup::new(LookupKind::Address(ServiceAddress([3u8; 32])), txid, created)
    }

    #[test]
    fn test_timeout_boundaries() {
        let l = lookup(1, 1_000);
        assert!(!l.is_timed_out(1_000 + 4_999, 5_000));
        assert!(!l.is_timed_out(1_000 + 5_000, 5_000));
        assert!(l.is_timed_out(1_000 + 5_001, 5_000));
        // clock behind creation
        assert!(!l.is_timed_out(0, 5_000));
    }

    #[test]
    fn test_request_by_kind() {
        let tag_lookup = ServiceLookup::new(LookupKind::Tag(Tag::from_name("chat")), 9, 0);
        let RoutingMessage::Dht(carrier) = tag_lookup.build_request();
        match &carrier.messages[..] {
            [DhtMessage::FindIntro(find)] => {
                assert!(find.address.is_zero());
                assert_eq!(find.tag, Tag::from_name("chat"));
                assert_eq!(find.txid, 9);
                assert_eq!(find.recursion, dht::DEFAULT_RECURSION);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_send_via_path() {
        let path = MockPath::new(true);
        let mut l = lookup(5, 0);
        l.send_request_via_path(&path).unwrap();
        assert_eq!(l.path(), Some(path.id));

        let sent = path.sent.lock().unwrap();
        let decoded = <RoutingMessage as Decode>::from_bytes(&sent[0]).unwrap();
        assert_eq!(decoded, l.build_request());
    }

    #[test]
    fn test_send_refused() {
        let path = MockPath::new(false);
        let mut l = lookup(5, 0);
        assert!(matches!(
            l.send_request_via_path(&path),
            Err(LookupError::SendFailed(_))
        ));
        assert_eq!(l.path(), None);
    }

    #[test]
    fn test_table_rejects_collision() {
        let mut table = LookupTable::new();
        table.put_lookup(lookup(1, 0)).unwrap();
        assert!(matches!(
            table.put_lookup(lookup(1, 5)),
            Err(LookupError::TxidCollision(1))
        ));
        // the original is untouched
        assert_eq!(table.get(1).map(|l| l.created()), Some(0));
    }

    #[test]
    fn test_sweep_surfaces_empty_results() {
        let mut table = LookupTable::new();
        table.put_lookup(lookup(1, 0)).unwrap();
        table.put_lookup(lookup(2, 3_000)).unwrap();

        let results = table.sweep(5_001, 5_000);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].txid, 1);
        assert!(results[0].intro_sets.is_empty());
        assert!(!table.contains(1));

        // swept lookups cannot be answered again
        assert!(table.take(1).is_none());
        assert!(table.take(2).is_some());
    }

    #[test]
    fn test_purge_path_fires_nothing() {
        let path = MockPath::new(true);
        let mut table = LookupTable::new();
        let mut sent = lookup(1, 0);
        sent.send_request_via_path(&path).unwrap();
        table.put_lookup(sent).unwrap();
        table.put_lookup(lookup(2, 0)).unwrap();

        assert_eq!(table.purge_path(&path.id), 1);
        assert!(table.sweep(u64::MAX, 5_000).iter().all(|r| r.txid == 2));
    }
}
