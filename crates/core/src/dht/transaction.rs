use crate::identity::RouterId;
use crate::path::PathId;
use hiddenmesh_common::TimeMs;
use std::collections::HashMap;
use std::fmt;

/// Where a DHT request came from, and so where its reply goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requester {
    /// A neighbouring router, over a link-layer DHT frame
    Peer(RouterId),
    /// A client whose path terminates at us
    Path(PathId),
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requester::Peer(id) => write!(f, "peer {}", id),
            Requester::Path(id) => write!(f, "path {}", id),
        }
    }
}

/// Identifies a request we relayed: the peer we sent it to and the txid we
/// gave it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxKey {
    pub peer: RouterId,
    pub txid: u64,
}

/// A request we forwarded on someone else's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedTx {
    pub requester: Requester,
    /// txid the requester used, restored on the reply
    pub requester_txid: u64,
    pub target: RouterId,
    pub created: TimeMs,
}

/// Observable outcome of a relayed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    Resolved { key: TxKey, tx: RelayedTx },
    TimedOut { key: TxKey, tx: RelayedTx },
}

/// Relayed transactions awaiting a reply
///
/// Each key maps to at most one live entry; an entry leaves the table
/// exactly once, on resolution, timeout or peer teardown.
#[derive(Debug)]
pub struct TransactionTable {
    pending: HashMap<TxKey, RelayedTx>,
    timeout_ms: u64,
}

impl TransactionTable {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            timeout_ms,
        }
    }

    pub fn contains(&self, key: &TxKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Register a new relayed request; returns false on a key collision
    pub fn insert(&mut self, key: TxKey, tx: RelayedTx) -> bool {
        if self.pending.contains_key(&key) {
            return false;
        }
        self.pending.insert(key, tx);
        true
    }

    /// Resolve a transaction, or `None` if unknown or already resolved
    pub fn resolve(&mut self, key: &TxKey) -> Option<TxEvent> {
        self.pending.remove(key).map(|tx| TxEvent::Resolved { key: *key, tx })
    }

    /// Evict everything older than the timeout
    pub fn expire(&mut self, now: TimeMs) -> Vec<TxEvent> {
        let timeout = self.timeout_ms;
        let expired: Vec<TxKey> = self
            .pending
            .iter()
            .filter(|(_, tx)| now > tx.created && now - tx.created > timeout)
            .map(|(key, _)| *key)
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                self.pending
                    .remove(&key)
                    .map(|tx| TxEvent::TimedOut { key, tx })
            })
            .collect()
    }

    /// Drop every transaction sent to or requested by `peer`
    pub fn purge_peer(&mut self, peer: &RouterId) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|key, tx| &key.peer != peer && tx.requester != Requester::Peer(*peer));
        before - self.pending.len()
    }

    /// Drop every transaction requested over `path`
    pub fn purge_path(&mut self, path: &PathId) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, tx| tx.requester != Requester::Path(*path));
        before - self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(peer: u8, txid: u64) -> TxKey {
        TxKey {
            peer: RouterId::from_bytes([peer; 32]),
            txid,
        }
    }

    fn tx(requester: Requester, created: TimeMs) -> RelayedTx {
        RelayedTx {
            requester,
            requester_txid: 1,
            target: RouterId::default(),
            created,
        }
    }

    #[test]
    fn test_resolve_once() {
        let mut table = TransactionTable::new(100);
        let requester = Requester::Path(PathId([1u8; 16]));
        assert!(table.insert(key(1, 5), tx(requester, 0)));
        assert!(!table.insert(key(1, 5), tx(requester, 0)));

        assert!(matches!(table.resolve(&key(1, 5)), Some(TxEvent::Resolved { .. })));
        assert!(table.resolve(&key(1, 5)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_expire() {
        let mut table = TransactionTable::new(100);
        let requester = Requester::Peer(RouterId::from_bytes([9u8; 32]));
        table.insert(key(1, 1), tx(requester, 0));
        table.insert(key(1, 2), tx(requester, 50));

        assert!(table.expire(100).is_empty());
        let events = table.expire(101);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TxEvent::TimedOut { key, .. } if key.txid == 1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_purge() {
        let mut table = TransactionTable::new(100);
        let dead = RouterId::from_bytes([9u8; 32]);
        let path = PathId([3u8; 16]);
        table.insert(key(9, 1), tx(Requester::Path(path), 0));
        table.insert(key(1, 2), tx(Requester::Peer(dead), 0));
        table.insert(key(1, 3), tx(Requester::Path(path), 0));
        table.insert(key(1, 4), tx(Requester::Path(PathId([4u8; 16])), 0));

        assert_eq!(table.purge_peer(&dead), 2);
        assert_eq!(table.purge_path(&path), 1);
        assert_eq!(table.len(), 1);
    }
}
