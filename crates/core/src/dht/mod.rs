/// DHT lookup engine
///
/// Routes find-intro requests through the router key space. A node answers
/// from local storage when it can; otherwise it either hands back closer
/// contacts (iterative) or forwards the request greedily to a closer peer
/// under a fresh transaction id (recursive) and relays the reply back.
mod messages;
mod node_table;
mod storage;
mod transaction;

pub use messages::{DhtMessage, FindIntro, GotIntro, PublishIntro};
pub use node_table::{NodeEntry, NodeTable};
pub use storage::{IntroStorage, StorageError};
pub use transaction::{RelayedTx, Requester, TransactionTable, TxEvent, TxKey};

use crate::crypto::Crypto;
use crate::identity::RouterId;
use crate::path::PathId;
use hiddenmesh_common::{dht, TimeMs};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A DHT message to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtOutbound {
    pub to: Requester,
    pub message: DhtMessage,
}

impl DhtOutbound {
    fn reply(to: Requester, reply: GotIntro) -> Self {
        Self {
            to,
            message: DhtMessage::GotIntro(reply),
        }
    }
}

/// Result of a periodic DHT tick
#[derive(Debug, Default)]
pub struct DhtTick {
    /// Relayed transactions evicted for timing out
    pub events: Vec<TxEvent>,
    /// Empty replies owed to the requesters of evicted transactions
    pub outbound: Vec<DhtOutbound>,
    /// Stored IntroSets dropped for expiry
    pub expired_sets: usize,
}

/// DHT state owned by the logic thread
pub struct DhtContext {
    crypto: Arc<dyn Crypto>,
    nodes: NodeTable,
    storage: IntroStorage,
    transactions: TransactionTable,
}

impl DhtContext {
    pub fn new(local_id: RouterId, crypto: Arc<dyn Crypto>) -> Self {
        Self {
            crypto,
            nodes: NodeTable::new(local_id),
            storage: IntroStorage::new(dht::MAX_STORED_INTROSETS),
            transactions: TransactionTable::new(dht::RELAYED_TX_TIMEOUT_MS),
        }
    }

    pub fn local_id(&self) -> RouterId {
        self.nodes.local_id()
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    pub fn storage(&self) -> &IntroStorage {
        &self.storage
    }

    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }

    /// Make a peer with a verified session available for routing
    pub fn add_peer(&mut self, peer: RouterId, now: TimeMs) {
        if self.nodes.insert(peer, now) {
            debug!("DHT peer added: {}", peer);
        }
    }

    /// Forget a peer and every transaction that involves it
    pub fn remove_peer(&mut self, peer: &RouterId) {
        self.nodes.remove(peer);
        let purged = self.transactions.purge_peer(peer);
        if purged > 0 {
            debug!("Purged {} DHT transactions for closed peer {}", purged, peer);
        }
    }

    /// Drop transactions requested over a path that was torn down
    pub fn purge_path(&mut self, path: &PathId) {
        let purged = self.transactions.purge_path(path);
        if purged > 0 {
            debug!("Purged {} DHT transactions for path {}", purged, path);
        }
    }

    /// Handle one inbound DHT message, returning the messages it produces
    pub fn handle_message(&mut self, msg: DhtMessage, from: Requester, now: TimeMs) -> Vec<DhtOutbound> {
        match msg {
            DhtMessage::FindIntro(m) => self.handle_find_intro(m, from, now),
            DhtMessage::GotIntro(m) => self.handle_got_intro(m, from),
            DhtMessage::PublishIntro(m) => self.handle_publish_intro(m, from, now),
        }
    }

    fn handle_find_intro(&mut self, msg: FindIntro, from: Requester, now: TimeMs) -> Vec<DhtOutbound> {
        let (target, found) = if msg.tag.is_zero() {
            let found = self
                .storage
                .get_by_address(&msg.address, now)
                .into_iter()
                .collect::<Vec<_>>();
            (msg.address.dht_key(), found)
        } else {
            (
                msg.tag.dht_key(self.crypto.as_ref()),
                self.storage.get_by_tag(&msg.tag, now),
            )
        };

        if !found.is_empty() {
            debug!("FindIntro {} from {} answered locally", msg.txid, from);
            return vec![DhtOutbound::reply(from, GotIntro::new(found, msg.txid))];
        }

        let mut exclude = vec![self.local_id()];
        if let Requester::Peer(peer) = from {
            exclude.push(peer);
        }

        if msg.iterative {
            let mut reply = GotIntro::empty(msg.txid);
            reply.closer = self
                .nodes
                .closest_nodes(&target, dht::ITERATIVE_CONTACTS, &exclude);
            return vec![DhtOutbound::reply(from, reply)];
        }

        let recursion = msg.recursion.min(dht::MAX_RECURSION);
        if recursion == 0 {
            debug!("FindIntro {} from {} out of recursion budget", msg.txid, from);
            return vec![DhtOutbound::reply(from, GotIntro::empty(msg.txid))];
        }

        // a relayed request only moves strictly closer to the target so it
        // cannot loop; a request entering the DHT from a path may go anywhere
        let next = if msg.relayed {
            self.nodes.closer_than_us(&target, &exclude)
        } else {
            self.nodes
                .closest_nodes(&target, 1, &exclude)
                .into_iter()
                .next()
        };
        let Some(next) = next else {
            debug!("FindIntro {} from {}: no closer peer", msg.txid, from);
            return vec![DhtOutbound::reply(from, GotIntro::empty(msg.txid))];
        };

        let key = TxKey {
            peer: next,
            txid: self.fresh_txid(&next),
        };
        self.transactions.insert(
            key,
            RelayedTx {
                requester: from,
                requester_txid: msg.txid,
                target,
                created: now,
            },
        );

        let forwarded = FindIntro {
            recursion: recursion - 1,
            txid: key.txid,
            iterative: false,
            relayed: true,
            ..msg
        };
        debug!(
            "Relaying FindIntro {} from {} to {} as {}",
            msg.txid, from, next, key.txid
        );
        vec![DhtOutbound {
            to: Requester::Peer(next),
            message: DhtMessage::FindIntro(forwarded),
        }]
    }

    fn fresh_txid(&self, peer: &RouterId) -> u64 {
        loop {
            let txid = self.crypto.random_u64();
            let key = TxKey { peer: *peer, txid };
            if !self.transactions.contains(&key) {
                return txid;
            }
        }
    }

    fn handle_got_intro(&mut self, msg: GotIntro, from: Requester) -> Vec<DhtOutbound> {
        let Requester::Peer(peer) = from else {
            debug!("Dropping GotIntro {} that arrived over a path", msg.txid);
            return Vec::new();
        };

        let key = TxKey { peer, txid: msg.txid };
        let Some(TxEvent::Resolved { tx, .. }) = self.transactions.resolve(&key) else {
            debug!("Dropping GotIntro for unknown transaction {} from {}", msg.txid, peer);
            return Vec::new();
        };

        let reply = GotIntro {
            txid: tx.requester_txid,
            ..msg
        };
        vec![DhtOutbound::reply(tx.requester, reply)]
    }

    fn handle_publish_intro(&mut self, msg: PublishIntro, from: Requester, now: TimeMs) -> Vec<DhtOutbound> {
        let set = msg.intro_set;
        if set.is_expired(now) {
            debug!("Rejecting expired IntroSet published by {}", from);
            return vec![DhtOutbound::reply(from, GotIntro::empty(msg.txid))];
        }
        if !set.verify_signature(self.crypto.as_ref()) {
            warn!("Rejecting IntroSet with bad signature published by {}", from);
            return vec![DhtOutbound::reply(from, GotIntro::empty(msg.txid))];
        }
        let address = match set.address(self.crypto.as_ref()) {
            Ok(address) => address,
            Err(e) => {
                warn!("Cannot derive address of published IntroSet: {}", e);
                return vec![DhtOutbound::reply(from, GotIntro::empty(msg.txid))];
            }
        };

        let stored = match self.storage.store(address, set.clone()) {
            Ok(true) => {
                info!("Stored IntroSet for {}", address);
                vec![set]
            }
            Ok(false) => {
                // the publisher learns what we hold instead of its own set
                debug!("Kept newer IntroSet for {}", address);
                self.storage
                    .get_by_address(&address, now)
                    .into_iter()
                    .collect()
            }
            Err(e) => {
                warn!("Cannot store IntroSet for {}: {}", address, e);
                Vec::new()
            }
        };
        vec![DhtOutbound::reply(from, GotIntro::new(stored, msg.txid))]
    }

    /// Evict timed-out relayed transactions and expired IntroSets
    pub fn tick(&mut self, now: TimeMs) -> DhtTick {
        let events = self.transactions.expire(now);
        let outbound = events
            .iter()
            .filter_map(|event| match event {
                TxEvent::TimedOut { key, tx } => {
                    debug!("Relayed lookup {} to {} timed out", key.txid, key.peer);
                    Some(DhtOutbound::reply(
                        tx.requester,
                        GotIntro::empty(tx.requester_txid),
                    ))
                }
                TxEvent::Resolved { .. } => None,
            })
            .collect();

        DhtTick {
            events,
            outbound,
            expired_sets: self.storage.cleanup_expired(now),
        }
    }
}
