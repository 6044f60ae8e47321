use super::{
    IntroSet, LookupError, LookupHolder, LookupKind, LookupResult, LookupTable, ServiceAddress,
    ServiceIdentity, ServiceLookup, Tag,
};
use crate::bencode::{Encode, EncodeError};
use crate::crypto::Crypto;
use crate::dht::{GotIntro, PublishIntro};
use crate::identity::{IdentityError, RouterId};
use crate::path::{Path, PathId};
use crate::routing::RoutingMessage;
use hiddenmesh_common::protocol::VERSION;
use hiddenmesh_common::{service, TimeMs};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A GotIntro reply whose IntroSets have been signature checked
///
/// Built off the logic thread by [`verify_reply`]; only sets that verified
/// are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedReply {
    pub txid: u64,
    pub intro_sets: Vec<IntroSet>,
    /// Sets dropped for a bad signature or undecodable address
    pub rejected: usize,
}

/// Check every IntroSet in a reply, dropping the ones that fail
pub fn verify_reply(crypto: &dyn Crypto, reply: GotIntro) -> VerifiedReply {
    let total = reply.intro_sets.len();
    let intro_sets: Vec<IntroSet> = reply
        .intro_sets
        .into_iter()
        .filter(|set| set.verify_signature(crypto))
        .filter_map(|mut set| {
            // cache the address while we are off the logic thread
            set.info.update_addr(crypto).ok()?;
            Some(set)
        })
        .collect();
    VerifiedReply {
        txid: reply.txid,
        rejected: total - intro_sets.len(),
        intro_sets,
    }
}

/// A hidden service hosted on this router, and the holder of its lookups
pub struct Endpoint {
    name: String,
    crypto: Arc<dyn Crypto>,
    keyfile: Option<PathBuf>,
    tag: Tag,
    identity: ServiceIdentity,
    started: bool,

    /// Inbound paths we own, also used to send lookups
    paths: HashMap<PathId, Box<dyn Path>>,
    lookups: LookupTable,
    lookup_timeout: u64,

    /// Verified sets of other services by address
    resolved: HashMap<ServiceAddress, IntroSet>,
    /// Verified sets by topic
    tag_cache: HashMap<Tag, Vec<IntroSet>>,

    published: Option<IntroSet>,
    publish_txid: Option<u64>,
    publish_confirmed: bool,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, crypto: Arc<dyn Crypto>) -> Self {
        Self {
            name: name.into(),
            crypto,
            keyfile: None,
            tag: Tag::zero(),
            identity: ServiceIdentity::default(),
            started: false,
            paths: HashMap::new(),
            lookups: LookupTable::new(),
            lookup_timeout: service::LOOKUP_TIMEOUT_MS,
            resolved: HashMap::new(),
            tag_cache: HashMap::new(),
            published: None,
            publish_txid: None,
            publish_confirmed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> ServiceAddress {
        self.identity.address()
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn lookups(&self) -> &LookupTable {
        &self.lookups
    }

    pub fn published(&self) -> Option<&IntroSet> {
        self.published.as_ref()
    }

    /// Whether a DHT node acknowledged our latest IntroSet
    pub fn is_publish_confirmed(&self) -> bool {
        self.publish_confirmed
    }

    pub fn set_lookup_timeout(&mut self, timeout_ms: u64) {
        self.lookup_timeout = timeout_ms;
    }

    /// Apply one `key = value` option from the services file
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), EndpointError> {
        match key {
            "keyfile" => self.keyfile = Some(PathBuf::from(value)),
            "tag" => self.tag = Tag::from_name(value),
            _ => {
                return Err(EndpointError::UnknownOption {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Bring up the service identity
    ///
    /// With a keyfile the keys are loaded (or created if the file is absent);
    /// without one the service gets ephemeral keys.
    pub fn start(&mut self) -> Result<(), EndpointError> {
        match &self.keyfile {
            Some(path) => self.identity.ensure_keys(path, self.crypto.as_ref())?,
            None => self.identity.regenerate_keys(self.crypto.as_ref())?,
        }
        self.started = true;
        info!("Hidden service {} is {}", self.name, self.address());
        Ok(())
    }

    pub fn add_path(&mut self, path: Box<dyn Path>) {
        debug!("Endpoint {} gained path {}", self.name, path.id());
        self.paths.insert(path.id(), path);
    }

    /// Forget a path and every lookup that went out on it
    pub fn remove_path(&mut self, id: &PathId) -> bool {
        let removed = self.paths.remove(id).is_some();
        let purged = self.lookups.purge_path(id);
        if removed {
            debug!(
                "Endpoint {} lost path {} ({} lookups dropped)",
                self.name, id, purged
            );
        }
        removed
    }

    pub fn owns_path(&self, id: &PathId) -> bool {
        self.paths.contains_key(id)
    }

    pub fn path(&self, id: &PathId) -> Option<&dyn Path> {
        self.paths.get(id).map(|p| p.as_ref())
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Live path whose terminal router is closest to `key`
    fn select_path(&self, key: &RouterId, now: TimeMs) -> Option<&dyn Path> {
        self.paths
            .values()
            .filter(|p| now < p.expires_at())
            .min_by_key(|p| p.endpoint().distance(key))
            .map(|p| p.as_ref())
    }

    fn fresh_txid(&self) -> u64 {
        loop {
            let txid = self.crypto.random_u64();
            if !self.lookups.contains(txid) && self.publish_txid != Some(txid) {
                return txid;
            }
        }
    }

    /// Verified, unexpired set for `address` from an earlier lookup
    pub fn cached_intro_set(&self, address: &ServiceAddress, now: TimeMs) -> Option<&IntroSet> {
        self.resolved.get(address).filter(|set| !set.is_expired(now))
    }

    /// Verified, unexpired sets advertised under `tag`
    pub fn cached_tag(&self, tag: &Tag, now: TimeMs) -> Vec<&IntroSet> {
        self.tag_cache
            .get(tag)
            .map(|sets| sets.iter().filter(|s| !s.is_expired(now)).collect())
            .unwrap_or_default()
    }

    fn start_lookup(&mut self, kind: LookupKind, key: RouterId, now: TimeMs) -> Result<u64, LookupError> {
        let txid = self.fresh_txid();
        let mut lookup = ServiceLookup::new(kind, txid, now);
        let path = self.select_path(&key, now).ok_or(LookupError::NoPath)?;
        lookup.send_request_via_path(path)?;
        self.put_lookup(lookup)?;
        Ok(txid)
    }

    /// Look up a service by address, returning the lookup's txid
    pub fn lookup_address(&mut self, address: ServiceAddress, now: TimeMs) -> Result<u64, LookupError> {
        self.start_lookup(LookupKind::Address(address), address.dht_key(), now)
    }

    /// Look up the services advertising `tag`
    pub fn lookup_tag(&mut self, tag: Tag, now: TimeMs) -> Result<u64, LookupError> {
        let key = tag.dht_key(self.crypto.as_ref());
        self.start_lookup(LookupKind::Tag(tag), key, now)
    }

    /// Sign a fresh IntroSet from our live paths and push it into the DHT
    pub fn publish_intro_set(&mut self, now: TimeMs) -> Result<(), EndpointError> {
        let mut set = IntroSet {
            intros: self
                .paths
                .values()
                .filter(|p| now < p.expires_at())
                .map(|p| p.intro())
                .collect(),
            topic: self.tag,
            version: VERSION,
            ..Default::default()
        };
        self.identity.sign_intro_set(&mut set, self.crypto.as_ref())?;

        let txid = self.fresh_txid();
        let request = RoutingMessage::dht(vec![PublishIntro::new(set.clone(), txid).into()], 0);
        let bytes = request.to_bytes()?;

        let path = self
            .select_path(&self.address().dht_key(), now)
            .ok_or(EndpointError::Lookup(LookupError::NoPath))?;
        if !path.send(&bytes) {
            return Err(EndpointError::Lookup(LookupError::SendFailed(path.id())));
        }

        info!(
            "Published IntroSet for {} with {} introductions",
            self.name,
            set.intros.len()
        );
        self.published = Some(set);
        self.publish_txid = Some(txid);
        self.publish_confirmed = false;
        Ok(())
    }

    /// Apply a verified reply to the lookup it answers
    ///
    /// Replies to unknown or already finished transactions are dropped.
    pub fn handle_got_intro(&mut self, reply: VerifiedReply, now: TimeMs) -> Option<LookupResult> {
        if reply.rejected > 0 {
            warn!(
                "Endpoint {} rejected {} IntroSets with bad signatures",
                self.name, reply.rejected
            );
        }

        if self.publish_txid == Some(reply.txid) {
            self.publish_txid = None;
            self.publish_confirmed = self
                .published
                .as_ref()
                .is_some_and(|ours| reply.intro_sets.contains(ours));
            debug!(
                "Publish for {} acknowledged (stored: {})",
                self.name, self.publish_confirmed
            );
            return None;
        }

        let Some(lookup) = self.lookups.take(reply.txid) else {
            debug!("Endpoint {} dropping reply for unknown txid {}", self.name, reply.txid);
            return None;
        };

        let sets: Vec<IntroSet> = reply
            .intro_sets
            .into_iter()
            .filter(|set| !set.is_expired(now))
            .filter(|set| match lookup.kind() {
                LookupKind::Address(address) => set.info.addr() == address,
                LookupKind::Tag(tag) => set.topic == tag,
            })
            .collect();

        match lookup.kind() {
            LookupKind::Address(address) => {
                if let Some(set) = sets.first() {
                    self.resolved.insert(address, set.clone());
                }
            }
            LookupKind::Tag(tag) => {
                if !sets.is_empty() {
                    self.tag_cache.insert(tag, sets.clone());
                }
            }
        }

        debug!(
            "Lookup {} for {} finished with {} IntroSets",
            reply.txid,
            self.name,
            sets.len()
        );
        Some(lookup.handle_response(sets))
    }

    /// Periodic maintenance: timeouts, cache expiry, path expiry, republish
    pub fn tick(&mut self, now: TimeMs) -> Vec<LookupResult> {
        let results = self.lookups.sweep(now, self.lookup_timeout);

        self.resolved.retain(|_, set| !set.is_expired(now));
        self.tag_cache.retain(|_, sets| {
            sets.retain(|set| !set.is_expired(now));
            !sets.is_empty()
        });

        let expired: Vec<PathId> = self
            .paths
            .values()
            .filter(|p| now >= p.expires_at())
            .map(|p| p.id())
            .collect();
        for id in &expired {
            self.remove_path(id);
        }

        if self.started && self.should_publish(now) {
            if let Err(e) = self.publish_intro_set(now) {
                debug!("Endpoint {} cannot publish yet: {}", self.name, e);
            }
        }
        results
    }

    fn should_publish(&self, now: TimeMs) -> bool {
        if self.paths.is_empty() {
            return false;
        }
        match &self.published {
            None => true,
            Some(set) => set.has_expired_intros(now) || set.intros.len() < self.paths.len(),
        }
    }
}

impl LookupHolder for Endpoint {
    fn put_lookup(&mut self, lookup: ServiceLookup) -> Result<(), LookupError> {
        self.lookups.put_lookup(lookup)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("address", &self.address())
            .field("paths", &self.paths.len())
            .field("lookups", &self.lookups.len())
            .finish()
    }
}

/// Endpoint errors
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Unknown option {key}={value}")]
    UnknownOption { key: String, value: String },

    #[error("Duplicate hidden service name: {0}")]
    DuplicateName(String),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),
}
