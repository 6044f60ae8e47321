/// Router context
///
/// The one handle every component is given instead of process-wide state.
/// Everything here runs on the logic thread; blocking work goes to the
/// worker queue and comes back through [`Logic`].
use crate::bencode::{Decode, Encode};
use crate::crypto::{Crypto, TunnelNonce};
use crate::dht::{DhtContext, DhtMessage, DhtOutbound, Requester};
use crate::identity::{RouterId, RouterIdentity};
use crate::link::{
    DhtImmediate, InboundMessageParser, LinkHandler, LinkIntro, LinkMessage, LinkSession,
    RelayFrame,
};
use crate::logic::{Clock, Logic, LogicHandle};
use crate::path::{PathId, TransitHop};
use crate::routing::RoutingMessage;
use crate::service::{self, verify_reply, LookupResult, VerifiedReply};
use crate::thread_pool::WorkQueue;
use hiddenmesh_common::protocol::{MAX_LINK_MSG_SIZE, MAX_OUTBOUND_QUEUE};
use hiddenmesh_common::TimeMs;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Router {
    identity: RouterIdentity,
    crypto: Arc<dyn Crypto>,
    clock: Arc<dyn Clock>,
    dht: DhtContext,
    sessions: HashMap<RouterId, Arc<dyn LinkSession>>,
    /// Encoded frames waiting for a session to the peer
    outbound: HashMap<RouterId, VecDeque<Vec<u8>>>,
    transit: HashMap<PathId, TransitHop>,
    services: service::Context,
    logic: Logic<Router>,
    work: Arc<dyn WorkQueue>,
    finished_lookups: Vec<LookupResult>,
}

impl Router {
    pub fn new(
        identity: RouterIdentity,
        crypto: Arc<dyn Crypto>,
        clock: Arc<dyn Clock>,
        work: Arc<dyn WorkQueue>,
        lookup_timeout: u64,
    ) -> Self {
        let dht = DhtContext::new(identity.router_id(), crypto.clone());
        let services = service::Context::new(crypto.clone(), lookup_timeout);
        info!("Router {} ready", identity.router_id());
        Self {
            identity,
            crypto,
            clock,
            dht,
            sessions: HashMap::new(),
            outbound: HashMap::new(),
            transit: HashMap::new(),
            services,
            logic: Logic::new(),
            work,
            finished_lookups: Vec::new(),
        }
    }

    pub fn router_id(&self) -> RouterId {
        self.identity.router_id()
    }

    pub fn now(&self) -> TimeMs {
        self.clock.now_ms()
    }

    pub fn crypto(&self) -> &Arc<dyn Crypto> {
        &self.crypto
    }

    pub fn dht(&self) -> &DhtContext {
        &self.dht
    }

    pub fn services(&self) -> &service::Context {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut service::Context {
        &mut self.services
    }

    pub fn logic_handle(&self) -> LogicHandle<Router> {
        self.logic.handle()
    }

    /// Run `job` on the logic thread once `delay_ms` has passed
    pub fn call_later(&mut self, delay_ms: u64, job: impl FnOnce(&mut Router) + Send + 'static) -> u64 {
        let now = self.now();
        self.logic.call_later(now, delay_ms, job)
    }

    pub fn has_session(&self, peer: &RouterId) -> bool {
        self.sessions.contains_key(peer)
    }

    pub fn outbound_len(&self, peer: &RouterId) -> usize {
        self.outbound.get(peer).map_or(0, |q| q.len())
    }

    pub fn transit_hop(&self, path: &PathId) -> Option<&TransitHop> {
        self.transit.get(path)
    }

    /// Lookups finished since the last call
    pub fn take_finished_lookups(&mut self) -> Vec<LookupResult> {
        std::mem::take(&mut self.finished_lookups)
    }

    // ---- sessions and outbound queues ----

    /// Register a verified session, introduce ourselves and flush its queue
    pub fn session_established(&mut self, session: Arc<dyn LinkSession>) -> bool {
        let Some(peer) = session.remote_router() else {
            warn!("Refusing session without a verified router id");
            return false;
        };
        if peer == self.router_id() {
            warn!("Refusing session to ourselves");
            return false;
        }

        let now = self.now();
        self.sessions.insert(peer, session);
        self.dht.add_peer(peer, now);

        let mut nonce = TunnelNonce::zero();
        self.crypto.randomize(&mut nonce.0);
        let intro = LinkMessage::Intro(LinkIntro::new(self.router_id(), nonce));
        self.send_to_or_queue(&peer, &intro);

        let flushed = self.flush_outbound_for(&peer);
        info!("Session established with {} ({} queued frames sent)", peer, flushed);
        true
    }

    /// Tear down everything keyed by `peer`
    ///
    /// Queued frames, transit hops through the peer, relayed DHT transactions
    /// and the node-table entry all go; nothing fires for them afterwards.
    pub fn session_closed(&mut self, peer: &RouterId) {
        self.sessions.remove(peer);
        let discarded = self.discard_outbound_for(peer);

        let hops: Vec<PathId> = self
            .transit
            .values()
            .filter(|hop| hop.involves(peer))
            .map(|hop| hop.path_id)
            .collect();
        for path in &hops {
            self.remove_transit_hop(path);
        }

        self.dht.remove_peer(peer);
        info!(
            "Session with {} closed ({} frames discarded, {} transit hops dropped)",
            peer,
            discarded,
            hops.len()
        );
    }

    /// Send now if we have a session, otherwise queue for when we get one
    pub fn send_to_or_queue(&mut self, peer: &RouterId, msg: &LinkMessage) -> bool {
        let frame = match msg.to_bytes_bounded(MAX_LINK_MSG_SIZE) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Cannot encode link message for {}: {}", peer, e);
                return false;
            }
        };

        if let Some(session) = self.sessions.get(peer) {
            return session.send(&frame);
        }

        let queue = self.outbound.entry(*peer).or_default();
        if queue.len() >= MAX_OUTBOUND_QUEUE {
            warn!("Outbound queue for {} is full, dropping frame", peer);
            return false;
        }
        queue.push_back(frame);
        debug!("Queued frame for {} ({} waiting)", peer, queue.len());
        true
    }

    /// Send every queued frame for `peer` over its session
    pub fn flush_outbound_for(&mut self, peer: &RouterId) -> usize {
        let Some(session) = self.sessions.get(peer) else {
            return 0;
        };
        let Some(queue) = self.outbound.remove(peer) else {
            return 0;
        };
        let mut sent = 0;
        for frame in queue {
            if session.send(&frame) {
                sent += 1;
            } else {
                debug!("Session to {} refused a queued frame", peer);
            }
        }
        sent
    }

    /// Drop every queued frame for `peer`
    pub fn discard_outbound_for(&mut self, peer: &RouterId) -> usize {
        self.outbound.remove(peer).map_or(0, |q| q.len())
    }

    // ---- inbound ----

    /// Parse and dispatch one frame received on `session`
    pub fn handle_recv_link_message(&mut self, session: &dyn LinkSession, buf: &[u8]) -> bool {
        InboundMessageParser::new().process_from(session, buf, self)
    }

    fn dispatch_dht(&mut self, outbound: Vec<DhtOutbound>) {
        for out in outbound {
            match out.to {
                Requester::Peer(peer) => {
                    let msg = LinkMessage::DhtImmediate(DhtImmediate::new(vec![out.message]));
                    self.send_to_or_queue(&peer, &msg);
                }
                Requester::Path(path) => {
                    self.send_down_path(&path, out.message);
                }
            }
        }
    }

    // ---- transit hops ----

    pub fn add_transit_hop(&mut self, hop: TransitHop) -> bool {
        if self.transit.contains_key(&hop.path_id) {
            warn!("Transit hop {} already exists", hop.path_id);
            return false;
        }
        debug!("Added transit hop {}", hop.path_id);
        self.transit.insert(hop.path_id, hop);
        true
    }

    /// Drop a transit hop and any DHT requests that came in over it
    pub fn remove_transit_hop(&mut self, path: &PathId) -> bool {
        let removed = self.transit.remove(path).is_some();
        if removed {
            self.dht.purge_path(path);
        }
        removed
    }

    /// Reply to a client whose path terminates here
    fn send_down_path(&mut self, path: &PathId, msg: DhtMessage) -> bool {
        let Some(hop) = self.transit.get(path) else {
            debug!("No transit hop {} for DHT reply", path);
            return false;
        };
        if hop.upstream != self.router_id() {
            debug!("Transit hop {} does not terminate here", path);
            return false;
        }

        let routing = match RoutingMessage::dht(vec![msg], 0).to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot encode routing message for {}: {}", path, e);
                return false;
            }
        };
        let mut nonce = TunnelNonce::zero();
        self.crypto.randomize(&mut nonce.0);
        let Some(sealed) = self.crypto.seal(&hop.key, &nonce, &routing) else {
            warn!("Cannot seal reply on path {}", path);
            return false;
        };

        let downstream = hop.downstream;
        let frame = RelayFrame::new(*path, sealed, nonce ^ hop.nonce_xor);
        self.send_to_or_queue(&downstream, &LinkMessage::RelayDownstream(frame))
    }

    fn handle_relay_upstream(&mut self, from: RouterId, frame: RelayFrame) -> bool {
        let now = self.now();
        let Some(hop) = self.transit.get(&frame.path_id).cloned() else {
            debug!("Upstream frame for unknown path {}", frame.path_id);
            return false;
        };
        if hop.downstream != from || hop.is_expired(now) {
            debug!("Upstream frame on {} from unexpected {}", frame.path_id, from);
            return false;
        }
        let Some(inner) = self.crypto.open(&hop.key, &frame.nonce, &frame.payload) else {
            debug!("Cannot peel layer on path {}", frame.path_id);
            return false;
        };

        if hop.upstream != self.router_id() {
            let next = RelayFrame::new(hop.path_id, inner, frame.nonce ^ hop.nonce_xor);
            return self.send_to_or_queue(&hop.upstream, &LinkMessage::RelayUpstream(next));
        }

        // terminal hop
        let RoutingMessage::Dht(carrier) = match RoutingMessage::from_bytes(&inner) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Bad routing message on path {}: {}", hop.path_id, e);
                return false;
            }
        };
        for msg in carrier.messages {
            let out = self
                .dht
                .handle_message(msg, Requester::Path(hop.path_id), now);
            self.dispatch_dht(out);
        }
        true
    }

    fn handle_relay_downstream(&mut self, from: RouterId, frame: RelayFrame) -> bool {
        if let Some(hop) = self.transit.get(&frame.path_id).cloned() {
            if hop.upstream != from {
                debug!("Downstream frame on {} from unexpected {}", frame.path_id, from);
                return false;
            }
            let Some(sealed) = self.crypto.seal(&hop.key, &frame.nonce, &frame.payload) else {
                return false;
            };
            let next = RelayFrame::new(hop.path_id, sealed, frame.nonce ^ hop.nonce_xor);
            return self.send_to_or_queue(&hop.downstream, &LinkMessage::RelayDownstream(next));
        }
        self.handle_path_payload(frame)
    }

    /// A downstream frame on one of our own paths
    fn handle_path_payload(&mut self, frame: RelayFrame) -> bool {
        let path = frame.path_id;
        let Some(endpoint) = self.services.endpoint_for_path(&path) else {
            debug!("Downstream frame for unknown path {}", path);
            return false;
        };
        let Some(inner) = endpoint
            .path(&path)
            .and_then(|p| p.recv(&frame.nonce, &frame.payload))
        else {
            debug!("Cannot unwrap payload on our path {}", path);
            return false;
        };
        let RoutingMessage::Dht(carrier) = match RoutingMessage::from_bytes(&inner) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Bad routing message on our path {}: {}", path, e);
                return false;
            }
        };

        for msg in carrier.messages {
            match msg {
                DhtMessage::GotIntro(reply) => self.verify_on_pool(path, reply),
                other => debug!(
                    "Ignoring DHT {:?} on our path {}",
                    String::from_utf8_lossy(other.kind()),
                    path
                ),
            }
        }
        true
    }

    /// Check signatures off the logic thread, then apply the result on it
    fn verify_on_pool(&self, path: PathId, reply: crate::dht::GotIntro) {
        let crypto = self.crypto.clone();
        let logic = self.logic.handle();
        self.work.queue_job(Box::new(move || {
            let verified = verify_reply(crypto.as_ref(), reply);
            logic.call(move |router: &mut Router| router.apply_verified_reply(path, verified));
        }));
    }

    fn apply_verified_reply(&mut self, path: PathId, reply: VerifiedReply) {
        let now = self.now();
        if let Some(result) = self.services.handle_got_intro(&path, reply, now) {
            info!(
                "Lookup {} finished with {} IntroSets",
                result.txid,
                result.intro_sets.len()
            );
            self.finished_lookups.push(result);
        }
    }

    // ---- periodic work ----

    /// Run due timers and marshalled jobs, then periodic maintenance
    pub fn tick(&mut self) {
        let now = self.now();
        for job in self.logic.take_ready(now) {
            job(self);
        }

        let dht_tick = self.dht.tick(now);
        if dht_tick.expired_sets > 0 {
            debug!("Evicted {} expired IntroSets", dht_tick.expired_sets);
        }
        self.dispatch_dht(dht_tick.outbound);

        let expired: Vec<PathId> = self
            .transit
            .values()
            .filter(|hop| hop.is_expired(now))
            .map(|hop| hop.path_id)
            .collect();
        for path in &expired {
            self.remove_transit_hop(path);
        }

        for (name, result) in self.services.tick(now) {
            debug!("Lookup {} for {} timed out", result.txid, name);
            self.finished_lookups.push(result);
        }
    }
}

impl LinkHandler for Router {
    fn handle_link_message(&mut self, from: RouterId, msg: LinkMessage) -> bool {
        match msg {
            LinkMessage::Intro(intro) => {
                if intro.router != from {
                    warn!("LinkIntro claims {} on session verified as {}", intro.router, from);
                    return false;
                }
                let now = self.now();
                self.dht.add_peer(from, now);
                true
            }
            LinkMessage::DhtImmediate(immediate) => {
                let now = self.now();
                for mut msg in immediate.messages {
                    // requests in a peer's DHT frame are already inside the DHT
                    if let DhtMessage::FindIntro(find) = &mut msg {
                        find.relayed = true;
                    }
                    let out = self.dht.handle_message(msg, Requester::Peer(from), now);
                    self.dispatch_dht(out);
                }
                true
            }
            LinkMessage::RelayUpstream(frame) => self.handle_relay_upstream(from, frame),
            LinkMessage::RelayDownstream(frame) => self.handle_relay_downstream(from, frame),
            LinkMessage::Discard(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{DalekCrypto, SharedSecret};
    use crate::dht::{FindIntro, GotIntro};
    use crate::link::Discard;
    use crate::logic::ManualClock;
    use crate::path::mock::MockPath;
    use crate::service::{
        IntroSet, Introduction, ServiceAddress, ServiceIdentity, ServiceSection,
    };
    use crate::thread_pool::SyncPool;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct MockSession {
        remote: RouterId,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl MockSession {
        fn new(seed: u8) -> Arc<Self> {
            Arc::new(Self {
                remote: RouterId::from_bytes([seed; 32]),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn frames(&self) -> Vec<LinkMessage> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|f| InboundMessageParser::decode_frame(f).unwrap())
                .collect()
        }
    }

    impl LinkSession for MockSession {
        fn remote_router(&self) -> Option<RouterId> {
            Some(self.remote)
        }

        fn send(&self, frame: &[u8]) -> bool {
            self.sent.lock().unwrap().push(frame.to_vec());
            true
        }
    }

    struct Harness {
        router: Router,
        pool: Arc<SyncPool>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let crypto: Arc<dyn Crypto> = Arc::new(DalekCrypto::new());
        let pool = Arc::new(SyncPool::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let router = Router::new(
            RouterIdentity::generate(crypto.as_ref()),
            crypto,
            clock.clone(),
            pool.clone(),
            5_000,
        );
        Harness { router, pool, clock }
    }

    fn hop(path: u8, downstream: RouterId, upstream: RouterId) -> TransitHop {
        TransitHop {
            path_id: PathId([path; 16]),
            upstream,
            downstream,
            key: SharedSecret([9u8; 32]),
            nonce_xor: TunnelNonce([0x11u8; 32]),
            expires_at: u64::MAX,
        }
    }

    #[test]
    fn test_queue_until_session() {
        let mut h = harness();
        let session = MockSession::new(1);
        let peer = session.remote;

        assert!(h.router.send_to_or_queue(&peer, &LinkMessage::Discard(Discard::new(2))));
        assert_eq!(h.router.outbound_len(&peer), 1);

        assert!(h.router.session_established(session.clone()));
        assert_eq!(h.router.outbound_len(&peer), 0);
        let frames = session.frames();
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], LinkMessage::Intro(i) if i.router == h.router.router_id()));
        assert!(matches!(frames[1], LinkMessage::Discard(_)));
        assert!(h.router.dht().nodes().contains(&peer));
    }

    #[test]
    fn test_outbound_queue_is_bounded() {
        let mut h = harness();
        let peer = RouterId::from_bytes([2u8; 32]);
        let msg = LinkMessage::Discard(Discard::new(0));
        for _ in 0..MAX_OUTBOUND_QUEUE {
            assert!(h.router.send_to_or_queue(&peer, &msg));
        }
        assert!(!h.router.send_to_or_queue(&peer, &msg));
        assert_eq!(h.router.outbound_len(&peer), MAX_OUTBOUND_QUEUE);
        assert_eq!(h.router.discard_outbound_for(&peer), MAX_OUTBOUND_QUEUE);
    }

    #[test]
    fn test_session_closed_purges_peer_state() {
        let mut h = harness();
        let session = MockSession::new(3);
        let peer = session.remote;
        h.router.session_established(session);
        h.router
            .add_transit_hop(hop(1, peer, RouterId::from_bytes([4u8; 32])));

        h.router.session_closed(&peer);
        assert!(!h.router.has_session(&peer));
        assert!(h.router.transit_hop(&PathId([1u8; 16])).is_none());
        assert!(!h.router.dht().nodes().contains(&peer));

        // frames for a closed peer queue again instead of vanishing
        h.router
            .send_to_or_queue(&peer, &LinkMessage::Discard(Discard::new(0)));
        assert_eq!(h.router.outbound_len(&peer), 1);
    }

    #[test]
    fn test_link_intro_must_match_session() {
        let mut h = harness();
        let session = MockSession::new(5);
        let liar = RouterId::from_bytes([6u8; 32]);
        let frame = LinkMessage::Intro(LinkIntro::new(liar, TunnelNonce::zero()))
            .to_bytes()
            .unwrap();

        assert!(!h.router.handle_recv_link_message(session.as_ref(), &frame));
        assert!(!h.router.dht().nodes().contains(&liar));

        let honest = LinkMessage::Intro(LinkIntro::new(session.remote, TunnelNonce::zero()))
            .to_bytes()
            .unwrap();
        assert!(h.router.handle_recv_link_message(session.as_ref(), &honest));
        assert!(h.router.dht().nodes().contains(&session.remote));
    }

    #[test]
    fn test_find_intro_from_peer_without_closer_nodes() {
        let mut h = harness();
        let session = MockSession::new(7);
        h.router.session_established(session.clone());

        let find = FindIntro::by_address(ServiceAddress([1u8; 32]), 42, 3);
        let frame = LinkMessage::DhtImmediate(DhtImmediate::new(vec![find.into()]))
            .to_bytes()
            .unwrap();
        assert!(h.router.handle_recv_link_message(session.as_ref(), &frame));

        let frames = session.frames();
        let LinkMessage::DhtImmediate(reply) = frames.last().unwrap() else {
            panic!("expected a DHT reply");
        };
        assert_eq!(reply.messages, vec![DhtMessage::GotIntro(GotIntro::empty(42))]);
    }

    #[test]
    fn test_peer_find_intro_only_moves_closer() {
        let mut h = harness();
        let requester = MockSession::new(1);
        let other = MockSession::new(2);
        h.router.session_established(requester.clone());
        h.router.session_established(other.clone());

        // we sit on the target, so every peer is farther away than us
        let target = ServiceAddress(*h.router.router_id().as_bytes());
        let find = FindIntro::by_address(target, 42, 3);
        let frame = LinkMessage::DhtImmediate(DhtImmediate::new(vec![find.into()]))
            .to_bytes()
            .unwrap();
        assert!(h.router.handle_recv_link_message(requester.as_ref(), &frame));

        let LinkMessage::DhtImmediate(reply) = requester.frames().pop().unwrap() else {
            panic!("expected a DHT reply");
        };
        assert_eq!(reply.messages, vec![DhtMessage::GotIntro(GotIntro::empty(42))]);

        // only the LinkIntro went to the farther peer
        let frames = other.frames();
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], LinkMessage::Intro(_)));
        assert!(h.router.dht().transactions().is_empty());
    }

    #[test]
    fn test_transit_hop_forwards_upstream() {
        let mut h = harness();
        let down = MockSession::new(10);
        let up = MockSession::new(11);
        h.router.session_established(down.clone());
        h.router.session_established(up.clone());
        let hop = hop(2, down.remote, up.remote);
        h.router.add_transit_hop(hop.clone());

        let crypto = DalekCrypto::new();
        let nonce = TunnelNonce([5u8; 32]);
        let sealed = crypto.seal(&hop.key, &nonce, b"inner layers").unwrap();
        let frame = LinkMessage::RelayUpstream(RelayFrame::new(hop.path_id, sealed, nonce))
            .to_bytes()
            .unwrap();
        assert!(h.router.handle_recv_link_message(down.as_ref(), &frame));

        let LinkMessage::RelayUpstream(out) = up.frames().pop().unwrap() else {
            panic!("expected upstream relay");
        };
        assert_eq!(out.payload, b"inner layers");
        assert_eq!(out.nonce, nonce ^ hop.nonce_xor);

        // the wrong neighbour cannot inject into the path
        let replay = LinkMessage::RelayUpstream(RelayFrame::new(hop.path_id, vec![0u8; 32], nonce))
            .to_bytes()
            .unwrap();
        assert!(!h.router.handle_recv_link_message(up.as_ref(), &replay));
    }

    #[test]
    fn test_terminal_hop_answers_over_path() {
        let mut h = harness();
        let down = MockSession::new(12);
        h.router.session_established(down.clone());
        let hop = hop(3, down.remote, h.router.router_id());
        h.router.add_transit_hop(hop.clone());

        let crypto = DalekCrypto::new();
        let mut find = FindIntro::by_address(ServiceAddress([2u8; 32]), 5, 3);
        find.iterative = true;
        let request = RoutingMessage::dht(vec![find.into()], 0).to_bytes().unwrap();
        let nonce = TunnelNonce([6u8; 32]);
        let sealed = crypto.seal(&hop.key, &nonce, &request).unwrap();
        let frame = LinkMessage::RelayUpstream(RelayFrame::new(hop.path_id, sealed, nonce))
            .to_bytes()
            .unwrap();
        assert!(h.router.handle_recv_link_message(down.as_ref(), &frame));

        let LinkMessage::RelayDownstream(reply) = down.frames().pop().unwrap() else {
            panic!("expected downstream relay");
        };
        let inner = crypto
            .open(&hop.key, &(reply.nonce ^ hop.nonce_xor), &reply.payload)
            .unwrap();
        let RoutingMessage::Dht(carrier) = RoutingMessage::from_bytes(&inner).unwrap();
        let DhtMessage::GotIntro(got) = &carrier.messages[0] else {
            panic!("expected GotIntro");
        };
        assert_eq!(got.txid, 5);
        assert!(got.intro_sets.is_empty());
        assert_eq!(got.closer, vec![down.remote]);
    }

    #[test]
    fn test_reply_on_own_path_is_verified_on_pool() {
        let mut h = harness();
        h.router
            .services_mut()
            .add_endpoint(&ServiceSection {
                name: "client".to_string(),
                options: BTreeMap::new(),
            })
            .unwrap();
        let (path, _) = MockPath::new(20, u64::MAX);
        let path_id = path.id;
        let ep = h.router.services_mut().endpoint_mut("client").unwrap();
        ep.add_path(Box::new(path));

        // a remote service's signed set
        let crypto = DalekCrypto::new();
        let remote = ServiceIdentity::generate(&crypto).unwrap();
        let mut set = IntroSet {
            intros: vec![Introduction {
                router: RouterId::from_bytes([1u8; 32]),
                path_id: PathId([2u8; 16]),
                expires_at: u64::MAX - 1,
                ..Default::default()
            }],
            ..Default::default()
        };
        remote.sign_intro_set(&mut set, &crypto).unwrap();

        let txid = ep.lookup_address(remote.address(), 1_000).unwrap();
        let payload = RoutingMessage::dht(vec![GotIntro::new(vec![set], txid).into()], 0)
            .to_bytes()
            .unwrap();

        let upstream = MockSession::new(21);
        let frame = LinkMessage::RelayDownstream(RelayFrame::new(path_id, payload, TunnelNonce::zero()))
            .to_bytes()
            .unwrap();
        assert!(h.router.handle_recv_link_message(upstream.as_ref(), &frame));

        // nothing applied until the worker and then the logic thread run
        assert_eq!(h.pool.pending(), 1);
        h.router.tick();
        assert!(h.router.take_finished_lookups().is_empty());

        assert_eq!(h.pool.tick(), 1);
        h.router.tick();
        let finished = h.router.take_finished_lookups();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].txid, txid);
        assert_eq!(finished[0].intro_sets.len(), 1);
    }

    #[test]
    fn test_timers_run_on_tick() {
        let mut h = harness();
        h.router.call_later(500, |router| {
            router.add_transit_hop(hop(9, RouterId::from_bytes([1u8; 32]), RouterId::from_bytes([2u8; 32])));
        });

        h.router.tick();
        assert!(h.router.transit_hop(&PathId([9u8; 16])).is_none());

        h.clock.advance(500);
        h.router.tick();
        assert!(h.router.transit_hop(&PathId([9u8; 16])).is_some());
    }

    #[test]
    fn test_expired_transit_hops_are_dropped() {
        let mut h = harness();
        let mut short = hop(4, RouterId::from_bytes([1u8; 32]), RouterId::from_bytes([2u8; 32]));
        short.expires_at = 2_000;
        h.router.add_transit_hop(short);
        assert!(!h.router.add_transit_hop(hop(4, RouterId::default(), RouterId::default())));

        h.clock.set(2_000);
        h.router.tick();
        assert!(h.router.transit_hop(&PathId([4u8; 16])).is_none());
    }
}
