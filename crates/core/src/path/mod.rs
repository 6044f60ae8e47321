/// Path abstraction
///
/// Paths are built by an external collaborator. The core only sees an opaque
/// onion channel it can push routing messages into, and transit hops that
/// the builder registers on the router when we relay someone else's path.
use crate::crypto::{fixed_bytes, SharedSecret, TunnelNonce};
use crate::identity::RouterId;
use crate::service::Introduction;
use hiddenmesh_common::TimeMs;
use std::fmt;

fixed_bytes!(
    /// Identifier of a path at one hop
    PathId,
    16
);

impl fmt::Debug for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathId({})", hex::encode(self.0))
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A built multi-hop path owned by this node
pub trait Path: Send {
    fn id(&self) -> PathId;

    /// The terminal hop, where our routing messages are handled
    fn endpoint(&self) -> RouterId;

    /// Onion-wrap an encoded routing message and hand it to the first hop
    fn send(&self, routing_msg: &[u8]) -> bool;

    /// Peel every hop layer from a downstream payload
    fn recv(&self, nonce: &TunnelNonce, payload: &[u8]) -> Option<Vec<u8>>;

    /// Estimated round-trip latency in milliseconds, 0 when unknown
    fn latency(&self) -> u64 {
        0
    }

    fn expires_at(&self) -> TimeMs;

    /// Introduction advertising this path as an entry point
    fn intro(&self) -> Introduction {
        Introduction {
            router: self.endpoint(),
            path_id: self.id(),
            latency: self.latency(),
            version: hiddenmesh_common::protocol::VERSION,
            expires_at: self.expires_at(),
        }
    }
}

/// Our role inside someone else's path
#[derive(Clone)]
pub struct TransitHop {
    pub path_id: PathId,
    /// Next hop towards the path's terminal; ourselves when we are the terminal
    pub upstream: RouterId,
    /// Previous hop towards the path owner
    pub downstream: RouterId,
    /// Layer key agreed with the path owner
    pub key: SharedSecret,
    /// Mixed into the nonce before forwarding
    pub nonce_xor: TunnelNonce,
    pub expires_at: TimeMs,
}

impl TransitHop {
    /// Whether `peer` is one of our neighbours on this path
    pub fn involves(&self, peer: &RouterId) -> bool {
        &self.upstream == peer || &self.downstream == peer
    }

    pub fn is_expired(&self, now: TimeMs) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for TransitHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitHop")
            .field("path_id", &self.path_id)
            .field("upstream", &self.upstream)
            .field("downstream", &self.downstream)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
