use crate::identity::RouterId;

/// An established link to a neighbouring router
///
/// Sessions are created by the transport, which owns the handshake; the
/// core only reads the verified identity and pushes encoded frames.
pub trait LinkSession: Send + Sync {
    /// Router id proven by the transport handshake, `None` until verified
    fn remote_router(&self) -> Option<RouterId>;

    /// Queue one encoded link message on the wire
    fn send(&self, frame: &[u8]) -> bool;
}
