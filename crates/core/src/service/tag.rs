use crate::crypto::{fixed_bytes, Crypto};
use crate::identity::RouterId;
use std::fmt;

fixed_bytes!(
    /// 16-byte topic a service may advertise under; all zeroes means "no topic"
    Tag,
    16
);

impl Tag {
    /// Build a tag from a human-readable name, truncated or zero-padded to 16 bytes
    pub fn from_name(name: &str) -> Self {
        let mut out = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(16);
        out[..len].copy_from_slice(&bytes[..len]);
        Self(out)
    }

    /// Key under which sets for this topic live in the DHT
    ///
    /// Hashing hides the topic from relays that only see the key.
    pub fn dht_key(&self, crypto: &dyn Crypto) -> RouterId {
        RouterId::from_bytes(crypto.shorthash(&self.0).0)
    }

    /// Printable name, trailing zero padding stripped
    pub fn name(&self) -> String {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:?})", self.name())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
