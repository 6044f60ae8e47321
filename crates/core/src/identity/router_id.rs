use crate::bencode::{Decode, DecodeError, Encode, EncodeError, Reader, Writer};
use crate::crypto::PubKey;
use std::fmt;

/// A router's long-term public signing key, also its DHT coordinate
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouterId([u8; 32]);

impl RouterId {
    /// Create a RouterId from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the RouterId
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn to_pubkey(&self) -> PubKey {
        PubKey(self.0)
    }

    /// Convert to a hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from a hexadecimal string
    pub fn from_hex(s: &str) -> Result<Self, RouterIdError> {
        let bytes = hex::decode(s).map_err(|_| RouterIdError::InvalidHex)?;
        if bytes.len() != 32 {
            return Err(RouterIdError::InvalidLength);
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }

    /// Calculate XOR distance to another key
    pub fn distance(&self, other: &RouterId) -> Distance {
        let mut result = [0u8; 32];
        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Distance(result)
    }

    /// Get a shortened display version (first 8 bytes as hex)
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl From<PubKey> for RouterId {
    fn from(key: PubKey) -> Self {
        Self(key.0)
    }
}

impl From<[u8; 32]> for RouterId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Encode for RouterId {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_bytes(&self.0)
    }
}

impl Decode for RouterId {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.read_fixed::<32>().map(Self)
    }
}

impl fmt::Debug for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouterId({}...)", &self.short_hex())
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_hex())
    }
}

/// Distance between two keys in the DHT keyspace
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance([u8; 32]);

impl Distance {
    /// Get the raw bytes of the distance
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Calculate the number of leading zero bits
    pub fn leading_zeros(&self) -> u32 {
        let mut count = 0;
        for byte in self.0.iter() {
            let zeros = byte.leading_zeros();
            count += zeros;
            if zeros < 8 {
                break;
            }
        }
        count
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({}...)", hex::encode(&self.0[..4]))
    }
}

/// Errors related to RouterId parsing
#[derive(Debug, thiserror::Error)]
pub enum RouterIdError {
    #[error("Invalid hexadecimal string")]
    InvalidHex,

    #[error("Invalid length (expected 32 bytes)")]
    InvalidLength,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_id_hex() {
        let id = RouterId::from_bytes([0xab; 32]);
        let restored = RouterId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, restored);
        assert!(matches!(
            RouterId::from_hex("abcd"),
            Err(RouterIdError::InvalidLength)
        ));
        assert!(matches!(
            RouterId::from_hex("zz"),
            Err(RouterIdError::InvalidHex)
        ));
    }

    #[test]
    fn test_router_id_distance() {
        let id1 = RouterId::from_bytes([3u8; 32]);
        let id2 = RouterId::from_bytes([9u8; 32]);

        // XOR distance is symmetric
        assert_eq!(id1.distance(&id2), id2.distance(&id1));

        // Distance to self is zero
        assert_eq!(id1.distance(&id1).as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_distance_ordering() {
        let id1 = RouterId::from_bytes([0u8; 32]);
        let id2 = RouterId::from_bytes([1u8; 32]);
        let id3 = RouterId::from_bytes([255u8; 32]);

        assert!(id1.distance(&id2) < id1.distance(&id3));
        assert_eq!(id1.distance(&id2).leading_zeros(), 7);
    }

    #[test]
    fn test_wire_form() {
        let id = RouterId::from_bytes([7u8; 32]);
        let bytes = id.to_bytes().unwrap();
        assert_eq!(&bytes[..3], b"32:");
        assert_eq!(<RouterId as Decode>::from_bytes(&bytes).unwrap(), id);
    }
}
