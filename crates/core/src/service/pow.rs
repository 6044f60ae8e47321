/// Proof of work attached to an IntroSet
///
/// A publisher may grind a nonce so that the hash of the encoded proof has a
/// number of leading zero bits, buying an extended lifetime for its set.
use crate::bencode::{
    decode_dict, Decode, DecodeDict, DecodeError, Encode, EncodeError, Reader, Writer,
};
use crate::crypto::fixed_bytes;
use hiddenmesh_common::TimeMs;
use std::fmt;

fixed_bytes!(PowNonce, 32);

impl fmt::Debug for PowNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PowNonce({}...)", hex::encode(&self.0[..8]))
    }
}

/// Proof of Work evidence for an IntroSet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProofOfWork {
    /// Extra lifetime in milliseconds this proof claims
    pub extended_lifetime: u64,

    /// Nonce found during mining
    pub nonce: PowNonce,

    /// When the proof was computed (unix ms)
    pub timestamp: TimeMs,

    pub version: u64,
}

impl ProofOfWork {
    /// Mine a proof with `difficulty` leading zero bits
    ///
    /// Gives up after `max_attempts` nonces.
    pub fn mine(
        extended_lifetime: u64,
        difficulty: u32,
        now: TimeMs,
        max_attempts: u64,
    ) -> Option<Self> {
        let mut pow = Self {
            extended_lifetime,
            nonce: PowNonce::zero(),
            timestamp: now,
            version: hiddenmesh_common::protocol::VERSION,
        };

        for attempt in 0..max_attempts {
            pow.nonce.0[..8].copy_from_slice(&attempt.to_le_bytes());
            if pow.leading_zero_bits() >= difficulty {
                return Some(pow);
            }
        }
        None
    }

    /// Hash of the encoded proof
    fn work_hash(&self) -> Option<[u8; 32]> {
        let bytes = self.to_bytes().ok()?;
        Some(*blake3::hash(&bytes).as_bytes())
    }

    fn leading_zero_bits(&self) -> u32 {
        match self.work_hash() {
            Some(hash) => count_leading_zero_bits(&hash),
            None => 0,
        }
    }

    /// Check the work and that the claimed lifetime has not run out
    pub fn is_valid(&self, difficulty: u32, now: TimeMs) -> bool {
        if now < self.timestamp {
            return false;
        }
        if now >= self.timestamp.saturating_add(self.extended_lifetime) {
            return false;
        }
        self.leading_zero_bits() >= difficulty
    }
}

/// Count leading zero bits in a hash
fn count_leading_zero_bits(hash: &[u8; 32]) -> u32 {
    let mut count = 0;
    for &byte in hash {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

impl Encode for ProofOfWork {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.start_dict()?;
        w.write_key_int("e", self.extended_lifetime)?;
        w.write_key("n", &self.nonce)?;
        w.write_key_int("t", self.timestamp)?;
        w.write_key_int("v", self.version)?;
        w.end()
    }
}

impl DecodeDict for ProofOfWork {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"e" => self.extended_lifetime = r.read_int()?,
            b"n" => self.nonce = PowNonce::decode(r)?,
            b"t" => self.timestamp = r.read_int()?,
            b"v" => self.version = r.read_int()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl Decode for ProofOfWork {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        decode_dict(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow_mining_easy() {
        let pow = ProofOfWork::mine(60_000, 8, 1_000, 1 << 20).unwrap();
        assert!(pow.is_valid(8, 1_000));
        assert!(pow.is_valid(8, 60_999));
    }

    #[test]
    fn test_pow_lifetime() {
        let pow = ProofOfWork::mine(1_000, 4, 5_000, 1 << 16).unwrap();
        // before it was made
        assert!(!pow.is_valid(4, 4_999));
        // after the claimed lifetime
        assert!(!pow.is_valid(4, 6_000));
    }

    #[test]
    fn test_difficulty_is_checked() {
        let pow = ProofOfWork::mine(60_000, 4, 0, 1 << 16).unwrap();
        assert!(pow.is_valid(4, 10));
        assert!(!pow.is_valid(200, 10));
    }

    #[test]
    fn test_leading_zero_bits() {
        let mut hash = [0u8; 32];
        assert_eq!(count_leading_zero_bits(&hash), 256);
        hash[3] = 128;
        assert_eq!(count_leading_zero_bits(&hash), 24);
        hash[2] = 64;
        assert_eq!(count_leading_zero_bits(&hash), 17);
    }

    #[test]
    fn test_gives_up() {
        assert!(ProofOfWork::mine(1, 256, 0, 4).is_none());
    }
}
