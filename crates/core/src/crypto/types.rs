use std::fmt;

/// Defines a fixed-size byte newtype that bencodes as a byte string
macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn zero() -> Self {
                Self([0u8; $len])
            }

            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn set_zero(&mut self) {
                self.0 = [0u8; $len];
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl $crate::bencode::Encode for $name {
            fn encode(
                &self,
                w: &mut $crate::bencode::Writer,
            ) -> Result<(), $crate::bencode::EncodeError> {
                w.write_bytes(&self.0)
            }
        }

        impl $crate::bencode::Decode for $name {
            fn decode(
                r: &mut $crate::bencode::Reader<'_>,
            ) -> Result<Self, $crate::bencode::DecodeError> {
                r.read_fixed::<$len>().map(Self)
            }
        }
    };
}

pub(crate) use fixed_bytes;

fixed_bytes!(
    /// 32-byte public key (Ed25519 for signing, X25519 for encryption)
    PubKey,
    32
);

fixed_bytes!(
    /// 64-byte secret key laid out as `secret || public`
    SecretKey,
    64
);

fixed_bytes!(
    /// Detached Ed25519 signature
    Signature,
    64
);

fixed_bytes!(SharedSecret, 32);

fixed_bytes!(
    /// Per-message nonce carried with relayed frames
    TunnelNonce,
    32
);

fixed_bytes!(ShortHash, 32);

fixed_bytes!(LongHash, 64);

impl SecretKey {
    /// The 32-byte secret half
    pub fn secret(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0[..32]);
        out
    }

    /// The public half stored after the secret
    pub fn to_public(&self) -> PubKey {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0[32..]);
        PubKey(out)
    }

    pub fn from_parts(secret: [u8; 32], public: [u8; 32]) -> Self {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&secret);
        out[32..].copy_from_slice(&public);
        Self(out)
    }
}

impl TunnelNonce {
    /// First 24 bytes, the XChaCha20 nonce length
    pub fn xnonce(&self) -> [u8; 24] {
        let mut out = [0u8; 24];
        out.copy_from_slice(&self.0[..24]);
        out
    }
}

impl std::ops::BitXor for TunnelNonce {
    type Output = TunnelNonce;

    fn bitxor(self, rhs: TunnelNonce) -> TunnelNonce {
        let mut out = self.0;
        for (a, b) in out.iter_mut().zip(rhs.0.iter()) {
            *a ^= b;
        }
        TunnelNonce(out)
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("public_key", &self.to_public())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret(<redacted>)")
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for TunnelNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TunnelNonce({}...)", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for ShortHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortHash({})", hex::encode(self.0))
    }
}

impl fmt::Debug for LongHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LongHash({}...)", hex::encode(&self.0[..16]))
    }
}
