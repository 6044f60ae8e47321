/// Crypto facade
///
/// Every cryptographic primitive the node uses goes through the [`Crypto`]
/// trait so the backend can be swapped (or stubbed in tests). The default
/// backend is [`DalekCrypto`].

mod dalek;
mod types;

pub use dalek::DalekCrypto;
pub(crate) use types::fixed_bytes;
pub use types::{LongHash, PubKey, SecretKey, SharedSecret, ShortHash, Signature, TunnelNonce};

/// Pluggable cryptography backend
pub trait Crypto: Send + Sync {
    /// Generate an X25519 encryption keypair
    fn encryption_keygen(&self) -> SecretKey;

    /// Generate an Ed25519 signing keypair
    fn identity_keygen(&self) -> SecretKey;

    /// Client side of a nonce-bound key exchange with `their_pub`
    fn dh_client(
        &self,
        their_pub: &PubKey,
        our_secret: &SecretKey,
        nonce: &TunnelNonce,
    ) -> Option<SharedSecret>;

    /// Server side of a nonce-bound key exchange with `their_pub`
    fn dh_server(
        &self,
        their_pub: &PubKey,
        our_secret: &SecretKey,
        nonce: &TunnelNonce,
    ) -> Option<SharedSecret>;

    /// 64-byte hash
    fn hash(&self, data: &[u8]) -> LongHash;

    /// 32-byte hash
    fn shorthash(&self, data: &[u8]) -> ShortHash;

    /// 32-byte keyed hash
    fn hmac(&self, data: &[u8], secret: &SharedSecret) -> ShortHash;

    /// Detached signature over `data`
    fn sign(&self, secret: &SecretKey, data: &[u8]) -> Signature;

    /// Check a detached signature
    fn verify(&self, public: &PubKey, data: &[u8], signature: &Signature) -> bool;

    /// Add one onion layer (XChaCha20-Poly1305)
    fn seal(&self, key: &SharedSecret, nonce: &TunnelNonce, plaintext: &[u8]) -> Option<Vec<u8>>;

    /// Remove one onion layer
    fn open(&self, key: &SharedSecret, nonce: &TunnelNonce, ciphertext: &[u8]) -> Option<Vec<u8>>;

    /// Fill `buf` with random bytes
    fn randomize(&self, buf: &mut [u8]);

    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.randomize(&mut bytes);
        u64::from_le_bytes(bytes)
    }
}
