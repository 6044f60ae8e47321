use super::{Crypto, LongHash, PubKey, SecretKey, SharedSecret, ShortHash, Signature, TunnelNonce};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Default backend: Ed25519 signatures, X25519 key exchange, BLAKE3 hashing
/// and XChaCha20-Poly1305 layers
#[derive(Debug, Default, Clone, Copy)]
pub struct DalekCrypto;

impl DalekCrypto {
    pub fn new() -> Self {
        Self
    }

    /// Raw exchange hashed together with both public keys
    fn dh(
        client_pk: &PubKey,
        server_pk: &PubKey,
        their_pub: &PubKey,
        our_secret: &SecretKey,
    ) -> Option<[u8; 32]> {
        let secret = StaticSecret::from(our_secret.secret());
        let shared = secret.diffie_hellman(&X25519PublicKey::from(their_pub.0));
        if !shared.was_contributory() {
            return None;
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(client_pk.as_bytes());
        hasher.update(server_pk.as_bytes());
        hasher.update(shared.as_bytes());
        Some(*hasher.finalize().as_bytes())
    }
}

impl Crypto for DalekCrypto {
    fn encryption_keygen(&self) -> SecretKey {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        SecretKey::from_parts(secret.to_bytes(), public.to_bytes())
    }

    fn identity_keygen(&self) -> SecretKey {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);
        SecretKey::from_parts(seed, signing_key.verifying_key().to_bytes())
    }

    fn dh_client(
        &self,
        their_pub: &PubKey,
        our_secret: &SecretKey,
        nonce: &TunnelNonce,
    ) -> Option<SharedSecret> {
        let our_pub = our_secret.to_public();
        let result = Self::dh(&our_pub, their_pub, their_pub, our_secret)?;
        Some(SharedSecret(blake3::keyed_hash(&result, nonce.as_bytes()).into()))
    }

    fn dh_server(
        &self,
        their_pub: &PubKey,
        our_secret: &SecretKey,
        nonce: &TunnelNonce,
    ) -> Option<SharedSecret> {
        let our_pub = our_secret.to_public();
        let result = Self::dh(their_pub, &our_pub, their_pub, our_secret)?;
        Some(SharedSecret(blake3::keyed_hash(&result, nonce.as_bytes()).into()))
    }

    fn hash(&self, data: &[u8]) -> LongHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(data);
        let mut out = [0u8; 64];
        hasher.finalize_xof().fill(&mut out);
        LongHash(out)
    }

    fn shorthash(&self, data: &[u8]) -> ShortHash {
        ShortHash(*blake3::hash(data).as_bytes())
    }

    fn hmac(&self, data: &[u8], secret: &SharedSecret) -> ShortHash {
        ShortHash(*blake3::keyed_hash(secret.as_bytes(), data).as_bytes())
    }

    fn sign(&self, secret: &SecretKey, data: &[u8]) -> Signature {
        let signing_key = SigningKey::from_bytes(&secret.secret());
        Signature(signing_key.sign(data).to_bytes())
    }

    fn verify(&self, public: &PubKey, data: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(public.as_bytes()) else {
            return false;
        };
        key.verify(data, &ed25519_dalek::Signature::from_bytes(&signature.0))
            .is_ok()
    }

    fn seal(&self, key: &SharedSecret, nonce: &TunnelNonce, plaintext: &[u8]) -> Option<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        cipher
            .encrypt(XNonce::from_slice(&nonce.xnonce()), plaintext)
            .ok()
    }

    fn open(&self, key: &SharedSecret, nonce: &TunnelNonce, ciphertext: &[u8]) -> Option<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        cipher
            .decrypt(XNonce::from_slice(&nonce.xnonce()), ciphertext)
            .ok()
    }

    fn randomize(&self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}
