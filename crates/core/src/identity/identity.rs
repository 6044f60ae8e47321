use super::{load_or_create, IdentityError, RouterId};
use crate::bencode::DecodeError;
use crate::crypto::{Crypto, PubKey, SecretKey, Signature};
use hiddenmesh_common::protocol::MAX_KEYFILE_SIZE;
use std::fmt;
use std::path::Path;

/// Long-term identity of this router
///
/// Holds the Ed25519 signing key and the RouterId derived from its public half.
#[derive(Clone)]
pub struct RouterIdentity {
    secret: SecretKey,
    router_id: RouterId,
}

impl RouterIdentity {
    /// Generate a new random identity
    pub fn generate(crypto: &dyn Crypto) -> Self {
        Self::from_secret(crypto.identity_keygen())
    }

    /// Create an identity from an existing secret key
    pub fn from_secret(secret: SecretKey) -> Self {
        let router_id = RouterId::from(secret.to_public());
        Self { secret, router_id }
    }

    /// Load the identity key at `path`, generating it if the file is absent
    ///
    /// The file holds the raw 64-byte secret key.
    pub fn ensure(path: &Path, crypto: &dyn Crypto) -> Result<Self, IdentityError> {
        let blob = load_or_create(path, MAX_KEYFILE_SIZE, || {
            Ok(crypto.identity_keygen().as_bytes().to_vec())
        })?;

        let bytes: [u8; 64] = blob.as_slice().try_into().map_err(|_| {
            IdentityError::Corrupt(DecodeError::InvalidFieldSize {
                expected: SecretKey::LEN,
                actual: blob.len(),
            })
        })?;
        let secret = SecretKey::from_bytes(bytes);
        if secret.to_public().is_zero() {
            return Err(IdentityError::Corrupt(DecodeError::Invalid(
                "identity key has an empty public half".to_string(),
            )));
        }
        Ok(Self::from_secret(secret))
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> PubKey {
        self.secret.to_public()
    }

    pub fn router_id(&self) -> RouterId {
        self.router_id
    }

    /// Sign a message
    pub fn sign(&self, crypto: &dyn Crypto, message: &[u8]) -> Signature {
        crypto.sign(&self.secret, message)
    }
}

impl fmt::Debug for RouterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterIdentity")
            .field("router_id", &self.router_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DalekCrypto;

    #[test]
    fn test_identity_sign_verify() {
        let crypto = DalekCrypto::new();
        let identity = RouterIdentity::generate(&crypto);
        let message = b"hiddenmesh test message";

        let signature = identity.sign(&crypto, message);
        assert!(crypto.verify(&identity.public_key(), message, &signature));
        assert_eq!(identity.router_id().to_pubkey(), identity.public_key());
    }

    #[test]
    fn test_identity_persists() {
        let crypto = DalekCrypto::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");

        let first = RouterIdentity::ensure(&path, &crypto).unwrap();
        let second = RouterIdentity::ensure(&path, &crypto).unwrap();
        assert_eq!(first.router_id(), second.router_id());
    }

    #[test]
    fn test_truncated_key_is_fatal() {
        let crypto = DalekCrypto::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");
        std::fs::write(&path, [1u8; 10]).unwrap();

        assert!(matches!(
            RouterIdentity::ensure(&path, &crypto),
            Err(IdentityError::Corrupt(_))
        ));
    }
}
