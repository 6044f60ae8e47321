use super::{IntroSet, ServiceAddress, ServiceInfo, VanityNonce};
use crate::bencode::{
    decode_dict, Decode, DecodeDict, DecodeError, Encode, EncodeError, Reader, Writer,
};
use crate::crypto::{Crypto, SecretKey};
use crate::identity::{load_or_create, IdentityError};
use hiddenmesh_common::protocol::{MAX_INTROSET_SIZE, MAX_KEYFILE_SIZE, VERSION};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Private keys of a hidden service plus the public half derived from them
///
/// Persisted as a bencoded dict: `e` encryption secret, `s` signing secret,
/// `v` version, `x` vanity.
#[derive(Clone, Default)]
pub struct ServiceIdentity {
    enc_key: SecretKey,
    sign_key: SecretKey,
    version: u64,
    vanity: VanityNonce,
    public: ServiceInfo,
}

impl ServiceIdentity {
    /// Fresh identity with newly generated keys
    pub fn generate(crypto: &dyn Crypto) -> Result<Self, EncodeError> {
        let mut identity = Self::default();
        identity.regenerate_keys(crypto)?;
        Ok(identity)
    }

    /// Replace both keypairs and clear the vanity
    pub fn regenerate_keys(&mut self, crypto: &dyn Crypto) -> Result<(), EncodeError> {
        self.enc_key = crypto.encryption_keygen();
        self.sign_key = crypto.identity_keygen();
        self.version = VERSION;
        self.vanity.set_zero();
        self.rebuild_public(crypto)
    }

    fn rebuild_public(&mut self, crypto: &dyn Crypto) -> Result<(), EncodeError> {
        self.public.enc_key = self.enc_key.to_public();
        self.public.sign_key = self.sign_key.to_public();
        self.public.version = self.version;
        self.public.vanity = self.vanity;
        self.public.update_addr(crypto)
    }

    /// Load keys from `path`, generating and persisting them if it is absent
    ///
    /// An oversize or undecodable file is an error; it is never regenerated.
    pub fn ensure_keys(&mut self, path: &Path, crypto: &dyn Crypto) -> Result<(), IdentityError> {
        let blob = load_or_create(path, MAX_KEYFILE_SIZE, || {
            let fresh = Self::generate(crypto)?;
            Ok(fresh.to_bytes_bounded(MAX_KEYFILE_SIZE)?)
        })?;

        let loaded = <Self as Decode>::from_bytes(&blob)?;
        self.enc_key = loaded.enc_key;
        self.sign_key = loaded.sign_key;
        self.version = loaded.version;
        self.vanity = loaded.vanity;
        self.rebuild_public(crypto)?;
        debug!("Loaded service keys for {}", self.public.addr());
        Ok(())
    }

    pub fn public(&self) -> &ServiceInfo {
        &self.public
    }

    pub fn address(&self) -> ServiceAddress {
        self.public.addr()
    }

    /// Stamp our public info on `set` and sign it
    pub fn sign_intro_set(&self, set: &mut IntroSet, crypto: &dyn Crypto) -> Result<(), IdentityError> {
        if set.intros.is_empty() {
            return Err(IdentityError::NoIntroductions);
        }
        set.info = self.public.clone();
        set.signature.set_zero();
        let bytes = set.to_bytes_bounded(MAX_INTROSET_SIZE)?;
        set.signature = crypto.sign(&self.sign_key, &bytes);
        Ok(())
    }
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("public", &self.public)
            .field("secret_keys", &"<redacted>")
            .finish()
    }
}

impl Encode for ServiceIdentity {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.start_dict()?;
        w.write_key("e", &self.enc_key)?;
        w.write_key("s", &self.sign_key)?;
        w.write_key_int("v", self.version)?;
        w.write_key("x", &self.vanity)?;
        w.end()
    }
}

impl DecodeDict for ServiceIdentity {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"e" => self.enc_key = SecretKey::decode(r)?,
            b"s" => self.sign_key = SecretKey::decode(r)?,
            b"v" => self.version = r.read_int()?,
            b"x" => self.vanity = VanityNonce::decode(r)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn finish_decode(&mut self) -> Result<(), DecodeError> {
        if self.enc_key.is_zero() {
            return Err(DecodeError::MissingField("e"));
        }
        if self.sign_key.is_zero() {
            return Err(DecodeError::MissingField("s"));
        }
        Ok(())
    }
}

impl Decode for ServiceIdentity {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        decode_dict(r)
    }
}
