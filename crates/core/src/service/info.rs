use super::ServiceAddress;
use crate::bencode::{
    decode_dict, Decode, DecodeDict, DecodeError, Encode, EncodeError, Reader, Writer,
};
use crate::crypto::{fixed_bytes, Crypto, PubKey};
use std::fmt;

fixed_bytes!(
    /// Optional bytes a service may grind to get a vanity address
    VanityNonce,
    16
);

/// Public half of a hidden service identity
///
/// The service address is the short hash of this structure's encoding. It is
/// cached and must be refreshed with [`ServiceInfo::update_addr`] whenever a
/// key changes; the cache takes no part in equality or encoding.
#[derive(Clone, Default)]
pub struct ServiceInfo {
    pub enc_key: PubKey,
    pub sign_key: PubKey,
    pub version: u64,
    pub vanity: VanityNonce,
    cached_addr: ServiceAddress,
}

impl ServiceInfo {
    pub fn new(enc_key: PubKey, sign_key: PubKey, crypto: &dyn Crypto) -> Result<Self, EncodeError> {
        let mut info = Self {
            enc_key,
            sign_key,
            ..Default::default()
        };
        info.update_addr(crypto)?;
        Ok(info)
    }

    /// Hash the current encoding into a fresh address
    pub fn calculate_address(&self, crypto: &dyn Crypto) -> Result<ServiceAddress, EncodeError> {
        let bytes = self.to_bytes()?;
        Ok(ServiceAddress(crypto.shorthash(&bytes).0))
    }

    /// Recompute the cached address
    pub fn update_addr(&mut self, crypto: &dyn Crypto) -> Result<(), EncodeError> {
        self.cached_addr = self.calculate_address(crypto)?;
        Ok(())
    }

    /// The cached address; zero until [`ServiceInfo::update_addr`] has run
    pub fn addr(&self) -> ServiceAddress {
        self.cached_addr
    }

    /// The cached address, computed on the fly if the cache is empty
    pub fn address(&self, crypto: &dyn Crypto) -> Result<ServiceAddress, EncodeError> {
        if self.cached_addr.is_zero() {
            self.calculate_address(crypto)
        } else {
            Ok(self.cached_addr)
        }
    }
}

impl PartialEq for ServiceInfo {
    fn eq(&self, other: &Self) -> bool {
        self.enc_key == other.enc_key
            && self.sign_key == other.sign_key
            && self.version == other.version
            && self.vanity == other.vanity
    }
}

impl Eq for ServiceInfo {}

impl fmt::Debug for ServiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInfo")
            .field("enc_key", &self.enc_key)
            .field("sign_key", &self.sign_key)
            .field("version", &self.version)
            .field("addr", &self.cached_addr)
            .finish()
    }
}

impl Encode for ServiceInfo {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.start_dict()?;
        w.write_key("e", &self.enc_key)?;
        w.write_key("s", &self.sign_key)?;
        w.write_key_int("v", self.version)?;
        if !self.vanity.is_zero() {
            w.write_key("x", &self.vanity)?;
        }
        w.end()
    }
}

impl DecodeDict for ServiceInfo {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"e" => self.enc_key = PubKey::decode(r)?,
            b"s" => self.sign_key = PubKey::decode(r)?,
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

impl Decode for ServiceInfo {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        decode_dict(r)
    }
}
