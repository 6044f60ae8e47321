use super::{Introduction, ProofOfWork, ServiceAddress, ServiceInfo, Tag};
use crate::bencode::{
    decode_dict, decode_list, Decode, DecodeDict, DecodeError, Encode, EncodeError, Reader,
    Writer,
};
use crate::crypto::{Crypto, Signature};
use hiddenmesh_common::protocol::MAX_INTROSET_SIZE;
use hiddenmesh_common::TimeMs;
use tracing::debug;

/// Signed bundle of a service's introductions plus its public identity
///
/// The signature covers the canonical encoding of the set with `signature`
/// zeroed. Any signed structure follows the same zero, encode, verify
/// sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntroSet {
    pub info: ServiceInfo,
    pub intros: Vec<Introduction>,
    pub topic: Tag,
    pub version: u64,
    pub pow: Option<ProofOfWork>,
    pub signature: Signature,
}

impl IntroSet {
    /// True once every introduction has expired
    pub fn is_expired(&self, now: TimeMs) -> bool {
        self.intros.iter().all(|intro| intro.is_expired(now))
    }

    /// True if at least one introduction has expired
    pub fn has_expired_intros(&self, now: TimeMs) -> bool {
        self.intros.iter().any(|intro| intro.is_expired(now))
    }

    /// Drop expired introductions, returning how many were removed
    ///
    /// The signature no longer matches afterwards; re-sign before publishing.
    pub fn prune_expired(&mut self, now: TimeMs) -> usize {
        let before = self.intros.len();
        self.intros.retain(|intro| !intro.is_expired(now));
        before - self.intros.len()
    }

    /// Latest expiry across all introductions
    pub fn expires_at(&self) -> TimeMs {
        self.intros
            .iter()
            .map(|intro| intro.expires_at)
            .max()
            .unwrap_or(0)
    }

    /// The bytes covered by the signature
    pub fn signing_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut copy = self.clone();
        copy.signature.set_zero();
        copy.to_bytes_bounded(MAX_INTROSET_SIZE)
    }

    /// Check the signature against the embedded signing key
    pub fn verify_signature(&self, crypto: &dyn Crypto) -> bool {
        let bytes = match self.signing_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("IntroSet does not fit for verification: {}", e);
                return false;
            }
        };
        crypto.verify(&self.info.sign_key, &bytes, &self.signature)
    }

    /// Address of the service that published this set
    pub fn address(&self, crypto: &dyn Crypto) -> Result<ServiceAddress, EncodeError> {
        self.info.address(crypto)
    }
}

impl Encode for IntroSet {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.start_dict()?;
        w.write_key("a", &self.info)?;
        w.write_key_list("i", &self.intros)?;
        if !self.topic.is_zero() {
            w.write_key("n", &self.topic)?;
        }
        w.write_key_int("v", self.version)?;
        if let Some(pow) = &self.pow {
            w.write_key("w", pow)?;
        }
        w.write_key("z", &self.signature)?;
        w.end()
    }
}

impl DecodeDict for IntroSet {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"a" => self.info = ServiceInfo::decode(r)?,
            b"i" => self.intros = decode_list(r)?,
            b"n" => self.topic = Tag::decode(r)?,
            b"v" => self.version = r.read_int()?,
            b"w" => self.pow = Some(ProofOfWork::decode(r)?),
            b"z" => self.signature = Signature::decode(r)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn finish_decode(&mut self) -> Result<(), DecodeError> {
        if self.info.sign_key.is_zero() {
            return Err(DecodeError::MissingField("a"));
        }
        Ok(())
    }
}

impl Decode for IntroSet {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        decode_dict(r)
    }
}
