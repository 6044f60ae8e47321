use crate::bencode::{
    decode_dict, Decode, DecodeDict, DecodeError, Encode, EncodeError, Reader, Writer,
};
use crate::identity::RouterId;
use crate::path::PathId;
use hiddenmesh_common::TimeMs;

/// One advertised entry point for reaching a hidden service
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Introduction {
    /// Router at the far end of the service's inbound path
    pub router: RouterId,
    /// Path id at that router
    pub path_id: PathId,
    pub latency: u64,
    pub version: u64,
    /// Absolute expiry in unix milliseconds
    pub expires_at: TimeMs,
}

impl Introduction {
    pub fn is_expired(&self, now: TimeMs) -> bool {
        now >= self.expires_at
    }

    pub fn clear(&mut self) {
        self.router = RouterId::default();
        self.path_id.set_zero();
        self.latency = 0;
        self.expires_at = 0;
    }
}

impl Encode for Introduction {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.start_dict()?;
        w.write_key("k", &self.router)?;
        if self.latency != 0 {
            w.write_key_int("l", self.latency)?;
        }
        w.write_key("p", &self.path_id)?;
        w.write_key_int("v", self.version)?;
        w.write_key_int("x", self.expires_at)?;
        w.end()
    }
}

impl DecodeDict for Introduction {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"k" => self.router = RouterId::decode(r)?,
            b"l" => self.latency = r.read_int()?,
            b"p" => self.path_id = PathId::decode(r)?,
            b"v" => self.version = r.read_int()?,
            b"x" => self.expires_at = r.read_int()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn finish_decode(&mut self) -> Result<(), DecodeError> {
        if self.router.is_zero() {
            return Err(DecodeError::MissingField("k"));
        }
        Ok(())
    }
}

impl Decode for Introduction {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        decode_dict(r)
    }
}
