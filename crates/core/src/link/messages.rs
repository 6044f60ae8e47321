use crate::bencode::{
    decode_list, decode_version, DecodeDict, DecodeError, Encode, EncodeError, Reader, Writer,
    Decode,
};
use crate::crypto::TunnelNonce;
use crate::dht::DhtMessage;
use crate::identity::RouterId;
use crate::path::PathId;
use hiddenmesh_common::protocol::VERSION;

/// Handshake announcing the sender's router id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkIntro {
    pub nonce: TunnelNonce,
    pub router: RouterId,
    pub version: u64,
}

impl LinkIntro {
    pub fn new(router: RouterId, nonce: TunnelNonce) -> Self {
        Self {
            nonce,
            router,
            version: VERSION,
        }
    }

    fn encode_fields(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_key("n", &self.nonce)?;
        w.write_key("r", &self.router)?;
        w.write_key_int("v", self.version)
    }
}

impl DecodeDict for LinkIntro {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"n" => self.nonce = TunnelNonce::decode(r)?,
            b"r" => self.router = RouterId::decode(r)?,
            b"v" => self.version = decode_version(r, VERSION)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn finish_decode(&mut self) -> Result<(), DecodeError> {
        if self.router.is_zero() {
            return Err(DecodeError::MissingField("r"));
        }
        Ok(())
    }
}

/// DHT traffic exchanged directly between neighbouring routers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhtImmediate {
    pub messages: Vec<DhtMessage>,
    pub version: u64,
}

impl DhtImmediate {
    pub fn new(messages: Vec<DhtMessage>) -> Self {
        Self {
            messages,
            version: VERSION,
        }
    }

    fn encode_fields(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_key_list("m", &self.messages)?;
        w.write_key_int("v", self.version)
    }
}

impl DecodeDict for DhtImmediate {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"m" => self.messages = decode_list(r)?,
            b"v" => self.version = decode_version(r, VERSION)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// One onion-layered routing frame travelling along a path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayFrame {
    pub path_id: PathId,
    pub version: u64,
    pub payload: Vec<u8>,
    pub nonce: TunnelNonce,
}

impl RelayFrame {
    pub fn new(path_id: PathId, payload: Vec<u8>, nonce: TunnelNonce) -> Self {
        Self {
            path_id,
            version: VERSION,
            payload,
            nonce,
        }
    }

    fn encode_fields(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_key("p", &self.path_id)?;
        w.write_key_int("v", self.version)?;
        w.write_key_bytes("x", &self.payload)?;
        w.write_key("y", &self.nonce)
    }
}

impl DecodeDict for RelayFrame {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"p" => self.path_id = PathId::decode(r)?,
            b"v" => self.version = decode_version(r, VERSION)?,
            b"x" => self.payload = r.read_bytes()?.to_vec(),
            b"y" => self.nonce = TunnelNonce::decode(r)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn finish_decode(&mut self) -> Result<(), DecodeError> {
        if self.path_id.is_zero() {
            return Err(DecodeError::MissingField("p"));
        }
        Ok(())
    }
}

/// Padding, dropped on receipt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discard {
    pub version: u64,
    pub padding: Vec<u8>,
}

impl Discard {
    pub fn new(len: usize) -> Self {
        Self {
            version: VERSION,
            padding: vec![0u8; len],
        }
    }

    fn encode_fields(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_key_int("v", self.version)?;
        w.write_key_bytes("z", &self.padding)
    }
}

impl DecodeDict for Discard {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"v" => self.version = decode_version(r, VERSION)?,
            b"z" => self.padding = r.read_bytes()?.to_vec(),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Link-layer message, tagged on the wire by the `a` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMessage {
    Intro(LinkIntro),
    DhtImmediate(DhtImmediate),
    RelayUpstream(RelayFrame),
    RelayDownstream(RelayFrame),
    Discard(Discard),
}

impl LinkMessage {
    /// Wire discriminator
    pub fn kind(&self) -> &'static [u8] {
        match self {
            LinkMessage::Intro(_) => b"i",
            LinkMessage::DhtImmediate(_) => b"m",
            LinkMessage::RelayUpstream(_) => b"u",
            LinkMessage::RelayDownstream(_) => b"d",
            LinkMessage::Discard(_) => b"x",
        }
    }

    /// Empty variant for a discriminator, or `None` if unknown
    pub fn for_kind(kind: &[u8]) -> Option<Self> {
        match kind {
            b"i" => Some(LinkMessage::Intro(LinkIntro::default())),
            b"m" => Some(LinkMessage::DhtImmediate(DhtImmediate::default())),
            b"u" => Some(LinkMessage::RelayUpstream(RelayFrame::default())),
            b"d" => Some(LinkMessage::RelayDownstream(RelayFrame::default())),
            b"x" => Some(LinkMessage::Discard(Discard::default())),
            _ => None,
        }
    }

    pub(crate) fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match self {
            LinkMessage::Intro(m) => m.decode_key(key, r),
            LinkMessage::DhtImmediate(m) => m.decode_key(key, r),
            LinkMessage::RelayUpstream(m) | LinkMessage::RelayDownstream(m) => m.decode_key(key, r),
            LinkMessage::Discard(m) => m.decode_key(key, r),
        }
    }

    pub(crate) fn finish_decode(&mut self) -> Result<(), DecodeError> {
        match self {
            LinkMessage::Intro(m) => m.finish_decode(),
            LinkMessage::DhtImmediate(m) => m.finish_decode(),
            LinkMessage::RelayUpstream(m) | LinkMessage::RelayDownstream(m) => m.finish_decode(),
            LinkMessage::Discard(m) => m.finish_decode(),
        }
    }
}

impl Encode for LinkMessage {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.start_dict()?;
        w.write_key_bytes("a", self.kind())?;
        match self {
            LinkMessage::Intro(m) => m.encode_fields(w)?,
            LinkMessage::DhtImmediate(m) => m.encode_fields(w)?,
            LinkMessage::RelayUpstream(m) | LinkMessage::RelayDownstream(m) => m.encode_fields(w)?,
            LinkMessage::Discard(m) => m.encode_fields(w)?,
        }
        w.end()
    }
}
