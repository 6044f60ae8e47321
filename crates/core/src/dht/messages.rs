use crate::bencode::{
    decode_list, Decode, DecodeDict, DecodeError, Encode, EncodeError, Reader, Writer,
};
use crate::identity::RouterId;
use crate::service::{IntroSet, ServiceAddress, Tag};
use hiddenmesh_common::protocol::VERSION;

/// Ask for the IntroSet(s) stored under an address or a topic tag
///
/// Exactly one of `address` and `tag` is non-zero. `relayed` is not part of
/// the encoding: it records whether the request reached us from a peer's
/// DHT frame (true) or over a path (false).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindIntro {
    pub iterative: bool,
    pub tag: Tag,
    pub recursion: u64,
    pub address: ServiceAddress,
    pub txid: u64,
    pub version: u64,
    pub relayed: bool,
}

impl FindIntro {
    /// Direct lookup of a service address
    pub fn by_address(address: ServiceAddress, txid: u64, recursion: u64) -> Self {
        Self {
            address,
            txid,
            recursion,
            version: VERSION,
            ..Default::default()
        }
    }

    /// Topic lookup; the address stays zeroed
    pub fn by_tag(tag: Tag, txid: u64, recursion: u64) -> Self {
        Self {
            tag,
            txid,
            recursion,
            version: VERSION,
            ..Default::default()
        }
    }

    fn encode_fields(&self, w: &mut Writer) -> Result<(), EncodeError> {
        if self.iterative {
            w.write_key_int("I", 1)?;
        }
        if !self.tag.is_zero() {
            w.write_key("N", &self.tag)?;
        }
        w.write_key_int("R", self.recursion)?;
        if !self.address.is_zero() {
            w.write_key("S", &self.address)?;
        }
        w.write_key_int("T", self.txid)?;
        w.write_key_int("V", self.version)
    }
}

impl DecodeDict for FindIntro {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"I" => self.iterative = r.read_int()? != 0,
            b"N" => self.tag = Tag::decode(r)?,
            b"R" => self.recursion = r.read_int()?,
            b"S" => self.address = ServiceAddress::decode(r)?,
            b"T" => self.txid = r.read_int()?,
            b"V" => self.version = r.read_int()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn finish_decode(&mut self) -> Result<(), DecodeError> {
        match (self.tag.is_zero(), self.address.is_zero()) {
            (true, true) => Err(DecodeError::Invalid(
                "find intro without a target".to_string(),
            )),
            (false, false) => Err(DecodeError::Invalid(
                "find intro with both a tag and an address".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Reply to a [`FindIntro`] or [`PublishIntro`], matched by `txid`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GotIntro {
    pub intro_sets: Vec<IntroSet>,
    /// Closer contacts for an iterative lookup
    pub closer: Vec<RouterId>,
    pub txid: u64,
    pub version: u64,
}

impl GotIntro {
    pub fn new(intro_sets: Vec<IntroSet>, txid: u64) -> Self {
        Self {
            intro_sets,
            closer: Vec::new(),
            txid,
            version: VERSION,
        }
    }

    /// The "not found" answer
    pub fn empty(txid: u64) -> Self {
        Self::new(Vec::new(), txid)
    }

    fn encode_fields(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_key_list("I", &self.intro_sets)?;
        if !self.closer.is_empty() {
            w.write_key_list("K", &self.closer)?;
        }
        w.write_key_int("T", self.txid)?;
        w.write_key_int("V", self.version)
    }
}

impl DecodeDict for GotIntro {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"I" => self.intro_sets = decode_list(r)?,
            b"K" => self.closer = decode_list(r)?,
            b"T" => self.txid = r.read_int()?,
            b"V" => self.version = r.read_int()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Store a signed IntroSet at the receiving node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishIntro {
    pub intro_set: IntroSet,
    pub txid: u64,
    pub version: u64,
}

impl PublishIntro {
    pub fn new(intro_set: IntroSet, txid: u64) -> Self {
        Self {
            intro_set,
            txid,
            version: VERSION,
        }
    }

    fn encode_fields(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_key("I", &self.intro_set)?;
        w.write_key_int("T", self.txid)?;
        w.write_key_int("V", self.version)
    }
}

impl DecodeDict for PublishIntro {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"I" => self.intro_set = IntroSet::decode(r)?,
            b"T" => self.txid = r.read_int()?,
            b"V" => self.version = r.read_int()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn finish_decode(&mut self) -> Result<(), DecodeError> {
        if self.intro_set.info.sign_key.is_zero() {
            return Err(DecodeError::MissingField("I"));
        }
        Ok(())
    }
}

/// DHT message, tagged on the wire by the `A` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhtMessage {
    FindIntro(FindIntro),
    GotIntro(GotIntro),
    PublishIntro(PublishIntro),
}

impl DhtMessage {
    /// Wire discriminator
    pub fn kind(&self) -> &'static [u8] {
        match self {
            DhtMessage::FindIntro(_) => b"F",
            DhtMessage::GotIntro(_) => b"G",
            DhtMessage::PublishIntro(_) => b"I",
        }
    }

    /// Empty variant for a discriminator, or `None` if unknown
    fn for_kind(kind: &[u8]) -> Option<Self> {
        match kind {
            b"F" => Some(DhtMessage::FindIntro(FindIntro::default())),
            b"G" => Some(DhtMessage::GotIntro(GotIntro::default())),
            b"I" => Some(DhtMessage::PublishIntro(PublishIntro::default())),
            _ => None,
        }
    }

    pub fn txid(&self) -> u64 {
        match self {
            DhtMessage::FindIntro(m) => m.txid,
            DhtMessage::GotIntro(m) => m.txid,
            DhtMessage::PublishIntro(m) => m.txid,
        }
    }

    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match self {
            DhtMessage::FindIntro(m) => m.decode_key(key, r),
            DhtMessage::GotIntro(m) => m.decode_key(key, r),
            DhtMessage::PublishIntro(m) => m.decode_key(key, r),
        }
    }

    fn finish_decode(&mut self) -> Result<(), DecodeError> {
        match self {
            DhtMessage::FindIntro(m) => m.finish_decode(),
            DhtMessage::GotIntro(m) => m.finish_decode(),
            DhtMessage::PublishIntro(m) => m.finish_decode(),
        }
    }
}

impl From<FindIntro> for DhtMessage {
    fn from(m: FindIntro) -> Self {
        DhtMessage::FindIntro(m)
    }
}

impl From<GotIntro> for DhtMessage {
    fn from(m: GotIntro) -> Self {
        DhtMessage::GotIntro(m)
    }
}

impl From<PublishIntro> for DhtMessage {
    fn from(m: PublishIntro) -> Self {
        DhtMessage::PublishIntro(m)
    }
}

impl Encode for DhtMessage {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.start_dict()?;
        w.write_key_bytes("A", self.kind())?;
        match self {
            DhtMessage::FindIntro(m) => m.encode_fields(w)?,
            DhtMessage::GotIntro(m) => m.encode_fields(w)?,
            DhtMessage::PublishIntro(m) => m.encode_fields(w)?,
        }
        w.end()
    }
}

impl Decode for DhtMessage {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut msg: Option<DhtMessage> = None;
        r.read_dict(|key, r| {
            if let Some(m) = msg.as_mut() {
                return m.decode_key(key, r);
            }
            if key != b"A" {
                return Err(DecodeError::MissingField("A"));
            }
            let kind = r.read_bytes()?;
            msg = Some(DhtMessage::for_kind(kind).ok_or_else(|| {
                DecodeError::Invalid(format!(
                    "unknown dht message type {:?}",
                    String::from_utf8_lossy(kind)
                ))
            })?);
            Ok(true)
        })?;
        let mut msg = msg.ok_or(DecodeError::MissingField("A"))?;
        msg.finish_decode()?;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lookup_has_zero_address() {
        let msg = FindIntro::by_tag(Tag::from_name("chat"), 7, 3);
        assert!(msg.address.is_zero());

        let bytes = DhtMessage::from(msg.clone()).to_bytes().unwrap();
        assert!(!bytes.windows(3).any(|w| w == b"1:S"));
        assert!(!bytes.windows(3).any(|w| w == b"1:I"));

        let decoded = <DhtMessage as Decode>::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, DhtMessage::FindIntro(msg));
    }

    #[test]
    fn test_address_lookup_has_zero_tag() {
        let mut msg = FindIntro::by_address(ServiceAddress([5u8; 32]), 9, 2);
        msg.iterative = true;
        assert!(msg.tag.is_zero());

        let bytes = DhtMessage::from(msg.clone()).to_bytes().unwrap();
        assert!(!bytes.windows(3).any(|w| w == b"1:N"));

        match <DhtMessage as Decode>::from_bytes(&bytes).unwrap() {
            DhtMessage::FindIntro(decoded) => {
                assert_eq!(decoded, msg);
                // envelope property, never on the wire
                assert!(!decoded.relayed);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_find_intro_needs_exactly_one_target() {
        let both = b"d1:A1:F1:N16:aaaaaaaaaaaaaaaa1:Ri1e1:S32:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb1:Ti1e1:Vi0ee";
        assert!(<DhtMessage as Decode>::from_bytes(both).is_err());

        let neither = b"d1:A1:F1:Ri1e1:Ti1e1:Vi0ee";
        assert!(<DhtMessage as Decode>::from_bytes(neither).is_err());
    }

    #[test]
    fn test_discriminator_must_come_first() {
        assert!(matches!(
            <DhtMessage as Decode>::from_bytes(b"d1:Ti1ee"),
            Err(DecodeError::MissingField("A"))
        ));
        assert!(matches!(
            <DhtMessage as Decode>::from_bytes(b"d1:A1:Q1:Ti1ee"),
            Err(DecodeError::Invalid(_))
        ));
    }

    #[test]
    fn test_got_intro_wire_form() {
        let mut reply = GotIntro::empty(42);
        let bytes = DhtMessage::from(reply.clone()).to_bytes().unwrap();
        assert_eq!(bytes, b"d1:A1:G1:Ile1:Ti42e1:Vi0ee");

        reply.closer = vec![RouterId::from_bytes([1u8; 32])];
        let bytes = DhtMessage::from(reply.clone()).to_bytes().unwrap();
        assert_eq!(
            <DhtMessage as Decode>::from_bytes(&bytes).unwrap(),
            DhtMessage::GotIntro(reply)
        );
    }
}
