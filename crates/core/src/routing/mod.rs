/// Messages carried end-to-end over a path
///
/// Only the terminal hop of a path decodes these; every hop before it sees
/// an opaque relay payload.
use crate::bencode::{
    decode_list, Decode, DecodeDict, DecodeError, Encode, EncodeError, Reader, Writer,
};
use crate::dht::DhtMessage;
use hiddenmesh_common::protocol::VERSION;

/// DHT messages tunnelled through a path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhtCarrier {
    pub messages: Vec<DhtMessage>,
    /// Per-path sequence number
    pub seq: u64,
    pub version: u64,
}

impl DhtCarrier {
    pub fn new(messages: Vec<DhtMessage>, seq: u64) -> Self {
        Self {
            messages,
            seq,
            version: VERSION,
        }
    }
}

impl DecodeDict for DhtCarrier {
    fn decode_key(&mut self, key: &[u8], r: &mut Reader<'_>) -> Result<bool, DecodeError> {
        match key {
            b"M" => self.messages = decode_list(r)?,
            b"S" => self.seq = r.read_int()?,
            b"V" => self.version = r.read_int()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Routing message, tagged on the wire by the `A` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingMessage {
    Dht(DhtCarrier),
}

impl RoutingMessage {
    pub fn dht(messages: Vec<DhtMessage>, seq: u64) -> Self {
        RoutingMessage::Dht(DhtCarrier::new(messages, seq))
    }
}

impl Encode for RoutingMessage {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match self {
            RoutingMessage::Dht(m) => {
                w.start_dict()?;
                w.write_key_bytes("A", b"M")?;
                w.write_key_list("M", &m.messages)?;
                w.write_key_int("S", m.seq)?;
                w.write_key_int("V", m.version)?;
                w.end()
            }
        }
    }
}

impl Decode for RoutingMessage {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut msg: Option<DhtCarrier> = None;
        r.read_dict(|key, r| {
            if let Some(m) = msg.as_mut() {
                return m.decode_key(key, r);
            }
            if key != b"A" {
                return Err(DecodeError::MissingField("A"));
            }
            let kind = r.read_bytes()?;
            if kind != b"M" {
                return Err(DecodeError::Invalid(format!(
                    "unknown routing message type {:?}",
                    String::from_utf8_lossy(kind)
                )));
            }
            msg = Some(DhtCarrier::default());
            Ok(true)
        })?;
        msg.map(RoutingMessage::Dht)
            .ok_or(DecodeError::MissingField("A"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::{FindIntro, GotIntro};
    use crate::service::Tag;

    #[test]
    fn test_carrier_wire_form() {
        let msg = RoutingMessage::dht(vec![GotIntro::empty(1).into()], 3);
        let bytes = msg.to_bytes().unwrap();
        assert!(bytes.starts_with(b"d1:A1:M1:Mld1:A1:G"));
        assert_eq!(<RoutingMessage as Decode>::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_nested_messages_decode() {
        let msg = RoutingMessage::dht(
            vec![
                FindIntro::by_tag(Tag::from_name("chat"), 4, 2).into(),
                GotIntro::empty(5).into(),
            ],
            0,
        );
        let bytes = msg.to_bytes().unwrap();
        let RoutingMessage::Dht(decoded) = <RoutingMessage as Decode>::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.messages.len(), 2);
        assert_eq!(decoded.messages[0].txid(), 4);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(<RoutingMessage as Decode>::from_bytes(b"d1:A1:Z1:Si0ee").is_err());
        assert!(<RoutingMessage as Decode>::from_bytes(b"d1:Si0ee").is_err());
    }
}
