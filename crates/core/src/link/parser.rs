use super::{LinkMessage, LinkSession};
use crate::bencode::{DecodeError, Reader};
use crate::identity::RouterId;
use hiddenmesh_common::protocol::MAX_LINK_MSG_SIZE;
use tracing::{debug, warn};

/// Receiver of fully parsed link messages
pub trait LinkHandler {
    /// Act on a message from a verified peer; `false` rejects it
    fn handle_link_message(&mut self, from: RouterId, msg: LinkMessage) -> bool;
}

/// Streaming parse state for inbound link frames
///
/// The first key of every frame must be the `a` discriminator, which picks
/// the variant; every later key is decoded by that variant.
#[derive(Debug)]
pub struct InboundMessageParser {
    first_key: bool,
    msg: Option<LinkMessage>,
    from: Option<RouterId>,
}

impl Default for InboundMessageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundMessageParser {
    pub fn new() -> Self {
        Self {
            first_key: true,
            msg: None,
            from: None,
        }
    }

    fn reset(&mut self) {
        self.first_key = true;
        self.msg = None;
        self.from = None;
    }

    /// Decode one frame into the message under assembly
    fn read_frame(&mut self, buf: &[u8]) -> Result<(), DecodeError> {
        if buf.len() > MAX_LINK_MSG_SIZE {
            return Err(DecodeError::Invalid(format!(
                "frame of {} bytes exceeds {}",
                buf.len(),
                MAX_LINK_MSG_SIZE
            )));
        }

        let mut r = Reader::new(buf);
        let first_key = &mut self.first_key;
        let msg = &mut self.msg;
        r.read_dict(|key, r| {
            if !*first_key {
                return match msg.as_mut() {
                    Some(m) => m.decode_key(key, r),
                    None => Err(DecodeError::MissingField("a")),
                };
            }
            *first_key = false;
            if key != b"a" {
                return Err(DecodeError::MissingField("a"));
            }
            let kind = r.read_bytes()?;
            *msg = Some(LinkMessage::for_kind(kind).ok_or_else(|| {
                DecodeError::Invalid(format!(
                    "unknown link message type {:?}",
                    String::from_utf8_lossy(kind)
                ))
            })?);
            Ok(true)
        })?;
        r.finish()?;

        match self.msg.as_mut() {
            Some(m) => m.finish_decode(),
            None => Err(DecodeError::MissingField("a")),
        }
    }

    /// Parse one frame from `session` and hand it to `handler`
    ///
    /// Fails if the frame does not decode or the session has no verified
    /// identity. The session itself is never modified.
    pub fn process_from(
        &mut self,
        session: &dyn LinkSession,
        buf: &[u8],
        handler: &mut dyn LinkHandler,
    ) -> bool {
        self.reset();
        if let Err(e) = self.read_frame(buf) {
            debug!("Dropping malformed link frame: {}", e);
            self.reset();
            return false;
        }
        self.from = session.remote_router();
        self.message_done(handler)
    }

    /// Stamp the sender on the assembled message and dispatch it
    pub fn message_done(&mut self, handler: &mut dyn LinkHandler) -> bool {
        let from = self.from.take();
        let msg = self.msg.take();
        self.first_key = true;

        let Some(msg) = msg else {
            debug!("No link message to dispatch");
            return false;
        };
        let Some(from) = from else {
            warn!("Link message {:?} from unverified session", String::from_utf8_lossy(msg.kind()));
            return false;
        };
        handler.handle_link_message(from, msg)
    }

    /// Decode a standalone frame without dispatching it
    pub fn decode_frame(buf: &[u8]) -> Result<LinkMessage, DecodeError> {
        let mut parser = Self::new();
        parser.read_frame(buf)?;
        parser.msg.take().ok_or(DecodeError::MissingField("a"))
    }
}
