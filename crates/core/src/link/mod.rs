/// Link layer
///
/// Messages exchanged directly between neighbouring routers, and the
/// per-session parser that turns inbound frames into them.

mod messages;
mod parser;
mod session;

pub use messages::{Discard, DhtImmediate, LinkIntro, LinkMessage, RelayFrame};
pub use parser::{InboundMessageParser, LinkHandler};
pub use session::LinkSession;
