mod identity;
mod key_file;
mod router_id;

pub use identity::RouterIdentity;
pub use key_file::load_or_create;
pub use router_id::{Distance, RouterId, RouterIdError};

use crate::bencode::{DecodeError, EncodeError};

/// Errors raised while bringing up or using a long-term identity
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Key file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key file is {size} bytes, maximum is {max}")]
    Oversize { size: u64, max: usize },

    #[error("Key file is corrupt: {0}")]
    Corrupt(#[from] DecodeError),

    #[error("Cannot sign an IntroSet without introductions")]
    NoIntroductions,

    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),
}
