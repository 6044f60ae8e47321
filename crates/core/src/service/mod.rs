/// Hidden services
///
/// The data model (`ServiceInfo`, `Introduction`, `IntroSet`), the keys a
/// service holds, the lookup state machine, and the endpoints this router
/// hosts.

mod address;
mod config;
mod context;
mod endpoint;
mod identity;
mod info;
mod intro;
mod intro_set;
mod lookup;
mod pow;
mod tag;

pub use address::{ServiceAddress, ServiceAddressError};
pub use config::{ConfigError, ServiceSection, ServicesConfig};
pub use context::Context;
pub use endpoint::{verify_reply, Endpoint, EndpointError, VerifiedReply};
pub use identity::ServiceIdentity;
pub use info::{ServiceInfo, VanityNonce};
pub use intro::Introduction;
pub use intro_set::IntroSet;
pub use lookup::{
    LookupError, LookupHolder, LookupKind, LookupResult, LookupTable, ServiceLookup,
};
pub use pow::{PowNonce, ProofOfWork};
pub use tag::Tag;

pub use crate::identity::IdentityError;
