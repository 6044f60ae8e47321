pub mod bencode;
pub mod crypto;
pub mod dht;
pub mod identity;
pub mod link;
pub mod logic;
pub mod path;
pub mod router;
pub mod routing;
pub mod service;
pub mod thread_pool;

pub use crypto::{Crypto, DalekCrypto};
pub use identity::{IdentityError, RouterId, RouterIdentity};
pub use logic::{Clock, Logic, LogicHandle, ManualClock, SystemClock};
pub use router::Router;
pub use thread_pool::{SyncPool, ThreadPool, WorkQueue};

// Re-export hidden service types
pub use service::{
    Endpoint, IntroSet, Introduction, LookupResult, ServiceAddress, ServiceIdentity,
    ServiceInfo, ServicesConfig, Tag,
};
