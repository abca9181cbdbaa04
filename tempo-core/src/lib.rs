pub mod error;
pub mod receiver;
pub mod role;

pub use error::{UnknownProtocol, UnknownRole};
pub use receiver::{ReceiverProtocol, ReceiverSet, TransportProtocol, LEGACY_RECEIVER_PROTOCOLS};
pub use role::Role;

/// The gossip port used for cluster membership between workload processes.
pub const MEMBERLIST_PORT: u16 = 7946;
