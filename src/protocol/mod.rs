//! Wire protocol: method vocabulary, peer roles, envelopes, discovery
//! tokens and the payload codec.

pub mod codec;
pub mod envelope;
pub mod method;
pub mod role;

pub use envelope::{Arg, Envelope, FrameHeader};
pub use method::Method;
pub use role::PeerRole;

/// Datagram a client broadcasts to find the broker.
pub const DISCOVERY_REQUEST: &[u8] = b"AreYouTheServer?";

/// Datagram the broker answers a discovery request with.
pub const DISCOVERY_ACK: &[u8] = b"YesIamTheServer!";
