//! Wire layer: the tagged-tuple message and the pluggable datagram
//! encoders.

pub mod encoder;
pub mod message;

pub use encoder::{JsonEncoder, ProtocolEncoder};
#[cfg(feature = "messagepack")]
pub use encoder::MsgpackEncoder;
pub use message::{is_standard_code, HandleRef, NetMessage, STANDARD_RANGE_END};
