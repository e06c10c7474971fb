//! Wire protocol between a connection-proxying host and a packet plugin.
//!
//! Messages are serialized with [`postcard`] and framed with a 4-byte
//! big-endian length prefix, suitable for any reliable byte stream
//! (Unix socket, TCP, pipes).
//!
//! A connection starts with a [`Hello`] / [`HelloAck`] exchange, after which
//! the host drives the session with [`Call`]s and the plugin answers each
//! with exactly one [`Reply`].

mod codec;
mod message;
mod value;

pub use codec::{recv, send};
pub use message::{
    CORE_PROTOCOL_VERSION, Call, ErrorCode, ErrorInfo, Hello, HelloAck, Method, PacketRequest,
    Reply, SessionConfig, Verdict,
};
pub use value::Value;
