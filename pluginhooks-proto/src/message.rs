//! Protocol message types for host↔plugin communication.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Value;

/// Version of the framing and envelope layout defined by this crate.
///
/// Independent of the application protocol version a plugin announces in
/// its handshake.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// First frame sent by the host on every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Must equal [`CORE_PROTOCOL_VERSION`].
    pub core_version: u32,
    /// Application protocol version the host expects the plugin to speak.
    pub protocol_version: u32,
    /// Name of the plugin the host wants to dispense.
    pub plugin: String,
}

impl Hello {
    /// Creates a hello for the current core protocol.
    pub fn new(protocol_version: u32, plugin: impl Into<String>) -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            protocol_version,
            plugin: plugin.into(),
        }
    }
}

/// Plugin's answer to a [`Hello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HelloAck {
    /// The plugin accepts the connection; calls may follow.
    Ready,
    /// The plugin refuses the connection and will close it.
    Error(ErrorInfo),
}

/// Names of the callbacks a host can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Method {
    /// Session start.
    OnConnect,
    /// Packet received from the remote peer.
    OnReceive,
    /// Packet about to be sent toward the client.
    OnSend,
}

impl Method {
    /// The method name as the host refers to it.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnConnect => "OnConnect",
            Self::OnReceive => "OnReceive",
            Self::OnSend => "OnSend",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable context for one proxied session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Host-assigned session identifier.
    pub session_id: String,
    /// Identifier of the user that opened the session.
    pub user_id: String,
    /// Plugin-specific configuration.
    pub config: BTreeMap<String, Value>,
    /// Name of the target connection.
    pub connection_name: String,
    /// Type of the target connection (e.g. `postgres`, `tcp`).
    pub connection_type: String,
    /// Environment variables configured for the connection.
    pub connection_env_vars: BTreeMap<String, Value>,
    /// Command used to launch the connection.
    pub connection_command: Vec<String>,
    /// Arguments supplied by the client.
    pub client_args: Vec<String>,
    /// Verb the client invoked (e.g. `connect`, `exec`).
    pub client_verb: String,
}

/// One packet under inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRequest {
    /// Host-defined packet type tag.
    pub packet_type: String,
    /// Raw packet bytes.
    pub payload: Vec<u8>,
}

impl PacketRequest {
    /// Creates a request for a packet of the given type.
    pub fn new(packet_type: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            packet_type: packet_type.into(),
            payload: payload.into(),
        }
    }
}

/// A call sent from host to plugin after the hello exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Call {
    /// Start the session.
    Connect(SessionConfig),
    /// A packet received from the remote peer.
    Receive(PacketRequest),
    /// A packet about to be sent toward the client.
    Send(PacketRequest),
}

impl Call {
    /// The callback this call is routed to.
    pub const fn method(&self) -> Method {
        match self {
            Self::Connect(_) => Method::OnConnect,
            Self::Receive(_) => Method::OnReceive,
            Self::Send(_) => Method::OnSend,
        }
    }
}

/// Outcome of a packet callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Verdict {
    /// Forward the original packet unchanged.
    Forward,
    /// Forward this payload in place of the original.
    Mutate(Vec<u8>),
    /// Drop the packet and stop processing this direction.
    Stop(ErrorInfo),
}

impl Verdict {
    /// The payload the host should forward, or `None` when it must stop.
    pub fn payload_for<'a>(&'a self, original: &'a [u8]) -> Option<&'a [u8]> {
        match self {
            Self::Forward => Some(original),
            Self::Mutate(payload) => Some(payload),
            Self::Stop(_) => None,
        }
    }

    /// Returns `true` for [`Verdict::Stop`].
    pub const fn is_stop(&self) -> bool {
        matches!(self, Self::Stop(_))
    }
}

/// Reply sent from plugin to host, one per [`Call`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Reply {
    /// The session was established.
    Connected,
    /// `OnConnect` failed; the session is over and the connection closes.
    Aborted(ErrorInfo),
    /// Result of `OnReceive` / `OnSend`.
    Verdict(Verdict),
    /// The call was rejected without invoking the plugin.
    Error(ErrorInfo),
}

/// Category of a protocol-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Core or application protocol versions differ.
    VersionMismatch,
    /// The hello named a plugin this process does not serve.
    UnknownPlugin,
    /// A packet call arrived before the session was established.
    NotConnected,
    /// A second `Connect` arrived on an established session.
    AlreadyConnected,
    /// The session was aborted by a failed `OnConnect`.
    Aborted,
    /// The plugin reported a failure.
    Plugin,
    /// Anything else.
    Internal,
}

/// Error payload carried by [`HelloAck::Error`], [`Reply`] and [`Verdict::Stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error category.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl ErrorInfo {
    /// Creates an error with the given code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for [`ErrorCode::VersionMismatch`].
    pub fn version_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::VersionMismatch, message)
    }

    /// Shorthand for [`ErrorCode::Plugin`].
    pub fn plugin(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Plugin, message)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorInfo {}
