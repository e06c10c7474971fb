//! The callback contract a plugin author implements.

use std::fmt;
use std::future::Future;

use pluginhooks_proto::{ErrorInfo, PacketRequest, SessionConfig, Verdict};

/// Failure reported by a plugin callback.
///
/// Deliberately opaque: the host only needs to know that processing must
/// stop, and the message is shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PluginError {
    /// Human-readable description.
    message: String,
}

impl PluginError {
    /// Creates an error from any displayable value.
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for PluginError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for PluginError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<PluginError> for ErrorInfo {
    fn from(err: PluginError) -> Self {
        Self::plugin(err.message)
    }
}

/// A callback's verdict for one packet.
///
/// Starts empty, which means "forward the original packet unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketResponse {
    /// Replacement payload.
    payload: Option<Vec<u8>>,
    /// Failure; wins over any payload.
    error: Option<PluginError>,
}

impl PacketResponse {
    /// Replaces the packet payload.
    ///
    /// An empty payload is a real mutation, not a pass-through.
    pub fn mutate(&mut self, payload: impl Into<Vec<u8>>) {
        self.payload = Some(payload.into());
    }

    /// Marks the packet as failed: it is dropped and processing of this
    /// direction stops.
    pub fn fail(&mut self, error: impl Into<PluginError>) {
        self.error = Some(error.into());
    }

    /// The replacement payload, if any.
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// The failure, if any.
    pub const fn error(&self) -> Option<&PluginError> {
        self.error.as_ref()
    }

    /// Returns `true` if the packet will be stopped.
    pub const fn is_stopped(&self) -> bool {
        self.error.is_some()
    }

    /// Resolves the wire verdict from the response and the callback result.
    ///
    /// Precedence: returned error, then failure field, then payload.
    pub(crate) fn into_verdict(self, result: Result<(), PluginError>) -> Verdict {
        match (result, self.error, self.payload) {
            (Err(err), _, _) | (Ok(()), Some(err), _) => Verdict::Stop(err.into()),
            (Ok(()), None, Some(payload)) => Verdict::Mutate(payload),
            (Ok(()), None, None) => Verdict::Forward,
        }
    }
}

/// Packet-processing callbacks for a connection-proxying host.
///
/// One value serves every session of the process, so callbacks take `&self`
/// and may run concurrently for different sessions. Calls within a single
/// session arrive in order: one [`on_connect`](Plugin::on_connect), then any
/// number of [`on_receive`](Plugin::on_receive) / [`on_send`](Plugin::on_send).
///
/// Implementations may use `async fn`:
///
/// ```
/// use pluginhooks::{PacketRequest, PacketResponse, Plugin, PluginError, SessionConfig};
///
/// struct Upper;
///
/// impl Plugin for Upper {
///     async fn on_connect(&self, _config: &SessionConfig) -> Result<(), PluginError> {
///         Ok(())
///     }
///
///     async fn on_receive(
///         &self,
///         _session: &SessionConfig,
///         request: &PacketRequest,
///         response: &mut PacketResponse,
///     ) -> Result<(), PluginError> {
///         response.mutate(request.payload.to_ascii_uppercase());
///         Ok(())
///     }
///
///     async fn on_send(
///         &self,
///         _session: &SessionConfig,
///         _request: &PacketRequest,
///         _response: &mut PacketResponse,
///     ) -> Result<(), PluginError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Plugin: Send + Sync + 'static {
    /// Called once when a session starts.
    ///
    /// Returning an error aborts the session; no packet callback follows.
    fn on_connect(
        &self,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<(), PluginError>> + Send;

    /// Called for each packet received from the remote peer, before it
    /// reaches its destination.
    ///
    /// Leave `response` untouched to forward the packet unchanged, call
    /// [`PacketResponse::mutate`] to replace it, or fail (via
    /// [`PacketResponse::fail`] or an `Err`) to stop.
    fn on_receive(
        &self,
        session: &SessionConfig,
        request: &PacketRequest,
        response: &mut PacketResponse,
    ) -> impl Future<Output = Result<(), PluginError>> + Send;

    /// Called for each packet about to be sent toward the client.
    ///
    /// Same contract as [`on_receive`](Plugin::on_receive).
    fn on_send(
        &self,
        session: &SessionConfig,
        request: &PacketRequest,
        response: &mut PacketResponse,
    ) -> impl Future<Output = Result<(), PluginError>> + Send;
}

#[cfg(test)]
mod tests {
    use pluginhooks_proto::ErrorCode;

    use super::*;

    #[test]
    fn untouched_response_forwards() {
        assert_eq!(PacketResponse::default().into_verdict(Ok(())), Verdict::Forward);
    }

    #[test]
    fn mutation_is_forwarded() {
        let mut resp = PacketResponse::default();
        resp.mutate(b"GET /mutated".to_vec());
        assert_eq!(
            resp.into_verdict(Ok(())),
            Verdict::Mutate(b"GET /mutated".to_vec())
        );
    }

    #[test]
    fn failure_field_wins_over_payload() {
        let mut resp = PacketResponse::default();
        resp.mutate("ignored");
        resp.fail("blocked");
        assert!(resp.is_stopped());

        match resp.into_verdict(Ok(())) {
            Verdict::Stop(info) => {
                assert_eq!(info.code, ErrorCode::Plugin);
                assert_eq!(info.message, "blocked");
            }
            other => panic!("expected Stop, got {other:?}"),
        }
    }

    #[test]
    fn returned_error_wins_over_everything() {
        let mut resp = PacketResponse::default();
        resp.mutate("ignored");
        resp.fail("from field");

        match resp.into_verdict(Err(PluginError::new("from result"))) {
            Verdict::Stop(info) => assert_eq!(info.message, "from result"),
            other => panic!("expected Stop, got {other:?}"),
        }
    }
}
