//! Per-session adapter between the wire protocol and a [`Plugin`].
//!
//! Forwards each [`Call`] to the matching callback and tracks the session
//! lifecycle: `AwaitingConnect → Established → Aborted`.

use std::sync::Arc;

use pluginhooks_proto::{Call, ErrorCode, ErrorInfo, Method, PacketRequest, Reply, SessionConfig};
use tracing::{debug, warn};

use crate::plugin::{PacketResponse, Plugin};

/// Where a session is in its lifecycle.
#[derive(Debug)]
enum State {
    /// No `Connect` yet.
    AwaitingConnect,
    /// `on_connect` succeeded; the configuration is fixed for the session.
    Established(SessionConfig),
    /// `on_connect` failed; every later call is refused.
    Aborted,
}

/// Packet direction, used to pick the callback.
#[derive(Debug, Clone, Copy)]
enum Direction {
    /// From the remote peer.
    Receive,
    /// Toward the client.
    Send,
}

/// One session's view of a plugin.
#[derive(Debug)]
pub struct Session<P> {
    /// The shared plugin.
    plugin: Arc<P>,
    /// Lifecycle state.
    state: State,
}

impl<P: Plugin> Session<P> {
    /// Creates a session awaiting its `Connect` call.
    pub const fn new(plugin: Arc<P>) -> Self {
        Self {
            plugin,
            state: State::AwaitingConnect,
        }
    }

    /// The session configuration, once established.
    pub const fn config(&self) -> Option<&SessionConfig> {
        match &self.state {
            State::Established(cfg) => Some(cfg),
            _ => None,
        }
    }

    /// Returns `true` once `on_connect` has failed.
    ///
    /// Transports close the connection of an aborted session.
    pub const fn is_aborted(&self) -> bool {
        matches!(self.state, State::Aborted)
    }

    /// Routes one call to the plugin and returns the reply for the host.
    pub async fn handle(&mut self, call: Call) -> Reply {
        let method = call.method();
        if self.is_aborted() {
            warn!(%method, "call on aborted session refused");
            return Reply::Error(ErrorInfo::new(
                ErrorCode::Aborted,
                format!("{method}: session was aborted by OnConnect"),
            ));
        }

        match call {
            Call::Connect(_) if self.config().is_some() => Reply::Error(ErrorInfo::new(
                ErrorCode::AlreadyConnected,
                "OnConnect: session is already established",
            )),
            Call::Connect(config) => self.connect(config).await,
            Call::Receive(req) => self.packet(Direction::Receive, req).await,
            Call::Send(req) => self.packet(Direction::Send, req).await,
            _ => Reply::Error(ErrorInfo::new(
                ErrorCode::Internal,
                format!("unsupported call {method}"),
            )),
        }
    }

    /// Runs `on_connect` and settles the session state.
    async fn connect(&mut self, config: SessionConfig) -> Reply {
        debug!(session = %config.session_id, user = %config.user_id, "OnConnect");
        match self.plugin.on_connect(&config).await {
            Ok(()) => {
                self.state = State::Established(config);
                Reply::Connected
            }
            Err(err) => {
                warn!(session = %config.session_id, error = %err, "OnConnect failed; aborting session");
                self.state = State::Aborted;
                Reply::Aborted(err.into())
            }
        }
    }

    /// Runs a packet callback and resolves its verdict.
    async fn packet(&self, direction: Direction, request: PacketRequest) -> Reply {
        let Some(config) = self.config() else {
            let method = match direction {
                Direction::Receive => Method::OnReceive,
                Direction::Send => Method::OnSend,
            };
            return Reply::Error(ErrorInfo::new(
                ErrorCode::NotConnected,
                format!("{method}: OnConnect has not been called"),
            ));
        };

        let mut response = PacketResponse::default();
        let result = match direction {
            Direction::Receive => {
                self.plugin
                    .on_receive(config, &request, &mut response)
                    .await
            }
            Direction::Send => self.plugin.on_send(config, &request, &mut response).await,
        };
        let verdict = response.into_verdict(result);
        debug!(
            ?direction,
            packet_type = %request.packet_type,
            len = request.payload.len(),
            stop = verdict.is_stop(),
            "packet processed"
        );
        Reply::Verdict(verdict)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pluginhooks_proto::{Value, Verdict};

    use super::*;
    use crate::plugin::PluginError;

    /// Records calls and behaves according to the session config.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Plugin for Recorder {
        async fn on_connect(&self, config: &SessionConfig) -> Result<(), PluginError> {
            self.calls.lock().unwrap().push("connect");
            match config.config.get("reject") {
                Some(Value::Bool(true)) => Err("rejected by config".into()),
                _ => Ok(()),
            }
        }

        async fn on_receive(
            &self,
            _session: &SessionConfig,
            request: &PacketRequest,
            response: &mut PacketResponse,
        ) -> Result<(), PluginError> {
            self.calls.lock().unwrap().push("receive");
            if request.packet_type == "http" {
                let mut payload = request.payload.clone();
                payload.extend_from_slice(b"mutated");
                response.mutate(payload);
            }
            Ok(())
        }

        async fn on_send(
            &self,
            session: &SessionConfig,
            _request: &PacketRequest,
            response: &mut PacketResponse,
        ) -> Result<(), PluginError> {
            self.calls.lock().unwrap().push("send");
            response.mutate("should be ignored");
            response.fail(format!("send blocked for {}", session.session_id));
            Ok(())
        }
    }

    fn connect_call(reject: bool) -> Call {
        let mut config = SessionConfig {
            session_id: "s-1".into(),
            ..SessionConfig::default()
        };
        config.config.insert("reject".into(), Value::Bool(reject));
        Call::Connect(config)
    }

    fn established() -> (Arc<Recorder>, Session<Recorder>) {
        let plugin = Arc::new(Recorder::default());
        (Arc::clone(&plugin), Session::new(plugin))
    }

    #[tokio::test]
    async fn receive_forwards_mutated_payload() {
        let (_, mut session) = established();
        assert_eq!(session.handle(connect_call(false)).await, Reply::Connected);
        assert_eq!(session.config().map(|c| c.session_id.as_str()), Some("s-1"));

        let reply = session
            .handle(Call::Receive(PacketRequest::new("http", b"GET /".to_vec())))
            .await;
        assert_eq!(reply, Reply::Verdict(Verdict::Mutate(b"GET /mutated".to_vec())));
    }

    #[tokio::test]
    async fn untouched_response_keeps_original_payload() {
        let (_, mut session) = established();
        session.handle(connect_call(false)).await;

        let request = PacketRequest::new("tcp", b"raw bytes".to_vec());
        let Reply::Verdict(verdict) = session.handle(Call::Receive(request.clone())).await else {
            panic!("expected a verdict");
        };
        assert_eq!(verdict, Verdict::Forward);
        assert_eq!(verdict.payload_for(&request.payload), Some(&b"raw bytes"[..]));
    }

    #[tokio::test]
    async fn send_failure_stops_packet() {
        let (_, mut session) = established();
        session.handle(connect_call(false)).await;

        match session.handle(Call::Send(PacketRequest::new("http", b"x".to_vec()))).await {
            Reply::Verdict(Verdict::Stop(info)) => {
                assert_eq!(info.code, ErrorCode::Plugin);
                assert_eq!(info.message, "send blocked for s-1");
            }
            other => panic!("expected Stop, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_connect_aborts_session() {
        let (plugin, mut session) = established();

        match session.handle(connect_call(true)).await {
            Reply::Aborted(info) => assert_eq!(info.message, "rejected by config"),
            other => panic!("expected Aborted, got {other:?}"),
        }
        assert!(session.is_aborted());

        for call in [
            Call::Receive(PacketRequest::new("http", b"GET /".to_vec())),
            Call::Send(PacketRequest::new("http", b"GET /".to_vec())),
            connect_call(false),
        ] {
            match session.handle(call).await {
                Reply::Error(info) => assert_eq!(info.code, ErrorCode::Aborted),
                other => panic!("expected Error, got {other:?}"),
            }
        }
        assert_eq!(plugin.calls(), ["connect"]);
    }

    #[tokio::test]
    async fn packets_before_connect_are_refused() {
        let (plugin, mut session) = established();

        match session.handle(Call::Receive(PacketRequest::default())).await {
            Reply::Error(info) => assert_eq!(info.code, ErrorCode::NotConnected),
            other => panic!("expected Error, got {other:?}"),
        }
        assert!(plugin.calls().is_empty());
    }

    #[tokio::test]
    async fn second_connect_is_refused_and_config_kept() {
        let (plugin, mut session) = established();
        session.handle(connect_call(false)).await;

        let other = SessionConfig {
            session_id: "s-2".into(),
            ..SessionConfig::default()
        };
        match session.handle(Call::Connect(other)).await {
            Reply::Error(info) => assert_eq!(info.code, ErrorCode::AlreadyConnected),
            reply => panic!("expected Error, got {reply:?}"),
        }
        assert_eq!(session.config().map(|c| c.session_id.as_str()), Some("s-1"));
        assert_eq!(plugin.calls(), ["connect"]);
    }
}
