//! The tagger plugin and its per-session settings.

use anyhow::{Context, Result, bail};
use pluginhooks::{PacketRequest, PacketResponse, Plugin, PluginError, SessionConfig, Value};
use tracing::info;

/// Settings from the command line, overridable per session.
#[derive(Debug, Clone)]
pub struct Defaults {
    /// Suffix appended to matching received packets.
    pub suffix: String,
    /// Packet type that gets the suffix.
    pub packet_type: String,
    /// Packet types stopped in both directions.
    pub blocked: Vec<String>,
}

/// Effective settings for one session.
#[derive(Debug)]
struct Settings<'a> {
    /// Suffix to append.
    suffix: &'a str,
    /// Types to stop.
    blocked: Vec<&'a str>,
}

impl<'a> Settings<'a> {
    /// Merges the session's `suffix` / `block` keys over the defaults.
    fn resolve(defaults: &'a Defaults, session: &'a SessionConfig) -> Result<Self> {
        let suffix = match session.config.get("suffix") {
            None => defaults.suffix.as_str(),
            Some(v) => v.as_str().context("config key `suffix` must be a string")?,
        };

        let mut blocked: Vec<&str> = defaults.blocked.iter().map(String::as_str).collect();
        if let Some(v) = session.config.get("block") {
            blocked.extend(block_list(v)?);
        }

        Ok(Self { suffix, blocked })
    }

    /// Returns `true` if packets of `packet_type` must be stopped.
    fn blocks(&self, packet_type: &str) -> bool {
        self.blocked.iter().any(|t| *t == packet_type)
    }
}

/// Reads the `block` key: a list of packet type strings.
fn block_list(value: &Value) -> Result<Vec<&str>> {
    let Some(items) = value.as_list() else {
        bail!("config key `block` must be a list of strings");
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str()
                .with_context(|| format!("config key `block`: item {i} is not a string"))
        })
        .collect()
}

/// Appends a suffix to one packet type and blocks others.
#[derive(Debug)]
pub struct Tagger {
    /// Command-line settings.
    defaults: Defaults,
}

impl Tagger {
    /// Creates the plugin.
    pub const fn new(defaults: Defaults) -> Self {
        Self { defaults }
    }

    /// Resolves settings, turning errors into plugin failures.
    fn settings<'a>(&'a self, session: &'a SessionConfig) -> Result<Settings<'a>, PluginError> {
        Settings::resolve(&self.defaults, session).map_err(|e| PluginError::new(format!("{e:#}")))
    }

    /// Shared handling for both directions.
    fn check_blocked(
        settings: &Settings<'_>,
        request: &PacketRequest,
        response: &mut PacketResponse,
    ) -> bool {
        if settings.blocks(&request.packet_type) {
            response.fail(format!("packet type {:?} is blocked", request.packet_type));
            return true;
        }
        false
    }
}

impl Plugin for Tagger {
    async fn on_connect(&self, config: &SessionConfig) -> Result<(), PluginError> {
        let settings = self.settings(config)?;
        info!(
            session = %config.session_id,
            connection = %config.connection_name,
            verb = %config.client_verb,
            suffix = %settings.suffix,
            blocked = settings.blocked.len(),
            "session opened"
        );
        Ok(())
    }

    async fn on_receive(
        &self,
        session: &SessionConfig,
        request: &PacketRequest,
        response: &mut PacketResponse,
    ) -> Result<(), PluginError> {
        let settings = self.settings(session)?;
        if Self::check_blocked(&settings, request, response) {
            return Ok(());
        }
        if request.packet_type == self.defaults.packet_type {
            response.mutate([request.payload.as_slice(), settings.suffix.as_bytes()].concat());
        }
        Ok(())
    }

    async fn on_send(
        &self,
        session: &SessionConfig,
        request: &PacketRequest,
        response: &mut PacketResponse,
    ) -> Result<(), PluginError> {
        let settings = self.settings(session)?;
        Self::check_blocked(&settings, request, response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pluginhooks::{Call, ErrorCode, Reply, Session, Verdict};

    use super::*;

    fn tagger() -> Arc<Tagger> {
        Arc::new(Tagger::new(Defaults {
            suffix: "-tagged".into(),
            packet_type: "http".into(),
            blocked: vec!["telnet".into()],
        }))
    }

    async fn open(config: &[(&str, Value)]) -> (Session<Tagger>, Reply) {
        let mut session = Session::new(tagger());
        let reply = session
            .handle(Call::Connect(SessionConfig {
                session_id: "s-1".into(),
                config: config
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), v.clone()))
                    .collect(),
                ..SessionConfig::default()
            }))
            .await;
        (session, reply)
    }

    #[tokio::test]
    async fn session_suffix_overrides_default() {
        let (mut session, reply) = open(&[("suffix", Value::from("mutated"))]).await;
        assert_eq!(reply, Reply::Connected);

        let reply = session
            .handle(Call::Receive(PacketRequest::new("http", b"GET /".to_vec())))
            .await;
        assert_eq!(reply, Reply::Verdict(Verdict::Mutate(b"GET /mutated".to_vec())));
    }

    #[tokio::test]
    async fn default_suffix_and_other_types_forwarded() {
        let (mut session, _) = open(&[]).await;

        let reply = session
            .handle(Call::Receive(PacketRequest::new("http", b"GET /".to_vec())))
            .await;
        assert_eq!(reply, Reply::Verdict(Verdict::Mutate(b"GET /-tagged".to_vec())));

        let reply = session
            .handle(Call::Receive(PacketRequest::new("pg", b"SELECT 1".to_vec())))
            .await;
        assert_eq!(reply, Reply::Verdict(Verdict::Forward));

        // Sends are never tagged.
        let reply = session
            .handle(Call::Send(PacketRequest::new("http", b"200 OK".to_vec())))
            .await;
        assert_eq!(reply, Reply::Verdict(Verdict::Forward));
    }

    #[tokio::test]
    async fn blocked_types_stop_in_both_directions() {
        let (mut session, _) = open(&[("block", Value::from(vec!["ssh"]))]).await;

        for call in [
            Call::Send(PacketRequest::new("ssh", b"x".to_vec())),
            Call::Receive(PacketRequest::new("telnet", b"x".to_vec())),
        ] {
            match session.handle(call).await {
                Reply::Verdict(Verdict::Stop(info)) => {
                    assert_eq!(info.code, ErrorCode::Plugin);
                    assert!(info.message.contains("is blocked"), "{}", info.message);
                }
                other => panic!("expected Stop, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn malformed_config_aborts_session() {
        let (mut session, reply) = open(&[("suffix", Value::Int(5))]).await;
        match reply {
            Reply::Aborted(info) => assert_eq!(info.message, "config key `suffix` must be a string"),
            other => panic!("expected Aborted, got {other:?}"),
        }

        let (_, reply) = open(&[("block", Value::from(vec![Value::Int(1)]))]).await;
        match reply {
            Reply::Aborted(info) => {
                assert_eq!(info.message, "config key `block`: item 0 is not a string");
            }
            other => panic!("expected Aborted, got {other:?}"),
        }

        let reply = session
            .handle(Call::Receive(PacketRequest::new("http", b"GET /".to_vec())))
            .await;
        assert!(matches!(reply, Reply::Error(info) if info.code == ErrorCode::Aborted));
    }
}
