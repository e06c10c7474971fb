//! Bootstrap and per-connection dispatch.

use std::io;
use std::sync::Arc;

use pluginhooks_proto::{
    CORE_PROTOCOL_VERSION, Call, ErrorCode, ErrorInfo, Hello, HelloAck, Reply, Verdict,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, error, info, warn};

use crate::config::ServeConfig;
use crate::plugin::Plugin;
use crate::session::Session;
use crate::transport::Transport;

/// A plugin bound to the single name and handshake it is served under.
#[derive(Debug)]
pub struct Registration<P> {
    /// Handshake and name.
    config: ServeConfig,
    /// The plugin shared by every session.
    plugin: Arc<P>,
}

impl<P: Plugin> Registration<P> {
    /// Binds `plugin` to the name and handshake in `config`.
    pub fn new(config: ServeConfig, plugin: P) -> Self {
        Self {
            config,
            plugin: Arc::new(plugin),
        }
    }

    /// The serve configuration.
    pub const fn config(&self) -> &ServeConfig {
        &self.config
    }

    /// Checks a host's hello against the handshake and registered name.
    pub fn accept(&self, hello: &Hello) -> Result<(), ErrorInfo> {
        if hello.core_version != CORE_PROTOCOL_VERSION {
            return Err(ErrorInfo::version_mismatch(format!(
                "host core protocol v{}, plugin core protocol v{CORE_PROTOCOL_VERSION}",
                hello.core_version
            )));
        }
        let expected = self.config.handshake.protocol_version;
        if hello.protocol_version != expected {
            return Err(ErrorInfo::version_mismatch(format!(
                "host protocol v{}, plugin protocol v{expected}",
                hello.protocol_version
            )));
        }
        if hello.plugin != self.config.plugin_name {
            return Err(ErrorInfo::new(
                ErrorCode::UnknownPlugin,
                format!(
                    "unknown plugin {:?}; this process serves {:?}",
                    hello.plugin, self.config.plugin_name
                ),
            ));
        }
        Ok(())
    }

    /// Opens a fresh session on the registered plugin.
    pub fn session(&self) -> Session<P> {
        Session::new(Arc::clone(&self.plugin))
    }
}

/// Serves one host connection until EOF.
///
/// The first frame must be a [`Hello`]; a rejected hello is answered with
/// [`HelloAck::Error`] and the connection is closed. Afterwards every
/// [`Call`] gets exactly one reply. A session aborted by `on_connect` is
/// closed right after its reply.
pub async fn handle_connection<P, S>(registration: &Registration<P>, stream: S) -> io::Result<()>
where
    P: Plugin,
    S: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut r = BufReader::new(reader);
    let mut w = BufWriter::new(writer);

    let hello: Hello = match pluginhooks_proto::recv(&mut r).await {
        Ok(h) => h,
        // Clean disconnect.
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
        Err(e) => return Err(e),
    };

    if let Err(err) = registration.accept(&hello) {
        warn!(plugin = %hello.plugin, error = %err, "handshake rejected");
        pluginhooks_proto::send(&mut w, &HelloAck::Error(err)).await?;
        return w.flush().await;
    }
    pluginhooks_proto::send(&mut w, &HelloAck::Ready).await?;
    w.flush().await?;

    let mut session = registration.session();
    loop {
        let call: Call = match pluginhooks_proto::recv(&mut r).await {
            Ok(call) => call,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        debug!(method = %call.method(), "call");

        let reply = session.handle(call).await;
        match pluginhooks_proto::send(&mut w, &reply).await {
            // Encoding fails before any byte is written, so the stream is
            // still in sync and a replacement reply can follow.
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %e, "reply could not be encoded");
                pluginhooks_proto::send(&mut w, &unencodable(&reply)).await?;
            }
            res => res?,
        }
        w.flush().await?;

        if session.is_aborted() {
            return Ok(());
        }
    }
}

/// Stands in for a reply too large for one frame.
///
/// An oversized verdict stops the packet; anything else becomes an
/// internal error. The session stays open either way.
fn unencodable(reply: &Reply) -> Reply {
    match reply {
        Reply::Verdict(_) => Reply::Verdict(Verdict::Stop(ErrorInfo::new(
            ErrorCode::Internal,
            "mutated payload exceeds 16 MiB frame limit",
        ))),
        _ => Reply::Error(ErrorInfo::new(
            ErrorCode::Internal,
            "reply exceeds 16 MiB frame limit",
        )),
    }
}

/// Serves `plugin` over `transport` until the transport stops or the
/// process receives SIGINT/SIGTERM.
pub async fn serve_with<P, T>(config: ServeConfig, plugin: P, transport: T) -> crate::Result<()>
where
    P: Plugin,
    T: Transport,
{
    info!(
        plugin = %config.plugin_name,
        protocol_version = config.handshake.protocol_version,
        "serving plugin"
    );
    let registration = Arc::new(Registration::new(config, plugin));

    tokio::select! {
        res = transport.serve(registration) => res,
        () = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}

/// Starts the plugin process; call this from `main`.
///
/// Reads `MAGIC_COOKIE_KEY`, `MAGIC_COOKIE_VAL`, `PLUGIN_NAME` and
/// `PLUGIN_VERSION`, checks that the host exported the magic cookie, then
/// serves over the default Unix socket transport.
///
/// Never returns. Invalid configuration is reported on stderr and the
/// process exits with status 1 before any socket is opened; a clean
/// shutdown exits with status 0.
#[cfg(unix)]
#[allow(clippy::print_stderr)]
pub fn serve<P: Plugin>(plugin: P) -> ! {
    let code = match run(plugin) {
        Ok(()) => 0,
        Err(err) => {
            error!(%err, "plugin stopped");
            eprintln!("[pluginhooks] {err}");
            1
        }
    };
    std::process::exit(code)
}

/// Validates the environment and blocks on [`serve_with`].
#[cfg(unix)]
fn run<P: Plugin>(plugin: P) -> crate::Result<()> {
    bootstrap(plugin, |key| std::env::var(key).ok())
}

/// Configuration is fully checked before a runtime or socket exists.
#[cfg(unix)]
fn bootstrap<P: Plugin>(plugin: P, lookup: impl Fn(&str) -> Option<String>) -> crate::Result<()> {
    let config = ServeConfig::from_lookup(&lookup)?;
    config.handshake.verify_cookie(&lookup)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve_with(
        config,
        plugin,
        crate::transport::UnixTransport::new(),
    ))
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    () = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => ctrl_c.await,
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
