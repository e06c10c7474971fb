//! Transports that accept host connections and feed them to the plugin.
//!
//! [`Transport`] is the seam to the hosting framework. [`UnixTransport`] is
//! the default: a Unix socket in a private temporary directory, announced to
//! the host on stdout.

use std::future::Future;
use std::sync::Arc;

use crate::plugin::Plugin;
use crate::server::Registration;

/// Accepts host connections and serves them with a registered plugin.
pub trait Transport {
    /// Runs until the transport fails or has nothing left to serve.
    ///
    /// Sessions may be served concurrently.
    fn serve<P: Plugin>(
        self,
        registration: Arc<Registration<P>>,
    ) -> impl Future<Output = crate::Result<()>> + Send;
}

#[cfg(unix)]
pub use unix::{SOCKET_NAME, UnixTransport};

#[cfg(unix)]
mod unix {
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use pluginhooks_proto::CORE_PROTOCOL_VERSION;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;
    use tracing::{error, info, warn};

    use super::Transport;
    use crate::plugin::Plugin;
    use crate::server::{Registration, handle_connection};

    /// File name of the listening socket inside the transport directory.
    pub const SOCKET_NAME: &str = "plugin.sock";

    /// Serves host connections on a Unix socket.
    ///
    /// On start it prints one line to stdout for the host:
    /// `CORE_VERSION|PROTOCOL_VERSION|unix|SOCKET_PATH|postcard`.
    /// Stdout carries nothing else, so log to stderr.
    #[derive(Debug, Default)]
    pub struct UnixTransport {
        /// Directory for the socket; a fresh temporary one when `None`.
        dir: Option<PathBuf>,
    }

    impl UnixTransport {
        /// Creates a transport that binds inside a new temporary directory,
        /// removed again when serving stops.
        pub const fn new() -> Self {
            Self { dir: None }
        }

        /// Creates a transport that binds `dir/plugin.sock`.
        ///
        /// A stale socket file at that path is replaced, and the socket file
        /// is removed again when serving stops.
        pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
            Self {
                dir: Some(dir.into()),
            }
        }
    }

    impl Transport for UnixTransport {
        async fn serve<P: Plugin>(self, registration: Arc<Registration<P>>) -> crate::Result<()> {
            // Held until serving stops; dropping it removes the directory.
            let (_tmp, dir) = match self.dir {
                Some(dir) => (None, dir),
                None => {
                    let tmp = tempfile::Builder::new().prefix("plugin").tempdir()?;
                    let dir = tmp.path().to_path_buf();
                    (Some(tmp), dir)
                }
            };
            let path = dir.join(SOCKET_NAME);
            let listener = bind(&path)?;
            let _socket = SocketFile(path.clone());
            info!(socket = %path.display(), "listening");

            announce(registration.config().handshake.protocol_version, &path).await?;

            loop {
                let (stream, _addr) = listener.accept().await?;
                let reg = Arc::clone(&registration);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(&reg, stream).await {
                        error!("session error: {e}");
                    }
                });
            }
        }
    }

    /// Removes the socket file on drop, including when the serving future is
    /// cancelled.
    struct SocketFile(PathBuf);

    impl Drop for SocketFile {
        fn drop(&mut self) {
            match std::fs::remove_file(&self.0) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(socket = %self.0.display(), "failed to remove socket: {e}"),
            }
        }
    }

    /// Binds `path`, replacing a leftover socket file.
    fn bind(path: &Path) -> io::Result<UnixListener> {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        UnixListener::bind(path)
    }

    /// Writes the address line the host reads to find the socket.
    async fn announce(protocol_version: u32, path: &Path) -> io::Result<()> {
        let line = format!(
            "{CORE_PROTOCOL_VERSION}|{protocol_version}|unix|{}|postcard\n",
            path.display()
        );
        let mut stdout = tokio::io::stdout();
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await
    }

}
