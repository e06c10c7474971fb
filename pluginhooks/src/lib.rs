//! Serve packet-processing plugins for a connection-proxying host.
//!
//! A plugin is a separate process that the host launches and then calls
//! for every session it proxies: once when the session opens
//! ([`Plugin::on_connect`]) and once per packet in each direction
//! ([`Plugin::on_receive`], [`Plugin::on_send`]). Each packet callback
//! either forwards the packet unchanged, replaces its payload, or stops it.
//!
//! # Quick start
//!
//! ```no_run
//! use pluginhooks::{PacketRequest, PacketResponse, Plugin, PluginError, SessionConfig};
//!
//! struct Tagger;
//!
//! impl Plugin for Tagger {
//!     async fn on_connect(&self, config: &SessionConfig) -> Result<(), PluginError> {
//!         if config.user_id.is_empty() {
//!             return Err("anonymous sessions are not allowed".into());
//!         }
//!         Ok(())
//!     }
//!
//!     async fn on_receive(
//!         &self,
//!         _session: &SessionConfig,
//!         request: &PacketRequest,
//!         response: &mut PacketResponse,
//!     ) -> Result<(), PluginError> {
//!         if request.packet_type == "http" {
//!             response.mutate([request.payload.as_slice(), b"mutated"].concat());
//!         }
//!         Ok(())
//!     }
//!
//!     async fn on_send(
//!         &self,
//!         _session: &SessionConfig,
//!         _request: &PacketRequest,
//!         _response: &mut PacketResponse,
//!     ) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() {
//!     // Requires MAGIC_COOKIE_KEY, MAGIC_COOKIE_VAL, PLUGIN_NAME and
//!     // PLUGIN_VERSION; never returns.
//!     pluginhooks::serve(Tagger);
//! }
//! ```

mod config;
mod error;
mod plugin;
mod server;
mod session;
mod transport;

pub use config::{
    ConfigError, ENV_MAGIC_COOKIE_KEY, ENV_MAGIC_COOKIE_VAL, ENV_PLUGIN_NAME, ENV_PLUGIN_VERSION,
    HandshakeConfig, REQUIRED_ENV, ServeConfig,
};
pub use error::{Error, Result};
pub use plugin::{PacketResponse, Plugin, PluginError};
pub use pluginhooks_proto::{
    Call, ErrorCode, ErrorInfo, Method, PacketRequest, Reply, SessionConfig, Value, Verdict,
};
#[cfg(unix)]
pub use server::serve;
pub use server::{Registration, handle_connection, serve_with};
pub use session::Session;
#[cfg(unix)]
pub use transport::{SOCKET_NAME, UnixTransport};
pub use transport::Transport;
