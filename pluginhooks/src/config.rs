//! Handshake configuration read at bootstrap.
//!
//! The four variables below are a misconfiguration tripwire for operators,
//! not a security boundary. [`ServeConfig::from_lookup`] takes the values
//! from any source so callers (and tests) need not touch the process
//! environment.

/// Name of the environment variable holding the magic cookie key.
pub const ENV_MAGIC_COOKIE_KEY: &str = "MAGIC_COOKIE_KEY";
/// Name of the environment variable holding the magic cookie value.
pub const ENV_MAGIC_COOKIE_VAL: &str = "MAGIC_COOKIE_VAL";
/// Name of the environment variable holding the registered plugin name.
pub const ENV_PLUGIN_NAME: &str = "PLUGIN_NAME";
/// Name of the environment variable holding the protocol version.
pub const ENV_PLUGIN_VERSION: &str = "PLUGIN_VERSION";

/// All required variables, in the order diagnostics list them.
pub const REQUIRED_ENV: [&str; 4] = [
    ENV_MAGIC_COOKIE_KEY,
    ENV_MAGIC_COOKIE_VAL,
    ENV_PLUGIN_NAME,
    ENV_PLUGIN_VERSION,
];

/// One or more required variables were unset, empty or invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "missing required env vars [MAGIC_COOKIE_KEY, MAGIC_COOKIE_VAL, PLUGIN_NAME, PLUGIN_VERSION] \
     (unset or invalid: {})",
    .invalid.join(", ")
)]
pub struct ConfigError {
    /// The offending variables, a subset of [`REQUIRED_ENV`].
    pub invalid: Vec<&'static str>,
}

/// Values both sides must agree on before any call is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Application protocol version; always positive.
    pub protocol_version: u32,
    /// Name of the environment variable the host sets to the cookie value.
    pub magic_cookie_key: String,
    /// Expected cookie value.
    pub magic_cookie_value: String,
}

impl HandshakeConfig {
    /// Checks that the host exported the magic cookie.
    ///
    /// `lookup` resolves environment variable names; the variable named by
    /// [`Self::magic_cookie_key`] must equal [`Self::magic_cookie_value`].
    pub fn verify_cookie(&self, lookup: impl Fn(&str) -> Option<String>) -> crate::Result<()> {
        match lookup(&self.magic_cookie_key) {
            Some(v) if v == self.magic_cookie_value => Ok(()),
            _ => Err(crate::Error::CookieMismatch {
                key: self.magic_cookie_key.clone(),
            }),
        }
    }
}

/// Everything needed to serve a single plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    /// Handshake parameters.
    pub handshake: HandshakeConfig,
    /// The only plugin name this process answers to.
    pub plugin_name: String,
}

impl ServeConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Unset or empty values are invalid; `PLUGIN_VERSION` must parse as a
    /// positive integer. Every offending variable is reported, not only the
    /// first.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let cookie_key = non_empty(ENV_MAGIC_COOKIE_KEY);
        let cookie_val = non_empty(ENV_MAGIC_COOKIE_VAL);
        let plugin_name = non_empty(ENV_PLUGIN_NAME);
        let version = non_empty(ENV_PLUGIN_VERSION)
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0);

        match (cookie_key, cookie_val, plugin_name, version) {
            (
                Some(magic_cookie_key),
                Some(magic_cookie_value),
                Some(plugin_name),
                Some(protocol_version),
            ) => Ok(Self {
                handshake: HandshakeConfig {
                    protocol_version,
                    magic_cookie_key,
                    magic_cookie_value,
                },
                plugin_name,
            }),
            (k, v, n, p) => {
                let present = [k.is_some(), v.is_some(), n.is_some(), p.is_some()];
                let invalid = REQUIRED_ENV
                    .iter()
                    .zip(present)
                    .filter(|(_, ok)| !ok)
                    .map(|(name, _)| *name)
                    .collect();
                Err(ConfigError { invalid })
            }
        }
    }
}
