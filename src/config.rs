//! Destination and process-wide security configuration.
//!
//! Parsing of configuration text is the host's job; this module only
//! validates the values it is handed and produces immutable snapshots.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::codec::Framing;
use crate::core::{
    ConfigError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_SERVICE_NAME,
    MAX_COMPRESSION_LEVEL, MAX_LINE,
};
use crate::security::ServiceName;
use crate::transport::AddressFamily;

/// Per-message protection requested from the security layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    /// Messages travel in clear with an integrity tag.
    Integrity,
    /// Messages are encrypted.
    #[default]
    Encryption,
}

impl SecurityMode {
    /// Whether wrapped messages are encrypted.
    pub fn is_confidential(self) -> bool {
        matches!(self, SecurityMode::Encryption)
    }
}

impl FromStr for SecurityMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integrity" => Ok(SecurityMode::Integrity),
            "encryption" => Ok(SecurityMode::Encryption),
            other => Err(ConfigError::UnknownSecurityMode(other.to_string())),
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityMode::Integrity => f.write_str("integrity"),
            SecurityMode::Encryption => f.write_str("encryption"),
        }
    }
}

/// Process-wide security settings.
///
/// Destinations clone this at construction, so later changes only affect
/// destinations (and therefore contexts) created afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityConfig {
    /// Protection applied to every wrapped message.
    pub mode: SecurityMode,
    /// Service prefix of the target principal (`host` when unset).
    pub service_name: Option<String>,
}

impl SecurityConfig {
    /// Directive selecting the security mode.
    pub const DIRECTIVE_MODE: &'static str = "gssmode";
    /// Directive overriding the service prefix.
    pub const DIRECTIVE_SERVICE_NAME: &'static str = "gssforwardservicename";
    /// Directive restoring defaults.
    pub const DIRECTIVE_RESET: &'static str = "resetconfigvariables";

    /// Create a config with the given mode and no service override.
    pub fn new(mode: SecurityMode) -> Self {
        Self {
            mode,
            service_name: None,
        }
    }

    /// Set the service prefix override.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        self.service_name = Some(name);
        Ok(self)
    }

    /// Service prefix in effect.
    pub fn service(&self) -> &str {
        self.service_name.as_deref().unwrap_or(DEFAULT_SERVICE_NAME)
    }

    /// Build the principal name `service@host` for a target host.
    pub fn principal_for(&self, host: &str) -> ServiceName {
        ServiceName::new(self.service(), host)
    }

    /// Restore defaults (encryption, no override).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Apply one configuration directive.
    ///
    /// On error the config is left untouched.
    pub fn apply_directive(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            Self::DIRECTIVE_MODE => {
                self.mode = value.parse()?;
                tracing::debug!(mode = %self.mode, "security mode set");
            }
            Self::DIRECTIVE_SERVICE_NAME => {
                if value.is_empty() {
                    return Err(ConfigError::EmptyServiceName);
                }
                self.service_name = Some(value.to_string());
            }
            Self::DIRECTIVE_RESET => self.reset(),
            other => return Err(ConfigError::UnknownDirective(other.to_string())),
        }
        Ok(())
    }
}

/// Settings for one forwarding destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardConfig {
    /// Host name or address literal to resolve.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Framing applied to every message.
    pub framing: Framing,
    /// 0 disables compression, 1-9 selects the level.
    pub compression_level: u8,
    /// Address family used for resolution.
    pub address_family: AddressFamily,
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Longer messages are truncated to this size.
    pub max_message_size: usize,
}

impl ForwardConfig {
    /// Start building a config for `host`.
    pub fn builder(host: impl Into<String>) -> ForwardConfigBuilder {
        ForwardConfigBuilder::new(host)
    }
}

/// Builder for [`ForwardConfig`].
#[derive(Debug)]
pub struct ForwardConfigBuilder {
    config: ForwardConfig,
    error: Option<ConfigError>,
}

impl ForwardConfigBuilder {
    /// Create a builder with defaults for `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            config: ForwardConfig {
                host: host.into(),
                port: DEFAULT_PORT,
                framing: Framing::default(),
                compression_level: 0,
                address_family: AddressFamily::default(),
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                max_message_size: MAX_LINE,
            },
            error: None,
        }
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the port from a configuration string; it must be numeric.
    pub fn port_str(mut self, port: &str) -> Self {
        let numeric = !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit());
        match port.parse::<u16>() {
            Ok(p) if numeric => self.config.port = p,
            _ => self.record(ConfigError::InvalidPort(port.to_string())),
        }
        self
    }

    /// Set the framing mode.
    pub fn framing(mut self, framing: Framing) -> Self {
        self.config.framing = framing;
        self
    }

    /// Set the compression level (0 disables).
    pub fn compression_level(mut self, level: u8) -> Self {
        if level > MAX_COMPRESSION_LEVEL {
            self.record(ConfigError::InvalidCompressionLevel(level));
        } else {
            self.config.compression_level = level;
        }
        self
    }

    /// Restrict resolution to one address family.
    pub fn address_family(mut self, family: AddressFamily) -> Self {
        self.config.address_family = family;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the truncation limit; it must be non-zero.
    pub fn max_message_size(mut self, size: usize) -> Self {
        if size == 0 {
            self.record(ConfigError::InvalidMessageSize(size));
        } else {
            self.config.max_message_size = size;
        }
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<ForwardConfig, ConfigError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.config.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        Ok(self.config)
    }

    fn record(&mut self, err: ConfigError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}
