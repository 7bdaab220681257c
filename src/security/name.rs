//! Host-based service principal names (`service@host`).

use std::fmt;
use std::str::FromStr;

use crate::core::SecurityError;

/// Target principal of a security context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName {
    service: String,
    host: String,
}

impl ServiceName {
    /// Build a principal from its parts.
    pub fn new(service: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            host: host.into(),
        }
    }

    /// Service prefix.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Host part.
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.service, self.host)
    }
}

impl FromStr for ServiceName {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((service, host)) if !service.is_empty() && !host.is_empty() => {
                Ok(Self::new(service, host))
            }
            _ => Err(SecurityError::InvalidName(s.to_string())),
        }
    }
}
