//! # Server Configuration
//!
//! HTTP server settings for liveness probes and metrics.

use super::{override_from, ConfigError};
use crate::constants::DEFAULT_HTTP_ADDR;
use serde::Deserialize;
use std::net::SocketAddr;

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    /// Listen address; a bare `:port` binds all interfaces
    #[serde(alias = "ADDR")]
    pub addr: String,
    /// Path prefix for every route (e.g. `/autounseal`)
    #[serde(alias = "routePrefix")]
    pub route_prefix: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            addr: DEFAULT_HTTP_ADDR.to_string(),
            route_prefix: String::new(),
        }
    }
}

impl HttpSettings {
    pub(super) fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(lookup, "HTTP_ADDR", &mut self.addr)?;
        override_from(lookup, "HTTP_ROUTE_PREFIX", &mut self.route_prefix)?;
        Ok(())
    }

    /// Resolve the listen address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        };
        addr.parse()
            .map_err(|_parse_err| ConfigError::Invalid(format!("invalid http addr {:?}", self.addr)))
    }

    /// Normalized route prefix: empty, or `/segment` without a trailing slash
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.route_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}
