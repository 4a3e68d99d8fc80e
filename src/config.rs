//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::Result;
use crate::ratelimit::{RateLimitPolicy, RouteRule, RouteRules};

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Honor X-Forwarded-For / X-Real-Ip when deriving client keys.
    /// Only enable behind a trusted proxy; the headers are spoofable.
    #[serde(default)]
    pub trust_forwarded_headers: bool,

    /// Background sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Default limit for routes without a matching rule
    #[serde(default = "default_max_requests")]
    pub default_max_requests: u64,

    /// Default window in milliseconds for routes without a matching rule
    #[serde(default = "default_window_ms")]
    pub default_window_ms: u64,

    /// Ordered route rules, first match wins
    #[serde(default)]
    pub rules: Vec<RouteRule>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_headers: false,
            sweep_interval_secs: default_sweep_interval(),
            default_max_requests: default_max_requests(),
            default_window_ms: default_window_ms(),
            rules: Vec::new(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_max_requests() -> u64 {
    60
}

fn default_window_ms() -> u64 {
    60000
}

impl RateLimitingConfig {
    /// The fallback policy for unmatched routes.
    pub fn default_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(self.default_max_requests, self.default_window_ms)
    }

    /// Build the validated rule table. Fails on zero-valued policies or
    /// unknown methods so misconfiguration aborts startup instead of
    /// weakening limits.
    pub fn route_rules(&self) -> Result<RouteRules> {
        RouteRules::new(self.default_policy(), self.rules.clone())
    }
}

impl FloodgateConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: FloodgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::FloodgateError::Config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FloodgateConfig::default();
        assert_eq!(config.server.listen_addr, default_listen_addr());
        assert!(!config.rate_limiting.trust_forwarded_headers);
        assert_eq!(config.rate_limiting.sweep_interval_secs, 60);
        assert_eq!(
            config.rate_limiting.default_policy(),
            RateLimitPolicy::new(60, 60000)
        );
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  listen_addr: 0.0.0.0:9000
rate_limiting:
  trust_forwarded_headers: true
  sweep_interval_secs: 30
  default_max_requests: 120
  default_window_ms: 60000
  rules:
    - methods: [POST, DELETE]
      path_prefix: /v1/check
      max_requests: 20
      window_ms: 10000
"#;
        let config: FloodgateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:9000".parse().unwrap());
        assert!(config.rate_limiting.trust_forwarded_headers);

        let rules = config.rate_limiting.route_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.default_policy().max_requests, 120);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
rate_limiting:
  default_max_requests: 10
"#;
        let config: FloodgateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.listen_addr, default_listen_addr());
        assert_eq!(config.rate_limiting.default_max_requests, 10);
        assert_eq!(config.rate_limiting.default_window_ms, 60000);
    }

    #[test]
    fn test_invalid_rule_fails_rule_building() {
        let yaml = r#"
rate_limiting:
  rules:
    - path_prefix: /api
      max_requests: 0
      window_ms: 60000
"#;
        let config: FloodgateConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.rate_limiting.route_rules().is_err());
    }
}
