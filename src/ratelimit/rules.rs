//! Route rule configuration and matching.
//!
//! Rules map an HTTP method + path prefix to a rate limit policy. The rule
//! set is an ordered list evaluated first-match-wins, with a default policy
//! for anything unmatched. Matching is pure data over method and path, so
//! stricter limits for mutating endpoints are a configuration concern.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};

/// A per-route rate limit policy: at most `max_requests` admitted per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum requests admitted per window
    pub max_requests: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimitPolicy {
    /// Create a new policy.
    pub fn new(max_requests: u64, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// The window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// A zero limit or zero window is a caller programming error. The
    /// limiter treats such a policy as always-deny; configuration loading
    /// rejects it outright.
    pub fn is_valid(&self) -> bool {
        self.max_requests > 0 && self.window_ms > 0
    }

    /// Validate the policy, failing startup on misconfiguration.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(FloodgateError::Rule(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(FloodgateError::Rule(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A single route rule as it appears in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    /// HTTP methods this rule applies to (empty matches any method)
    #[serde(default)]
    pub methods: Vec<String>,
    /// Path prefix this rule applies to
    pub path_prefix: String,
    /// Maximum requests admitted per window
    pub max_requests: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

/// A rule compiled for matching: methods parsed, policy extracted.
#[derive(Debug, Clone)]
struct CompiledRule {
    methods: Vec<Method>,
    path_prefix: String,
    policy: RateLimitPolicy,
}

impl CompiledRule {
    fn matches(&self, method: &Method, path: &str) -> bool {
        (self.methods.is_empty() || self.methods.contains(method))
            && path.starts_with(&self.path_prefix)
    }
}

/// YAML document shape for a standalone rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleSetFile {
    /// Fallback policy for unmatched routes
    default: RateLimitPolicy,
    /// Ordered route rules, first match wins
    #[serde(default)]
    rules: Vec<RouteRule>,
}

/// An ordered set of route rules with a default fallback policy.
///
/// All policies are validated at construction; a rule set that would
/// disable limiting (zero limit or window) never makes it into service.
#[derive(Debug, Clone)]
pub struct RouteRules {
    rules: Vec<CompiledRule>,
    default_policy: RateLimitPolicy,
}

impl RouteRules {
    /// Build a validated rule set from a default policy and rule list.
    pub fn new(default_policy: RateLimitPolicy, rules: Vec<RouteRule>) -> Result<Self> {
        default_policy.validate()?;

        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let policy = RateLimitPolicy::new(rule.max_requests, rule.window_ms);
            policy
                .validate()
                .map_err(|e| FloodgateError::Rule(format!("{} ({})", e, rule.path_prefix)))?;

            let methods = rule
                .methods
                .iter()
                .map(|m| parse_method(m))
                .collect::<Result<Vec<_>>>()?;

            compiled.push(CompiledRule {
                methods,
                path_prefix: rule.path_prefix,
                policy,
            });
        }

        Ok(Self {
            rules: compiled,
            default_policy,
        })
    }

    /// Load a rule set from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading route rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a rule set from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: RuleSetFile = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse route rules: {}", e)))?;
        Self::new(file.default, file.rules)
    }

    /// Resolve the policy for a request. Rules are checked in declaration
    /// order; the first match wins, otherwise the default applies.
    pub fn resolve(&self, method: &Method, path: &str) -> RateLimitPolicy {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map(|rule| rule.policy)
            .unwrap_or(self.default_policy)
    }

    /// The fallback policy for unmatched routes.
    pub fn default_policy(&self) -> RateLimitPolicy {
        self.default_policy
    }

    /// Number of configured rules (excluding the default).
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether any explicit rules are configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Parse an HTTP method name, rejecting non-standard tokens. Shared by
/// rule loading and the decision API so neither side accepts a method the
/// other could never match.
pub(crate) fn parse_method(s: &str) -> Result<Method> {
    match s.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        "OPTIONS" => Ok(Method::OPTIONS),
        "TRACE" => Ok(Method::TRACE),
        "CONNECT" => Ok(Method::CONNECT),
        other => Err(FloodgateError::Rule(format!(
            "unknown HTTP method '{}' in route rule",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_rules() {
        let yaml = r#"
default:
  max_requests: 60
  window_ms: 60000
rules:
  - methods: [POST]
    path_prefix: /api/jobs
    max_requests: 10
    window_ms: 60000
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.default_policy(), RateLimitPolicy::new(60, 60000));
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let yaml = r#"
default:
  max_requests: 100
  window_ms: 60000
rules:
  - methods: [DELETE]
    path_prefix: /api/jobs
    max_requests: 5
    window_ms: 60000
  - path_prefix: /api/jobs
    max_requests: 30
    window_ms: 60000
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();

        // DELETE hits the stricter rule declared first
        let policy = rules.resolve(&Method::DELETE, "/api/jobs/42");
        assert_eq!(policy.max_requests, 5);

        // Other methods fall through to the any-method rule
        let policy = rules.resolve(&Method::GET, "/api/jobs");
        assert_eq!(policy.max_requests, 30);
    }

    #[test]
    fn test_resolve_default_fallback() {
        let yaml = r#"
default:
  max_requests: 100
  window_ms: 60000
rules:
  - path_prefix: /api/jobs
    max_requests: 30
    window_ms: 60000
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();

        let policy = rules.resolve(&Method::GET, "/api/courses");
        assert_eq!(policy, rules.default_policy());
    }

    #[test]
    fn test_empty_methods_matches_any() {
        let yaml = r#"
default:
  max_requests: 100
  window_ms: 60000
rules:
  - path_prefix: /api
    max_requests: 10
    window_ms: 1000
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();

        for method in [Method::GET, Method::POST, Method::DELETE] {
            assert_eq!(rules.resolve(&method, "/api/x").max_requests, 10);
        }
    }

    #[test]
    fn test_zero_limit_rejected() {
        let result = RouteRules::new(
            RateLimitPolicy::new(100, 60000),
            vec![RouteRule {
                methods: vec![],
                path_prefix: "/api".to_string(),
                max_requests: 0,
                window_ms: 60000,
            }],
        );
        assert!(matches!(result, Err(FloodgateError::Rule(_))));
    }

    #[test]
    fn test_zero_window_default_rejected() {
        let result = RouteRules::new(RateLimitPolicy::new(100, 0), vec![]);
        assert!(matches!(result, Err(FloodgateError::Rule(_))));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let yaml = r#"
default:
  max_requests: 100
  window_ms: 60000
rules:
  - methods: [FETCH]
    path_prefix: /api
    max_requests: 10
    window_ms: 60000
"#;
        let result = RouteRules::from_yaml(yaml);
        assert!(matches!(result, Err(FloodgateError::Rule(_))));
    }

    #[test]
    fn test_method_parsing_case_insensitive() {
        let yaml = r#"
default:
  max_requests: 100
  window_ms: 60000
rules:
  - methods: [post, delete]
    path_prefix: /api
    max_requests: 10
    window_ms: 60000
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.resolve(&Method::POST, "/api/x").max_requests, 10);
        assert_eq!(rules.resolve(&Method::GET, "/api/x").max_requests, 100);
    }
}
