//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (prefix: `THUNDER_`)
//! 2. `./config.toml` in the current working directory
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Root configuration for the Thunder core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThunderConfig {
    /// Service-level settings (name, port, log level).
    pub service: ServiceConfig,

    /// Security pipeline settings (bearer verifier, scope policy, public paths).
    pub security: SecurityConfig,

    /// Observability fan-out settings (console/file/otel sinks).
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Flow engine settings (graph directory, default handle).
    #[serde(default)]
    pub flow: FlowConfig,
}

/// Service-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_port(),
            log_level: default_log_level(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Bearer-JWT verifier key material and algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerVerifierConfig {
    /// Path to the public key (or HMAC secret file) used to verify signatures.
    #[serde(default = "default_public_key_path")]
    pub public_key_path: PathBuf,

    /// Verification algorithm (RS256, ES256, HS256, ...).
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,

    #[serde(default)]
    pub issuer: Option<String>,

    #[serde(default)]
    pub audience: Option<String>,
}

impl Default for BearerVerifierConfig {
    fn default() -> Self {
        Self {
            public_key_path: default_public_key_path(),
            algorithm: default_jwt_algorithm(),
            issuer: None,
            audience: None,
        }
    }
}

/// Exemptions from the default "protected paths require the `system` scope" policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredScopesPolicyConfig {
    /// Path prefixes that require no scopes at all (self-service paths).
    #[serde(default = "default_self_service_prefixes")]
    pub self_service_prefixes: Vec<String>,

    /// Scope required for every other protected path.
    #[serde(default = "default_system_scope")]
    pub default_scope: String,
}

impl Default for RequiredScopesPolicyConfig {
    fn default() -> Self {
        Self {
            self_service_prefixes: default_self_service_prefixes(),
            default_scope: default_system_scope(),
        }
    }
}

/// Security pipeline configuration (C4/C5/C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub bearer_verifier: BearerVerifierConfig,

    #[serde(default)]
    pub required_scopes_policy: RequiredScopesPolicyConfig,

    /// Wildcard path patterns that bypass authentication entirely (C4).
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            bearer_verifier: BearerVerifierConfig::default(),
            required_scopes_policy: RequiredScopesPolicyConfig::default(),
            public_paths: default_public_paths(),
        }
    }
}

/// Failure mode for subscriber initialization (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    Strict,
    Lenient,
}

impl Default for FailureMode {
    fn default() -> Self {
        FailureMode::Lenient
    }
}

/// Per-sink configuration (console/file/otel share this shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,

    /// `json` (default) or `csv`.
    #[serde(default = "default_format")]
    pub format: String,

    /// Category tags this sink subscribes to; `*` subscribes to everything.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// File sink destination path (ignored by other sinks).
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// OTLP endpoint (ignored by non-tracing sinks).
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            format: default_format(),
            categories: default_categories(),
            path: None,
            endpoint: None,
        }
    }
}

/// Observability fan-out configuration (C2/C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub failure_mode: FailureMode,

    #[serde(default)]
    pub console: SinkConfig,

    #[serde(default)]
    pub file: SinkConfig,

    #[serde(default)]
    pub otel: SinkConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_mode: FailureMode::default(),
            console: SinkConfig {
                enabled: true,
                categories: vec!["*".to_string()],
                ..SinkConfig::default()
            },
            file: SinkConfig::default(),
            otel: SinkConfig::default(),
        }
    }
}

/// Flow engine configuration (C8/C9/C11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Directory of JSON graph definition files, loaded at startup.
    #[serde(default = "default_graph_directory")]
    pub graph_directory: PathBuf,

    /// Graph ID served when a `/flow/execute` request omits `graph_id`.
    #[serde(default)]
    pub default_auth_flow_handle: Option<String>,

    /// Whether to auto-derive a registration graph for authentication graphs
    /// that lack one (§4.6).
    #[serde(default = "default_true")]
    pub auto_infer_registration: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            graph_directory: default_graph_directory(),
            default_auth_flow_handle: None,
            auto_infer_registration: true,
        }
    }
}

fn default_service_name() -> String {
    "thunder".to_string()
}

fn default_port() -> u16 {
    8443
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_public_key_path() -> PathBuf {
    PathBuf::from("./keys/jwt-public.pem")
}

fn default_jwt_algorithm() -> String {
    "RS256".to_string()
}

fn default_self_service_prefixes() -> Vec<String> {
    vec!["/users/me".to_string()]
}

fn default_system_scope() -> String {
    "system".to_string()
}

fn default_public_paths() -> Vec<String> {
    vec![
        "/health/liveness".to_string(),
        "/health/readiness".to_string(),
        "/flow/execute".to_string(),
        "/authn/**".to_string(),
        "/registration/**".to_string(),
        "/oauth2/**".to_string(),
        "/.well-known/**".to_string(),
        "/i18n/**".to_string(),
        "/branding/**".to_string(),
        "/internal/**".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_format() -> String {
    "json".to_string()
}

fn default_categories() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_graph_directory() -> PathBuf {
    PathBuf::from("./graphs")
}

impl ThunderConfig {
    /// Load configuration from `./config.toml` plus `THUNDER_`-prefixed
    /// environment variables, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load configuration from a specific file (bypasses the default search
    /// path; useful for tests and non-standard deployments).
    pub fn load_from(path: &str) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(ThunderConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("THUNDER_").split("_"));

        figment
            .extract()
            .map_err(|e| crate::error::Error::Config(e.to_string()))
    }
}

impl Default for ThunderConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
            flow: FlowConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_runnable() {
        let config = ThunderConfig::default();
        assert_eq!(config.service.port, 8443);
        assert_eq!(config.security.required_scopes_policy.default_scope, "system");
        assert!(config.security.public_paths.contains(&"/health/liveness".to_string()));
        assert!(config.observability.console.enabled);
        assert!(config.flow.auto_infer_registration);
    }

    #[test]
    fn load_from_missing_file_falls_back_to_defaults() {
        let config = ThunderConfig::load_from("does-not-exist.toml").unwrap();
        assert_eq!(config.service.name, "thunder");
    }

    #[test]
    fn env_override_takes_precedence() {
        std::env::set_var("THUNDER_SERVICE_PORT", "9999");
        let config = ThunderConfig::load_from("does-not-exist.toml").unwrap();
        std::env::remove_var("THUNDER_SERVICE_PORT");
        assert_eq!(config.service.port, 9999);
    }
}
