//! `EngineConfig` and the raw key-value loader it's built from.
//!
//! Loading order is YAML file, then `.env` overlay, then environment
//! variables win. Collaborator-only keys (`security.*`) are carried through
//! `RawConfig` untouched; the core never interprets them.

use crate::error::ConfigurationError;
use crate::proxy::{ClientIpPolicy, TrustedEntry};
use http::HeaderName;
use std::collections::HashMap;
use std::path::Path;

/// A single configuration value, convertible to the handful of concrete
/// types the core's own keys need.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Bool(bool),
    List(Vec<ConfigValue>),
    Null,
}

impl ConfigValue {
    fn from_yaml(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Bool(b) => ConfigValue::Bool(*b),
            serde_yaml::Value::Number(n) => n
                .as_i64()
                .map(ConfigValue::Integer)
                .unwrap_or_else(|| ConfigValue::String(n.to_string())),
            serde_yaml::Value::String(s) => ConfigValue::String(s.clone()),
            serde_yaml::Value::Null => ConfigValue::Null,
            serde_yaml::Value::Sequence(seq) => {
                ConfigValue::List(seq.iter().map(ConfigValue::from_yaml).collect())
            }
            other => ConfigValue::String(format!("{other:?}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config key not found: {0}")]
    NotFound(String),
    #[error("config key {key:?} could not be read as {expected}")]
    TypeMismatch { key: String, expected: &'static str },
    #[error("failed to load configuration: {0}")]
    Load(String),
}

pub trait FromConfigValue: Sized {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError>;
}

impl FromConfigValue for String {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::String(s) => Ok(s.clone()),
            ConfigValue::Integer(i) => Ok(i.to_string()),
            ConfigValue::Bool(b) => Ok(b.to_string()),
            _ => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "String",
            }),
        }
    }
}

impl FromConfigValue for bool {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::Bool(b) => Ok(*b),
            ConfigValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(ConfigError::TypeMismatch {
                    key: key.to_string(),
                    expected: "bool",
                }),
            },
            _ => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "bool",
            }),
        }
    }
}

impl FromConfigValue for u64 {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::Integer(i) if *i >= 0 => Ok(*i as u64),
            ConfigValue::String(s) => s.parse().map_err(|_| ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "u64",
            }),
            _ => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "u64",
            }),
        }
    }
}

impl<T: FromConfigValue> FromConfigValue for Vec<T> {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| T::from_config_value(v, &format!("{key}[{i}]")))
                .collect(),
            other => Ok(vec![T::from_config_value(other, key)?]),
        }
    }
}

/// Raw, flattened (dot-separated-key) configuration values. Loaded from a
/// YAML file, a `.env` overlay, then environment variables — each step
/// overriding the last.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    values: HashMap<String, ConfigValue>,
}

impl RawConfig {
    pub fn empty() -> Self {
        RawConfig::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        let parsed: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Load(e.to_string()))?;
        flatten("", &parsed, &mut values);
        Ok(RawConfig { values })
    }

    /// Load `application.yaml` (if present) from the current directory,
    /// overlay any `.env` file (without clobbering already-set environment
    /// variables), then overlay `env::vars()` using the `routed.a.b` <->
    /// `ROUTED_A_B` convention.
    pub fn load() -> Result<Self, ConfigError> {
        let mut values = HashMap::new();

        let yaml_path = Path::new("application.yaml");
        if yaml_path.exists() {
            let content =
                std::fs::read_to_string(yaml_path).map_err(|e| ConfigError::Load(e.to_string()))?;
            let parsed: serde_yaml::Value =
                serde_yaml::from_str(&content).map_err(|e| ConfigError::Load(e.to_string()))?;
            flatten("", &parsed, &mut values);
        }

        let _ = dotenvy::dotenv();

        for (env_key, env_val) in std::env::vars() {
            if let Some(key) = env_key.strip_prefix("ROUTED_") {
                let config_key = key.to_lowercase().replace('_', ".");
                values.insert(config_key, ConfigValue::String(env_val));
            }
        }

        Ok(RawConfig { values })
    }

    pub fn set(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

fn flatten(prefix: &str, value: &serde_yaml::Value, out: &mut HashMap<String, ConfigValue>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                let key_str = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => format!("{other:?}"),
                };
                let full_key = if prefix.is_empty() {
                    key_str
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten(&full_key, v, out);
            }
        }
        leaf => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), ConfigValue::from_yaml(leaf));
            }
        }
    }
}

/// Features namespace under `EngineConfig`.
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    pub enable_proxy_support: bool,
    pub enable_trusted_platform: bool,
    pub enable_secure_request_ids: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            enable_proxy_support: false,
            enable_trusted_platform: false,
            enable_secure_request_ids: false,
        }
    }
}

/// Immutable-after-build engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub redirect_trailing_slash: bool,
    pub redirect_fixed_path: bool,
    pub handle_method_not_allowed: bool,
    pub forwarded_by_client_ip: bool,
    pub features: FeatureFlags,
    pub trusted_proxies: Vec<String>,
    pub trusted_platform: Option<String>,
    pub remote_ip_headers: Vec<String>,
    pub graceful_shutdown_grace_period_secs: u64,
    pub max_request_body_bytes: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            redirect_trailing_slash: true,
            redirect_fixed_path: false,
            handle_method_not_allowed: true,
            forwarded_by_client_ip: true,
            features: FeatureFlags::default(),
            trusted_proxies: Vec::new(),
            trusted_platform: None,
            remote_ip_headers: vec!["X-Forwarded-For".to_string(), "X-Real-IP".to_string()],
            graceful_shutdown_grace_period_secs: 30,
            max_request_body_bytes: None,
        }
    }
}

impl EngineConfig {
    /// Read the core's opaque keys out of `raw`, falling back
    /// to the documented defaults for anything absent. Everything else in
    /// `raw` (e.g. `security.*`) is left for collaborators to read directly.
    pub fn from_raw(raw: &RawConfig) -> Result<EngineConfig, ConfigurationError> {
        let defaults = EngineConfig::default();
        Ok(EngineConfig {
            redirect_trailing_slash: raw
                .get_or("redirectTrailingSlash", defaults.redirect_trailing_slash),
            redirect_fixed_path: raw.get_or("redirectFixedPath", defaults.redirect_fixed_path),
            handle_method_not_allowed: raw
                .get_or("handleMethodNotAllowed", defaults.handle_method_not_allowed),
            forwarded_by_client_ip: raw
                .get_or("forwardedByClientIP", defaults.forwarded_by_client_ip),
            features: FeatureFlags {
                enable_proxy_support: raw.get_or(
                    "features.enableProxySupport",
                    defaults.features.enable_proxy_support,
                ),
                enable_trusted_platform: raw.get_or(
                    "features.enableTrustedPlatform",
                    defaults.features.enable_trusted_platform,
                ),
                enable_secure_request_ids: raw.get_or(
                    "features.enableSecureRequestIds",
                    defaults.features.enable_secure_request_ids,
                ),
            },
            trusted_proxies: raw.get_or("trustedProxies", Vec::new()),
            trusted_platform: raw.get("trustedPlatform").ok(),
            remote_ip_headers: raw.get_or("remoteIPHeaders", defaults.remote_ip_headers),
            graceful_shutdown_grace_period_secs: raw.get_or(
                "gracefulShutdownGracePeriodSecs",
                defaults.graceful_shutdown_grace_period_secs,
            ),
            max_request_body_bytes: raw.get("security.maxRequestSize").ok(),
        })
    }

    /// Parse `trusted_proxies` and build the resolved client-IP policy used
    /// by `Context::client_ip`. Fatal at `build()` if an
    /// entry doesn't parse.
    pub fn client_ip_policy(&self) -> Result<ClientIpPolicy, ConfigurationError> {
        let trusted_proxies = self
            .trusted_proxies
            .iter()
            .map(|entry| {
                TrustedEntry::parse(entry)
                    .ok_or_else(|| ConfigurationError::InvalidTrustedProxy(entry.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let trusted_platform_header = self
            .trusted_platform
            .as_deref()
            .map(HeaderName::from_bytes)
            .transpose()
            .map_err(|_| {
                ConfigurationError::InvalidTrustedProxy(
                    self.trusted_platform.clone().unwrap_or_default(),
                )
            })?;

        let remote_ip_headers = self
            .remote_ip_headers
            .iter()
            .map(|h| HeaderName::from_bytes(h.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConfigurationError::InvalidTrustedProxy("remoteIPHeaders".to_string()))?;

        Ok(ClientIpPolicy {
            forwarded_by_client_ip: self.forwarded_by_client_ip,
            enable_proxy_support: self.features.enable_proxy_support,
            enable_trusted_platform: self.features.enable_trusted_platform,
            trusted_proxies,
            trusted_platform_header,
            remote_ip_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert!(config.redirect_trailing_slash);
        assert!(config.handle_method_not_allowed);
        assert_eq!(config.remote_ip_headers, vec!["X-Forwarded-For", "X-Real-IP"]);
    }

    #[test]
    fn raw_config_reads_nested_yaml_keys() {
        let raw = RawConfig::from_yaml_str(
            "redirectTrailingSlash: false\nfeatures:\n  enableProxySupport: true\n",
        )
        .unwrap();
        let config = EngineConfig::from_raw(&raw).unwrap();
        assert!(!config.redirect_trailing_slash);
        assert!(config.features.enable_proxy_support);
    }

    #[test]
    fn invalid_trusted_proxy_entry_is_a_configuration_error() {
        let mut raw = RawConfig::empty();
        raw.set(
            "trustedProxies",
            ConfigValue::List(vec![ConfigValue::String("not-an-ip".to_string())]),
        );
        let config = EngineConfig::from_raw(&raw).unwrap();
        assert!(config.client_ip_policy().is_err());
    }

    #[test]
    fn forwarded_by_client_ip_false_disables_proxy_header_resolution() {
        let mut raw = RawConfig::empty();
        raw.set("forwardedByClientIP", ConfigValue::Bool(false));
        raw.set(
            "features.enableProxySupport",
            ConfigValue::Bool(true),
        );
        raw.set(
            "trustedProxies",
            ConfigValue::List(vec![ConfigValue::String("10.0.0.0/8".to_string())]),
        );
        let config = EngineConfig::from_raw(&raw).unwrap();
        let policy = config.client_ip_policy().unwrap();

        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::HeaderName::from_static("x-forwarded-for"),
            http::HeaderValue::from_static("203.0.113.5"),
        );
        let remote: std::net::IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(policy.resolve(remote, &headers), remote);
    }
}
