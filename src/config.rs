//! # Gateway Configuration
//!
//! YAML-backed configuration for building a [`Pipeline`](crate::pipeline::Pipeline) and
//! for resolving method metadata.
//!
//! ## File format
//!
//! Every section is optional and falls back to its defaults:
//!
//! ```yaml
//! environment: production        # or development / prod / dev
//! middleware: audit              # name registered in a MiddlewareRegistry
//! cache:
//!   enabled: true
//!   capacity: 1024
//! rate_control:
//!   limit: 100                   # calls per interval and caller, 0 disables
//!   interval_secs: 60
//!   penalty_secs: 300            # block after exceeding, 0 = until window end
//! access:
//!   grants:
//!     alice: [orders.admin]
//!   hierarchy:
//!     orders.admin: [orders.read]
//! services:
//!   - class: Orders
//!     version: "1.0"
//!     methods:
//!       - name: list
//!         role: orders.read
//!         cache_ttl: 30
//!       - name: create
//!         http_method: POST
//!         status: { success: 201, error: 400, error_message: "Order rejected" }
//! ```
//!
//! `cache_ttl`, `interval_secs` and `penalty_secs` are capped at one year.
//!
//! ## Environment Variables
//!
//! Applied by [`GatewayConfig::load`] after the file is parsed:
//!
//! - `BRRTG_ENVIRONMENT` - `production`/`development` (or `prod`/`dev`)
//! - `BRRTG_MIDDLEWARE` - middleware name; an empty value removes the middleware
//! - `BRRTG_CACHE_CAPACITY` - maximum number of cached results
//!
//! The environment here is only the default a router stamps on the contexts it builds.
//! The pipeline itself reads the environment from each context.

use crate::cache::MAX_CACHE_TTL_SECS;
use crate::context::{Environment, MethodMetadata, StatusPolicy};
use crate::guards::MAX_WINDOW;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration load or validation error
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid YAML for [`GatewayConfig`]
    Parse(serde_yaml::Error),
    /// An environment override holds an unusable value
    InvalidOverride { var: &'static str, value: String },
    /// The configuration parsed but is inconsistent
    Invalid(String),
    /// `middleware` names an implementation that is not registered
    UnknownMiddleware {
        name: String,
        registered: Vec<String>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse(e) => write!(f, "invalid config: {e}"),
            ConfigError::InvalidOverride { var, value } => {
                write!(f, "invalid value '{value}' for {var}")
            }
            ConfigError::Invalid(reason) => write!(f, "invalid config: {reason}"),
            ConfigError::UnknownMiddleware { name, registered } => write!(
                f,
                "unknown middleware '{name}' (registered: [{}])",
                registered.join(", ")
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub environment: Environment,
    /// Name of the invocation middleware to use instead of direct invocation
    pub middleware: Option<String>,
    pub cache: CacheConfig,
    pub rate_control: RateControlConfig,
    pub access: AccessConfig,
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false a no-op cache is installed and nothing is ever stored
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateControlConfig {
    /// Calls allowed per caller and interval; 0 disables rate control
    pub limit: u32,
    pub interval_secs: u64,
    pub penalty_secs: u64,
}

impl Default for RateControlConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            interval_secs: 60,
            penalty_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Caller identity to granted roles
    pub grants: HashMap<String, Vec<String>>,
    /// Role to the roles it implies
    pub hierarchy: HashMap<String, Vec<String>>,
}

/// A service class and the methods it exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub class: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub methods: Vec<MethodConfig>,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodConfig {
    pub name: String,
    #[serde(default = "default_http_method")]
    pub http_method: String,
    /// Required role; empty means public
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub cache_ttl: u64,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub rate_control_exempt: bool,
}

fn default_http_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub success: u16,
    pub success_message: Option<String>,
    pub error: u16,
    pub error_message: Option<String>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        let policy = StatusPolicy::default();
        Self {
            success: policy.success,
            success_message: policy.success_message,
            error: policy.error,
            error_message: policy.error_message,
        }
    }
}

impl MethodConfig {
    /// Method metadata for this method on a service with `version`.
    #[must_use]
    pub fn metadata(&self, version: &str) -> MethodMetadata {
        MethodMetadata::new(version)
            .role(self.role.as_str())
            .cache_ttl(self.cache_ttl)
            .rate_control_exempt(self.rate_control_exempt)
            .status(StatusPolicy {
                success: self.status.success,
                success_message: self.status.success_message.clone(),
                error: self.status.error,
                error_message: self.status.error_message.clone(),
            })
    }
}

impl GatewayConfig {
    /// Load a config file, apply `BRRTG_*` overrides and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an override is invalid,
    /// or validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: GatewayConfig = serde_yaml::from_str(&raw).map_err(ConfigError::Parse)?;
        config.apply_overrides_from(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate YAML without consulting the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_yaml::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides, reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for an unparseable value.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BRRTG_ENVIRONMENT") {
            self.environment =
                Environment::parse(&value).ok_or(ConfigError::InvalidOverride {
                    var: "BRRTG_ENVIRONMENT",
                    value,
                })?;
        }
        if let Some(value) = lookup("BRRTG_MIDDLEWARE") {
            let value = value.trim();
            self.middleware = (!value.is_empty()).then(|| value.to_string());
        }
        if let Some(value) = lookup("BRRTG_CACHE_CAPACITY") {
            self.cache.capacity = value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                var: "BRRTG_CACHE_CAPACITY",
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    /// Check the configuration for inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_control.limit > 0 && self.rate_control.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_control.interval_secs must be positive when a limit is set".to_string(),
            ));
        }
        let rc = &self.rate_control;
        let windows = [
            ("interval_secs", rc.interval_secs),
            ("penalty_secs", rc.penalty_secs),
        ];
        for (name, secs) in windows {
            if secs > MAX_WINDOW.as_secs() {
                return Err(ConfigError::Invalid(format!(
                    "rate_control.{name} must not exceed {}",
                    MAX_WINDOW.as_secs()
                )));
            }
        }
        let mut classes = HashSet::new();
        for service in &self.services {
            if service.class.trim().is_empty() {
                return Err(ConfigError::Invalid("service with empty class name".to_string()));
            }
            if !classes.insert(service.class.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "service '{}' is declared twice",
                    service.class
                )));
            }
            let mut methods = HashSet::new();
            for method in &service.methods {
                if !methods.insert(method.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "method '{}.{}' is declared twice",
                        service.class, method.name
                    )));
                }
                if http::Method::from_bytes(method.http_method.as_bytes()).is_err() {
                    return Err(ConfigError::Invalid(format!(
                        "method '{}.{}' has invalid http_method '{}'",
                        service.class, method.name, method.http_method
                    )));
                }
                if method.cache_ttl > MAX_CACHE_TTL_SECS {
                    return Err(ConfigError::Invalid(format!(
                        "method '{}.{}' has cache_ttl {} above the maximum of {MAX_CACHE_TTL_SECS}",
                        service.class, method.name, method.cache_ttl
                    )));
                }
                for code in [method.status.success, method.status.error] {
                    if !(100..=599).contains(&code) {
                        return Err(ConfigError::Invalid(format!(
                            "method '{}.{}' has invalid status {code}",
                            service.class, method.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn find_service(&self, class: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.class == class)
    }

    /// Look up a method by class and method name.
    #[must_use]
    pub fn find_method(&self, class: &str, method: &str) -> Option<(&ServiceConfig, &MethodConfig)> {
        let service = self.find_service(class)?;
        service
            .methods
            .iter()
            .find(|m| m.name == method)
            .map(|m| (service, m))
    }

    /// Total number of configured methods
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.services.iter().map(|s| s.methods.len()).sum()
    }
}
