//! Configuration module for TenantGraph.
//!
//! This module handles loading and validating configuration from:
//! - YAML configuration files (`tenantgraph.yaml`)
//! - Environment variables
//! - CLI arguments
//!
//! # Configuration File Format
//!
//! ```yaml
//! # tenantgraph.yaml
//!
//! # Dependency collection
//! collector:
//!   max_concurrent_fetches: 8
//!   max_retries: 3
//!   initial_backoff_ms: 500
//!   backoff_multiplier: 2.0
//!   max_backoff_ms: 30000
//!   fetch_timeout_secs: 30
//!   store_timeout_secs: 60
//!   max_depth: 1
//!
//! # Cloud API
//! azure:
//!   management_endpoint: https://management.azure.com
//!   access_token: ${AZURE_ACCESS_TOKEN}
//!
//! # Graph store
//! neo4j:
//!   uri: http://localhost:7474
//!   database: neo4j
//!   user: neo4j
//!   password: ${NEO4J_PASSWORD}
//! ```

use crate::collector::RetryPolicy;
use crate::error::{Result, TenantGraphError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

/// Dependency collection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorOptions {
    /// Upper bound on concurrent fetches against the cloud API.
    pub max_concurrent_fetches: usize,

    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_backoff_ms: u64,

    /// Factor applied to the delay after every retry.
    pub backoff_multiplier: f64,

    /// Ceiling for a single backoff delay.
    pub max_backoff_ms: u64,

    /// Timeout for a single fetch attempt.
    pub fetch_timeout_secs: u64,

    /// Timeout for the batched existence check.
    pub store_timeout_secs: u64,

    /// Resolution depth. 1 fetches direct references only; larger values
    /// also follow references of fetched resources.
    pub max_depth: usize,

    /// Overall deadline for one collection call.
    pub deadline_secs: Option<u64>,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            max_retries: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            fetch_timeout_secs: 30,
            store_timeout_secs: 60,
            max_depth: 1,
            deadline_secs: None,
        }
    }
}

impl CollectorOptions {
    /// Retry policy for cloud fetches.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            attempt_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 {
            return Err(crate::err!(ConfigValue {
                key: "collector.max_concurrent_fetches".to_string(),
                message: "must be at least 1".to_string(),
            }));
        }
        if self.max_depth == 0 {
            return Err(crate::err!(ConfigValue {
                key: "collector.max_depth".to_string(),
                message: "must be at least 1".to_string(),
            }));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(crate::err!(ConfigValue {
                key: "collector.backoff_multiplier".to_string(),
                message: "must be >= 1.0".to_string(),
            }));
        }
        Ok(())
    }
}

/// Cloud API options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureOptions {
    /// Resource Manager endpoint.
    pub management_endpoint: String,

    /// Bearer token. Acquiring one is out of scope; pass it in.
    pub access_token: Option<String>,

    /// API version used when a type has no explicit entry.
    pub default_api_version: String,

    /// Per provider type API versions, e.g.
    /// `Microsoft.Network/virtualNetworks/subnets: 2023-09-01`.
    pub api_versions: HashMap<String, String>,
}

impl Default for AzureOptions {
    fn default() -> Self {
        Self {
            management_endpoint: "https://management.azure.com".to_string(),
            access_token: None,
            default_api_version: "2021-04-01".to_string(),
            api_versions: HashMap::new(),
        }
    }
}

/// Graph store options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jOptions {
    /// HTTP endpoint, e.g. `http://localhost:7474`.
    pub uri: Option<String>,

    /// Database name.
    pub database: String,

    /// Basic auth user.
    pub user: Option<String>,

    /// Basic auth password.
    pub password: Option<String>,
}

impl Default for Neo4jOptions {
    fn default() -> Self {
        Self {
            uri: None,
            database: "neo4j".to_string(),
            user: None,
            password: None,
        }
    }
}

/// Output options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Use colored output.
    pub colored: bool,

    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self { colored: true, pretty: true }
    }
}

/// Main configuration structure with nested sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dependency collection options
    pub collector: CollectorOptions,

    /// Cloud API options
    pub azure: AzureOptions,

    /// Graph store options
    pub neo4j: Neo4jOptions,

    /// Output options
    pub output: OutputOptions,
}

impl Config {
    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a value is out of range.
    pub fn from_yaml(content: &str) -> Result<Self> {
        tracing::debug!("Parsing configuration from YAML");
        let expanded = expand_env_vars(content);

        let config: Self = serde_yaml::from_str(&expanded).map_err(|e| {
            TenantGraphError::config_parse(e.to_string(), Some(Box::new(e)), file!(), line!())
        })?;
        config.collector.validate()?;

        tracing::debug!(
            max_concurrent_fetches = config.collector.max_concurrent_fetches,
            max_depth = config.collector.max_depth,
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    /// Generate an example YAML configuration.
    #[must_use]
    pub fn example_yaml() -> String {
        r"# TenantGraph Configuration File

# Dependency collection for filtered scans
collector:
  # Concurrent fetches against the cloud API
  max_concurrent_fetches: 8

  # Retries for throttled or failed fetches
  max_retries: 3
  initial_backoff_ms: 500
  backoff_multiplier: 2.0
  max_backoff_ms: 30000

  # Per-attempt fetch timeout and existence check timeout
  fetch_timeout_secs: 30
  store_timeout_secs: 60

  # 1 resolves direct references only
  max_depth: 1

  # Overall deadline for one collection (partial results after it)
  # deadline_secs: 300

# Cloud API
azure:
  management_endpoint: https://management.azure.com
  # access_token: ${AZURE_ACCESS_TOKEN}
  default_api_version: 2021-04-01
  # api_versions:
  #   Microsoft.Compute/virtualMachines: 2023-09-01
  #   Microsoft.Network/virtualNetworks/subnets: 2023-09-01

# Graph store (Neo4j HTTP endpoint)
neo4j:
  # uri: http://localhost:7474
  database: neo4j
  # user: neo4j
  # password: ${NEO4J_PASSWORD}

# Output options
output:
  colored: true
  pretty: true
"
        .to_string()
    }

    /// Merge CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &crate::cli::BuildArgs) {
        if let Some(n) = args.max_concurrent {
            self.collector.max_concurrent_fetches = n.max(1);
        }
        if let Some(depth) = args.max_depth {
            self.collector.max_depth = depth.max(1);
        }
        if let Some(secs) = args.deadline_secs {
            self.collector.deadline_secs = Some(secs);
        }
        if let Some(ref uri) = args.neo4j_uri {
            self.neo4j.uri = Some(uri.clone());
        }
    }

    /// Fill credentials that are not configured from the environment.
    pub fn load_credentials_from_env(&mut self) {
        let get_non_empty_env = |var: &str| -> Option<String> {
            std::env::var(var).ok().filter(|s| !s.is_empty())
        };

        if self.azure.access_token.is_none() {
            self.azure.access_token =
                get_non_empty_env("TG_AZURE_TOKEN").or_else(|| get_non_empty_env("AZURE_ACCESS_TOKEN"));
        }
        if self.neo4j.password.is_none() {
            self.neo4j.password = get_non_empty_env("TG_NEO4J_PASSWORD");
        }
        tracing::debug!(
            azure_token_set = self.azure.access_token.is_some(),
            neo4j_password_set = self.neo4j.password.is_some(),
            "Credential loading complete"
        );
    }
}

static BRACED_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid regex"));

static BARE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex"));

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. Unset variables are left as-is.
fn expand_env_vars(content: &str) -> String {
    let lookup = |name: &str, whole: &str| std::env::var(name).unwrap_or_else(|_| whole.to_string());

    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures<'_>| lookup(&caps[1], &caps[0]));
    BARE_VAR
        .replace_all(&braced, |caps: &regex::Captures<'_>| lookup(&caps[1], &caps[0]))
        .into_owned()
}
