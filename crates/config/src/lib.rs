//! The coordinator's typed configuration surface: a TOML file deserialized
//! via `serde` + `toml`, with every option defaulted to a documented value
//! and overridable by an environment variable under a fixed prefix, read
//! once at startup.
//!
//! `coordinator-node` is the only crate that constructs [`CoordinatorConfig`]
//! and hands its sections to the components that need them — no component
//! reads environment variables or files itself.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod env_overlay;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use coordinator_lifecycle::LifecycleConfig;
use coordinator_queue::QueueConfig;
use serde::{Deserialize, Serialize};

pub use env_overlay::apply_env_overrides;

/// Environment variable prefix read by [`apply_env_overrides`], e.g.
/// `COORDINATOR__REGISTRY__MINER_LIVENESS_TIMEOUT_MS=60000`.
pub const ENV_PREFIX: &str = "COORDINATOR__";

/// Errors loading or validating a [`CoordinatorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file's contents were not valid TOML for [`CoordinatorConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
    /// An environment variable override could not be applied.
    #[error("invalid override {key}={value}: {reason}")]
    InvalidOverride {
        /// The dotted config key the override targeted.
        key: String,
        /// The raw environment variable value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// `signing_key_path`/`signing_key_id` were left empty; the coordinator
    /// refuses to start without them.
    #[error("signer.signing_key_path and signer.signing_key_id are required")]
    MissingSigningKey,
}

/// Dispatch and liveness knobs owned by `coordinator-registry`'s caller
/// (`coordinator-node`), since the registry crate itself takes these as
/// plain arguments rather than storing a config struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RegistrySection {
    /// A miner with no heartbeat for this long is considered offline.
    pub miner_liveness_timeout_ms: u64,
    /// How often the background liveness sweep runs.
    pub heartbeat_scan_interval_ms: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self { miner_liveness_timeout_ms: 30_000, heartbeat_scan_interval_ms: 5_000 }
    }
}

/// One rate-limit bucket: `tokens` capacity, refilled at `refill_per_sec`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimit {
    /// Bucket capacity.
    pub tokens: u32,
    /// Tokens added back per second.
    pub refill_per_sec: f64,
}

/// RPC surface knobs: listen address, long-poll ceiling, and per
/// endpoint-class token-bucket rate limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RpcSection {
    /// Address the JSON-RPC HTTP server binds.
    pub listen_addr: String,
    /// Address the `/metrics` and `/healthz/*` HTTP server binds.
    pub observability_listen_addr: String,
    /// Ceiling on how long `miner_poll` may long-poll before returning empty.
    pub poll_long_wait_ms_max: u64,
    /// Rate limit per endpoint class (`"client"`, `"miner"`, `"operator"`).
    pub rate_limits: BTreeMap<String, RateLimit>,
}

impl Default for RpcSection {
    fn default() -> Self {
        let mut rate_limits = BTreeMap::new();
        rate_limits.insert("client".to_owned(), RateLimit { tokens: 100, refill_per_sec: 20.0 });
        rate_limits.insert("miner".to_owned(), RateLimit { tokens: 200, refill_per_sec: 50.0 });
        rate_limits.insert("operator".to_owned(), RateLimit { tokens: 20, refill_per_sec: 5.0 });
        Self {
            listen_addr: "127.0.0.1:8545".to_owned(),
            observability_listen_addr: "127.0.0.1:9100".to_owned(),
            poll_long_wait_ms_max: 10_000,
            rate_limits,
        }
    }
}

/// Signer key material location. Required: the coordinator refuses to start
/// without both fields populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SignerSection {
    /// Path to the raw 32-byte Ed25519 seed file.
    pub signing_key_path: PathBuf,
    /// Identifier recorded on receipts sealed with this key.
    pub signing_key_id: String,
}

impl Default for SignerSection {
    fn default() -> Self {
        Self { signing_key_path: PathBuf::new(), signing_key_id: String::new() }
    }
}

/// One configured caller: the `api_key` maps to this tenant scope.
/// Loaded once at startup into a `StaticKeyIdentityProvider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IdentityEntry {
    /// Tenant the caller is scoped to.
    pub tenant_id: String,
    /// Identifier recorded on jobs/payments the caller submits.
    pub caller_id: String,
    /// Whether this caller may call `operator_*` methods.
    #[serde(default)]
    pub is_operator: bool,
}

/// Static `api_key -> IdentityEntry` map read from `[identity.keys]`.
/// A structural, not scalar, section: it is populated entirely from the
/// config file, not from environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct IdentitySection {
    /// `api_key -> tenant scope`.
    pub keys: BTreeMap<String, IdentityEntry>,
}

/// Bounded retries for transient Store dependency errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ErrorHandlingSection {
    /// Maximum retries for a Store call that failed transiently.
    pub store_retry_max: u32,
}

impl Default for ErrorHandlingSection {
    fn default() -> Self {
        Self { store_retry_max: 3 }
    }
}

/// The coordinator's complete, validated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CoordinatorConfig {
    /// Job admission knobs.
    pub queue: QueueConfig,
    /// Job transition/timer knobs.
    pub lifecycle: LifecycleConfig,
    /// Miner liveness knobs.
    pub registry: RegistrySection,
    /// RPC surface knobs.
    pub rpc: RpcSection,
    /// Signing key location.
    pub signer: SignerSection,
    /// Static API-key to tenant-scope map.
    pub identity: IdentitySection,
    /// Retry policy for transient dependency errors.
    pub error_handling: ErrorHandlingSection,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            lifecycle: LifecycleConfig::default(),
            registry: RegistrySection::default(),
            rpc: RpcSection::default(),
            signer: SignerSection::default(),
            identity: IdentitySection::default(),
            error_handling: ErrorHandlingSection::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Loads configuration from `path`, applies environment overrides under
    /// [`ENV_PREFIX`], and validates required fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_owned(), source })?;
        let mut config: Self =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.to_owned(), source })?;
        apply_env_overrides(&mut config, std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants `serde` defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signer.signing_key_path.as_os_str().is_empty() || self.signer.signing_key_id.is_empty() {
            return Err(ConfigError::MissingSigningKey);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.registry.miner_liveness_timeout_ms, 30_000);
        assert_eq!(config.registry.heartbeat_scan_interval_ms, 5_000);
        assert_eq!(config.lifecycle.attempt_timeout_ms, 120_000);
        assert_eq!(config.lifecycle.max_attempts, 3);
        assert_eq!(config.queue.job_default_ttl_ms, 900_000);
        assert_eq!(config.queue.max_job_payload_bytes, 65_536);
        assert_eq!(config.queue.tenant_open_jobs_max, 1_000);
        assert_eq!(config.rpc.poll_long_wait_ms_max, 10_000);
        assert_eq!(config.error_handling.store_retry_max, 3);
    }

    #[test]
    fn validate_rejects_a_missing_signing_key() {
        let config = CoordinatorConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingSigningKey)));
    }

    #[test]
    fn load_reads_a_toml_file_and_applies_required_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.toml");
        std::fs::write(
            &path,
            r#"
            [signer]
            signing_key_path = "/etc/coordinator/signing.key"
            signing_key_id = "key-1"

            [lifecycle]
            attempt_timeout_ms = 60000
            max_attempts = 5
            timer_scan_interval_ms = 1000
            timer_batch_max = 500
            "#,
        )
        .unwrap();

        let config = CoordinatorConfig::load(&path).unwrap();
        assert_eq!(config.signer.signing_key_id, "key-1");
        assert_eq!(config.lifecycle.max_attempts, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.queue.job_default_ttl_ms, 900_000);
    }

    #[test]
    fn load_fails_without_a_signing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.toml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(CoordinatorConfig::load(&path), Err(ConfigError::MissingSigningKey)));
    }
}
