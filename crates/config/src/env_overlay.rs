//! Environment variable overrides for [`crate::CoordinatorConfig`], applied
//! once at startup after the TOML file loads. Keys use a double-underscore
//! path separator under [`crate::ENV_PREFIX`], e.g.
//! `COORDINATOR__LIFECYCLE__MAX_ATTEMPTS=5`.

use crate::{ConfigError, CoordinatorConfig, ENV_PREFIX};

/// Applies every `COORDINATOR__...` variable in `vars` onto `config`.
/// Unrecognized keys are rejected so a typo'd override fails loudly at
/// startup instead of being silently ignored.
pub fn apply_env_overrides(
    config: &mut CoordinatorConfig,
    vars: impl Iterator<Item = (String, String)>,
) -> Result<(), ConfigError> {
    for (key, value) in vars {
        let Some(path) = key.strip_prefix(ENV_PREFIX) else { continue };
        apply_one(config, &path.to_lowercase(), &value)?;
    }
    Ok(())
}

fn apply_one(config: &mut CoordinatorConfig, path: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidOverride { key: path.to_owned(), value: value.to_owned(), reason: reason.to_owned() };
    let parse_u64 = |v: &str| v.parse::<u64>().map_err(|e| invalid(&e.to_string()));
    let parse_u32 = |v: &str| v.parse::<u32>().map_err(|e| invalid(&e.to_string()));
    let parse_usize = |v: &str| v.parse::<usize>().map_err(|e| invalid(&e.to_string()));

    match path {
        "queue__job_default_ttl_ms" => config.queue.job_default_ttl_ms = parse_u64(value)?,
        "queue__max_job_payload_bytes" => config.queue.max_job_payload_bytes = parse_usize(value)?,
        "queue__tenant_open_jobs_max" => config.queue.tenant_open_jobs_max = parse_usize(value)?,

        "lifecycle__attempt_timeout_ms" => config.lifecycle.attempt_timeout_ms = parse_u64(value)?,
        "lifecycle__max_attempts" => config.lifecycle.max_attempts = parse_u32(value)?,
        "lifecycle__timer_scan_interval_ms" => config.lifecycle.timer_scan_interval_ms = parse_u64(value)?,
        "lifecycle__timer_batch_max" => config.lifecycle.timer_batch_max = parse_usize(value)?,

        "registry__miner_liveness_timeout_ms" => config.registry.miner_liveness_timeout_ms = parse_u64(value)?,
        "registry__heartbeat_scan_interval_ms" => config.registry.heartbeat_scan_interval_ms = parse_u64(value)?,

        "rpc__listen_addr" => config.rpc.listen_addr = value.to_owned(),
        "rpc__observability_listen_addr" => config.rpc.observability_listen_addr = value.to_owned(),
        "rpc__poll_long_wait_ms_max" => config.rpc.poll_long_wait_ms_max = parse_u64(value)?,

        "signer__signing_key_path" => config.signer.signing_key_path = value.into(),
        "signer__signing_key_id" => config.signer.signing_key_id = value.to_owned(),

        "error_handling__store_retry_max" => config.error_handling.store_retry_max = parse_u32(value)?,

        other => return Err(invalid(&format!("unrecognized config key {other}"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_a_nested_field_by_dotted_path() {
        let mut config = CoordinatorConfig::default();
        let vars = vec![("COORDINATOR__LIFECYCLE__MAX_ATTEMPTS".to_owned(), "7".to_owned())].into_iter();
        apply_env_overrides(&mut config, vars).unwrap();
        assert_eq!(config.lifecycle.max_attempts, 7);
    }

    #[test]
    fn ignores_variables_outside_the_prefix() {
        let mut config = CoordinatorConfig::default();
        let vars = vec![("PATH".to_owned(), "/usr/bin".to_owned())].into_iter();
        apply_env_overrides(&mut config, vars).unwrap();
        assert_eq!(config, CoordinatorConfig::default());
    }

    #[test]
    fn rejects_an_unrecognized_key() {
        let mut config = CoordinatorConfig::default();
        let vars = vec![("COORDINATOR__NOT_A_REAL_KEY".to_owned(), "1".to_owned())].into_iter();
        assert!(matches!(apply_env_overrides(&mut config, vars), Err(ConfigError::InvalidOverride { .. })));
    }

    #[test]
    fn rejects_a_non_numeric_value_for_a_numeric_field() {
        let mut config = CoordinatorConfig::default();
        let vars = vec![("COORDINATOR__LIFECYCLE__MAX_ATTEMPTS".to_owned(), "not-a-number".to_owned())].into_iter();
        assert!(matches!(apply_env_overrides(&mut config, vars), Err(ConfigError::InvalidOverride { .. })));
    }
}
