// ABOUTME: Configuration loading and validation for the savekeep coordinator.
// ABOUTME: Reads SAVEKEEP_* environment variables, falling back to defaults for anything unset.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use savekeep_core::{Obfuscator, Plaintext, SlotError, SlotId, XorObfuscator};
use thiserror::Error;

/// Key used when SAVEKEEP_KEY is not set.
pub const DEFAULT_OBFUSCATION_KEY: &str = "savekeep-default-obfuscation-key";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid number: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("SAVEKEEP_MAX_RETRY_ATTEMPTS must be at least 1")]
    NoAttempts,

    #[error("operation timeout {operation:?} must be longer than the save collection window {save:?}")]
    TimeoutOrder { operation: Duration, save: Duration },

    #[error("SAVEKEEP_QUICK_SLOT is invalid: {0}")]
    QuickSlot(#[from] SlotError),
}

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct SavekeepConfig {
    /// Preferred save directory.
    pub home: PathBuf,
    /// Used when `home` is not writable.
    pub fallback_home: PathBuf,
    /// Length of the response collection window during a save.
    pub save_timeout: Duration,
    /// Upper bound on a single save or load attempt.
    pub operation_timeout: Duration,
    pub max_retry_attempts: u32,
    pub retry_delay: Duration,
    pub scene_load_timeout: Duration,
    /// Pause after a scene finishes loading, before restore data is sent.
    pub scene_settle_delay: Duration,
    /// Pause after publishing load data.
    pub load_settle_delay: Duration,
    /// Poll interval while waiting for a scene transition.
    pub tick: Duration,
    /// Soft ceiling on serialized save size; larger saves only warn.
    pub max_save_bytes: u64,
    pub obfuscate: bool,
    pub obfuscation_key: String,
    pub quick_slot: SlotId,
    /// Slots 1..=max_slots are covered by list and validation.
    pub max_slots: u32,
}

impl Default for SavekeepConfig {
    fn default() -> Self {
        Self {
            home: default_home(&|k: &str| std::env::var(k).ok()),
            fallback_home: std::env::temp_dir().join("savekeep"),
            save_timeout: Duration::from_millis(2000),
            operation_timeout: Duration::from_millis(60_000),
            max_retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            scene_load_timeout: Duration::from_millis(30_000),
            scene_settle_delay: Duration::from_millis(500),
            load_settle_delay: Duration::from_millis(100),
            tick: Duration::from_millis(16),
            max_save_bytes: 10 * 1024 * 1024,
            obfuscate: true,
            obfuscation_key: DEFAULT_OBFUSCATION_KEY.to_string(),
            quick_slot: SlotId::FIRST,
            max_slots: 10,
        }
    }
}

impl SavekeepConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - SAVEKEEP_HOME: save directory (default: $XDG_DATA_HOME/savekeep or ~/.local/share/savekeep)
    /// - SAVEKEEP_SAVE_TIMEOUT_MS: response collection window (default: 2000)
    /// - SAVEKEEP_OPERATION_TIMEOUT_MS: per-attempt limit (default: 60000)
    /// - SAVEKEEP_MAX_RETRY_ATTEMPTS: attempts per operation (default: 3)
    /// - SAVEKEEP_RETRY_DELAY_MS: pause between attempts (default: 1000)
    /// - SAVEKEEP_SCENE_LOAD_TIMEOUT_MS: scene transition limit (default: 30000)
    /// - SAVEKEEP_SCENE_SETTLE_MS: pause after a scene loads (default: 500)
    /// - SAVEKEEP_LOAD_SETTLE_MS: pause after load data is published (default: 100)
    /// - SAVEKEEP_TICK_MS: scene poll interval (default: 16)
    /// - SAVEKEEP_MAX_SAVE_BYTES: soft size ceiling (default: 10 MiB)
    /// - SAVEKEEP_OBFUSCATE: obfuscate saves on disk (default: true)
    /// - SAVEKEEP_KEY: obfuscation key (default: built-in)
    /// - SAVEKEEP_QUICK_SLOT: slot for quick save/load (default: 1)
    /// - SAVEKEEP_MAX_SLOTS: slots covered by list/validate (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|k| std::env::var(k).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        let max_retry_attempts = parse_num(&get, "SAVEKEEP_MAX_RETRY_ATTEMPTS", defaults.max_retry_attempts)?;
        if max_retry_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }

        let save_timeout = parse_ms(&get, "SAVEKEEP_SAVE_TIMEOUT_MS", defaults.save_timeout)?;
        let operation_timeout = parse_ms(&get, "SAVEKEEP_OPERATION_TIMEOUT_MS", defaults.operation_timeout)?;
        // A save attempt must outlive its own collection window.
        if operation_timeout <= save_timeout {
            return Err(ConfigError::TimeoutOrder {
                operation: operation_timeout,
                save: save_timeout,
            });
        }

        let quick_slot = SlotId::new(parse_num(&get, "SAVEKEEP_QUICK_SLOT", defaults.quick_slot.get())?)?;

        let obfuscate = get("SAVEKEEP_OBFUSCATE")
            .map(|v| v == "true" || v == "1" || v == "yes")
            .unwrap_or(defaults.obfuscate);

        Ok(Self {
            home: default_home(&get),
            fallback_home: defaults.fallback_home,
            save_timeout,
            operation_timeout,
            max_retry_attempts,
            retry_delay: parse_ms(&get, "SAVEKEEP_RETRY_DELAY_MS", defaults.retry_delay)?,
            scene_load_timeout: parse_ms(&get, "SAVEKEEP_SCENE_LOAD_TIMEOUT_MS", defaults.scene_load_timeout)?,
            scene_settle_delay: parse_ms(&get, "SAVEKEEP_SCENE_SETTLE_MS", defaults.scene_settle_delay)?,
            load_settle_delay: parse_ms(&get, "SAVEKEEP_LOAD_SETTLE_MS", defaults.load_settle_delay)?,
            tick: parse_ms(&get, "SAVEKEEP_TICK_MS", defaults.tick)?,
            max_save_bytes: parse_num(&get, "SAVEKEEP_MAX_SAVE_BYTES", defaults.max_save_bytes)?,
            obfuscate,
            obfuscation_key: get("SAVEKEEP_KEY").unwrap_or(defaults.obfuscation_key),
            quick_slot,
            max_slots: parse_num(&get, "SAVEKEEP_MAX_SLOTS", defaults.max_slots)?,
        })
    }

    /// The byte transform selected by this configuration.
    pub fn obfuscator(&self) -> Arc<dyn Obfuscator> {
        if self.obfuscate {
            Arc::new(XorObfuscator::new(&self.obfuscation_key))
        } else {
            Arc::new(Plaintext)
        }
    }
}

fn default_home(get: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(home) = get("SAVEKEEP_HOME") {
        return PathBuf::from(home);
    }
    if let Some(data) = get("XDG_DATA_HOME") {
        return PathBuf::from(data).join("savekeep");
    }
    get("HOME")
        .map(|h| PathBuf::from(h).join(".local").join("share"))
        .unwrap_or_else(std::env::temp_dir)
        .join("savekeep")
}

fn parse_num<T: std::str::FromStr>(
    get: &dyn Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        None => Ok(default),
    }
}

fn parse_ms(
    get: &dyn Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_num(get, var, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn config_loads_defaults() {
        let config = SavekeepConfig::from_vars(vars(&[("HOME", "/home/tester")])).unwrap();

        assert_eq!(config.home, PathBuf::from("/home/tester/.local/share/savekeep"));
        assert_eq!(config.save_timeout, Duration::from_secs(2));
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.quick_slot.get(), 1);
        assert!(config.obfuscate);
        assert_eq!(config.obfuscation_key, DEFAULT_OBFUSCATION_KEY);
    }

    #[test]
    fn config_reads_overrides() {
        let config = SavekeepConfig::from_vars(vars(&[
            ("SAVEKEEP_HOME", "/srv/saves"),
            ("SAVEKEEP_SAVE_TIMEOUT_MS", "250"),
            ("SAVEKEEP_MAX_RETRY_ATTEMPTS", "5"),
            ("SAVEKEEP_OBFUSCATE", "false"),
            ("SAVEKEEP_QUICK_SLOT", "9"),
            ("SAVEKEEP_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/saves"));
        assert_eq!(config.save_timeout, Duration::from_millis(250));
        assert_eq!(config.max_retry_attempts, 5);
        assert!(!config.obfuscate);
        assert_eq!(config.quick_slot.get(), 9);
        assert_eq!(config.obfuscation_key, "secret");
        assert_eq!(config.obfuscator().name(), "plaintext");
    }

    #[test]
    fn xdg_data_home_is_preferred_over_home() {
        let config = SavekeepConfig::from_vars(vars(&[
            ("XDG_DATA_HOME", "/xdg"),
            ("HOME", "/home/tester"),
        ]))
        .unwrap();
        assert_eq!(config.home, PathBuf::from("/xdg/savekeep"));
    }

    #[test]
    fn config_rejects_bad_numbers() {
        let err = SavekeepConfig::from_vars(vars(&[("SAVEKEEP_RETRY_DELAY_MS", "soon")])).unwrap_err();
        assert!(
            err.to_string().contains("SAVEKEEP_RETRY_DELAY_MS"),
            "error should name the variable: {}",
            err
        );
    }

    #[test]
    fn config_rejects_zero_attempts_and_zero_slot() {
        assert!(matches!(
            SavekeepConfig::from_vars(vars(&[("SAVEKEEP_MAX_RETRY_ATTEMPTS", "0")])),
            Err(ConfigError::NoAttempts)
        ));
        assert!(matches!(
            SavekeepConfig::from_vars(vars(&[("SAVEKEEP_QUICK_SLOT", "0")])),
            Err(ConfigError::QuickSlot(_))
        ));
    }

    #[test]
    fn config_rejects_operation_timeout_inside_save_window() {
        let err = SavekeepConfig::from_vars(vars(&[
            ("SAVEKEEP_SAVE_TIMEOUT_MS", "5000"),
            ("SAVEKEEP_OPERATION_TIMEOUT_MS", "5000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::TimeoutOrder { .. }));

        assert!(matches!(
            SavekeepConfig::from_vars(vars(&[("SAVEKEEP_OPERATION_TIMEOUT_MS", "500")])),
            Err(ConfigError::TimeoutOrder { .. })
        ));
        assert!(
            SavekeepConfig::from_vars(vars(&[
                ("SAVEKEEP_SAVE_TIMEOUT_MS", "500"),
                ("SAVEKEEP_OPERATION_TIMEOUT_MS", "501"),
            ]))
            .is_ok()
        );
    }
}
