//! Settings vault – reads/writes `~/.decisify/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use decisify_kernel::SafetyThresholds;
use decisify_metrics::DEFAULT_WINDOW_SIZE;
use decisify_perception::{FusionPolicy, FusionVariant, HubConfig};
use decisify_runtime::OrchestratorConfig;
use decisify_types::DecisifyError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "DECISIFY_CONFIG";

/// Engine settings persisted in `~/.decisify/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds between decision cycles.
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: f64,

    /// Softmax temperature; lower is sharper.
    #[serde(default = "default_temperature")]
    pub agent_temperature: f64,

    #[serde(default = "default_max_volatility_for_buy")]
    pub max_volatility_for_buy: f64,

    #[serde(default = "default_max_volatility_for_sell")]
    pub max_volatility_for_sell: f64,

    #[serde(default = "default_min_confidence")]
    pub min_confidence_threshold: f64,

    /// Per-attempt timeout for every signal source.
    #[serde(default = "default_sensor_timeout")]
    pub sensor_timeout_secs: f64,

    /// Attempts per fetch, including the first.
    #[serde(default = "default_sensor_max_retries")]
    pub sensor_max_retries: u32,

    /// Base of the exponential retry backoff.
    #[serde(default = "default_sensor_retry_delay")]
    pub sensor_retry_delay_secs: f64,

    #[serde(default = "default_metrics_window")]
    pub metrics_window_size: usize,

    #[serde(default)]
    pub fusion_variant: FusionVariant,

    /// Stop after this many cycles; run until Ctrl-C when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u64>,

    #[serde(default)]
    pub fusion: FusionPolicy,
}

fn default_cycle_interval() -> f64 {
    5.0
}
fn default_temperature() -> f64 {
    1.0
}
fn default_max_volatility_for_buy() -> f64 {
    0.05
}
fn default_max_volatility_for_sell() -> f64 {
    0.08
}
fn default_min_confidence() -> f64 {
    0.15
}
fn default_sensor_timeout() -> f64 {
    3.0
}
fn default_sensor_max_retries() -> u32 {
    3
}
fn default_sensor_retry_delay() -> f64 {
    0.5
}
fn default_metrics_window() -> usize {
    DEFAULT_WINDOW_SIZE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval(),
            agent_temperature: default_temperature(),
            max_volatility_for_buy: default_max_volatility_for_buy(),
            max_volatility_for_sell: default_max_volatility_for_sell(),
            min_confidence_threshold: default_min_confidence(),
            sensor_timeout_secs: default_sensor_timeout(),
            sensor_max_retries: default_sensor_max_retries(),
            sensor_retry_delay_secs: default_sensor_retry_delay(),
            metrics_window_size: default_metrics_window(),
            fusion_variant: FusionVariant::default(),
            max_cycles: None,
            fusion: FusionPolicy::default(),
        }
    }
}

impl Settings {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), DecisifyError> {
        positive("cycle_interval_secs", self.cycle_interval_secs)?;
        positive("agent_temperature", self.agent_temperature)?;
        positive("sensor_timeout_secs", self.sensor_timeout_secs)?;
        if !(self.sensor_retry_delay_secs.is_finite() && self.sensor_retry_delay_secs >= 0.0) {
            return Err(DecisifyError::InvalidConfig(format!(
                "sensor_retry_delay_secs must be non-negative, got {}",
                self.sensor_retry_delay_secs
            )));
        }
        if self.sensor_max_retries == 0 {
            return Err(DecisifyError::InvalidConfig(
                "sensor_max_retries must be at least 1".into(),
            ));
        }
        if self.metrics_window_size == 0 {
            return Err(DecisifyError::InvalidConfig(
                "metrics_window_size must be at least 1".into(),
            ));
        }
        self.thresholds().validate()?;
        self.fusion.validate()
    }

    pub fn thresholds(&self) -> SafetyThresholds {
        SafetyThresholds {
            max_volatility_for_buy: self.max_volatility_for_buy,
            max_volatility_for_sell: self.max_volatility_for_sell,
            min_confidence_threshold: self.min_confidence_threshold,
        }
    }

    /// Validate and convert into the runtime's configuration.
    pub fn to_orchestrator_config(&self) -> Result<OrchestratorConfig, DecisifyError> {
        self.validate()?;
        Ok(OrchestratorConfig {
            cycle_interval: Duration::from_secs_f64(self.cycle_interval_secs),
            agent_temperature: self.agent_temperature,
            fusion_variant: self.fusion_variant,
            fusion_policy: self.fusion.clone(),
            safety: self.thresholds(),
            hub: HubConfig {
                timeout: Duration::from_secs_f64(self.sensor_timeout_secs),
                max_retries: self.sensor_max_retries,
                retry_delay: Duration::from_secs_f64(self.sensor_retry_delay_secs),
            },
            metrics_window_size: self.metrics_window_size,
            max_cycles: self.max_cycles,
        })
    }
}

fn positive(name: &str, value: f64) -> Result<(), DecisifyError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DecisifyError::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

/// `$DECISIFY_CONFIG`, or `~/.decisify/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".decisify").join("config.toml")
}

/// Settings from the config file (defaults when absent) with environment
/// overrides applied.
pub fn load() -> Result<Settings, String> {
    let mut settings = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Parse the file at `path`.  `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Settings>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let settings: Settings =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(settings))
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

/// Apply `DECISIFY_*` environment variable overrides.
///
/// | Variable | Field |
/// |---|---|
/// | `DECISIFY_CYCLE_INTERVAL` | `cycle_interval_secs` |
/// | `DECISIFY_AGENT_TEMPERATURE` | `agent_temperature` |
/// | `DECISIFY_MAX_VOLATILITY_BUY` | `max_volatility_for_buy` |
/// | `DECISIFY_MAX_VOLATILITY_SELL` | `max_volatility_for_sell` |
/// | `DECISIFY_MIN_CONFIDENCE` | `min_confidence_threshold` |
/// | `DECISIFY_SENSOR_TIMEOUT` | `sensor_timeout_secs` |
/// | `DECISIFY_SENSOR_MAX_RETRIES` | `sensor_max_retries` |
/// | `DECISIFY_SENSOR_RETRY_DELAY` | `sensor_retry_delay_secs` |
/// | `DECISIFY_METRICS_WINDOW_SIZE` | `metrics_window_size` |
/// | `DECISIFY_FUSION_VARIANT` | `fusion_variant` (`reference` / `optimized`) |
/// | `DECISIFY_MAX_CYCLES` | `max_cycles` |
///
/// Unparsable values are logged and ignored.
pub fn apply_env_overrides(s: &mut Settings) {
    if let Some(v) = env_parse("DECISIFY_CYCLE_INTERVAL") {
        s.cycle_interval_secs = v;
    }
    if let Some(v) = env_parse("DECISIFY_AGENT_TEMPERATURE") {
        s.agent_temperature = v;
    }
    if let Some(v) = env_parse("DECISIFY_MAX_VOLATILITY_BUY") {
        s.max_volatility_for_buy = v;
    }
    if let Some(v) = env_parse("DECISIFY_MAX_VOLATILITY_SELL") {
        s.max_volatility_for_sell = v;
    }
    if let Some(v) = env_parse("DECISIFY_MIN_CONFIDENCE") {
        s.min_confidence_threshold = v;
    }
    if let Some(v) = env_parse("DECISIFY_SENSOR_TIMEOUT") {
        s.sensor_timeout_secs = v;
    }
    if let Some(v) = env_parse("DECISIFY_SENSOR_MAX_RETRIES") {
        s.sensor_max_retries = v;
    }
    if let Some(v) = env_parse("DECISIFY_SENSOR_RETRY_DELAY") {
        s.sensor_retry_delay_secs = v;
    }
    if let Some(v) = env_parse("DECISIFY_METRICS_WINDOW_SIZE") {
        s.metrics_window_size = v;
    }
    if let Ok(v) = std::env::var("DECISIFY_FUSION_VARIANT") {
        match v.trim().to_ascii_lowercase().as_str() {
            "reference" => s.fusion_variant = FusionVariant::Reference,
            "optimized" => s.fusion_variant = FusionVariant::Optimized,
            other => warn!(value = other, "ignoring unknown DECISIFY_FUSION_VARIANT"),
        }
    }
    if let Some(v) = env_parse("DECISIFY_MAX_CYCLES") {
        s.max_cycles = Some(v);
    }
}

/// Write `settings` to `path`, creating the parent directory.
pub fn save_to(settings: &Settings, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.cycle_interval_secs, 5.0);
        assert_eq!(s.agent_temperature, 1.0);
        assert_eq!(s.max_volatility_for_buy, 0.05);
        assert_eq!(s.max_volatility_for_sell, 0.08);
        assert_eq!(s.min_confidence_threshold, 0.15);
        assert_eq!(s.sensor_timeout_secs, 3.0);
        assert_eq!(s.sensor_max_retries, 3);
        assert_eq!(s.sensor_retry_delay_secs, 0.5);
        assert_eq!(s.metrics_window_size, 100);
        assert_eq!(s.fusion_variant, FusionVariant::Optimized);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn roundtrip_default_settings() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Settings::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");

        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        let raw = r#"
agent_temperature = 0.5
fusion_variant = "reference"

[fusion]
action_threshold = 0.2
"#;
        fs::write(&path, raw).expect("write");

        let s = load_from(&path).expect("load ok").expect("some");

        assert_eq!(s.agent_temperature, 0.5);
        assert_eq!(s.fusion_variant, FusionVariant::Reference);
        assert_eq!(s.fusion.action_threshold, 0.2);
        assert_eq!(s.fusion.recency_scale_secs, 60.0);
        assert_eq!(s.cycle_interval_secs, 5.0);
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "agent_temperature = \"hot\"").expect("write");
        assert!(load_from(&path).unwrap_err().starts_with("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_decisify_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".decisify"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let cases = [
            Settings {
                agent_temperature: 0.0,
                ..Settings::default()
            },
            Settings {
                cycle_interval_secs: -1.0,
                ..Settings::default()
            },
            Settings {
                sensor_timeout_secs: f64::NAN,
                ..Settings::default()
            },
            Settings {
                sensor_max_retries: 0,
                ..Settings::default()
            },
            Settings {
                metrics_window_size: 0,
                ..Settings::default()
            },
            Settings {
                max_volatility_for_sell: 1.2,
                ..Settings::default()
            },
            Settings {
                min_confidence_threshold: -0.1,
                ..Settings::default()
            },
        ];
        for s in cases {
            assert!(
                matches!(s.validate(), Err(DecisifyError::InvalidConfig(_))),
                "expected rejection: {s:?}"
            );
        }
    }

    #[test]
    fn converts_to_orchestrator_config() {
        let s = Settings {
            cycle_interval_secs: 0.25,
            sensor_retry_delay_secs: 0.1,
            max_cycles: Some(7),
            ..Settings::default()
        };
        let c = s.to_orchestrator_config().expect("valid");
        assert_eq!(c.cycle_interval, Duration::from_millis(250));
        assert_eq!(c.hub.timeout, Duration::from_secs(3));
        assert_eq!(c.hub.retry_delay, Duration::from_millis(100));
        assert_eq!(c.hub.max_retries, 3);
        assert_eq!(c.safety, SafetyThresholds::default());
        assert_eq!(c.max_cycles, Some(7));
    }

    #[test]
    fn apply_env_overrides_changes_temperature() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("DECISIFY_AGENT_TEMPERATURE", "0.25") };
        let mut s = Settings::default();
        apply_env_overrides(&mut s);
        assert_eq!(s.agent_temperature, 0.25);
        unsafe { std::env::remove_var("DECISIFY_AGENT_TEMPERATURE") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_number() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("DECISIFY_SENSOR_MAX_RETRIES", "lots") };
        let mut s = Settings::default();
        apply_env_overrides(&mut s);
        assert_eq!(s.sensor_max_retries, 3);
        unsafe { std::env::remove_var("DECISIFY_SENSOR_MAX_RETRIES") };
    }

    #[test]
    fn apply_env_overrides_changes_variant_and_cycles() {
        // SAFETY: no other test reads or writes these variables.
        unsafe {
            std::env::set_var("DECISIFY_FUSION_VARIANT", "Reference");
            std::env::set_var("DECISIFY_MAX_CYCLES", "12");
        }
        let mut s = Settings::default();
        apply_env_overrides(&mut s);
        assert_eq!(s.fusion_variant, FusionVariant::Reference);
        assert_eq!(s.max_cycles, Some(12));
        unsafe {
            std::env::remove_var("DECISIFY_FUSION_VARIANT");
            std::env::remove_var("DECISIFY_MAX_CYCLES");
        }
    }
}
