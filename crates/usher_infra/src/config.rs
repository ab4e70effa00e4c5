//! Engine configuration with fail-closed defaults.
//!
//! Each numeric parameter has a documented default that is applied when
//! no value is supplied at runtime. A supplied value that is non-finite
//! or negative is rejected rather than clamped; a parameter with no
//! default would require fail-closed behavior when missing.

use std::fmt;

/// Numeric engine configuration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigParam {
    /// Maximum number of attempt records the ledger will track.
    LedgerCapacity,
    /// Maximum number of provisioned resources in the counter table.
    CounterCapacity,
    /// Age in seconds after which an `InProgress` attempt counts as stale
    /// in the health report.
    StaleAttemptAlertS,
}

/// Error when a required parameter is missing or malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingConfigError {
    /// snake_case parameter name.
    pub param_name: &'static str,
    /// Why resolution failed.
    pub reason: &'static str,
}

impl fmt::Display for MissingConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "config fail-closed: '{}' could not be resolved ({})",
            self.param_name, self.reason
        )
    }
}

impl std::error::Error for MissingConfigError {}

/// Returns the default for a parameter, or `None` if no default exists.
pub fn default_value(param: ConfigParam) -> Option<f64> {
    match param {
        ConfigParam::LedgerCapacity => Some(10_000.0),
        ConfigParam::CounterCapacity => Some(1_000.0),
        ConfigParam::StaleAttemptAlertS => Some(300.0),
    }
}

/// Returns the snake_case name for a parameter.
pub fn param_name(param: ConfigParam) -> &'static str {
    match param {
        ConfigParam::LedgerCapacity => "ledger_capacity",
        ConfigParam::CounterCapacity => "counter_capacity",
        ConfigParam::StaleAttemptAlertS => "stale_attempt_alert_s",
    }
}

/// Expected number of ConfigParam variants. Update when adding variants.
pub const EXPECTED_PARAM_COUNT: usize = 3;

/// All known `ConfigParam` variants (for exhaustive iteration in tests).
pub const ALL_PARAMS: &[ConfigParam] = &[
    ConfigParam::LedgerCapacity,
    ConfigParam::CounterCapacity,
    ConfigParam::StaleAttemptAlertS,
];

/// Resolve a configuration value with fail-safe semantics.
///
/// - If `value` is `Some`, returns that value (explicit config wins).
/// - If `value` is `None` and the parameter has a default, returns it.
/// - If `value` is `None` and no default exists, returns `Err`.
pub fn resolve_config_value(
    param: ConfigParam,
    value: Option<f64>,
) -> Result<f64, MissingConfigError> {
    if let Some(v) = value {
        if !v.is_finite() {
            return Err(MissingConfigError {
                param_name: param_name(param),
                reason: "value is non-finite (NaN or Infinity); fail-closed",
            });
        }
        if v < 0.0 {
            return Err(MissingConfigError {
                param_name: param_name(param),
                reason: "value is negative; all config params must be non-negative",
            });
        }
        return Ok(v);
    }
    default_value(param).ok_or_else(|| MissingConfigError {
        param_name: param_name(param),
        reason: "no default; engine must fail-closed",
    })
}

/// Fully resolved engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Terminal-key reuse policy. No default is applied here: whether a
    /// finished purchase may be retried under the same key is an explicit
    /// operator choice.
    pub allow_retry_after_terminal: bool,
    /// Attempt log bound.
    pub ledger_capacity: usize,
    /// Counter table bound.
    pub counter_capacity: usize,
    /// Stale in-flight attempt threshold, seconds.
    pub stale_attempt_alert_s: u64,
}

impl EngineConfig {
    /// Resolve a configuration, applying defaults for unset numeric
    /// parameters and rejecting malformed ones.
    pub fn resolve(
        allow_retry_after_terminal: bool,
        ledger_capacity: Option<f64>,
        counter_capacity: Option<f64>,
        stale_attempt_alert_s: Option<f64>,
    ) -> Result<Self, MissingConfigError> {
        let ledger_capacity =
            resolve_config_value(ConfigParam::LedgerCapacity, ledger_capacity)? as usize;
        let counter_capacity =
            resolve_config_value(ConfigParam::CounterCapacity, counter_capacity)? as usize;
        let stale_attempt_alert_s =
            resolve_config_value(ConfigParam::StaleAttemptAlertS, stale_attempt_alert_s)? as u64;

        Ok(Self {
            allow_retry_after_terminal,
            ledger_capacity,
            counter_capacity,
            stale_attempt_alert_s,
        })
    }
}
