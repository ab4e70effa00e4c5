//! Health reporting for the reservation engine.
//!
//! Minimal health surface: ok, build_id, engine_version, plus the
//! in-flight/stale attempt counts operators monitor for crash remnants.

/// Engine version reported by health checks.
pub const ENGINE_VERSION: &str = "0.1.0";

/// Health response for an operator-facing endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    /// True when the process is up and its stores are usable.
    pub ok: bool,
    /// Git commit SHA or build identifier.
    pub build_id: String,
    /// Engine version.
    pub engine_version: String,
    /// Attempts currently `InProgress`.
    pub in_flight_attempts: usize,
    /// In-flight attempts older than the stale alert threshold. Non-zero
    /// means crash remnants are awaiting operator reconciliation; the
    /// process itself is still healthy.
    pub stale_attempts: usize,
}

impl HealthResponse {
    /// Create a healthy response.
    pub fn healthy(
        build_id: impl Into<String>,
        in_flight_attempts: usize,
        stale_attempts: usize,
    ) -> Self {
        Self {
            ok: true,
            build_id: build_id.into(),
            engine_version: ENGINE_VERSION.to_string(),
            in_flight_attempts,
            stale_attempts,
        }
    }

    /// Create an unhealthy response.
    pub fn unhealthy(build_id: impl Into<String>) -> Self {
        Self {
            ok: false,
            build_id: build_id.into(),
            engine_version: ENGINE_VERSION.to_string(),
            in_flight_attempts: 0,
            stale_attempts: 0,
        }
    }
}

/// Exit code for a healthy engine.
pub const EXIT_HEALTHY: i32 = 0;
/// Exit code for an unhealthy engine.
pub const EXIT_UNHEALTHY: i32 = 1;
/// Exit code when health cannot be determined.
pub const EXIT_ERROR: i32 = 2;

/// Get the exit code for a health response.
pub fn exit_code(response: &HealthResponse) -> i32 {
    if response.ok { EXIT_HEALTHY } else { EXIT_UNHEALTHY }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_response_has_required_fields() {
        let resp = HealthResponse::healthy("abc123", 2, 1);
        assert!(resp.ok);
        assert_eq!(resp.build_id, "abc123");
        assert_eq!(resp.engine_version, ENGINE_VERSION);
        assert_eq!(resp.in_flight_attempts, 2);
        assert_eq!(resp.stale_attempts, 1);
    }

    #[test]
    fn test_unhealthy_response_has_required_fields() {
        let resp = HealthResponse::unhealthy("abc123");
        assert!(!resp.ok);
        assert_eq!(resp.build_id, "abc123");
        assert_eq!(resp.engine_version, ENGINE_VERSION);
    }

    #[test]
    fn test_stale_attempts_do_not_flip_ok() {
        let resp = HealthResponse::healthy("build_xyz", 5, 5);
        assert!(resp.ok);
        assert_eq!(exit_code(&resp), EXIT_HEALTHY);
    }

    #[test]
    fn test_exit_code_unhealthy() {
        let resp = HealthResponse::unhealthy("test");
        assert_eq!(exit_code(&resp), EXIT_UNHEALTHY);
    }
}
