//! Memory pressure monitor (C15).
//!
//! The driver only reports health state; it never throttles on its own.
//! There is no in-process memory sampler here — the caller supplies a usage
//! fraction (e.g. sourced from whatever the outer shell already measures)
//! and this module applies fixed thresholds to it.

/// Health state reported for a given memory usage fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Ok,
    Warning,
    Critical,
}

/// Threshold-based memory pressure monitor.
#[derive(Debug, Clone, Copy)]
pub struct MemoryMonitor {
    warn_fraction: f64,
    critical_fraction: f64,
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self {
            warn_fraction: 0.80,
            critical_fraction: 0.90,
        }
    }
}

impl MemoryMonitor {
    pub fn new(warn_fraction: f64, critical_fraction: f64) -> Self {
        Self {
            warn_fraction,
            critical_fraction,
        }
    }

    /// Classify a usage fraction (0.0-1.0) into a health state.
    pub fn health_state(&self, usage_fraction: f64) -> HealthState {
        if usage_fraction >= self.critical_fraction {
            HealthState::Critical
        } else if usage_fraction >= self.warn_fraction {
            HealthState::Warning
        } else {
            HealthState::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_ok_below_warn_threshold() {
        let monitor = MemoryMonitor::default();
        assert_eq!(monitor.health_state(0.5), HealthState::Ok);
    }

    #[test]
    fn reports_warning_at_80_percent() {
        let monitor = MemoryMonitor::default();
        assert_eq!(monitor.health_state(0.80), HealthState::Warning);
        assert_eq!(monitor.health_state(0.85), HealthState::Warning);
    }

    #[test]
    fn reports_critical_at_90_percent() {
        let monitor = MemoryMonitor::default();
        assert_eq!(monitor.health_state(0.90), HealthState::Critical);
        assert_eq!(monitor.health_state(0.99), HealthState::Critical);
    }
}
