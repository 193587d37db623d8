use serde::{Deserialize, Serialize};

/// Raw values produced by one read of a [`MeasurementSource`](crate::sensing::MeasurementSource).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub cpu_power_w: f64,
    pub gpu_power_w: f64,
    pub cpu_util_pct: f64,
    pub gpu_util_pct: f64,
    pub memory_gb: f64,
}

/// One timestamped sample of power and utilization.
///
/// Fields are only reachable through accessors so `total_power_w` can never
/// disagree with its parts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    timestamp: f64,
    cpu_power_w: f64,
    gpu_power_w: f64,
    total_power_w: f64,
    cpu_util_pct: f64,
    gpu_util_pct: f64,
    memory_gb: f64,
}

impl Measurement {
    pub fn new(timestamp: f64, reading: Reading) -> Self {
        let cpu_power_w = non_negative(reading.cpu_power_w);
        let gpu_power_w = non_negative(reading.gpu_power_w);
        Self {
            timestamp,
            cpu_power_w,
            gpu_power_w,
            total_power_w: cpu_power_w + gpu_power_w,
            cpu_util_pct: percent(reading.cpu_util_pct),
            gpu_util_pct: percent(reading.gpu_util_pct),
            memory_gb: non_negative(reading.memory_gb),
        }
    }

    /// Sample recorded for a tick whose reads failed.
    pub fn zeroed(timestamp: f64) -> Self {
        Self::new(timestamp, Reading::default())
    }

    /// Unix seconds at which the tick started.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn cpu_power_w(&self) -> f64 {
        self.cpu_power_w
    }

    pub fn gpu_power_w(&self) -> f64 {
        self.gpu_power_w
    }

    pub fn total_power_w(&self) -> f64 {
        self.total_power_w
    }

    pub fn cpu_util_pct(&self) -> f64 {
        self.cpu_util_pct
    }

    pub fn gpu_util_pct(&self) -> f64 {
        self.gpu_util_pct
    }

    pub fn memory_gb(&self) -> f64 {
        self.memory_gb
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Static description of the host a sampler runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerInfo {
    pub cpu_tdp_watts: f64,
    pub gpu_available: bool,
    pub platform: String,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            cpu_tdp_watts: 0.0,
            gpu_available: false,
            platform: "unknown".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_power_is_sum_of_components() {
        let m = Measurement::new(
            12.5,
            Reading {
                cpu_power_w: 40.0,
                gpu_power_w: 110.0,
                cpu_util_pct: 50.0,
                gpu_util_pct: 80.0,
                memory_gb: 7.5,
            },
        );
        assert_eq!(m.total_power_w(), 150.0);
        assert_eq!(m.timestamp(), 12.5);
        assert_eq!(m.memory_gb(), 7.5);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let m = Measurement::new(
            0.0,
            Reading {
                cpu_power_w: -3.0,
                gpu_power_w: f64::NAN,
                cpu_util_pct: 130.0,
                gpu_util_pct: -1.0,
                memory_gb: -2.0,
            },
        );
        assert_eq!(m.cpu_power_w(), 0.0);
        assert_eq!(m.gpu_power_w(), 0.0);
        assert_eq!(m.total_power_w(), 0.0);
        assert_eq!(m.cpu_util_pct(), 100.0);
        assert_eq!(m.gpu_util_pct(), 0.0);
        assert_eq!(m.memory_gb(), 0.0);
    }

    #[test]
    fn zeroed_sample_keeps_its_timestamp() {
        let m = Measurement::zeroed(99.0);
        assert_eq!(m.timestamp(), 99.0);
        assert_eq!(m.total_power_w(), 0.0);
        assert_eq!(m.cpu_util_pct(), 0.0);
    }
}
