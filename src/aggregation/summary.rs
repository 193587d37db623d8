use serde::{Deserialize, Serialize};

use crate::metrics::Measurement;

const SECONDS_PER_HOUR: f64 = 3600.0;
const WATT_HOURS_PER_KWH: f64 = 1000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyBreakdown {
    pub total_kwh: f64,
    pub cpu_kwh: f64,
    pub gpu_kwh: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerStats {
    pub avg_total_watts: f64,
    pub avg_cpu_watts: f64,
    pub avg_gpu_watts: f64,
    pub peak_total_watts: f64,
    pub peak_cpu_watts: f64,
    pub peak_gpu_watts: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilizationStats {
    pub avg_cpu_percent: f64,
    pub avg_gpu_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub avg_gb: f64,
    pub peak_gb: f64,
}

/// Statistics over one session's samples. `Default` is the empty summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergySummary {
    pub duration_seconds: f64,
    pub duration_hours: f64,
    pub sample_count: usize,
    pub energy: EnergyBreakdown,
    pub power: PowerStats,
    pub utilization: UtilizationStats,
    pub memory: MemoryStats,
}

impl EnergySummary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn total_kwh(&self) -> f64 {
        self.energy.total_kwh
    }
}

/// Summarize a chronologically ordered snapshot.
///
/// Energy is average power × elapsed time between the first and last sample,
/// not a per-interval integral. That is only accurate when power varies slowly
/// relative to the sampling interval; it is kept so results stay reproducible.
/// A lone sample has no elapsed time and therefore contributes no energy.
pub fn summarize(measurements: &[Measurement]) -> EnergySummary {
    let (Some(first), Some(last)) = (measurements.first(), measurements.last()) else {
        return EnergySummary::empty();
    };

    let count = measurements.len() as f64;
    let duration_seconds = (last.timestamp() - first.timestamp()).max(0.0);
    let duration_hours = duration_seconds / SECONDS_PER_HOUR;

    let avg = |field: fn(&Measurement) -> f64| measurements.iter().map(field).sum::<f64>() / count;
    let peak = |field: fn(&Measurement) -> f64| measurements.iter().map(field).fold(0.0, f64::max);

    let avg_total_watts = avg(Measurement::total_power_w);
    let avg_cpu_watts = avg(Measurement::cpu_power_w);
    let avg_gpu_watts = avg(Measurement::gpu_power_w);

    EnergySummary {
        duration_seconds,
        duration_hours,
        sample_count: measurements.len(),
        energy: EnergyBreakdown {
            total_kwh: avg_total_watts * duration_hours / WATT_HOURS_PER_KWH,
            cpu_kwh: avg_cpu_watts * duration_hours / WATT_HOURS_PER_KWH,
            gpu_kwh: avg_gpu_watts * duration_hours / WATT_HOURS_PER_KWH,
        },
        power: PowerStats {
            avg_total_watts,
            avg_cpu_watts,
            avg_gpu_watts,
            peak_total_watts: peak(Measurement::total_power_w),
            peak_cpu_watts: peak(Measurement::cpu_power_w),
            peak_gpu_watts: peak(Measurement::gpu_power_w),
        },
        utilization: UtilizationStats {
            avg_cpu_percent: avg(Measurement::cpu_util_pct),
            avg_gpu_percent: avg(Measurement::gpu_util_pct),
        },
        memory: MemoryStats {
            avg_gb: avg(Measurement::memory_gb),
            peak_gb: peak(Measurement::memory_gb),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Reading;

    fn sample(ts: f64, cpu: f64, gpu: f64) -> Measurement {
        Measurement::new(
            ts,
            Reading {
                cpu_power_w: cpu,
                gpu_power_w: gpu,
                cpu_util_pct: cpu / 2.0,
                gpu_util_pct: gpu / 4.0,
                memory_gb: 4.0 + ts / 3600.0,
            },
        )
    }

    #[test]
    fn empty_snapshot_is_all_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary, EnergySummary::empty());
        assert_eq!(summary.sample_count, 0);
        assert!(summary.is_empty());
        assert_eq!(summary.total_kwh(), 0.0);
    }

    #[test]
    fn single_sample_contributes_no_energy() {
        // Instantaneous power without elapsed time is zero energy by policy.
        let summary = summarize(&[sample(1_700_000_000.0, 180.0, 250.0)]);
        assert_eq!(summary.sample_count, 1);
        assert_eq!(summary.duration_seconds, 0.0);
        assert_eq!(summary.energy.total_kwh, 0.0);
        assert_eq!(summary.power.avg_total_watts, 430.0);
        assert_eq!(summary.power.peak_total_watts, 430.0);
    }

    #[test]
    fn energy_is_average_power_times_duration() {
        let samples = [sample(0.0, 100.0, 0.0), sample(3600.0, 300.0, 0.0)];
        let summary = summarize(&samples);

        assert_eq!(summary.duration_seconds, 3600.0);
        assert_eq!(summary.duration_hours, 1.0);
        assert_eq!(summary.power.avg_total_watts, 200.0);
        assert_eq!(summary.energy.total_kwh, 0.2);
        assert_eq!(summary.energy.cpu_kwh, 0.2);
        assert_eq!(summary.energy.gpu_kwh, 0.0);
        assert_eq!(summary.power.peak_cpu_watts, 300.0);
    }

    #[test]
    fn average_ignores_uneven_spacing() {
        // A trapezoidal integral would weight the long 0W gap; this method does not.
        let samples = [
            sample(0.0, 100.0, 0.0),
            sample(1.0, 100.0, 0.0),
            sample(3601.0, 0.0, 0.0),
        ];
        let summary = summarize(&samples);
        let expected = summary.power.avg_total_watts * summary.duration_hours / 1000.0;
        assert_eq!(summary.energy.total_kwh, expected);
        assert!((summary.power.avg_total_watts - 200.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn per_component_stats_are_tracked() {
        let samples = [
            sample(0.0, 50.0, 200.0),
            sample(10.0, 70.0, 100.0),
            sample(20.0, 60.0, 150.0),
        ];
        let summary = summarize(&samples);

        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.power.avg_cpu_watts, 60.0);
        assert_eq!(summary.power.avg_gpu_watts, 150.0);
        assert_eq!(summary.power.peak_gpu_watts, 200.0);
        assert_eq!(summary.power.peak_total_watts, 250.0);
        assert_eq!(summary.utilization.avg_cpu_percent, 30.0);
        assert_eq!(summary.utilization.avg_gpu_percent, 37.5);
        assert!(summary.memory.peak_gb > summary.memory.avg_gb);
    }
}
