use anyhow::{Context, Result};
use std::time::Duration;
use sysinfo::System;

use crate::metrics::{Reading, SamplerInfo};

use super::gpu::GpuProbe;

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Used when the host cannot describe its CPUs.
pub const DEFAULT_CPU_TDP_WATTS: f64 = 65.0;
pub const MIN_CPU_TDP_WATTS: f64 = 35.0;
pub const MAX_CPU_TDP_WATTS: f64 = 200.0;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Something that can produce one [`Reading`] on demand.
///
/// `sample` runs on the blocking pool and may sleep for a measurement window.
pub trait MeasurementSource: Send + 'static {
    fn sample(&mut self) -> Result<Reading>;

    fn info(&self) -> SamplerInfo {
        SamplerInfo::default()
    }
}

/// Modeled power for the local machine: CPU from utilization × estimated TDP,
/// GPU from NVML when present, memory from the OS.
pub struct HardwareProbe {
    system: System,
    cpu_tdp_watts: f64,
    cpu_window: Duration,
    gpu: GpuProbe,
}

impl HardwareProbe {
    pub fn new() -> Self {
        Self::with_gpu(GpuProbe::detect())
    }

    pub fn with_gpu(gpu: GpuProbe) -> Self {
        let mut system = System::new();
        let cpu_tdp_watts = estimate_cpu_tdp(&mut system);

        // First refresh establishes the baseline the usage delta is computed from.
        system.refresh_cpu_usage();

        log_info!(
            "hardware probe ready: estimated CPU TDP {:.1}W, GPU available: {}",
            cpu_tdp_watts,
            gpu.is_available()
        );

        Self {
            system,
            cpu_tdp_watts,
            cpu_window: sysinfo::MINIMUM_CPU_UPDATE_INTERVAL,
            gpu,
        }
    }

    pub fn cpu_tdp_watts(&self) -> f64 {
        self.cpu_tdp_watts
    }

    /// Global CPU utilization averaged over one OS refresh window.
    fn read_cpu_util(&mut self) -> f64 {
        self.system.refresh_cpu_usage();
        std::thread::sleep(self.cpu_window);
        self.system.refresh_cpu_usage();
        f64::from(self.system.global_cpu_usage())
    }

    fn read_memory_gb(&mut self) -> f64 {
        self.system.refresh_memory();
        self.system.used_memory() as f64 / BYTES_PER_GIB
    }
}

impl Default for HardwareProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementSource for HardwareProbe {
    fn sample(&mut self) -> Result<Reading> {
        let cpu_util_pct = self.read_cpu_util();
        let cpu_power_w = self.cpu_tdp_watts * (cpu_util_pct / 100.0);
        let gpu = self.gpu.read().context("GPU telemetry read failed")?;
        let memory_gb = self.read_memory_gb();

        Ok(Reading {
            cpu_power_w,
            gpu_power_w: gpu.power_w,
            cpu_util_pct,
            gpu_util_pct: gpu.util_pct,
            memory_gb,
        })
    }

    fn info(&self) -> SamplerInfo {
        SamplerInfo {
            cpu_tdp_watts: self.cpu_tdp_watts,
            gpu_available: self.gpu.is_available(),
            platform: platform_description(),
        }
    }
}

fn estimate_cpu_tdp(system: &mut System) -> f64 {
    system.refresh_cpu_frequency();
    let cpus = system.cpus();
    if cpus.is_empty() {
        return DEFAULT_CPU_TDP_WATTS;
    }

    let total_mhz: u64 = cpus.iter().map(|cpu| cpu.frequency()).sum();
    let freq_ghz = if total_mhz > 0 {
        Some(total_mhz as f64 / cpus.len() as f64 / 1000.0)
    } else {
        None
    };

    tdp_from_topology(cpus.len(), freq_ghz)
}

/// Rough TDP from logical core count and clock: 15W per core at 2GHz plus 5W
/// per extra GHz, or a flat 20W per core when the clock is unknown.
pub fn tdp_from_topology(cores: usize, freq_ghz: Option<f64>) -> f64 {
    if cores == 0 {
        return DEFAULT_CPU_TDP_WATTS;
    }

    let cores = cores as f64;
    let estimate = match freq_ghz {
        Some(ghz) if ghz.is_finite() && ghz > 0.0 => cores * (15.0 + (ghz - 2.0) * 5.0),
        _ => cores * 20.0,
    };
    estimate.clamp(MIN_CPU_TDP_WATTS, MAX_CPU_TDP_WATTS)
}

fn platform_description() -> String {
    let os = System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string());
    format!("{os} ({})", std::env::consts::ARCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tdp_scales_with_cores_and_clock() {
        // 4 cores at 3GHz: 4 * (15 + 5) = 80W
        assert_eq!(tdp_from_topology(4, Some(3.0)), 80.0);
    }

    #[test]
    fn tdp_is_clamped() {
        assert_eq!(tdp_from_topology(1, Some(2.0)), MIN_CPU_TDP_WATTS);
        assert_eq!(tdp_from_topology(64, Some(3.5)), MAX_CPU_TDP_WATTS);
        assert_eq!(tdp_from_topology(32, None), MAX_CPU_TDP_WATTS);
    }

    #[test]
    fn tdp_without_clock_uses_flat_per_core_estimate() {
        assert_eq!(tdp_from_topology(3, None), 60.0);
        assert_eq!(tdp_from_topology(3, Some(0.0)), 60.0);
    }

    #[test]
    fn tdp_without_cores_falls_back_to_default() {
        assert_eq!(tdp_from_topology(0, Some(3.0)), DEFAULT_CPU_TDP_WATTS);
    }

    #[test]
    fn hardware_probe_produces_sane_readings() {
        let mut probe = HardwareProbe::with_gpu(GpuProbe::disabled());
        let reading = probe.sample().unwrap();

        assert!((0.0..=100.0).contains(&reading.cpu_util_pct));
        assert!(reading.cpu_power_w <= probe.cpu_tdp_watts() + f64::EPSILON);
        assert_eq!(reading.gpu_power_w, 0.0);
        assert!(reading.memory_gb >= 0.0);
        assert!(!probe.info().gpu_available);
    }
}
