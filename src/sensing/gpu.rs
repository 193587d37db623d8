use anyhow::Result;

#[cfg(feature = "nvidia")]
use anyhow::Context;
#[cfg(feature = "nvidia")]
use nvml_wrapper::Nvml;

const ENABLE_LOGS: bool = true;

#[cfg(not(feature = "nvidia"))]
use crate::log_info;
#[cfg(feature = "nvidia")]
use crate::{log_info, log_warn};

/// Aggregate over every visible GPU: power is summed, utilization averaged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpuReading {
    pub power_w: f64,
    pub util_pct: f64,
}

/// GPU telemetry resolved once at construction.
///
/// When the probe fails (no driver, no device, feature disabled) every read
/// returns zeros without touching NVML again.
pub struct GpuProbe {
    #[cfg(feature = "nvidia")]
    nvml: Option<Nvml>,
}

impl GpuProbe {
    pub fn detect() -> Self {
        #[cfg(feature = "nvidia")]
        {
            let nvml = match Nvml::init() {
                Ok(nvml) => match nvml.device_count() {
                    Ok(count) if count > 0 => {
                        log_info!("NVIDIA GPU monitoring initialized, found {count} GPU(s)");
                        Some(nvml)
                    }
                    Ok(_) => {
                        log_info!("NVML loaded but reports no GPUs");
                        None
                    }
                    Err(err) => {
                        log_warn!("NVML device enumeration failed: {err}");
                        None
                    }
                },
                Err(err) => {
                    log_warn!("NVML initialization failed, GPU power will read as 0: {err}");
                    None
                }
            };
            Self { nvml }
        }

        #[cfg(not(feature = "nvidia"))]
        {
            log_info!("built without GPU support, GPU power will read as 0");
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "nvidia")]
            nvml: None,
        }
    }

    pub fn is_available(&self) -> bool {
        #[cfg(feature = "nvidia")]
        {
            self.nvml.is_some()
        }

        #[cfg(not(feature = "nvidia"))]
        {
            false
        }
    }

    pub fn read(&self) -> Result<GpuReading> {
        #[cfg(feature = "nvidia")]
        {
            let Some(nvml) = self.nvml.as_ref() else {
                return Ok(GpuReading::default());
            };

            let count = nvml.device_count().context("NVML device count failed")?;
            let mut total_power_w = 0.0;
            let mut total_util = 0.0;
            for idx in 0..count {
                let device = nvml
                    .device_by_index(idx)
                    .with_context(|| format!("NVML device {idx} unavailable"))?;
                let power_mw = device
                    .power_usage()
                    .with_context(|| format!("NVML power read failed for GPU {idx}"))?;
                let util = device
                    .utilization_rates()
                    .with_context(|| format!("NVML utilization read failed for GPU {idx}"))?;
                total_power_w += f64::from(power_mw) / 1000.0;
                total_util += f64::from(util.gpu);
            }

            let util_pct = if count > 0 {
                total_util / f64::from(count)
            } else {
                0.0
            };
            Ok(GpuReading {
                power_w: total_power_w,
                util_pct,
            })
        }

        #[cfg(not(feature = "nvidia"))]
        {
            Ok(GpuReading::default())
        }
    }
}
