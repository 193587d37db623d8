use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::{Measurement, MeasurementBuffer};
use crate::utils::unix_now;

use super::probe::MeasurementSource;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const DEBUG_LOG_EVERY: usize = 10;

pub(crate) type SharedSource = Arc<Mutex<Box<dyn MeasurementSource>>>;

/// Take one sample per tick until cancelled.
///
/// Cancellation is only observed between ticks, so an in-flight read always
/// completes and lands in the buffer. Ticks that overrun the period are
/// delayed rather than bunched up.
pub async fn sampling_loop(
    source: SharedSource,
    buffer: MeasurementBuffer,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!("energy sampling started (interval {:?})", interval);

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                log_info!("energy sampling shutting down after {} samples", buffer.len());
                break;
            }
            _ = ticker.tick() => {
                let measurement = take_measurement(&source).await;
                buffer.append(measurement);

                let count = buffer.len();
                if count % DEBUG_LOG_EVERY == 0 {
                    log_debug!(
                        "power: CPU={:.1}W GPU={:.1}W total={:.1}W CPU%={:.1} GPU%={:.1} ({} samples)",
                        measurement.cpu_power_w(),
                        measurement.gpu_power_w(),
                        measurement.total_power_w(),
                        measurement.cpu_util_pct(),
                        measurement.gpu_util_pct(),
                        count
                    );
                }
            }
        }
    }
}

async fn take_measurement(source: &SharedSource) -> Measurement {
    let timestamp = unix_now();
    match read_source(Arc::clone(source)).await {
        Ok(reading) => Measurement::new(timestamp, reading),
        Err(err) => {
            log_warn!("sampling tick failed, recording a zero sample: {err:#}");
            Measurement::zeroed(timestamp)
        }
    }
}

async fn read_source(source: SharedSource) -> Result<crate::metrics::Reading> {
    tokio::task::spawn_blocking(move || {
        let mut guard = match source.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.sample()
    })
    .await
    .map_err(|err| anyhow!("sampling worker join failed: {err}"))?
}
