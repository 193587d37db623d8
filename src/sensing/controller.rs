use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::metrics::{Measurement, MeasurementBuffer, SamplerInfo};

use super::loop_worker::{sampling_loop, SharedSource};
use super::probe::{HardwareProbe, MeasurementSource};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_SAMPLING_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    pub interval: Duration,
    /// Upper bound on how long `stop` waits for the loop to acknowledge.
    pub stop_timeout: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SAMPLING_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SamplerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopOutcome {
    /// The loop finished its current tick and exited.
    Stopped,
    /// The loop did not exit in time; it was abandoned and the buffer may be
    /// missing its final tick.
    TimedOut,
    NotRunning,
}

/// Background sampler: owns a measurement source and, while running, one
/// tokio task appending to a fresh [`MeasurementBuffer`].
pub struct Sampler {
    config: SamplerConfig,
    source: SharedSource,
    info: SamplerInfo,
    buffer: MeasurementBuffer,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Sampler {
    pub fn new(source: impl MeasurementSource, config: SamplerConfig) -> Self {
        let info = source.info();
        let boxed: Box<dyn MeasurementSource> = Box::new(source);
        Self {
            config: SamplerConfig {
                interval: config.interval.max(MIN_SAMPLING_INTERVAL),
                stop_timeout: config.stop_timeout,
            },
            source: Arc::new(Mutex::new(boxed)),
            info,
            buffer: MeasurementBuffer::new(),
            handle: None,
            cancel_token: None,
        }
    }

    pub fn with_hardware(config: SamplerConfig) -> Self {
        Self::new(HardwareProbe::new(), config)
    }

    pub fn config(&self) -> SamplerConfig {
        self.config
    }

    pub fn info(&self) -> &SamplerInfo {
        &self.info
    }

    pub fn state(&self) -> SamplerState {
        if self.handle.is_some() {
            SamplerState::Running
        } else {
            SamplerState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SamplerState::Running
    }

    /// Spawn the sampling loop on the current tokio runtime with an empty
    /// buffer. Returns `false` without side effects when already running or
    /// when called outside a runtime.
    pub fn start(&mut self) -> bool {
        if self.handle.is_some() {
            log_warn!("energy sampling already running, ignoring start");
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                log_error!("cannot start energy sampling outside a tokio runtime: {err}");
                return false;
            }
        };

        let cancel_token = CancellationToken::new();
        self.buffer = MeasurementBuffer::new();

        let handle = runtime.spawn(sampling_loop(
            Arc::clone(&self.source),
            self.buffer.clone(),
            self.config.interval,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        true
    }

    /// Ask the loop to exit after its current tick and wait at most
    /// `stop_timeout` for it. The sampler is idle when this returns, whatever
    /// the outcome.
    pub async fn stop(&mut self) -> StopOutcome {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let Some(handle) = self.handle.take() else {
            log_warn!("energy sampling is not running, ignoring stop");
            return StopOutcome::NotRunning;
        };

        let abort_handle = handle.abort_handle();
        match tokio::time::timeout(self.config.stop_timeout, handle).await {
            Ok(Ok(())) => {
                log_info!("energy sampling stopped with {} samples", self.buffer.len());
                StopOutcome::Stopped
            }
            Ok(Err(err)) if err.is_cancelled() => {
                log_info!(
                    "energy sampling was halted early with {} samples",
                    self.buffer.len()
                );
                StopOutcome::Stopped
            }
            Ok(Err(err)) => {
                log_error!("energy sampling task failed to join: {err}");
                StopOutcome::Stopped
            }
            Err(_) => {
                abort_handle.abort();
                log_warn!(
                    "energy sampling did not stop within {:?}; continuing with {} collected samples",
                    self.config.stop_timeout,
                    self.buffer.len()
                );
                StopOutcome::TimedOut
            }
        }
    }

    /// Guard that halts the running loop if dropped while armed. The sampler
    /// still reports `Running` afterwards; `stop` collects the frozen buffer.
    pub fn halt_guard(&self) -> HaltGuard {
        HaltGuard {
            cancel_token: self.cancel_token.clone(),
            abort_handle: self.handle.as_ref().map(JoinHandle::abort_handle),
        }
    }

    /// Shared handle to the current session's samples.
    pub fn buffer(&self) -> MeasurementBuffer {
        self.buffer.clone()
    }

    pub fn snapshot(&self) -> Vec<Measurement> {
        self.buffer.snapshot()
    }

    /// Most recent sample, for live displays.
    pub fn latest(&self) -> Option<Measurement> {
        self.buffer.latest()
    }
}

/// See [`Sampler::halt_guard`].
#[must_use = "dropping the guard halts sampling immediately"]
pub struct HaltGuard {
    cancel_token: Option<CancellationToken>,
    abort_handle: Option<AbortHandle>,
}

impl HaltGuard {
    /// Leave the loop running.
    pub fn disarm(mut self) {
        self.cancel_token = None;
        self.abort_handle = None;
    }
}

impl Drop for HaltGuard {
    fn drop(&mut self) {
        let Some(abort_handle) = self.abort_handle.take() else {
            return;
        };
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        abort_handle.abort();
        log_warn!("energy sampling halted before the session was finished");
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
