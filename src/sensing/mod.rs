pub mod controller;
pub mod gpu;
mod loop_worker;
pub mod probe;

pub use controller::{
    HaltGuard, Sampler, SamplerConfig, SamplerState, StopOutcome, DEFAULT_SAMPLING_INTERVAL,
    DEFAULT_STOP_TIMEOUT,
};
pub use gpu::{GpuProbe, GpuReading};
pub use probe::{tdp_from_topology, HardwareProbe, MeasurementSource};
