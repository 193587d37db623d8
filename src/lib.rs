mod utils;

pub mod aggregation;
pub mod carbon;
pub mod config;
pub mod metrics;
pub mod sensing;
pub mod session;

pub use aggregation::{summarize, EnergySummary};
pub use carbon::{
    BudgetStatus, CarbonFootprint, FootprintCalculator, IntensityCache, IntensityProvider,
    IntensitySource,
};
pub use config::{EcotrackConfig, ProviderKind};
pub use metrics::{Measurement, MeasurementBuffer, Reading, SamplerInfo};
pub use sensing::{MeasurementSource, Sampler, SamplerConfig, StopOutcome};
pub use session::{CarbonSession, SessionConfig, SessionReport, WorkloadOutcome};
pub use utils::unix_now;

/// Route `log` output through `env_logger`. Safe to call more than once.
pub fn init_logging() {
    utils::logging::init();
}
