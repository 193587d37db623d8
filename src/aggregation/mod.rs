pub mod summary;

pub use summary::{
    summarize, EnergyBreakdown, EnergySummary, MemoryStats, PowerStats, UtilizationStats,
};
