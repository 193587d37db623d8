pub mod budget;
pub mod cache;
pub mod equivalents;
pub mod footprint;
pub mod provider;
pub mod regions;

pub use budget::{BudgetStatus, DEFAULT_DAILY_BUDGET_KG};
pub use cache::{CacheEntry, CacheStats, IntensityCache, DEFAULT_TTL};
pub use equivalents::calculate_equivalents;
pub use footprint::{CarbonFootprint, FootprintCalculator, IntensitySource};
pub use provider::{
    ElectricityMapsProvider, IntensityProvider, MockIntensityProvider, ProviderError,
    StaticIntensityProvider,
};
pub use regions::GLOBAL_DEFAULT_INTENSITY;
