use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::aggregation::EnergySummary;

use super::cache::IntensityCache;
use super::equivalents::calculate_equivalents;
use super::regions::{cost_per_kwh, regional_intensity, GLOBAL_DEFAULT_INTENSITY};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Where the intensity behind a footprint came from, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntensitySource {
    Override,
    Cache,
    RegionalAverage,
    GlobalDefault,
}

/// Modeled emissions for one session.
///
/// Only constructible from energy and intensity, so the derived totals always
/// agree with them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarbonFootprint {
    energy_kwh: f64,
    avg_carbon_intensity: f64,
    total_co2_grams: f64,
    total_co2_kg: f64,
    duration_hours: f64,
    cost_estimate_usd: Option<f64>,
    intensity_source: Option<IntensitySource>,
}

impl CarbonFootprint {
    pub fn new(
        energy_kwh: f64,
        carbon_intensity: f64,
        duration_hours: f64,
        cost_per_kwh: Option<f64>,
        source: IntensitySource,
    ) -> Self {
        let total_co2_grams = energy_kwh * carbon_intensity;
        Self {
            energy_kwh,
            avg_carbon_intensity: carbon_intensity,
            total_co2_grams,
            total_co2_kg: total_co2_grams / 1000.0,
            duration_hours,
            cost_estimate_usd: cost_per_kwh.map(|rate| energy_kwh * rate),
            intensity_source: Some(source),
        }
    }

    /// No measurable consumption; keeps the elapsed time.
    pub fn zero(duration_hours: f64) -> Self {
        Self {
            energy_kwh: 0.0,
            avg_carbon_intensity: 0.0,
            total_co2_grams: 0.0,
            total_co2_kg: 0.0,
            duration_hours,
            cost_estimate_usd: None,
            intensity_source: None,
        }
    }

    pub fn energy_kwh(&self) -> f64 {
        self.energy_kwh
    }

    /// gCO2eq/kWh used for this footprint.
    pub fn avg_carbon_intensity(&self) -> f64 {
        self.avg_carbon_intensity
    }

    pub fn total_co2_grams(&self) -> f64 {
        self.total_co2_grams
    }

    pub fn total_co2_kg(&self) -> f64 {
        self.total_co2_kg
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_hours
    }

    pub fn cost_estimate_usd(&self) -> Option<f64> {
        self.cost_estimate_usd
    }

    pub fn intensity_source(&self) -> Option<IntensitySource> {
        self.intensity_source
    }

    pub fn equivalents(&self) -> BTreeMap<&'static str, String> {
        calculate_equivalents(self.total_co2_kg)
    }
}

impl fmt::Display for CarbonFootprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Carbon Footprint: {:.2}g CO2 ({:.6}kg) from {:.6}kWh over {:.2}h",
            self.total_co2_grams, self.total_co2_kg, self.energy_kwh, self.duration_hours
        )
    }
}

/// Turns energy summaries into footprints for one region.
///
/// Cloning is cheap; clones share the intensity cache.
#[derive(Clone)]
pub struct FootprintCalculator {
    region: String,
    cache: Arc<IntensityCache>,
}

impl FootprintCalculator {
    pub fn new(region: impl Into<String>, cache: Arc<IntensityCache>) -> Self {
        let region = region.into();
        log_info!(
            "carbon calculator initialized for region {region} (provider: {})",
            cache.provider_name()
        );
        Self { region, cache }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn cache(&self) -> &Arc<IntensityCache> {
        &self.cache
    }

    /// Footprint of `summary`. Without a usable override this consults the
    /// cache and may block on an upstream fetch.
    pub fn calculate(
        &self,
        summary: &EnergySummary,
        intensity_override: Option<f64>,
    ) -> CarbonFootprint {
        if summary.energy.total_kwh <= 0.0 {
            log_warn!("no energy consumption recorded");
            return CarbonFootprint::zero(summary.duration_hours);
        }

        let (intensity, source) = self.resolve_intensity(intensity_override);
        self.build(summary, intensity, source)
    }

    /// Same as [`calculate`](Self::calculate) but never touches the cache.
    pub fn calculate_offline(&self, summary: &EnergySummary) -> CarbonFootprint {
        if summary.energy.total_kwh <= 0.0 {
            return CarbonFootprint::zero(summary.duration_hours);
        }

        let (intensity, source) = self.static_intensity();
        self.build(summary, intensity, source)
    }

    /// Override → cache → regional average → global default.
    pub fn resolve_intensity(&self, intensity_override: Option<f64>) -> (f64, IntensitySource) {
        match intensity_override {
            Some(value) if value.is_finite() && value >= 0.0 => {
                return (value, IntensitySource::Override)
            }
            Some(value) => log_warn!("ignoring invalid carbon intensity override {value}"),
            None => {}
        }

        if let Some(value) = self.cache.get(&self.region) {
            return (value, IntensitySource::Cache);
        }

        self.static_intensity()
    }

    fn static_intensity(&self) -> (f64, IntensitySource) {
        match regional_intensity(&self.region) {
            Some(value) => {
                log_warn!(
                    "using regional average carbon intensity for {}: {value} gCO2eq/kWh",
                    self.region
                );
                (value, IntensitySource::RegionalAverage)
            }
            None => {
                log_warn!(
                    "no carbon intensity data for {}, using global default {GLOBAL_DEFAULT_INTENSITY} gCO2eq/kWh",
                    self.region
                );
                (GLOBAL_DEFAULT_INTENSITY, IntensitySource::GlobalDefault)
            }
        }
    }

    fn build(
        &self,
        summary: &EnergySummary,
        intensity: f64,
        source: IntensitySource,
    ) -> CarbonFootprint {
        let footprint = CarbonFootprint::new(
            summary.energy.total_kwh,
            intensity,
            summary.duration_hours,
            Some(cost_per_kwh(&self.region)),
            source,
        );
        log_info!("carbon footprint calculated: {footprint}");
        footprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::EnergyBreakdown;
    use crate::carbon::provider::{IntensityProvider, ProviderError, StaticIntensityProvider};

    struct DownProvider;

    impl IntensityProvider for DownProvider {
        fn name(&self) -> &'static str {
            "down"
        }

        fn fetch(&self, region: &str) -> Result<f64, ProviderError> {
            Err(ProviderError::Unavailable {
                region: region.to_string(),
            })
        }
    }

    fn summary(total_kwh: f64, duration_hours: f64) -> EnergySummary {
        EnergySummary {
            duration_hours,
            duration_seconds: duration_hours * 3600.0,
            sample_count: 2,
            energy: EnergyBreakdown {
                total_kwh,
                cpu_kwh: total_kwh,
                gpu_kwh: 0.0,
            },
            ..EnergySummary::default()
        }
    }

    fn offline(region: &str) -> FootprintCalculator {
        let cache = IntensityCache::with_default_ttl(Arc::new(DownProvider));
        FootprintCalculator::new(region, Arc::new(cache))
    }

    #[test]
    fn override_intensity_is_used_directly() {
        let footprint = offline("IN-SO").calculate(&summary(0.1, 1.0), Some(400.0));

        assert_eq!(footprint.energy_kwh(), 0.1);
        assert_eq!(footprint.avg_carbon_intensity(), 400.0);
        assert_eq!(footprint.total_co2_grams(), 40.0);
        assert_eq!(footprint.total_co2_kg(), 0.04);
        assert_eq!(footprint.intensity_source(), Some(IntensitySource::Override));
    }

    #[test]
    fn zero_energy_keeps_duration() {
        let footprint = offline("FR").calculate(&summary(0.0, 2.5), Some(400.0));
        assert_eq!(footprint, CarbonFootprint::zero(2.5));
        assert_eq!(footprint.duration_hours(), 2.5);
        assert_eq!(footprint.intensity_source(), None);
        assert_eq!(footprint.cost_estimate_usd(), None);
    }

    #[test]
    fn cached_intensity_beats_regional_average() {
        let provider = StaticIntensityProvider::new().with_region("FR", 55.0);
        let cache = Arc::new(IntensityCache::with_default_ttl(Arc::new(provider)));
        let footprint = FootprintCalculator::new("FR", cache).calculate(&summary(1.0, 1.0), None);

        assert_eq!(footprint.avg_carbon_intensity(), 55.0);
        assert_eq!(footprint.intensity_source(), Some(IntensitySource::Cache));
    }

    #[test]
    fn unavailable_upstream_falls_back_to_region() {
        let footprint = offline("FR").calculate(&summary(1.0, 1.0), None);
        assert_eq!(footprint.avg_carbon_intensity(), 79.0);
        assert_eq!(
            footprint.intensity_source(),
            Some(IntensitySource::RegionalAverage)
        );
    }

    #[test]
    fn unknown_region_falls_back_to_global_default() {
        let footprint = offline("ZZ").calculate(&summary(1.0, 1.0), None);
        assert_eq!(footprint.avg_carbon_intensity(), GLOBAL_DEFAULT_INTENSITY);
        assert_eq!(
            footprint.intensity_source(),
            Some(IntensitySource::GlobalDefault)
        );
    }

    #[test]
    fn invalid_override_continues_down_the_chain() {
        let footprint = offline("GB").calculate(&summary(1.0, 1.0), Some(-1.0));
        assert_eq!(footprint.avg_carbon_intensity(), 233.0);
    }

    #[test]
    fn cost_uses_regional_price() {
        let footprint = offline("DE").calculate(&summary(2.0, 1.0), Some(100.0));
        let cost = footprint.cost_estimate_usd().unwrap();
        assert!((cost - 0.6).abs() < 1e-12);
    }

    #[test]
    fn offline_calculation_skips_the_cache() {
        let provider = StaticIntensityProvider::new().with_region("FR", 55.0);
        let cache = Arc::new(IntensityCache::with_default_ttl(Arc::new(provider)));
        let calculator = FootprintCalculator::new("FR", cache.clone());

        let footprint = calculator.calculate_offline(&summary(1.0, 1.0));
        assert_eq!(footprint.avg_carbon_intensity(), 79.0);
        assert_eq!(cache.stats().fetches, 0);
    }

    #[test]
    fn display_matches_report_format() {
        let footprint = offline("FR").calculate(&summary(0.1, 1.0), Some(400.0));
        assert_eq!(
            footprint.to_string(),
            "Carbon Footprint: 40.00g CO2 (0.040000kg) from 0.100000kWh over 1.00h"
        );
    }
}
