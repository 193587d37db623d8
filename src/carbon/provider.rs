use chrono::{Local, Timelike};
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use super::regions::REGIONAL_INTENSITY;

const ENABLE_LOGS: bool = true;

use crate::log_info;

const ELECTRICITY_MAPS_URL: &str = "https://api.electricitymap.org/v3/carbon-intensity/latest";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no carbon intensity available for region {region}")]
    Unavailable { region: String },

    #[error("carbon intensity request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("carbon intensity provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid carbon intensity data: {0}")]
    InvalidData(String),
}

/// Upstream source of grid carbon intensity, in gCO2eq/kWh.
///
/// `fetch` is one blocking call. Any retry policy lives in the implementation;
/// callers treat an error as "unavailable right now".
pub trait IntensityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch(&self, region: &str) -> Result<f64, ProviderError>;
}

/// Fixed table of intensities; deterministic and offline.
#[derive(Debug, Clone, Default)]
pub struct StaticIntensityProvider {
    intensities: HashMap<String, f64>,
}

impl StaticIntensityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded with the built-in regional averages.
    pub fn regional_averages() -> Self {
        REGIONAL_INTENSITY
            .iter()
            .fold(Self::new(), |provider, (region, value)| {
                provider.with_region(region, *value)
            })
    }

    pub fn with_region(mut self, region: &str, intensity: f64) -> Self {
        self.set_intensity(region, intensity);
        self
    }

    pub fn set_intensity(&mut self, region: &str, intensity: f64) {
        self.intensities
            .insert(region.to_ascii_uppercase(), intensity.max(0.0));
    }
}

impl IntensityProvider for StaticIntensityProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn fetch(&self, region: &str) -> Result<f64, ProviderError> {
        self.intensities
            .get(&region.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| ProviderError::Unavailable {
                region: region.to_string(),
            })
    }
}

/// Simulated grid following a daily cycle: clean overnight, dirty at the
/// morning and evening peaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockIntensityProvider;

impl MockIntensityProvider {
    pub fn new() -> Self {
        Self
    }

    /// Base intensity and maximum jitter for a local hour of day.
    pub fn profile_for_hour(hour: u32) -> (f64, i32) {
        match hour {
            0..=6 => (150.0, 30),
            7..=9 | 18..=22 => (350.0, 50),
            _ => (250.0, 40),
        }
    }

    pub fn intensity_at(hour: u32, rng: &mut impl Rng) -> f64 {
        let (base, spread) = Self::profile_for_hour(hour);
        base + f64::from(rng.gen_range(-spread..=spread))
    }
}

impl IntensityProvider for MockIntensityProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn fetch(&self, region: &str) -> Result<f64, ProviderError> {
        let hour = Local::now().hour();
        let intensity = Self::intensity_at(hour, &mut rand::thread_rng());
        log_info!("mock carbon intensity in {region}: {intensity} gCO2eq/kWh (simulated)");
        Ok(intensity)
    }
}

#[derive(Debug, Deserialize)]
struct LatestIntensity {
    #[serde(rename = "carbonIntensity")]
    carbon_intensity: Option<f64>,
}

/// Live intensity from the Electricity Maps `carbon-intensity/latest` endpoint.
#[derive(Debug, Clone)]
pub struct ElectricityMapsProvider {
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl ElectricityMapsProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ELECTRICITY_MAPS_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl IntensityProvider for ElectricityMapsProvider {
    fn name(&self) -> &'static str {
        "electricitymap"
    }

    fn fetch(&self, region: &str) -> Result<f64, ProviderError> {
        // Built per call: the blocking client owns a runtime and must not be
        // created or dropped on an async worker thread.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        let response = client
            .get(&self.base_url)
            .query(&[("zone", region)])
            .header("auth-token", &self.api_key)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: LatestIntensity = response.json()?;
        let intensity = payload
            .carbon_intensity
            .ok_or_else(|| ProviderError::InvalidData("missing carbonIntensity".into()))?;
        log_info!("current carbon intensity in {region}: {intensity} gCO2eq/kWh");
        Ok(intensity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn static_provider_serves_known_regions_only() {
        let provider = StaticIntensityProvider::new().with_region("fr", 79.0);
        assert_eq!(provider.fetch("FR").unwrap(), 79.0);
        assert!(matches!(
            provider.fetch("DE"),
            Err(ProviderError::Unavailable { .. })
        ));
    }

    #[test]
    fn regional_averages_cover_the_fallback_table() {
        let provider = StaticIntensityProvider::regional_averages();
        assert_eq!(provider.fetch("IN-SO").unwrap(), 708.0);
        assert_eq!(provider.fetch("JP").unwrap(), 475.0);
    }

    #[test]
    fn negative_static_values_are_floored() {
        let provider = StaticIntensityProvider::new().with_region("XX", -5.0);
        assert_eq!(provider.fetch("XX").unwrap(), 0.0);
    }

    #[test]
    fn mock_follows_daily_cycle() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let night = MockIntensityProvider::intensity_at(3, &mut rng);
            let peak = MockIntensityProvider::intensity_at(19, &mut rng);
            let midday = MockIntensityProvider::intensity_at(13, &mut rng);
            assert!((120.0..=180.0).contains(&night));
            assert!((300.0..=400.0).contains(&peak));
            assert!((210.0..=290.0).contains(&midday));
        }
    }

    #[test]
    fn mock_always_answers() {
        let value = MockIntensityProvider::new().fetch("anywhere").unwrap();
        assert!((120.0..=400.0).contains(&value));
    }
}
