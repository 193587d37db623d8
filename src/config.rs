use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc, time::Duration};

use crate::carbon::{
    ElectricityMapsProvider, IntensityProvider, MockIntensityProvider, StaticIntensityProvider,
    DEFAULT_TTL,
};
use crate::sensing::{SamplerConfig, DEFAULT_SAMPLING_INTERVAL, DEFAULT_STOP_TIMEOUT};
use crate::session::SessionConfig;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const ENV_REGION: &str = "ECOTRACK_REGION";
pub const ENV_API_KEY: &str = "ECOTRACK_API_KEY";
pub const ENV_SAMPLING_INTERVAL: &str = "ECOTRACK_SAMPLING_INTERVAL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Mock,
    ElectricityMap,
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcotrackConfig {
    pub region: String,
    pub cache_ttl_secs: u64,
    pub sampling_interval_secs: f64,
    pub stop_timeout_secs: f64,
    pub daily_budget_kg: Option<f64>,
    pub provider: ProviderKind,
    pub api_key: Option<String>,
}

impl Default for EcotrackConfig {
    fn default() -> Self {
        Self {
            region: "IN-SO".into(),
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            sampling_interval_secs: DEFAULT_SAMPLING_INTERVAL.as_secs_f64(),
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT.as_secs_f64(),
            daily_budget_kg: None,
            provider: ProviderKind::default(),
            api_key: None,
        }
    }
}

impl EcotrackConfig {
    /// Read a JSON config file. A missing file yields defaults; an unreadable
    /// one is an error; an unparsable one yields defaults with a warning.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log_info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Ok(Self::from_json(&contents).unwrap_or_else(|err| {
            log_warn!("ignoring invalid config {}: {err:#}", path.display());
            Self::default()
        }))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents).context("Failed to parse config")?;
        Ok(config.sanitized())
    }

    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `ECOTRACK_*` overrides read through `var`.
    pub fn apply_env_with(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(region) = var(ENV_REGION).filter(|r| !r.trim().is_empty()) {
            self.region = region.trim().to_string();
        }
        if let Some(api_key) = var(ENV_API_KEY).filter(|k| !k.is_empty()) {
            self.api_key = Some(api_key);
        }
        if let Some(raw) = var(ENV_SAMPLING_INTERVAL) {
            match raw.trim().parse::<f64>() {
                Ok(secs) => self.sampling_interval_secs = secs,
                Err(err) => log_warn!("ignoring {ENV_SAMPLING_INTERVAL}={raw}: {err}"),
            }
        }
        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !valid_secs(self.sampling_interval_secs) {
            log_warn!(
                "invalid sampling interval {}s, using {}s",
                self.sampling_interval_secs,
                defaults.sampling_interval_secs
            );
            self.sampling_interval_secs = defaults.sampling_interval_secs;
        }
        if !valid_secs(self.stop_timeout_secs) {
            log_warn!(
                "invalid stop timeout {}s, using {}s",
                self.stop_timeout_secs,
                defaults.stop_timeout_secs
            );
            self.stop_timeout_secs = defaults.stop_timeout_secs;
        }
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::try_from_secs_f64(self.sampling_interval_secs)
                .unwrap_or(DEFAULT_SAMPLING_INTERVAL),
            stop_timeout: Duration::try_from_secs_f64(self.stop_timeout_secs)
                .unwrap_or(DEFAULT_STOP_TIMEOUT),
        }
    }

    pub fn session_config(&self, name: impl Into<String>) -> SessionConfig {
        SessionConfig {
            name: name.into(),
            daily_budget_kg: self.daily_budget_kg,
        }
    }

    pub fn build_provider(&self) -> Arc<dyn IntensityProvider> {
        match (self.provider, self.api_key.as_deref()) {
            (ProviderKind::ElectricityMap, Some(key)) => {
                Arc::new(ElectricityMapsProvider::new(key))
            }
            (ProviderKind::ElectricityMap, None) => {
                log_warn!("electricitymap provider needs an API key, using mock intensities");
                Arc::new(MockIntensityProvider::new())
            }
            (ProviderKind::Static, _) => Arc::new(StaticIntensityProvider::regional_averages()),
            (ProviderKind::Mock, _) => Arc::new(MockIntensityProvider::new()),
        }
    }
}

fn valid_secs(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0
}
