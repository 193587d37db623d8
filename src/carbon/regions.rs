//! Static per-region grid averages, used when no live intensity is available.

/// Global average grid intensity in gCO2eq/kWh.
pub const GLOBAL_DEFAULT_INTENSITY: f64 = 475.0;

/// Global average electricity price in USD/kWh.
pub const DEFAULT_COST_PER_KWH: f64 = 0.15;

/// (region, gCO2eq/kWh)
pub const REGIONAL_INTENSITY: &[(&str, f64)] = &[
    ("IN-SO", 708.0), // coal heavy
    ("US-CA", 234.0),
    ("DE", 401.0),
    ("FR", 79.0), // nuclear heavy
    ("GB", 233.0),
    ("CN", 681.0),
    ("JP", 475.0),
];

/// (region, USD/kWh)
pub const REGIONAL_COST_PER_KWH: &[(&str, f64)] = &[
    ("IN-SO", 0.08),
    ("US-CA", 0.20),
    ("DE", 0.30),
    ("FR", 0.18),
    ("GB", 0.25),
    ("CN", 0.08),
    ("JP", 0.26),
];

fn lookup(table: &[(&str, f64)], region: &str) -> Option<f64> {
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(region))
        .map(|(_, value)| *value)
}

pub fn regional_intensity(region: &str) -> Option<f64> {
    lookup(REGIONAL_INTENSITY, region)
}

pub fn cost_per_kwh(region: &str) -> f64 {
    lookup(REGIONAL_COST_PER_KWH, region).unwrap_or(DEFAULT_COST_PER_KWH)
}
