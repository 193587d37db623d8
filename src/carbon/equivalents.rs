//! Relatable comparisons for an amount of CO2, from fixed published factors.

use std::collections::BTreeMap;

/// kg CO2 per mile driven by an average passenger car.
pub const CAR_KG_PER_MILE: f64 = 0.404;
pub const KM_PER_MILE: f64 = 1.60934;
/// kg CO2 per full smartphone charge.
pub const SMARTPHONE_CHARGE_KG: f64 = 0.0084;
/// kg CO2 per hour of a 10W LED bulb.
pub const LED_BULB_KG_PER_HOUR: f64 = 0.009;
/// kg CO2 absorbed by one tree in a year.
pub const TREE_KG_PER_YEAR: f64 = 21.8;
/// kg CO2 per passenger-km on a short-haul flight.
pub const FLIGHT_KG_PER_KM: f64 = 0.255;

pub fn calculate_equivalents(co2_kg: f64) -> BTreeMap<&'static str, String> {
    let car_miles = co2_kg / CAR_KG_PER_MILE;

    BTreeMap::from([
        (
            "car_driving_miles",
            format!("{car_miles:.2} miles of driving"),
        ),
        (
            "car_driving_km",
            format!("{:.2} km of driving", car_miles * KM_PER_MILE),
        ),
        (
            "smartphone_charges",
            format!("{:.0} smartphone charges", co2_kg / SMARTPHONE_CHARGE_KG),
        ),
        (
            "led_bulb_hours",
            format!(
                "{:.1} hours of LED light bulb",
                co2_kg / LED_BULB_KG_PER_HOUR
            ),
        ),
        (
            "tree_absorption",
            format!(
                "{:.4} years of tree CO2 absorption",
                co2_kg / TREE_KG_PER_YEAR
            ),
        ),
        (
            "flight_km",
            format!(
                "{:.2} km of flight per passenger",
                co2_kg / FLIGHT_KG_PER_KM
            ),
        ),
    ])
}
