//! Derived comfort metrics computed at read time from a snapshot.
//!
//! Both functions are pure and propagate [`UNKNOWN`] from their inputs.

use crate::observation::{is_unknown, UNKNOWN};

// Magnus formula coefficients.
const MAGNUS_A: f64 = 17.27;
const MAGNUS_B: f64 = 237.7;

/// Dew point in °C (Magnus approximation).
///
/// Returns [`UNKNOWN`] if either input is unknown or humidity is not positive.
pub fn dew_point(temp_c: f64, humidity_pct: f64) -> f64 {
    if is_unknown(temp_c) || is_unknown(humidity_pct) || humidity_pct <= 0.0 {
        return UNKNOWN;
    }
    let gamma = (MAGNUS_A * temp_c) / (MAGNUS_B + temp_c) + (humidity_pct / 100.0).ln();
    (MAGNUS_B * gamma) / (MAGNUS_A - gamma)
}

/// "Feels like" temperature in °C.
///
/// - wind chill (Environment Canada) when below 10 °C with wind above 4.8 km/h,
/// - heat index (NOAA Rothfusz regression) at or above 27 °C and 40 % humidity,
/// - otherwise the air temperature itself.
pub fn feels_like(temp_c: f64, humidity_pct: f64, wind_mps: f64) -> f64 {
    if is_unknown(temp_c) {
        return UNKNOWN;
    }

    let wind_kmh = wind_mps * 3.6;

    // NaN comparisons are false, so unknown wind or humidity falls through.
    if temp_c < 10.0 && wind_kmh > 4.8 {
        return wind_chill(temp_c, wind_kmh);
    }
    if temp_c >= 27.0 && humidity_pct >= 40.0 {
        return heat_index(temp_c, humidity_pct);
    }
    temp_c
}

fn wind_chill(temp_c: f64, wind_kmh: f64) -> f64 {
    let v16 = wind_kmh.powf(0.16);
    13.12 + 0.6215 * temp_c - 11.37 * v16 + 0.3965 * temp_c * v16
}

fn heat_index(temp_c: f64, rh: f64) -> f64 {
    let tf = temp_c * 1.8 + 32.0;
    let hi = -42.379 + 2.04901523 * tf + 10.14333127 * rh
        - 0.22475541 * tf * rh
        - 0.00683783 * tf * tf
        - 0.05481717 * rh * rh
        + 0.00122874 * tf * tf * rh
        + 0.00085282 * tf * rh * rh
        - 0.00000199 * tf * tf * rh * rh;
    (hi - 32.0) / 1.8
}
