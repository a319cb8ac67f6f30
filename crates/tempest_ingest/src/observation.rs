//! Observation model and decoders.
//!
//! Two wire shapes feed the same [`Observation`]:
//!
//! - the live stream sends `obs_st` frames as a positional array
//!   ([`decode_stream_frame`]),
//! - the REST fallback returns field-keyed objects ([`RestObservation`]).
//!
//! The stream decoder maps null or mistyped slots to [`UNKNOWN`]; the REST
//! decoder maps absent fields to zero. The two are intentionally not unified.

use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;

/// Sentinel for a field whose source value was absent, null or mistyped.
pub const UNKNOWN: f64 = f64::NAN;

/// Returns true if `value` is the [`UNKNOWN`] sentinel.
pub fn is_unknown(value: f64) -> bool {
    value.is_nan()
}

/// One complete reading cycle from the station.
///
/// Replaced wholesale in the store; never mutated field by field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Observation {
    /// Epoch seconds.
    pub timestamp: i64,
    /// m/s
    pub wind_lull: f64,
    /// m/s
    pub wind_avg: f64,
    /// m/s
    pub wind_gust: f64,
    /// Degrees.
    pub wind_direction: f64,
    /// Seconds.
    pub wind_sample_interval: f64,
    /// Millibars.
    pub station_pressure: f64,
    /// Celsius.
    pub air_temperature: f64,
    /// Percent.
    pub relative_humidity: f64,
    /// Lux.
    pub illuminance: f64,
    pub uv: f64,
    /// W/m².
    pub solar_radiation: f64,
    /// mm over the report interval.
    pub rain_accumulated: f64,
    /// 0 = none, 1 = rain, 2 = hail, 3 = rain + hail.
    pub precipitation_type: f64,
    /// km
    pub lightning_strike_avg_distance: f64,
    pub lightning_strike_count: f64,
    /// Volts.
    pub battery: f64,
    /// Minutes.
    pub report_interval: f64,
}

// ── Stream frame (obs_st) ───────────────────────────────────────────

/// Minimum number of slots in an `obs_st` frame.
pub const STREAM_FRAME_SLOTS: usize = 18;

// Slot table for `obs_st`. Position is agreed out of band with the server.
const SLOT_TIMESTAMP: usize = 0;
const SLOT_WIND_LULL: usize = 1;
const SLOT_WIND_AVG: usize = 2;
const SLOT_WIND_GUST: usize = 3;
const SLOT_WIND_DIRECTION: usize = 4;
const SLOT_WIND_SAMPLE_INTERVAL: usize = 5;
const SLOT_STATION_PRESSURE: usize = 6;
const SLOT_AIR_TEMPERATURE: usize = 7;
const SLOT_RELATIVE_HUMIDITY: usize = 8;
const SLOT_ILLUMINANCE: usize = 9;
const SLOT_UV: usize = 10;
const SLOT_SOLAR_RADIATION: usize = 11;
const SLOT_RAIN_ACCUMULATED: usize = 12;
const SLOT_PRECIPITATION_TYPE: usize = 13;
const SLOT_LIGHTNING_AVG_DISTANCE: usize = 14;
const SLOT_LIGHTNING_COUNT: usize = 15;
const SLOT_BATTERY: usize = 16;
const SLOT_REPORT_INTERVAL: usize = 17;

/// Decode one `obs_st` positional frame.
///
/// Fails only if the frame is shorter than [`STREAM_FRAME_SLOTS`] or the
/// timestamp slot is unusable. Every other slot degrades to [`UNKNOWN`].
pub fn decode_stream_frame(raw: &[Value]) -> Result<Observation, DecodeError> {
    if raw.len() < STREAM_FRAME_SLOTS {
        return Err(DecodeError::FrameTooShort {
            got: raw.len(),
            want: STREAM_FRAME_SLOTS,
        });
    }

    let timestamp = to_timestamp(&raw[SLOT_TIMESTAMP])?;
    let slot = |i: usize| to_float(&raw[i]);

    Ok(Observation {
        timestamp,
        wind_lull: slot(SLOT_WIND_LULL),
        wind_avg: slot(SLOT_WIND_AVG),
        wind_gust: slot(SLOT_WIND_GUST),
        wind_direction: slot(SLOT_WIND_DIRECTION),
        wind_sample_interval: slot(SLOT_WIND_SAMPLE_INTERVAL),
        station_pressure: slot(SLOT_STATION_PRESSURE),
        air_temperature: slot(SLOT_AIR_TEMPERATURE),
        relative_humidity: slot(SLOT_RELATIVE_HUMIDITY),
        illuminance: slot(SLOT_ILLUMINANCE),
        uv: slot(SLOT_UV),
        solar_radiation: slot(SLOT_SOLAR_RADIATION),
        rain_accumulated: slot(SLOT_RAIN_ACCUMULATED),
        precipitation_type: slot(SLOT_PRECIPITATION_TYPE),
        lightning_strike_avg_distance: slot(SLOT_LIGHTNING_AVG_DISTANCE),
        lightning_strike_count: slot(SLOT_LIGHTNING_COUNT),
        battery: slot(SLOT_BATTERY),
        report_interval: slot(SLOT_REPORT_INTERVAL),
    })
}

/// Coerce a JSON value to `f64`, accepting numbers and numeric strings.
///
/// Anything else (null, bool, array, object, unparseable string) is [`UNKNOWN`].
pub fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(UNKNOWN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(UNKNOWN),
        _ => UNKNOWN,
    }
}

/// Coerce a JSON value to an epoch timestamp.
pub fn to_timestamp(value: &Value) -> Result<i64, DecodeError> {
    match value {
        Value::Null => Err(DecodeError::Timestamp("null timestamp".to_string())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            if n.is_u64() {
                return Err(DecodeError::Timestamp(format!(
                    "timestamp out of range: {}",
                    n
                )));
            }
            float_to_timestamp(n.as_f64().unwrap_or(f64::NAN))
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(i);
            }
            match s.parse::<f64>() {
                Ok(f) => float_to_timestamp(f),
                Err(_) => Err(DecodeError::Timestamp(format!(
                    "invalid timestamp string {:?}",
                    s
                ))),
            }
        }
        other => Err(DecodeError::Timestamp(format!(
            "invalid timestamp type: {}",
            json_type_name(other)
        ))),
    }
}

fn float_to_timestamp(f: f64) -> Result<i64, DecodeError> {
    // i64::MAX as f64 rounds up to 2^63, which itself does not fit.
    if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(DecodeError::Timestamp(format!(
            "timestamp out of range: {}",
            f
        )));
    }
    Ok(f as i64)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── REST response ───────────────────────────────────────────────────

/// Top-level REST response for `observations/station/<id>`.
#[derive(Debug, Deserialize)]
pub struct RestResponse {
    #[serde(default)]
    pub obs: Vec<RestObservation>,
}

/// A single field-keyed observation from the REST API.
///
/// Every field is optional; see [`RestObservation::into_observation`].
#[derive(Debug, Default, Deserialize)]
pub struct RestObservation {
    pub timestamp: Option<f64>,
    pub wind_lull: Option<f64>,
    pub wind_avg: Option<f64>,
    pub wind_gust: Option<f64>,
    pub wind_direction: Option<f64>,
    pub station_pressure: Option<f64>,
    pub air_temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub illuminance: Option<f64>,
    pub uv: Option<f64>,
    pub solar_radiation: Option<f64>,
    pub rain_accumulated: Option<f64>,
    #[serde(rename = "precip_type")]
    pub precipitation_type: Option<f64>,
    pub lightning_strike_avg_distance: Option<f64>,
    pub lightning_strike_count: Option<f64>,
    pub battery: Option<f64>,
    pub report_interval: Option<f64>,
}

impl RestObservation {
    /// Convert to an [`Observation`].
    ///
    /// Absent fields become `0.0`, not [`UNKNOWN`]. The REST schema has no
    /// wind sample interval, so that field is always `0.0`. A missing,
    /// negative or out-of-range timestamp leaves the timestamp at `0`.
    pub fn into_observation(self) -> Observation {
        let field = |v: Option<f64>| v.unwrap_or(0.0);

        let timestamp = match self.timestamp {
            Some(ts) if ts >= 0.0 && ts < i64::MAX as f64 => ts as i64,
            _ => 0,
        };

        Observation {
            timestamp,
            wind_lull: field(self.wind_lull),
            wind_avg: field(self.wind_avg),
            wind_gust: field(self.wind_gust),
            wind_direction: field(self.wind_direction),
            wind_sample_interval: 0.0,
            station_pressure: field(self.station_pressure),
            air_temperature: field(self.air_temperature),
            relative_humidity: field(self.relative_humidity),
            illuminance: field(self.illuminance),
            uv: field(self.uv),
            solar_radiation: field(self.solar_radiation),
            rain_accumulated: field(self.rain_accumulated),
            precipitation_type: field(self.precipitation_type),
            lightning_strike_avg_distance: field(self.lightning_strike_avg_distance),
            lightning_strike_count: field(self.lightning_strike_count),
            battery: field(self.battery),
            report_interval: field(self.report_interval),
        }
    }
}

/// Decode a REST response body into the first observation it carries.
pub fn decode_rest_body(body: &[u8]) -> Result<Observation, DecodeError> {
    let response: RestResponse =
        serde_json::from_slice(body).map_err(|e| DecodeError::Json(e.to_string()))?;
    response
        .obs
        .into_iter()
        .next()
        .map(RestObservation::into_observation)
        .ok_or(DecodeError::NoObservations)
}
