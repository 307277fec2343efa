use serde::Serialize;
use strum::Display;

/// Lowest setpoint the device accepts, itself a valid request.
pub const MIN_SETPOINT: f64 = 15.0;

/// Highest setpoint the device accepts, itself a valid request.
pub const MAX_SETPOINT: f64 = 150.0;

/// Replacement applied to any out-of-range request, mirroring the
/// device-side safe default. Out-of-range requests are replaced, not
/// rejected.
pub const FALLBACK_SETPOINT: f64 = 50.0;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
pub enum AlertKind {
    LowTemperature,
    HighTemperature,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Clamped {
    pub effective: f64,
    pub alert: Option<AlertKind>,
}

pub fn clamp(requested: f64) -> Clamped {
    if requested < MIN_SETPOINT {
        Clamped {
            effective: FALLBACK_SETPOINT,
            alert: Some(AlertKind::LowTemperature),
        }
    } else if requested > MAX_SETPOINT {
        Clamped {
            effective: FALLBACK_SETPOINT,
            alert: Some(AlertKind::HighTemperature),
        }
    } else {
        Clamped {
            effective: requested,
            alert: None,
        }
    }
}

/// Fixed-point wire conversion. The clamp keeps the product within the
/// unsigned 16-bit payload range, so the cast cannot overflow.
pub fn to_centi_degrees(degrees: f64) -> u16 {
    (degrees * 100.0).round() as u16
}
