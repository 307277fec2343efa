use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded temperature reading, stamped when the frame was decoded.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
}

impl Sample {
    pub fn now(temperature: f64) -> Self {
        Sample {
            timestamp: Utc::now(),
            temperature,
        }
    }
}
