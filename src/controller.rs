use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::{
    audio::AlertSounder,
    link::{LinkChannel, LinkError, LinkState, OpenOutcome, protocol::CommandFrame},
    pipeline::{PumpState, SampleQueue},
    safety::{self, AlertKind},
    store::RunId,
};

/* === Definitions === */

/// Operator-facing command path. Every operation returns a human-readable
/// status message rather than raising; link errors never escape as faults.
pub struct Controller {
    link: Arc<LinkChannel>,
    pump_state: watch::Receiver<PumpState>,
    queue: Arc<SampleQueue>,
    run_id: RunId,
    sounder: Arc<dyn AlertSounder>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct StatusSnapshot {
    pub link: LinkState,
    pub pump: PumpState,
    pub queued: usize,
    pub dropped: u64,
    pub run: RunId,
}

/* === Implementations === */

impl Controller {
    pub fn new(
        link: Arc<LinkChannel>,
        sounder: Arc<dyn AlertSounder>,
        queue: Arc<SampleQueue>,
        pump_state: watch::Receiver<PumpState>,
        run_id: RunId,
    ) -> Self {
        Controller {
            link,
            pump_state,
            queue,
            run_id,
            sounder,
        }
    }

    /// Clamps, encodes and sends a requested setpoint, playing the matching
    /// alert when the safety policy replaced the value.
    pub fn submit_setpoint(&self, requested: f64) -> String {
        let clamped = safety::clamp(requested);
        let frame = CommandFrame::new(safety::to_centi_degrees(clamped.effective));

        if let Err(err) = self.link.send(&frame.to_bytes()) {
            return match err {
                LinkError::NotOpen => "Link not open".to_owned(),
                err => format!("Failed to send setpoint: {err}"),
            };
        }

        match clamped.alert {
            None => format!("Setpoint set to {} °C", clamped.effective),

            Some(alert) => {
                self.sounder.play(alert);

                let direction = match alert {
                    AlertKind::LowTemperature => "too low",
                    AlertKind::HighTemperature => "too high",
                };

                format!(
                    "Setpoint {requested} °C is {direction}, clamped to {} °C and alert played",
                    clamped.effective
                )
            }
        }
    }

    pub fn open_link(&self) -> String {
        match self.link.open() {
            Ok(OpenOutcome::Opened) => "Link opened".to_owned(),
            Ok(OpenOutcome::AlreadyOpen) => "Link already open".to_owned(),
            Err(err) => format!("Failed to open link: {err}"),
        }
    }

    pub fn close_link(&self) -> String {
        match self.link.state() {
            LinkState::Closed => "Link not open".to_owned(),

            _ => {
                self.link.close();
                "Link closed".to_owned()
            }
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            link: self.link.state(),
            pump: *self.pump_state.borrow(),
            queued: self.queue.len(),
            dropped: self.queue.dropped(),
            run: self.run_id,
        }
    }
}
