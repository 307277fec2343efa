use std::{
    sync::mpsc,
    thread::{JoinHandle, spawn},
    time::Duration,
};

use eyre::Result;
use rodio::{
    OutputStream, Sink,
    source::{SineWave, Source},
};

use crate::safety::AlertKind;

/// Plays audible feedback for clamped setpoints. Playback problems are
/// logged, never propagated to the command path.
pub trait AlertSounder: Send + Sync {
    fn play(&self, alert: AlertKind);
}

pub struct AudioPlayer {
    queue: mpsc::Sender<AlertKind>,
    _thread: JoinHandle<Result<()>>,
}

/// Stand-in when audio output is disabled by configuration.
pub struct SilentSounder;

impl AudioPlayer {
    pub fn new() -> Self {
        let (queue, rx) = mpsc::channel();
        let _thread = spawn(move || audio_thread(rx));

        AudioPlayer { queue, _thread }
    }
}

impl Default for AudioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSounder for AudioPlayer {
    fn play(&self, alert: AlertKind) {
        if self.queue.send(alert).is_err() {
            tracing::warn!("Audio thread is gone, dropping {alert} alert");
        }
    }
}

impl AlertSounder for SilentSounder {
    fn play(&self, alert: AlertKind) {
        tracing::debug!("Audio disabled, suppressing {alert} alert");
    }
}

fn audio_thread(queue: mpsc::Receiver<AlertKind>) -> Result<()> {
    let (_stream, handle) = OutputStream::try_default()?;
    let sink = Sink::try_new(&handle)?;

    while let Ok(alert) = queue.recv() {
        sink.append(alert_tone(alert));
    }

    Ok(())
}

/// One distinct tone per alert kind, pitched to match the direction.
fn alert_tone(alert: AlertKind) -> impl Source<Item = f32> {
    let frequency = match alert {
        AlertKind::LowTemperature => 330.0,
        AlertKind::HighTemperature => 880.0,
    };

    SineWave::new(frequency)
        .take_duration(Duration::from_millis(600))
        .amplify(0.8)
}
