use std::{sync::Arc, time::Duration};

use serde::Serialize;
use strum::Display;
use tokio::{select, sync::watch, task::JoinHandle, time::sleep};

use crate::{
    defs::Sample,
    link::{
        LinkChannel, LinkState,
        protocol::{self, Scan},
    },
};

use super::queue::SampleQueue;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Trailing window kept while the buffer holds no complete frame. Bounds
/// both memory and rescan cost against a device that never frames
/// correctly.
const RESYNC_LIMIT: usize = 4096;

/* === Definitions === */

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
pub enum PumpState {
    Idle,
    Running,
    Stopped,
}

/// Background loop turning link bytes into queued samples.
///
/// The pump only observes the link: a fault surfaces as a state transition
/// and reopening stays an explicit operator action.
pub struct TelemetryPump {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<PumpState>,
    task: JoinHandle<()>,
}

/// Per-connection receive buffer with frame resynchronization.
struct Resync {
    buf: Vec<u8>,
    generation: u64,
}

/* === Implementations === */

impl TelemetryPump {
    pub fn spawn(link: Arc<LinkChannel>, queue: Arc<SampleQueue>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (state_tx, state) = watch::channel(PumpState::Idle);

        let task = tokio::spawn(pump_task(link, queue, state_tx, shutdown_rx));

        TelemetryPump {
            shutdown,
            state,
            task,
        }
    }

    pub fn state(&self) -> PumpState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PumpState> {
        self.state.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn pump_task(
    link: Arc<LinkChannel>,
    queue: Arc<SampleQueue>,
    state: watch::Sender<PumpState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut resync = Resync::new();

    loop {
        let interval = match link.state() {
            LinkState::Open => POLL_INTERVAL,
            _ => IDLE_INTERVAL,
        };

        select! {
            _ = shutdown.changed() => break,
            _ = sleep(interval) => {}
        }

        match link.state() {
            LinkState::Open => {
                set_state(&state, PumpState::Running);

                resync.sync_generation(link.generation());
                link.poll_available(resync.buffer());

                for centi_degrees in resync.decode() {
                    let temperature = protocol::degrees(centi_degrees);

                    tracing::debug!("Read temperature: {temperature} °C");
                    queue.push(Sample::now(temperature));
                }
            }

            _ => set_state(&state, PumpState::Idle),
        }
    }

    state.send_replace(PumpState::Stopped);
}

fn set_state(sender: &watch::Sender<PumpState>, next: PumpState) {
    sender.send_if_modified(|state| {
        if *state == next {
            return false;
        }

        tracing::debug!("Pump {state} -> {next}");
        *state = next;

        true
    });
}

impl Resync {
    fn new() -> Self {
        Resync {
            buf: Vec::new(),
            generation: 0,
        }
    }

    /// Stale bytes from before a reopen must not be stitched to fresh ones.
    fn sync_generation(&mut self, generation: u64) {
        if self.generation != generation {
            self.generation = generation;
            self.buf.clear();
        }
    }

    fn buffer(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    /// Extracts every complete frame currently buffered, then trims leftover
    /// garbage to the trailing window.
    fn decode(&mut self) -> Vec<u16> {
        let mut frames = Vec::new();

        loop {
            match protocol::scan_telemetry(&self.buf) {
                Scan::Frame {
                    centi_degrees,
                    consumed,
                } => {
                    self.buf.drain(..consumed);
                    frames.push(centi_degrees);
                }

                Scan::NeedMoreData => break,

                Scan::Garbage { discard } => {
                    self.buf.drain(..discard);
                    break;
                }
            }
        }

        if self.buf.len() > RESYNC_LIMIT {
            let excess = self.buf.len() - RESYNC_LIMIT;
            self.buf.drain(..excess);
        }

        frames
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::link::{Connector, LinkError, Transport};

    #[test]
    fn test_resync_decodes_consecutive_frames() {
        let mut resync = Resync::new();

        resync
            .buffer()
            .extend_from_slice(&[0x55, 0x02, 0x09, 0xC4, 0xAA, 0x55, 0x02, 0x0B, 0xB8, 0xAA]);

        assert_eq!(resync.decode(), [2500, 3000]);
        assert!(resync.buf.is_empty());
    }

    #[test]
    fn test_resync_keeps_partial_frame() {
        let mut resync = Resync::new();

        resync
            .buffer()
            .extend_from_slice(&[0x99, 0x55, 0x02, 0x09, 0xC4, 0xAA, 0x55, 0x02]);

        assert_eq!(resync.decode(), [2500]);
        assert_eq!(resync.buf, [0x55, 0x02]);

        resync.buffer().extend_from_slice(&[0x0B, 0xB8, 0xAA]);
        assert_eq!(resync.decode(), [3000]);
    }

    #[test]
    fn test_resync_discards_garbage() {
        let mut resync = Resync::new();

        resync.buffer().extend_from_slice(&[0x01, 0x02, 0x03]);

        assert_eq!(resync.decode(), [] as [u16; 0]);
        assert!(resync.buf.is_empty());
    }

    #[test]
    fn test_resync_clears_on_new_generation() {
        let mut resync = Resync::new();
        resync.sync_generation(1);

        resync.buffer().extend_from_slice(&[0x55, 0x02, 0x09]);
        resync.sync_generation(1);
        assert_eq!(resync.buf.len(), 3);

        resync.sync_generation(2);
        assert!(resync.buf.is_empty());
    }

    #[test]
    fn test_resync_trims_unbounded_garbage() {
        let mut resync = Resync::new();

        // A trailing header candidate pins the whole run as "need more data".
        resync.buffer().extend_from_slice(&[0x00; RESYNC_LIMIT]);
        resync.buffer().push(0x55);

        assert_eq!(resync.decode(), [] as [u16; 0]);
        assert!(resync.buf.len() <= RESYNC_LIMIT);
    }

    /* == Pump task == */

    struct ScriptedTransport(Vec<u8>);

    struct ScriptedConnector(Vec<u8>);

    impl Transport for ScriptedTransport {
        fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
            let count = self.0.len();
            buf.append(&mut self.0);
            Ok(count)
        }

        fn write_all(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connector for ScriptedConnector {
        fn connect(&self) -> Result<Box<dyn Transport>, LinkError> {
            Ok(Box::new(ScriptedTransport(self.0.clone())))
        }
    }

    #[tokio::test]
    async fn test_pump_queues_decoded_samples() {
        let frame = vec![0x31, 0x55, 0x02, 0x1D, 0x4C, 0xAA];

        let link = Arc::new(LinkChannel::with_connector(Box::new(ScriptedConnector(
            frame,
        ))));

        let queue = Arc::new(SampleQueue::new(8));
        let pump = TelemetryPump::spawn(link.clone(), queue.clone());

        link.open().unwrap();

        // The first iteration may still be on the idle cadence, so allow a
        // generous window for the decode to land.
        for _ in 0..200 {
            if !queue.is_empty() {
                break;
            }

            sleep(Duration::from_millis(20)).await;
        }

        let samples = queue.drain();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].temperature, 75.0);
        assert_eq!(pump.state(), PumpState::Running);

        pump.shutdown().await;
    }

    #[tokio::test]
    async fn test_pump_idles_and_stops() {
        let link = Arc::new(LinkChannel::with_connector(Box::new(ScriptedConnector(
            Vec::new(),
        ))));

        let queue = Arc::new(SampleQueue::new(8));
        let pump = TelemetryPump::spawn(link, queue);

        let mut state = pump.subscribe();
        assert_eq!(pump.state(), PumpState::Idle);

        pump.shutdown().await;

        state.wait_for(|s| *s == PumpState::Stopped).await.unwrap();
    }
}
