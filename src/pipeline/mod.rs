use std::sync::Arc;

use eyre::Result;

use crate::{
    audio::{AlertSounder, AudioPlayer, SilentSounder},
    config::Config,
    controller::Controller,
    display::TableDisplay,
    link::LinkChannel,
    store::RunLog,
};

pub mod pump;
pub mod queue;
pub mod sink;

pub use pump::{PumpState, TelemetryPump};
pub use queue::SampleQueue;
pub use sink::{SampleDisplay, SampleSink, SampleStore};

/// The assembled telemetry pipeline: link, pump, queue, sink and the
/// operator command path, wired from one configuration.
pub struct Pipeline {
    pub controller: Arc<Controller>,
    link: Arc<LinkChannel>,
    pump: TelemetryPump,
    sink: SampleSink,
}

impl Pipeline {
    pub async fn start(config: &Config) -> Result<Self> {
        let link = Arc::new(LinkChannel::serial(&config.link));
        let queue = Arc::new(SampleQueue::new(config.pipeline.queue_capacity));
        let store = Arc::new(RunLog::open(&config.store.path).await?);
        let display = Arc::new(TableDisplay::default());

        let sounder: Arc<dyn AlertSounder> = match config.audio.enabled {
            true => Arc::new(AudioPlayer::new()),
            false => Arc::new(SilentSounder),
        };

        let pump = TelemetryPump::spawn(link.clone(), queue.clone());

        let sink = SampleSink::spawn(
            queue.clone(),
            store.clone(),
            display,
            config.pipeline.drain_interval(),
        );

        let controller = Arc::new(Controller::new(
            link.clone(),
            sounder,
            queue,
            pump.subscribe(),
            store.run_id(),
        ));

        Ok(Pipeline {
            controller,
            link,
            pump,
            sink,
        })
    }

    /// Stops the background tasks after releasing the device. Samples still
    /// queued at this point are dropped; everything already persisted stays
    /// persisted.
    pub async fn stop(self) {
        self.link.close();
        self.pump.shutdown().await;
        self.sink.shutdown().await;
    }
}
