use std::{fmt, io, path::Path};

use async_trait::async_trait;
use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};
use chunked_bytes::ChunkedBytes;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncReadExt, AsyncWriteExt},
    sync::Mutex,
};

use crate::{defs::Sample, pipeline::SampleStore};

const META_FILE: &str = "meta.json";
const LOG_FILE: &str = "samples.bin";

/// Record layout: run id (u32), timestamp in microseconds (i64),
/// temperature (f32), all big-endian.
const RECORD_LEN: usize = 16;

/* === Definitions === */

/// Append-only sample log shared by every run.
///
/// Runs are told apart by the run id column rather than per-session tables
/// or files; opening the store registers a fresh id in the metadata
/// sidecar.
pub struct RunLog {
    file: Mutex<File>,
    run_id: RunId,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RunId(pub u32);

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct RunInfo {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to append sample: {0}")]
    WriteFailed(#[from] io::Error),
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Metadata {
    runs: Vec<RunInfo>,
}

struct Record {
    run_id: RunId,
    timestamp_micros: i64,
    temperature: f32,
}

/* === Implementations === */

impl RunLog {
    /// Opens the store directory, allocating the next run id for this
    /// session.
    pub async fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)
            .await
            .wrap_err("Failed to create store directory")?;

        let mut metadata = Metadata::load(path).await?;
        let run_id = metadata.next_run_id();

        metadata.runs.push(RunInfo {
            id: run_id,
            started_at: Utc::now(),
        });

        metadata.save(path).await?;

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path.join(LOG_FILE))
            .await
            .wrap_err("Failed to open sample log")?;

        tracing::info!("Opened sample log as run {run_id}");

        Ok(RunLog {
            file: Mutex::new(file),
            run_id,
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Lists recorded runs, oldest first.
    pub async fn read_runs(path: &Path) -> Result<Vec<RunInfo>> {
        Ok(Metadata::load(path).await?.runs)
    }

    /// Reads one run's samples from the log in append order.
    pub async fn read_samples(path: &Path, id: RunId) -> Result<Vec<Sample>> {
        let mut data = Vec::new();

        File::open(path.join(LOG_FILE))
            .await
            .wrap_err("Failed to open sample log")?
            .read_to_end(&mut data)
            .await?;

        let mut buf = &data[..];
        let mut samples = Vec::new();

        while buf.remaining() >= RECORD_LEN {
            let record = Record::get(&mut buf);

            if record.run_id == id {
                samples.push(record.sample());
            }
        }

        Ok(samples)
    }
}

#[async_trait]
impl SampleStore for RunLog {
    async fn append(&self, sample: &Sample) -> Result<(), StoreError> {
        let mut staged = ChunkedBytes::new();
        Record::new(self.run_id, sample).put(&mut staged);

        let mut file = self.file.lock().await;

        file.write_all_buf(&mut staged).await?;
        file.flush().await?;

        Ok(())
    }
}

impl Metadata {
    async fn load(path: &Path) -> Result<Self> {
        let meta_path = path.join(META_FILE);

        if !fs::try_exists(&meta_path).await? {
            return Ok(Metadata::default());
        }

        let data = fs::read(&meta_path).await?;

        serde_json::from_slice(&data).wrap_err("Failed to parse store metadata")
    }

    async fn save(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path.join(META_FILE)).await?;

        file.write_all(&serde_json::to_vec_pretty(self)?).await?;
        file.flush().await?;

        Ok(())
    }

    fn next_run_id(&self) -> RunId {
        RunId(self.runs.iter().map(|run| run.id.0 + 1).max().unwrap_or(0))
    }
}

impl Record {
    fn new(run_id: RunId, sample: &Sample) -> Self {
        Record {
            run_id,
            timestamp_micros: sample.timestamp.timestamp_micros(),
            temperature: sample.temperature as f32,
        }
    }

    fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.run_id.0);
        buf.put_i64(self.timestamp_micros);
        buf.put_f32(self.temperature);
    }

    fn get<B: Buf>(buf: &mut B) -> Self {
        Record {
            run_id: RunId(buf.get_u32()),
            timestamp_micros: buf.get_i64(),
            temperature: buf.get_f32(),
        }
    }

    fn sample(&self) -> Sample {
        let timestamp = DateTime::from_timestamp_micros(self.timestamp_micros)
            .unwrap_or(DateTime::UNIX_EPOCH);

        Sample {
            timestamp,
            temperature: f64::from(self.temperature),
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
