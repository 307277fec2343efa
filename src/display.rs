use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Local;

use crate::{defs::Sample, pipeline::SampleDisplay};

const HEADER_EVERY: u64 = 20;

/// Renders live samples as an aligned two-column table on stdout, the
/// transient half of the sample fan-out.
#[derive(Default)]
pub struct TableDisplay {
    rows: AtomicU64,
}

#[async_trait]
impl SampleDisplay for TableDisplay {
    async fn render(&self, sample: &Sample) {
        let row = self.rows.fetch_add(1, Ordering::Relaxed);

        if row % HEADER_EVERY == 0 {
            println!("{:<20}  {:>10}", "Time", "Temp [°C]");
        }

        let time = sample
            .timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        println!("{time:<20}  {:>10.2}", sample.temperature);
    }
}
