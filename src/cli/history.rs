use std::path::PathBuf;

use chrono::Local;
use clap::Parser;
use eyre::Result;

use crate::store::{RunId, RunLog};

#[derive(Parser)]
pub struct HistoryOpts {
    /// Store directory containing the sample log
    #[arg(short, long, default_value = "data")]
    path: PathBuf,

    /// Run to dump; lists all runs when omitted
    run: Option<u32>,
}

pub async fn history(opts: HistoryOpts) -> Result<()> {
    match opts.run {
        Some(id) => dump_run(&opts, RunId(id)).await,
        None => list_runs(&opts).await,
    }
}

async fn list_runs(opts: &HistoryOpts) -> Result<()> {
    let runs = RunLog::read_runs(&opts.path).await?;

    println!("{:<6}  {}", "Run", "Started");

    for run in runs {
        let started = run.started_at.with_timezone(&Local);

        println!("{:<6}  {}", run.id, started.format("%Y-%m-%d %H:%M:%S"));
    }

    Ok(())
}

async fn dump_run(opts: &HistoryOpts, id: RunId) -> Result<()> {
    let samples = RunLog::read_samples(&opts.path, id).await?;

    println!("Run {id} ({} samples)", samples.len());

    for sample in &samples {
        let time = sample.timestamp.with_timezone(&Local);

        println!(
            "  {}  {:>8.2} °C",
            time.format("%Y-%m-%d %H:%M:%S"),
            sample.temperature
        );
    }

    Ok(())
}
