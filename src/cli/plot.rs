use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::{Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use plotters::prelude::*;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tokio::fs;

use crate::{
    defs::Sample,
    store::{RunId, RunLog},
};

const PLOTS_DIR: &str = "plots";

#[derive(Clone, Debug, Parser)]
pub struct PlotOpts {
    /// Store directory containing the sample log
    #[arg(short, long, default_value = "data")]
    path: PathBuf,

    #[arg(short, long)]
    output_path: Option<PathBuf>,

    /// Plot a single run instead of every recorded run
    #[arg(short, long)]
    run: Option<u32>,
}

pub async fn plot(opts: PlotOpts) -> Result<()> {
    let runs = RunLog::read_runs(&opts.path).await?;
    tracing::info!("Found {} runs", runs.len());

    let selected: Vec<_> = runs
        .iter()
        .filter(|info| opts.run.is_none_or(|id| info.id == RunId(id)))
        .collect();

    if selected.is_empty() {
        bail!("No matching runs in {}", opts.path.display());
    }

    let output_dir = opts
        .output_path
        .clone()
        .unwrap_or_else(|| opts.path.join(PLOTS_DIR));

    if !fs::try_exists(&output_dir).await? {
        fs::create_dir_all(&output_dir).await?;
    }

    let mut jobs = Vec::with_capacity(selected.len());

    for info in selected {
        let samples = RunLog::read_samples(&opts.path, info.id).await?;
        jobs.push((info.id, samples));
    }

    let bar = ProgressBar::new(jobs.len() as u64);

    bar.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
        )
        .unwrap()
        .progress_chars("##-"),
    );

    jobs.into_par_iter().try_for_each(|(id, samples)| {
        let filename = output_dir.join(format!("run_{id:04}.png"));

        render_run(id, &samples, &filename)?;
        bar.inc(1);

        Ok::<_, eyre::Report>(())
    })?;

    bar.finish_and_clear();

    Ok(())
}

fn render_run(id: RunId, samples: &[Sample], filename: &Path) -> Result<()> {
    if samples.is_empty() {
        tracing::warn!("Run {id} has no samples, skipping");
        return Ok(());
    }

    let start = samples[0].timestamp;

    let series: Vec<(f32, f32)> = samples
        .iter()
        .map(|sample| {
            let elapsed = (sample.timestamp - start).num_milliseconds() as f32 / 1000.0;
            (elapsed, sample.temperature as f32)
        })
        .collect();

    let t_max = series.last().map(|(t, _)| *t).unwrap_or_default();

    let v_min = series.iter().map(|(_, v)| *v).fold(f32::INFINITY, f32::min);
    let v_max = series
        .iter()
        .map(|(_, v)| *v)
        .fold(f32::NEG_INFINITY, f32::max);

    let root = BitMapBackend::new(filename, (1800, 800)).into_drawing_area();

    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Run #{id}"), ("sans-serif", 24))
        .margin(24)
        .x_label_area_size(64)
        .y_label_area_size(64)
        .build_cartesian_2d(0f32..t_max.max(1.0), (v_min - 5.0)..(v_max + 5.0))?;

    chart
        .configure_mesh()
        .x_desc("Time [s]")
        .y_desc("Temperature [°C]")
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .draw()?;

    let (opacity, size) = match series.len() {
        0..500 => (1.0, 4),
        500..1000 => (0.5, 2),
        _ => (0.25, 1),
    };

    let style = ShapeStyle {
        color: RGBAColor(149, 81, 150, opacity),
        filled: true,
        stroke_width: 0,
    };

    chart.draw_series(LineSeries::new(
        series.iter().copied(),
        &RGBColor(149, 81, 150),
    ))?;

    chart.draw_series(
        series
            .iter()
            .map(|coords| Circle::new(*coords, size, style)),
    )?;

    root.present()?;

    Ok(())
}
