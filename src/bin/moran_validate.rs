//! Batch cross-validation of Moran simulator output.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use moran_validate::config::AnalysisConfig;
use moran_validate::pipeline::{AnalysisReport, Outcome, Pipeline};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "moran-validate")]
#[command(about = "Cross-validate Moran process simulations against the logistic ODE")]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moran_validate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(report) if report.failures().is_empty() => ExitCode::SUCCESS,
        Ok(report) => {
            error!(failures = report.failures().len(), "analysis finished with failed steps");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<AnalysisReport> {
    let config = match &cli.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    let report = pipeline.execute().context("loading datasets")?;

    for target in &report.targets {
        let max_diff = target.ode.ok().map(|o| o.cross_check.max_abs_diff);
        let runs = target.trajectories.ok().map(|t| t.found);
        let mean_sup = target.deviation.ok().map(|d| d.recomputed.mean_sup_dev);
        info!(key = %target.key, ?runs, ?max_diff, ?mean_sup, "target summary");
    }
    if let Outcome::Ok(histograms) = &report.histograms {
        info!(histograms = histograms.len(), "absorption histograms");
    }

    let json = report.to_json()?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(report)
}
