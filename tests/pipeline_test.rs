//! End-to-end tests: datasets on disk through the full analysis batch

use std::fmt::Write as _;
use std::path::PathBuf;

use moran_validate::config::AnalysisConfig;
use moran_validate::ode::{horizon, solve};
use moran_validate::pipeline::{AnalysisReport, Outcome, Pipeline, STEP_HISTOGRAMS};
use moran_validate::storage::{ParamKey, TimeWindow};
use moran_validate::Error;
use tempfile::TempDir;

/// Write a time-series CSV in the simulator's layout for the given pairs.
///
/// Each pair gets the reference ODE curve (every 10th grid point), `runs`
/// Moran runs that track the curve with a per-run offset, and a Deviation
/// summary row.
fn write_series(dir: &TempDir, pairs: &[ParamKey], runs: usize) -> PathBuf {
    let mut csv = String::from("N,r,Type,Sim_ID,Time,Value,std_sup_dev\n");
    for key in pairs {
        let t_n = horizon(key.n);
        let curve = solve(key.r, t_n, 0.5).unwrap();
        for p in curve.iter().step_by(10) {
            writeln!(csv, "{},{:.6},ODE,-1,{:.6},{:.6}", key.n, key.r, p.time, p.value).unwrap();
        }
        for sim in 0..runs {
            let offset = 0.01 * (sim as f64 + 1.0);
            for p in curve.iter().step_by(100) {
                let x = (p.value + offset).min(1.0);
                writeln!(csv, "{},{:.6},Moran,{sim},{:.6},{:.6}", key.n, key.r, p.time, x).unwrap();
            }
        }
        writeln!(csv, "{},{:.6},Deviation,-1,{t_n:.6},0.020000,0.008000", key.n, key.r).unwrap();
    }
    let path = dir.path().join("moran_simulation_results.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

fn write_absorption(dir: &TempDir) -> PathBuf {
    let mut csv = String::from("N,r,Sim_ID,AbsorptionTime\n");
    for (sim, t) in [12.0, 55.5, 200.0, 350.0].iter().enumerate() {
        writeln!(csv, "50,1.100000,{sim},{t:.6}").unwrap();
    }
    writeln!(csv, "100,1.300000,0,30.000000").unwrap();
    let path = dir.path().join("absorption_times.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

fn run(pairs: &[ParamKey], targets: Vec<ParamKey>) -> AnalysisReport {
    let dir = TempDir::new().unwrap();
    let series = write_series(&dir, pairs, 3);
    let absorption = write_absorption(&dir);
    let config = AnalysisConfig::default()
        .with_paths(series, absorption)
        .with_targets(targets);
    Pipeline::new(config).unwrap().execute().unwrap()
}

#[test]
fn test_full_batch() {
    let key = ParamKey::new(100, 1.3);
    let report = run(&[key, ParamKey::new(50, 1.1)], vec![key]);

    assert!(report.failures().is_empty(), "{:?}", report.failures());
    let target = &report.targets[0];

    let summary = target.trajectories.ok().unwrap();
    assert_eq!(summary.found, 3);
    assert_eq!(summary.kept, 3);

    // Reported curve is the reference rounded to 6 decimals
    let ode = target.ode.ok().unwrap();
    assert!(ode.cross_check.max_abs_diff < 1e-5);
    assert_eq!(ode.cross_check.skipped, 0);

    // Runs sit 0.01, 0.02, 0.03 above the curve (until capped at 1)
    let deviation = target.deviation.ok().unwrap();
    assert_eq!(deviation.recomputed.n_sim, 3);
    assert!((deviation.recomputed.mean_sup_dev - 0.02).abs() < 1e-3);
    let reported = deviation.reported.unwrap();
    assert!((reported.mean_sup_dev - 0.02).abs() < 1e-12);
    assert!((reported.ci95 - 0.008 / 1000_f64.sqrt() * 1.96).abs() < 1e-12);
}

#[test]
fn test_trajectories_windowed_and_truncated() {
    let key = ParamKey::new(100, 1.3);
    let dir = TempDir::new().unwrap();
    let series = write_series(&dir, &[key], 3);
    let absorption = write_absorption(&dir);
    let config = AnalysisConfig {
        time_window: TimeWindow::new(0.0, 2.0),
        ..AnalysisConfig::default().with_paths(series, absorption)
    };

    let pipeline = Pipeline::new(config.clone()).unwrap();
    let (store, _) = pipeline.load().unwrap();
    let runs = pipeline.trajectories(&store, key).unwrap();
    assert_eq!(runs.len(), 3);
    for (expected, run) in runs.iter().enumerate() {
        assert_eq!(run.sim_id(), expected);
        assert!(!run.is_empty());
        assert!(run.points().windows(2).all(|w| w[0].time <= w[1].time));
        assert!(run.points().iter().all(|p| (0.0..=2.0).contains(&p.time)));
    }

    let truncated = Pipeline::new(AnalysisConfig {
        max_trajectories: 2,
        ..config
    })
    .unwrap();
    let runs = truncated.trajectories(&store, key).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs.get(1).unwrap().sim_id(), 1);
    assert!(runs.get(2).is_none());
}

#[test]
fn test_deviation_series_grouped_by_r() {
    let report = run(
        &[ParamKey::new(100, 1.3), ParamKey::new(50, 1.1), ParamKey::new(50, 1.3)],
        vec![],
    );
    let labels: Vec<&str> = report
        .deviation_series
        .iter()
        .map(|s| s.r_label.as_str())
        .collect();
    assert_eq!(labels, vec!["1.10", "1.30"]);
    let ns: Vec<u32> = report.deviation_series[1].points.iter().map(|p| p.key.n).collect();
    assert_eq!(ns, vec![50, 100]);
}

#[test]
fn test_histograms_from_disk() {
    let report = run(&[ParamKey::new(50, 1.1)], vec![]);
    let histograms = report.histograms.ok().unwrap();
    // (50, 1.1) and (100, 1.3) present; (50, 1.3), (100, 1.1), 300 and 1000 skipped
    assert_eq!(histograms.len(), 2);
    let h = &histograms[0];
    assert_eq!(h.key, ParamKey::new(50, 1.1));
    assert_eq!(h.samples, 4);
    assert_eq!(h.excluded, 1);
    assert_eq!(h.bins[89].count, 1);
}

#[test]
fn test_failing_target_does_not_stop_others() {
    let present = ParamKey::new(100, 1.3);
    let absent = ParamKey::new(1000, 1.05);
    let report = run(&[present], vec![absent, present]);

    assert!(report.targets[1].trajectories.is_ok());
    assert!(report.targets[1].ode.is_ok());
    assert!(report.targets[1].deviation.is_ok());

    let failures = report.failures();
    assert_eq!(failures.len(), 3);
    for failure in &failures {
        assert_eq!(failure.key, Some(absent));
        assert_eq!(failure.kind, "EmptyResult");
        assert!(failure.message.contains("N=1000, r=1.05"));
    }
    assert!(!failures.iter().any(|f| f.step == STEP_HISTOGRAMS));
}

#[test]
fn test_report_serializes() {
    let key = ParamKey::new(100, 1.3);
    let report = run(&[key], vec![key]);
    let json = report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value["generated_at"].is_string());
    assert_eq!(value["n_sim"], 1000);
    assert!(value["targets"][0]["ode"]["ok"]["cross_check"]["max_abs_diff"].is_number());
}

#[test]
fn test_missing_dataset_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = AnalysisConfig::default().with_paths(
        dir.path().join("moran_simulation_results.csv"),
        dir.path().join("absorption_times.csv"),
    );
    let err = Pipeline::new(config).unwrap().execute().unwrap_err();
    assert!(matches!(err, Error::MissingFile { .. }));
}

#[test]
fn test_outcome_failed_shape() {
    let report = run(&[ParamKey::new(100, 1.3)], vec![ParamKey::new(7, 2.0)]);
    match &report.targets[0].ode {
        Outcome::Failed { step, kind, .. } => {
            assert_eq!(step, "ode_comparison");
            assert_eq!(kind, "EmptyResult");
        }
        Outcome::Ok(_) => panic!("no ODE rows exist for N=7"),
    }
}
