use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use serde::Serialize;
use spine_vec::{
    check_sufficiency, compute_spine_vectors_with, parse_weight, read_coordinates, sort_points,
    weight_shares, write_coordinates, write_result_table, FittedCurve, IndependentAxis, Params,
    Point, SpineLoadResult,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Spinal load vector CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute per-level and resultant load vectors from a coordinates CSV
    Compute(ComputeArgs),
    /// Fit the spinal curve and write a sampled polyline with tangent angles
    Curve(CurveArgs),
    /// List vertebral levels with their weight shares
    Levels(LevelsArgs),
}

#[derive(Parser, Debug)]
struct ComputeArgs {
    /// Coordinates CSV (`Level,X,Y`)
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Body weight in kg (defaults to the params file, then 60)
    #[arg(short, long)]
    weight: Option<String>,

    /// Output result table path (`-` for stdout)
    #[arg(short, long, default_value = "spine_vec.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Also write the sorted coordinates table
    #[arg(long, value_hint = ValueHint::FilePath)]
    coords_out: Option<PathBuf>,

    /// Optional JSON report with every intermediate vector
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// Independent axis of the fitted curve
    #[arg(long, value_enum)]
    axis: Option<AxisOpt>,

    /// Optional params JSON path
    #[arg(long, value_hint = ValueHint::FilePath)]
    params: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct CurveArgs {
    /// Coordinates CSV (`Level,X,Y`)
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output polyline CSV path (`-` for stdout)
    #[arg(short, long, default_value = "curve.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Per-point tangent angle CSV path
    #[arg(long, value_hint = ValueHint::FilePath)]
    angles: Option<PathBuf>,

    /// Number of evenly spaced samples along the curve
    #[arg(long)]
    samples: Option<usize>,

    /// Independent axis of the fitted curve
    #[arg(long, value_enum)]
    axis: Option<AxisOpt>,

    /// Optional params JSON path
    #[arg(long, value_hint = ValueHint::FilePath)]
    params: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct LevelsArgs {
    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AxisOpt {
    X,
    Y,
}

impl From<AxisOpt> for IndependentAxis {
    fn from(value: AxisOpt) -> Self {
        match value {
            AxisOpt::X => IndependentAxis::X,
            AxisOpt::Y => IndependentAxis::Y,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Compute(args) => args.verbose,
        Command::Curve(args) => args.verbose,
        Command::Levels(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Compute(args) => handle_compute(args),
        Command::Curve(args) => handle_curve(args),
        Command::Levels(args) => handle_levels(args),
    }
}

#[derive(Serialize)]
struct Report<'a> {
    generated_at: String,
    input: String,
    params: &'a Params,
    result: &'a SpineLoadResult,
}

fn handle_compute(args: ComputeArgs) -> Result<()> {
    let params = resolve_params(args.params.as_deref(), args.axis, None)?;
    let weight = match args.weight.as_deref() {
        Some(text) => parse_weight(text)
            .ok_or_else(|| anyhow!("weight '{}' is not a positive number", text))?,
        None => params.weight_kg,
    };

    let points = load_points(&args.input)?;
    info!("Loaded {} points from {}", points.len(), args.input.display());
    if let Some(reason) = check_sufficiency(&points, weight, params.min_points_per_region) {
        return Err(anyhow!(
            "insufficient data in {}: {}",
            args.input.display(),
            reason
        ));
    }

    let t_compute = Instant::now();
    let result = compute_spine_vectors_with(&points, weight, &params)
        .with_context(|| format!("failed to compute vectors for {}", args.input.display()))?
        .ok_or_else(|| anyhow!("insufficient data in {}", args.input.display()))?;
    debug!(
        "Compute stage: {:.3} ms ({} levels)",
        t_compute.elapsed().as_secs_f64() * 1000.0,
        result.levels.len()
    );
    info!(
        "Resultant vector: angle {:.2}°, magnitude {:.2} N ({} kg)",
        result.global().clinical_angle_deg,
        result.global().magnitude,
        weight
    );

    {
        let writer = open_output(&args.output)?;
        write_result_table(&result.rows, writer)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
    }
    if args.output.as_os_str() != "-" {
        info!("Wrote result table: {}", args.output.display());
    }

    if let Some(path) = args.coords_out.as_ref() {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        write_coordinates(&result.points, params.axis, file)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote coordinates: {}", path.display());
    }

    if let Some(path) = args.json.as_ref() {
        write_report(&args.input, &params, &result, path)?;
        info!("Wrote JSON report: {}", path.display());
    }

    Ok(())
}

fn handle_curve(args: CurveArgs) -> Result<()> {
    let params = resolve_params(args.params.as_deref(), args.axis, args.samples)?;
    let points = load_points(&args.input)?;
    if points.len() < 2 {
        return Err(anyhow!(
            "at least 2 points are needed to fit a curve, {} has {}",
            args.input.display(),
            points.len()
        ));
    }

    let sorted = sort_points(&points, params.axis);
    let curve = FittedCurve::fit(&sorted, params.axis)
        .with_context(|| format!("failed to fit curve through {}", args.input.display()))?;
    let samples = curve.sample(params.curve_samples)?;
    let angles = curve.tangent_angles(&sorted);

    {
        let mut writer = csv::Writer::from_writer(open_output(&args.output)?);
        writer.write_record(["X", "Y"])?;
        for (x, y) in &samples {
            writer.write_record([format!("{:.3}", x), format!("{:.3}", y)])?;
        }
        writer.flush()?;
    }
    if args.output.as_os_str() != "-" {
        info!(
            "Wrote curve polyline: {} ({} samples)",
            args.output.display(),
            samples.len()
        );
    }

    match args.angles.as_ref() {
        Some(path) => {
            write_angles(&sorted, &angles, path)?;
            info!("Wrote tangent angles: {}", path.display());
        }
        None => {
            for (point, angle) in sorted.iter().zip(angles.iter()) {
                debug!("{:>4} ({:.1}, {:.1}): {:.2}°", point.label, point.x, point.y, angle);
            }
        }
    }
    Ok(())
}

fn handle_levels(args: LevelsArgs) -> Result<()> {
    let mut writer = csv::Writer::from_writer(open_output(&args.output)?);
    writer.write_record([
        "Level",
        "Region",
        "Relative Weight",
        "Single Level Share",
        "Cumulative Share",
    ])?;
    for (level, share) in weight_shares().iter() {
        writer.write_record([
            level.to_string(),
            level.region().to_string(),
            format!("{:.1}", level.relative_weight()),
            format!("{:.4}", share.single_level),
            format!("{:.4}", share.cumulative),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn resolve_params(
    path: Option<&Path>,
    axis: Option<AxisOpt>,
    samples: Option<usize>,
) -> Result<Params> {
    let mut params = match path {
        Some(path) => load_params(path)?,
        None => Params::default(),
    };
    if let Some(axis) = axis {
        params.axis = axis.into();
    }
    if let Some(samples) = samples {
        if samples < 2 {
            return Err(anyhow!("--samples must be at least 2"));
        }
        params.curve_samples = samples;
    }
    Ok(params)
}

fn load_params(path: &Path) -> Result<Params> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read params {}", path.display()))?;
    let params = Params::from_json(&text)
        .with_context(|| format!("{} is not a valid params file", path.display()))?;
    if !(params.weight_kg.is_finite() && params.weight_kg > 0.0) {
        warn!(
            "params {} has unusable weight_kg {}; pass --weight",
            path.display(),
            params.weight_kg
        );
    }
    Ok(params)
}

fn load_points(path: &Path) -> Result<Vec<Point>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_coordinates(file).with_context(|| {
        format!(
            "unable to parse coordinates in {}; expected a Level,X,Y table",
            path.display()
        )
    })
}

fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdout().lock()));
    }
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(Box::new(file))
}

fn write_angles(points: &[Point], angles: &[f64], path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["Level", "X", "Y", "Tangent Angle"])?;
    for (point, angle) in points.iter().zip(angles.iter()) {
        writer.write_record([
            point.label.clone(),
            point.x.to_string(),
            point.y.to_string(),
            format!("{:.2}", angle),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_report(
    input: &Path,
    params: &Params,
    result: &SpineLoadResult,
    path: &Path,
) -> Result<()> {
    let report = Report {
        generated_at: Utc::now().to_rfc3339(),
        input: input.display().to_string(),
        params,
        result,
    };
    let text = serde_json::to_string_pretty(&report)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const SCENARIO: &str = "Level,X,Y\n\
        L4,312,460\n\
        C2,300,100\n\
        T6,305,260\n\
        C5,302,140\n\
        L2,310,420\n\
        T9,308,300\n";

    fn write_input(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("coordinates.csv");
        fs::write(&path, body).unwrap();
        path
    }

    fn compute_args(input: PathBuf, output: PathBuf) -> ComputeArgs {
        ComputeArgs {
            input,
            weight: Some("60".into()),
            output,
            coords_out: None,
            json: None,
            axis: None,
            params: None,
            verbose: false,
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["spine-vec", "compute", "in.csv", "-w", "72", "--axis", "x"])
            .unwrap();
        match cli.command {
            Command::Compute(args) => {
                assert_eq!(args.weight.as_deref(), Some("72"));
                assert!(matches!(args.axis, Some(AxisOpt::X)));
                assert_eq!(args.output, PathBuf::from("spine_vec.csv"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn compute_writes_result_coordinates_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), SCENARIO);
        let output = dir.path().join("spine_vec.csv");
        let coords = dir.path().join("sorted.csv");
        let json = dir.path().join("report.json");
        let mut args = compute_args(input, output.clone());
        args.coords_out = Some(coords.clone());
        args.json = Some(json.clone());
        handle_compute(args).unwrap();

        let table = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 11);
        assert!(lines[1].ends_with(",C2"));
        assert!(lines[10].ends_with(",GSV"));

        let reread = load_points(&coords).unwrap();
        let labels: Vec<&str> = reread.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["C2", "C5", "T6", "T9", "L2", "L4"]);

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert!(report["generated_at"].is_string());
        assert_eq!(report["result"]["rows"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn compute_reports_insufficient_data() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), "Level,X,Y\nC2,300,100\nT6,305,260\n");
        let output = dir.path().join("out.csv");
        let err = handle_compute(compute_args(input, output.clone())).unwrap_err();
        assert!(err.to_string().contains("insufficient data"));
        assert!(!output.exists());
    }

    #[test]
    fn compute_rejects_bad_weight_and_unknown_levels() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), SCENARIO);
        let mut args = compute_args(input, dir.path().join("out.csv"));
        args.weight = Some("-1".into());
        assert!(handle_compute(args).is_err());

        let body = format!("{}X1,311,440\n", SCENARIO);
        let input = write_input(dir.path(), &body);
        let err = handle_compute(compute_args(input, dir.path().join("out.csv"))).unwrap_err();
        assert!(format!("{:#}", err).contains("X1"));
    }

    #[test]
    fn curve_writes_samples_and_angles() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), SCENARIO);
        let output = dir.path().join("curve.csv");
        let angles = dir.path().join("angles.csv");
        handle_curve(CurveArgs {
            input,
            output: output.clone(),
            angles: Some(angles.clone()),
            samples: Some(50),
            axis: None,
            params: None,
            verbose: false,
        })
        .unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap().lines().count(), 51);
        let angle_lines = fs::read_to_string(&angles).unwrap();
        assert_eq!(angle_lines.lines().count(), 7);
        assert!(angle_lines.starts_with("Level,X,Y,Tangent Angle\nC2,300,100,"));
    }

    #[test]
    fn params_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        fs::write(
            &path,
            r#"{"axis": "x", "weight_kg": 80.0, "gravity_m_s2": 9.81, "min_points_per_region": 3}"#,
        )
        .unwrap();
        let params = resolve_params(Some(&path), None, Some(10)).unwrap();
        assert_eq!(params.axis, IndependentAxis::X);
        assert_eq!(params.weight_kg, 80.0);
        assert_eq!(params.gravity_m_s2, 9.81);
        assert_eq!(params.min_points_per_region, 3);
        assert_eq!(params.curve_samples, 10);
        let params = resolve_params(Some(&path), Some(AxisOpt::Y), None).unwrap();
        assert_eq!(params.axis, IndependentAxis::Y);
        assert!(resolve_params(None, None, Some(1)).is_err());
    }

    #[test]
    fn levels_lists_every_code() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("levels.csv");
        handle_levels(LevelsArgs {
            output: output.clone(),
            verbose: false,
        })
        .unwrap();
        let text = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 26);
        assert_eq!(lines[1], "C1,cervical,1.0,0.5714,7.5714");
        assert!(lines[25].starts_with("S1,lumbar,2.6,"));
        assert!(lines[25].ends_with(",65.0000"));
    }
}
