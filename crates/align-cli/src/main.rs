use std::fs;
use std::path::{Path, PathBuf};

use align_core::synthetic::SyntheticRig;
use align_pipeline::rig_align::{run_calibration, RigAlignConfig, RigAlignInput, RigAlignProblem};
use align_pipeline::session::CalibrationSession;
use anyhow::{Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;

/// Align a multi-camera rig from shared characteristic points and print the export as JSON.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON file with one characteristic point set per camera.
    #[arg(long, conflicts_with = "synthetic", required_unless_present = "synthetic")]
    input: Option<PathBuf>,

    /// Generate a synthetic ring rig with this many cameras instead of reading input.
    #[arg(long)]
    synthetic: Option<usize>,

    /// Half-width of the uniform noise added to synthetic points.
    #[arg(long, default_value_t = 0.0, requires = "synthetic")]
    noise: f64,

    /// Seed for the synthetic noise.
    #[arg(long, default_value_t = 7, requires = "synthetic")]
    seed: u64,

    /// Path to a JSON config; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the final session JSON to this path.
    #[arg(long)]
    session_out: Option<PathBuf>,

    /// Log solver progress.
    #[arg(short, long)]
    verbose: bool,
}

fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn load_input(args: &Args) -> Result<RigAlignInput> {
    match (&args.input, args.synthetic) {
        (Some(path), _) => load_json_file(path),
        (None, Some(cameras)) => {
            let rig = SyntheticRig::ring(cameras).with_noise(args.noise, args.seed);
            RigAlignInput::from_source(&rig)
        }
        (None, None) => anyhow::bail!("either --input or --synthetic is required"),
    }
}

fn run(args: &Args) -> Result<String> {
    let mut config = match &args.config {
        Some(path) => load_json_file::<RigAlignConfig>(path)?,
        None => RigAlignConfig::default(),
    };
    config.verbose |= args.verbose;

    let mut session = CalibrationSession::<RigAlignProblem>::with_input(load_input(args)?)?;
    session.set_config(config)?;
    run_calibration(&mut session)?;
    let export = session.export()?;

    if let Some(path) = &args.session_out {
        fs::write(path, session.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(serde_json::to_string_pretty(&export)?)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let output = run(&args)?;
    println!("{output}");
    Ok(())
}
