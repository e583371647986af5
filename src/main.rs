use anyhow::{bail, Context, Result};
use clap::Parser;
use framesafe::inference::{Device, OrtBackend};
use framesafe::pipeline::{process_video_to_path, ProcessingSession, ProgressEvent};
use framesafe::{AppConfig, RunMetrics};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Blur exposed body regions in a video, frame by frame
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file to scan
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Where the re-encoded video is written
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// ONNX detector model (overrides the config file)
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Execution device: auto, cpu or coreml
    #[arg(long, value_name = "DEVICE", value_parser = parse_device)]
    device: Option<Device>,

    /// Print a JSON run summary to stdout
    #[arg(long)]
    report_json: bool,

    /// Debug logging, including per-frame stage timings
    #[arg(short, long)]
    verbose: bool,
}

fn parse_device(value: &str) -> Result<Device, String> {
    match value {
        "auto" => Ok(Device::Auto),
        "cpu" => Ok(Device::Cpu),
        "coreml" => Ok(Device::CoreMl),
        other => Err(format!("unknown device '{}', expected auto, cpu or coreml", other)),
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    input: &'a PathBuf,
    output: &'a PathBuf,
    frames: u64,
    mitigated_frames: u64,
    metrics: &'a RunMetrics,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };

    if let Some(model) = &args.model {
        config.inference.model_path = model.clone();
    }
    if let Some(device) = args.device {
        config.inference.device = device;
    }

    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    if !config.model_exists() {
        bail!("model file not found: {}", config.model_path().display());
    }
    if !args.input.exists() {
        bail!("input video not found: {}", args.input.display());
    }

    let backend = OrtBackend::builder(config.model_path())
        .with_device(config.inference.device)
        .with_intra_threads(config.inference.intra_threads)
        .build()
        .context("loading detector model")?;
    let mut session = ProcessingSession::from_config(backend, &config)?;

    // Log at every 10% step, or every 100 frames when the length is unknown
    let mut last_logged: Option<u8> = None;
    let mut observer = |event: ProgressEvent| match event.percent {
        Some(percent) => {
            let due = match last_logged {
                None => true,
                Some(last) => percent >= last + 10 || (percent == 100 && last < 100),
            };
            if due {
                info!("Progress: {}% ({} frames)", percent, event.processed);
                last_logged = Some(percent);
            }
        }
        None if event.processed % 100 == 0 => info!("Progress: {} frames", event.processed),
        None => {}
    };

    let summary = process_video_to_path(
        &args.input,
        &args.output,
        config.fourcc()?,
        &mut session,
        &mut observer,
    )?;

    info!(
        "Wrote {} ({} frames, {} blurred)",
        summary.output.display(),
        summary.frames,
        summary.mitigated_frames
    );

    if args.report_json {
        let report = RunReport {
            input: &args.input,
            output: &summary.output,
            frames: summary.frames,
            mitigated_frames: summary.mitigated_frames,
            metrics: &summary.metrics,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    run(args)
}
