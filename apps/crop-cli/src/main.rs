use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use crop_core::{crop_bottom_with, resolve_crop_config, CropConfig, CropError, CropOverrides, CropReport, FsCodec};
use crop_telemetry::sink_from_env;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "CROP_BOTTOM_CONFIG";

#[derive(Parser, Debug)]
#[command(name = "crop-bottom", version, about = "Remove pixel rows from the bottom edge of an image")]
struct Cli {
    /// Image to read (defaults to the bundled avatar path).
    #[arg(long, short = 's')]
    source: Option<String>,
    /// Where to write the cropped image; the extension picks the format.
    #[arg(long, short = 'd')]
    destination: Option<String>,
    /// Rows to remove from the bottom edge.
    #[arg(long, short = 'p')]
    pixels: Option<u32>,
    /// JSON config file with `source`, `destination` and `cropPixels`.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
    /// Print a JSON report instead of the one-line message.
    #[arg(long, default_value_t = false, action = clap::ArgAction::SetTrue)]
    json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = run(&cli);
    let rendered = match &outcome {
        Ok(report) => render_success(report, cli.json),
        Err(err) => render_failure(err, cli.json),
    };

    match rendered {
        Ok(line) => println!("{}", line),
        Err(err) => {
            println!("Error cropping image: {:#}", err);
            return ExitCode::FAILURE;
        }
    }
    if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: &Cli) -> Result<CropReport, CropError> {
    let base = load_config(cli.config.as_deref())?;
    let config = resolve_crop_config(
        base,
        CropOverrides {
            source: cli.source.clone(),
            destination: cli.destination.clone(),
            crop_pixels: cli.pixels,
        },
    );
    let request = config.to_request();
    tracing::debug!(
        source = %request.source.display(),
        destination = %request.destination.display(),
        pixels = request.pixels_to_crop,
        "resolved crop request"
    );

    let telemetry = sink_from_env();
    let telemetry_ref = telemetry.as_ref().map(|sink| sink.as_ref());
    crop_bottom_with(&FsCodec, &request, telemetry_ref)
}

/// An explicitly named config (flag or env) must load; the per-user
/// default is only read when present.
fn load_config(explicit: Option<&Path>) -> Result<CropConfig, CropError> {
    if let Some(path) = explicit {
        return CropConfig::from_path(path);
    }
    if let Some(path) = std::env::var(CONFIG_ENV).ok().filter(|v| !v.trim().is_empty()) {
        return CropConfig::from_path(Path::new(&path));
    }
    match default_config_path() {
        Some(path) if path.is_file() => CropConfig::from_path(&path),
        _ => Ok(CropConfig::default()),
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("crop-bottom").join("config.json"))
}

fn render_success(report: &CropReport, json: bool) -> Result<String> {
    if !json {
        return Ok(report.summary());
    }
    serde_json::to_string_pretty(report).context("serializing crop report")
}

fn render_failure(err: &CropError, json: bool) -> Result<String> {
    if !json {
        return Ok(format!("Error cropping image: {}", err));
    }
    serde_json::to_string_pretty(&serde_json::json!({ "error": err.as_error_info() }))
        .context("serializing crop error")
}
