use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{ColorType, DynamicImage, ImageError, ImageFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use crop_image::{bottom_crop_box, estimate_rgba_bytes, CropBox, ImageSize};

pub const DEFAULT_SOURCE: &str = "server/uploads/avatars/shanthi_bhat_mysuru.png";
pub const DEFAULT_DESTINATION: &str = "server/uploads/avatars/shanthi_bhat_mysuru_cropped.png";
pub const DEFAULT_CROP_PIXELS: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub pixels_to_crop: u32,
}

impl CropRequest {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            pixels_to_crop: DEFAULT_CROP_PIXELS,
        }
    }

    pub fn with_pixels(mut self, pixels_to_crop: u32) -> Self {
        self.pixels_to_crop = pixels_to_crop;
        self
    }
}

impl Default for CropRequest {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE, DEFAULT_DESTINATION)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub original: ImageSize,
    pub cropped: ImageSize,
    pub crop_box: CropBox,
    pub format: String,
}

impl CropReport {
    pub fn summary(&self) -> String {
        format!(
            "Successfully cropped {} and saved to {}",
            self.source.display(),
            self.destination.display()
        )
    }
}

#[derive(Debug, Error)]
pub enum CropError {
    #[error("source image not found: {}", .path.display())]
    SourceNotFound { path: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error("cannot crop {pixels} rows from a {width}x{height} image")]
    InvalidGeometry { width: u32, height: u32, pixels: u32 },
    #[error("unsupported output format for {}", .path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error("config error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    SourceNotFound,
    ReadFailure,
    DecodeFailure,
    InvalidCropGeometry,
    UnsupportedFormat,
    WriteFailure,
    ConfigError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl CropError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SourceNotFound { .. } => ErrorCode::SourceNotFound,
            Self::ReadSource { .. } => ErrorCode::ReadFailure,
            Self::Decode { .. } => ErrorCode::DecodeFailure,
            Self::InvalidGeometry { .. } => ErrorCode::InvalidCropGeometry,
            Self::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            Self::Write { .. } => ErrorCode::WriteFailure,
            Self::Config(_) => ErrorCode::ConfigError,
        }
    }

    pub fn as_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Recognized configuration options. Every field may be omitted from a
/// config file; missing fields fall back to the built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CropConfig {
    pub source: String,
    pub destination: String,
    #[serde(alias = "crop_pixels")]
    pub crop_pixels: u32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            destination: DEFAULT_DESTINATION.to_string(),
            crop_pixels: DEFAULT_CROP_PIXELS,
        }
    }
}

impl CropConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, CropError> {
        serde_json::from_str(raw).map_err(|err| CropError::Config(format!("invalid config: {}", err)))
    }

    pub fn from_path(path: &Path) -> Result<Self, CropError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| CropError::Config(format!("failed to read {}: {}", path.display(), err)))?;
        Self::from_json_str(&raw)
    }

    pub fn to_request(&self) -> CropRequest {
        CropRequest {
            source: PathBuf::from(&self.source),
            destination: PathBuf::from(&self.destination),
            pixels_to_crop: self.crop_pixels,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CropOverrides {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub crop_pixels: Option<u32>,
}

pub fn resolve_crop_config(base: CropConfig, overrides: CropOverrides) -> CropConfig {
    let mut cfg = base;
    if let Some(source) = overrides.source.filter(|v| !v.trim().is_empty()) {
        cfg.source = source;
    }
    if let Some(destination) = overrides.destination.filter(|v| !v.trim().is_empty()) {
        cfg.destination = destination;
    }
    if let Some(pixels) = overrides.crop_pixels {
        cfg.crop_pixels = pixels;
    }
    cfg
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryEventType {
    CropStart,
    CropSuccess,
    CropError,
}

/// One step of a crop's lifecycle. Size and format fields are only set on
/// success, `error` only on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub event_type: TelemetryEventType,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub pixels_to_crop: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<ImageSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cropped: Option<ImageSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl TelemetryEvent {
    pub fn started(request: &CropRequest) -> Self {
        Self {
            event_type: TelemetryEventType::CropStart,
            source: request.source.clone(),
            destination: request.destination.clone(),
            pixels_to_crop: request.pixels_to_crop,
            duration_ms: None,
            original: None,
            cropped: None,
            format: None,
            error: None,
        }
    }

    pub fn succeeded(request: &CropRequest, report: &CropReport, duration_ms: u64) -> Self {
        Self {
            event_type: TelemetryEventType::CropSuccess,
            duration_ms: Some(duration_ms),
            original: Some(report.original),
            cropped: Some(report.cropped),
            format: Some(report.format.clone()),
            ..Self::started(request)
        }
    }

    pub fn failed(request: &CropRequest, err: &CropError, duration_ms: u64) -> Self {
        Self {
            event_type: TelemetryEventType::CropError,
            duration_ms: Some(duration_ms),
            error: Some(err.as_error_info()),
            ..Self::started(request)
        }
    }
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

pub trait ImageCodec {
    fn decode(&self, path: &Path) -> Result<DynamicImage, CropError>;
    fn encode(&self, image: &DynamicImage, path: &Path, format: ImageFormat) -> Result<(), CropError>;
}

/// Reads and writes images on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsCodec;

impl ImageCodec for FsCodec {
    fn decode(&self, path: &Path) -> Result<DynamicImage, CropError> {
        let bytes = std::fs::read(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => CropError::SourceNotFound {
                path: path.to_path_buf(),
            },
            _ => CropError::ReadSource {
                path: path.to_path_buf(),
                source: err,
            },
        })?;
        image::load_from_memory(&bytes).map_err(|err| CropError::Decode {
            path: path.to_path_buf(),
            source: err,
        })
    }

    fn encode(&self, image: &DynamicImage, path: &Path, format: ImageFormat) -> Result<(), CropError> {
        image.save_with_format(path, format).map_err(|err| CropError::Write {
            path: path.to_path_buf(),
            source: err,
        })
    }
}

/// Output format implied by the destination's extension.
pub fn output_format(destination: &Path) -> Result<ImageFormat, CropError> {
    match ImageFormat::from_path(destination) {
        Ok(format) if format.writing_enabled() => Ok(format),
        _ => Err(CropError::UnsupportedFormat {
            path: destination.to_path_buf(),
        }),
    }
}

pub fn crop_bottom(request: &CropRequest) -> Result<CropReport, CropError> {
    crop_bottom_with(&FsCodec, request, None)
}

pub fn crop_bottom_with(
    codec: &dyn ImageCodec,
    request: &CropRequest,
    telemetry: Option<&dyn TelemetrySink>,
) -> Result<CropReport, CropError> {
    let start = Instant::now();
    if let Some(sink) = telemetry {
        sink.emit(TelemetryEvent::started(request));
    }
    let outcome = run_crop(codec, request);
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &outcome {
        Ok(report) => {
            info!(
                source = %report.source.display(),
                destination = %report.destination.display(),
                width = report.cropped.width,
                height = report.cropped.height,
                "image cropped"
            );
            if let Some(sink) = telemetry {
                sink.emit(TelemetryEvent::succeeded(request, report, elapsed_ms));
            }
        }
        Err(err) => {
            warn!(source = %request.source.display(), error = %err, "crop failed");
            if let Some(sink) = telemetry {
                sink.emit(TelemetryEvent::failed(request, err, elapsed_ms));
            }
        }
    }
    outcome
}

fn run_crop(codec: &dyn ImageCodec, request: &CropRequest) -> Result<CropReport, CropError> {
    let format = output_format(&request.destination)?;
    let image = codec.decode(&request.source)?;
    let original = ImageSize {
        width: image.width(),
        height: image.height(),
    };
    debug!(
        width = original.width,
        height = original.height,
        rgba_bytes = estimate_rgba_bytes(original),
        "decoded source"
    );

    let crop_box = bottom_crop_box(original, request.pixels_to_crop).ok_or(CropError::InvalidGeometry {
        width: original.width,
        height: original.height,
        pixels: request.pixels_to_crop,
    })?;
    let cropped = image.crop_imm(crop_box.left, crop_box.top, crop_box.width(), crop_box.height());
    drop(image);

    let cropped = prepare_for_format(cropped, format);
    codec.encode(&cropped, &request.destination, format)?;

    Ok(CropReport {
        source: request.source.clone(),
        destination: request.destination.clone(),
        original,
        cropped: crop_box.size(),
        crop_box,
        format: format!("{:?}", format).to_ascii_lowercase(),
    })
}

// JPEG has no alpha channel; the other non-PNG encoders only take 8-bit RGB(A).
fn prepare_for_format(image: DynamicImage, format: ImageFormat) -> DynamicImage {
    match (format, image.color()) {
        (ImageFormat::Png, _) => image,
        (ImageFormat::Jpeg, ColorType::L8 | ColorType::Rgb8) => image,
        (ImageFormat::Jpeg, _) => DynamicImage::ImageRgb8(image.to_rgb8()),
        (_, ColorType::Rgb8 | ColorType::Rgba8) => image,
        _ => DynamicImage::ImageRgba8(image.to_rgba8()),
    }
}
