use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use crate::api::error::AppError;
use crate::services::staging::StagedAsset;

const SIXTEEN_BY_NINE: f64 = 16.0 / 9.0;
const NINE_BY_SIXTEEN: f64 = 9.0 / 16.0;
const RATIO_TOLERANCE: f64 = 0.01;

/// Pixel dimensions of the first media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

/// Coarse aspect-ratio category of an uploaded video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectClass {
    SixteenByNine,
    NineBySixteen,
    Other,
    /// Unclassified. Never handed out as a successful classification.
    #[default]
    Invalid,
}

impl AspectClass {
    /// Maps a geometry to its category; first match wins (16:9, then 9:16).
    pub fn from_geometry(geometry: Geometry) -> Result<Self> {
        let Geometry { width, height } = geometry;
        if width == 0 || height == 0 {
            bail!("invalid video dimensions: {}x{}", width, height);
        }

        let ratio = f64::from(width) / f64::from(height);
        if (ratio - SIXTEEN_BY_NINE).abs() < RATIO_TOLERANCE {
            Ok(Self::SixteenByNine)
        } else if (ratio - NINE_BY_SIXTEEN).abs() < RATIO_TOLERANCE {
            Ok(Self::NineBySixteen)
        } else {
            Ok(Self::Other)
        }
    }

    /// Key namespace segment; `None` for `Invalid`.
    pub fn namespace(self) -> Option<&'static str> {
        match self {
            Self::SixteenByNine => Some("landscape"),
            Self::NineBySixteen => Some("portrait"),
            Self::Other => Some("other"),
            Self::Invalid => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SixteenByNine => "16:9",
            Self::NineBySixteen => "9:16",
            Self::Other => "other",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for AspectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Out-of-process geometry probe
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<Geometry>;

    /// Whether the probe can run at all; used by the health endpoint.
    async fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

/// Parses `{"streams": [{"width": .., "height": ..}, ..]}` and returns the first
/// stream's dimensions.
pub fn parse_probe_output(stdout: &[u8]) -> Result<Geometry> {
    let output: ProbeOutput =
        serde_json::from_slice(stdout).context("unparseable probe output")?;

    let first = output
        .streams
        .first()
        .ok_or_else(|| anyhow!("no streams found in video file"))?;

    Ok(Geometry {
        width: first.width,
        height: first.height,
    })
}

/// Runs `ffprobe -v error -print_format json -show_streams <path>`.
///
/// The child is killed if the probing future is dropped, so a cancelled request
/// does not leave a probe running against a file that is about to be removed.
pub struct FfprobeProbe {
    program: String,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<Geometry> {
        let output = Command::new(&self.program)
            .args(["-v", "error", "-print_format", "json", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        parse_probe_output(&output.stdout)
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// Classifies staged videos by aspect ratio through a [`MediaProbe`]
#[derive(Clone)]
pub struct MediaClassifier {
    probe: Arc<dyn MediaProbe>,
}

impl MediaClassifier {
    pub fn new(probe: Arc<dyn MediaProbe>) -> Self {
        Self { probe }
    }

    pub async fn classify(&self, asset: &StagedAsset) -> Result<AspectClass, AppError> {
        let geometry = self
            .probe
            .probe(asset.path())
            .await
            .map_err(|e| AppError::Probe(format!("{:#}", e)))?;

        tracing::debug!("Probed {}x{}", geometry.width, geometry.height);

        AspectClass::from_geometry(geometry).map_err(|e| AppError::Probe(e.to_string()))
    }

    pub async fn is_available(&self) -> bool {
        self.probe.is_available().await
    }
}
