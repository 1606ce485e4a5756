
use std::{path::Path, sync::Arc, time::Duration};

use crate::process::Process;

use super::{GeometryInfo, MediaInspector, ProbeError};

#[derive(Debug, serde::Deserialize)]
struct FfProbeOutput {
    #[serde(default)]
    streams: Vec<FfProbeStream>,
}

#[derive(Debug, serde::Deserialize)]
struct FfProbeStream {
    width: Option<i64>,
    height: Option<i64>,
}

#[derive(Clone, Debug)]
pub(crate) struct FfProbe {
    program: Arc<str>,
    timeout: Duration,
}

impl FfProbe {
    pub(crate) fn new(program: &str, timeout: Duration) -> Self {
        FfProbe {
            program: Arc::from(program),
            timeout,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl MediaInspector for FfProbe {
    #[tracing::instrument(skip(self))]
    async fn probe(&self, path: &Path) -> Result<GeometryInfo, ProbeError> {
        let input_file_str = path.to_str().ok_or(ProbeError::Path)?;

        let process = Process::run(
            &self.program,
            &[
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                input_file_str,
            ],
            self.timeout,
        )
        .map_err(ProbeError::Process)?;

        let output = process.read_output().await.map_err(ProbeError::Process)?;

        let output: FfProbeOutput = serde_json::from_slice(&output).map_err(ProbeError::Json)?;

        let geometry = parse_geometry(output)?;

        tracing::debug!(width = geometry.width, height = geometry.height, "probed");

        Ok(geometry)
    }
}

fn parse_geometry(output: FfProbeOutput) -> Result<GeometryInfo, ProbeError> {
    output
        .streams
        .into_iter()
        .find_map(|stream| match (stream.width, stream.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Some(GeometryInfo {
                width: u32::try_from(width).ok()?,
                height: u32::try_from(height).ok()?,
            }),
            _ => None,
        })
        .ok_or(ProbeError::NoVideoStream)
}
