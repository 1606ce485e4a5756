mod ffmpeg;

use std::path::Path;

use crate::{
    aspect::{self, AspectCategory},
    error_code::ErrorCode,
    process::ProcessError,
};

pub(crate) use ffmpeg::FfProbe;

/// Dimensions of the first video stream in a file
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub(crate) struct GeometryInfo {
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl GeometryInfo {
    pub(crate) fn category(&self) -> AspectCategory {
        aspect::classify(self.width.into(), self.height.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProbeError {
    #[error("Error in ffprobe process")]
    Process(#[source] ProcessError),

    #[error("Invalid ffprobe output")]
    Json(#[source] serde_json::Error),

    #[error("No stream with positive width and height")]
    NoVideoStream,

    #[error("Invalid file path")]
    Path,
}

impl ProbeError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Process(e) => e.error_code(),
            Self::Json(_) => ErrorCode::PROBE_OUTPUT,
            Self::NoVideoStream => ErrorCode::NO_VIDEO_STREAM,
            Self::Path => ErrorCode::INVALID_FILE_PATH,
        }
    }

    pub(crate) const fn is_client_error(&self) -> bool {
        match self {
            Self::Process(e) => e.is_client_error(),
            Self::NoVideoStream => true,
            Self::Json(_) | Self::Path => false,
        }
    }
}

/// Reads stream geometry out of a fully written local file
#[async_trait::async_trait(?Send)]
pub(crate) trait MediaInspector {
    async fn probe(&self, path: &Path) -> Result<GeometryInfo, ProbeError>;
}
