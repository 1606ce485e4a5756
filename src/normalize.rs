mod ffmpeg;

use std::path::Path;

use crate::{error_code::ErrorCode, process::ProcessError};

pub(crate) use ffmpeg::FfMpegFastStart;

#[derive(Debug, thiserror::Error)]
pub(crate) enum NormalizeError {
    #[error("Error in ffmpeg process")]
    Process(#[source] ProcessError),

    #[error("Normalized output is missing")]
    MissingOutput(#[source] std::io::Error),

    #[error("Normalized output is empty")]
    EmptyOutput,

    #[error("Invalid file path")]
    Path,
}

impl NormalizeError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Process(e) => e.error_code(),
            Self::MissingOutput(_) | Self::EmptyOutput => ErrorCode::NORMALIZE_OUTPUT,
            Self::Path => ErrorCode::INVALID_FILE_PATH,
        }
    }

    pub(crate) const fn is_client_error(&self) -> bool {
        match self {
            Self::Process(e) => e.is_client_error(),
            _ => false,
        }
    }
}

/// Rewrites a video so its index precedes the media payload
///
/// Implementations write to `output` and must leave `input` untouched.
#[async_trait::async_trait(?Send)]
pub(crate) trait ContainerNormalizer {
    async fn normalize(&self, input: &Path, output: &Path) -> Result<(), NormalizeError>;
}

/// Confirm a normalizer actually produced something, returning its size
pub(crate) async fn verify_output(output: &Path) -> Result<u64, NormalizeError> {
    let metadata = tokio::fs::metadata(output)
        .await
        .map_err(NormalizeError::MissingOutput)?;

    if metadata.len() == 0 {
        return Err(NormalizeError::EmptyOutput);
    }

    Ok(metadata.len())
}
