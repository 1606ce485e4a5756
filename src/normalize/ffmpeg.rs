use std::{path::Path, sync::Arc, time::Duration};

use crate::process::Process;

use super::{ContainerNormalizer, NormalizeError};

/// Remuxes with `-movflags +faststart`, copying every stream as-is
#[derive(Clone, Debug)]
pub(crate) struct FfMpegFastStart {
    program: Arc<str>,
    timeout: Duration,
}

impl FfMpegFastStart {
    pub(crate) fn new(program: &str, timeout: Duration) -> Self {
        FfMpegFastStart {
            program: Arc::from(program),
            timeout,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl ContainerNormalizer for FfMpegFastStart {
    #[tracing::instrument(skip(self))]
    async fn normalize(&self, input: &Path, output: &Path) -> Result<(), NormalizeError> {
        let input_file_str = input.to_str().ok_or(NormalizeError::Path)?;
        let output_file_str = output.to_str().ok_or(NormalizeError::Path)?;

        let process = Process::run(
            &self.program,
            &[
                "-hide_banner",
                "-v",
                "warning",
                "-y",
                "-i",
                input_file_str,
                "-c",
                "copy",
                "-movflags",
                "+faststart",
                "-f",
                "mp4",
                output_file_str,
            ],
            self.timeout,
        )
        .map_err(NormalizeError::Process)?;

        process.wait().await.map_err(NormalizeError::Process)?;

        Ok(())
    }
}
