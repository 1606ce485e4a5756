use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use actix_web::web::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{error::Error, error_code::ErrorCode};

pub(crate) type ArcTmpDir = Arc<TmpDir>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StagingError {
    #[error("Error creating staging directory")]
    CreateDir(#[source] std::io::Error),

    #[error("Error creating staged file")]
    CreateFile(#[source] std::io::Error),

    #[error("Error writing staged file")]
    Write(#[source] std::io::Error),

    #[error("Error reading upload payload")]
    Payload(#[source] Error),

    #[error("Uploaded file was empty")]
    Empty,

    #[error("Uploaded file exceeded {limit} bytes")]
    TooLarge { limit: u64 },
}

impl StagingError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreateDir(_) | Self::CreateFile(_) | Self::Write(_) => {
                ErrorCode::STAGING_IO_ERROR
            }
            Self::Payload(_) => ErrorCode::FILE_UPLOAD_ERROR,
            Self::Empty => ErrorCode::VALIDATE_FILE_EMPTY,
            Self::TooLarge { .. } => ErrorCode::VALIDATE_FILE_SIZE,
        }
    }

    pub(crate) const fn is_client_error(&self) -> bool {
        matches!(self, Self::Payload(_) | Self::Empty | Self::TooLarge { .. })
    }
}

/// Process-wide root for staged uploads
#[derive(Debug)]
pub(crate) struct TmpDir {
    path: Option<PathBuf>,
}

impl TmpDir {
    pub(crate) async fn init<P: AsRef<Path>>(path: P) -> std::io::Result<Arc<Self>> {
        let path = path.as_ref().join(Uuid::now_v7().to_string());
        tokio::fs::create_dir_all(&path).await?;
        Ok(Arc::new(TmpDir { path: Some(path) }))
    }

    fn path(&self) -> &Path {
        self.path.as_deref().expect("tmp path exists")
    }

    /// Create the staging area for a single request
    ///
    /// Every file staged for the request lives inside this area, so releasing the area
    /// releases everything the request acquired.
    pub(crate) async fn staging_area(&self) -> Result<StagingArea, StagingError> {
        let path = self.path().join(Uuid::now_v7().to_string());

        tokio::fs::create_dir(&path)
            .await
            .map_err(StagingError::CreateDir)?;

        Ok(StagingArea { path: Some(path) })
    }

    pub(crate) async fn cleanup(self: Arc<Self>) -> std::io::Result<()> {
        if let Some(path) = Arc::into_inner(self).and_then(|mut this| this.path.take()) {
            remove_dir_all(&path).await?;
        }

        Ok(())
    }
}

impl Drop for TmpDir {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_dir_all(path);
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StageLimits {
    pub(crate) max_size: Option<u64>,
}

/// The set of temporary files owned by one request
#[must_use]
#[derive(Debug)]
pub(crate) struct StagingArea {
    path: Option<PathBuf>,
}

impl StagingArea {
    fn path(&self) -> &Path {
        self.path.as_deref().expect("staging path exists")
    }

    pub(crate) fn tmp_file(&self, ext: Option<&str>) -> TmpFile {
        let name = if let Some(ext) = ext {
            format!("{}{}", Uuid::now_v7(), ext)
        } else {
            Uuid::now_v7().to_string()
        };

        TmpFile(Some(self.path().join(name)))
    }

    /// Copy an inbound byte stream to a new file in this area
    ///
    /// Bytes are written as they arrive, so memory use does not depend on the upload size.
    #[tracing::instrument(level = "debug", skip(self, stream))]
    pub(crate) async fn stage<S>(
        &self,
        stream: S,
        ext: Option<&str>,
        limits: StageLimits,
    ) -> Result<StagedFile, StagingError>
    where
        S: Stream<Item = Result<Bytes, Error>>,
    {
        let file = self.tmp_file(ext);

        match write_stream(&file, stream, limits).await {
            Ok(len) => Ok(StagedFile { file, len }),
            Err(e) => {
                if let Err(cleanup) = file.cleanup().await {
                    tracing::warn!("Failed to remove partial upload: {cleanup}");
                }

                Err(e)
            }
        }
    }

    /// Release every file in this area
    ///
    /// Files that were already released are skipped, so calling this after individual
    /// `TmpFile::cleanup` calls is fine.
    pub(crate) async fn cleanup(mut self) -> std::io::Result<()> {
        if let Some(path) = self.path.take() {
            remove_dir_all(&path).await?;
        }

        Ok(())
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_dir_all(path);
        }
    }
}

async fn write_stream<S>(path: &Path, stream: S, limits: StageLimits) -> Result<u64, StagingError>
where
    S: Stream<Item = Result<Bytes, Error>>,
{
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(StagingError::CreateFile)?;

    futures_util::pin_mut!(stream);

    let mut len: u64 = 0;

    while let Some(res) = stream.next().await {
        let mut bytes = res.map_err(StagingError::Payload)?;

        len += bytes.len() as u64;

        if let Some(limit) = limits.max_size {
            if len > limit {
                return Err(StagingError::TooLarge { limit });
            }
        }

        file.write_all_buf(&mut bytes)
            .await
            .map_err(StagingError::Write)?;
    }

    file.flush().await.map_err(StagingError::Write)?;
    drop(file);

    if len == 0 {
        return Err(StagingError::Empty);
    }

    Ok(len)
}

async fn remove_dir_all(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        res => res,
    }
}

/// A closed, fully written upload
#[derive(Debug)]
pub(crate) struct StagedFile {
    file: TmpFile,
    len: u64,
}

impl StagedFile {
    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) async fn cleanup(self) -> std::io::Result<()> {
        self.file.cleanup().await
    }
}

impl Deref for StagedFile {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.file
    }
}

impl AsRef<Path> for StagedFile {
    fn as_ref(&self) -> &Path {
        &self.file
    }
}

#[must_use]
#[derive(Debug)]
pub(crate) struct TmpFile(Option<PathBuf>);

impl TmpFile {
    pub(crate) async fn cleanup(mut self) -> std::io::Result<()> {
        if let Some(path) = self.0.take() {
            match tokio::fs::remove_file(&path).await {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
                res => res?,
            }
        }

        Ok(())
    }
}

impl AsRef<Path> for TmpFile {
    fn as_ref(&self) -> &Path {
        self.0.as_deref().expect("tmp file exists")
    }
}

impl Deref for TmpFile {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.0.as_deref().expect("tmp file exists")
    }
}

impl Drop for TmpFile {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
