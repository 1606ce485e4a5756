
use std::time::Instant;

use actix_web::web::Bytes;
use futures_core::Stream;
use url::Url;

use crate::{
    aspect::AspectCategory,
    discover::{GeometryInfo, MediaInspector, ProbeError},
    error::Error,
    error_code::ErrorCode,
    future::WithMetrics,
    init_metrics::{
        REPO_UPDATE_VIDEO, UPLOADS, UPLOAD_BYTES, UPLOAD_CATEGORY, UPLOAD_DURATION,
    },
    normalize::{self, ContainerNormalizer, NormalizeError},
    object_key::ObjectKey,
    repo::{RepoError, Video, VideoId, VideoRepo},
    store::{Store, StoreError},
    tmp_file::{StageLimits, StagingArea, StagingError, TmpDir},
};

const ACCEPTED_MEDIA_TYPE: &str = "video/mp4";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ValidationError {
    #[error("Unsupported media type {0}, only {ACCEPTED_MEDIA_TYPE} is accepted")]
    UnsupportedMediaType(mime::Mime),
}

impl ValidationError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedMediaType(_) => ErrorCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

/// The pipeline step an upload failed in
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Stage {
    Validate,
    Stage,
    Probe,
    Normalize,
    Store,
    UpdateMetadata,
}

impl Stage {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Stage => "stage",
            Self::Probe => "probe",
            Self::Normalize => "normalize",
            Self::Store => "store",
            Self::UpdateMetadata => "update_metadata",
        }
    }
}

/// Where a single upload is in the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    Received,
    Staged,
    Probed,
    Classified,
    Normalized,
    KeyBuilt,
    Stored,
    Done,
    Failed(Stage),
}

impl State {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Staged => "staged",
            Self::Probed => "probed",
            Self::Classified => "classified",
            Self::Normalized => "normalized",
            Self::KeyBuilt => "key_built",
            Self::Stored => "stored",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        }
    }

    fn enter(self) -> Self {
        tracing::Span::current().record("state", self.as_str());

        match self {
            Self::Failed(stage) => tracing::debug!(stage = stage.as_str(), "upload failed"),
            state => tracing::trace!(state = state.as_str(), "upload advanced"),
        }

        self
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum IngestError {
    #[error("Error validating upload")]
    Validation(#[from] ValidationError),

    #[error("Video not found")]
    NotFound,

    #[error("Video belongs to another owner")]
    NotOwner,

    #[error("Error loading video record")]
    Lookup(#[source] RepoError),

    #[error("Error staging upload")]
    Staging(#[source] StagingError),

    #[error("Error probing upload")]
    Probe(#[source] ProbeError),

    #[error("Error normalizing upload")]
    Normalize(#[source] NormalizeError),

    #[error("Error storing video")]
    Store(#[source] StoreError),

    #[error("Stored video at {key} but failed to update its record")]
    MetadataUpdate {
        key: String,

        #[source]
        source: RepoError,
    },
}

impl IngestError {
    pub(crate) const fn stage(&self) -> Stage {
        match self {
            Self::Validation(_) | Self::NotFound | Self::NotOwner | Self::Lookup(_) => {
                Stage::Validate
            }
            Self::Staging(_) => Stage::Stage,
            Self::Probe(_) => Stage::Probe,
            Self::Normalize(_) => Stage::Normalize,
            Self::Store(_) => Stage::Store,
            Self::MetadataUpdate { .. } => Stage::UpdateMetadata,
        }
    }

    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::NotFound => ErrorCode::VIDEO_NOT_FOUND,
            Self::NotOwner => ErrorCode::NOT_OWNER,
            Self::Lookup(e) => e.error_code(),
            Self::Staging(e) => e.error_code(),
            Self::Probe(e) => e.error_code(),
            Self::Normalize(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::MetadataUpdate { .. } => ErrorCode::METADATA_UPDATE,
        }
    }

    pub(crate) const fn is_client_error(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Staging(e) => e.is_client_error(),
            Self::Probe(e) => e.is_client_error(),
            Self::Normalize(e) => e.is_client_error(),
            _ => false,
        }
    }
}

/// An inbound video waiting to be ingested
pub(crate) struct UploadRequest<P> {
    pub(crate) media_type: mime::Mime,
    pub(crate) limits: StageLimits,
    pub(crate) stream: P,
}

/// A video that made it into the object store
#[derive(Clone, Debug)]
pub(crate) struct StoredAsset {
    pub(crate) key: ObjectKey,
    pub(crate) url: Url,
    pub(crate) geometry: GeometryInfo,
    pub(crate) len: u64,
}

impl StoredAsset {
    pub(crate) const fn category(&self) -> AspectCategory {
        self.key.category()
    }
}

pub(crate) fn validate_media_type(media_type: &mime::Mime) -> Result<(), ValidationError> {
    if media_type.essence_str() == ACCEPTED_MEDIA_TYPE {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedMediaType(media_type.clone()))
    }
}

/// Stage, probe, normalize and store one upload
///
/// Every temporary file belongs to a staging area created here, and the area is released
/// before returning on every path. If this future is dropped instead, the area and any
/// running subprocess are torn down by their destructors.
#[tracing::instrument(
    skip_all,
    fields(media_type = %request.media_type, state = tracing::field::Empty)
)]
pub(crate) async fn ingest<I, N, S, P>(
    inspector: &I,
    normalizer: &N,
    store: &S,
    tmp_dir: &TmpDir,
    request: UploadRequest<P>,
) -> Result<StoredAsset, IngestError>
where
    I: MediaInspector + ?Sized,
    N: ContainerNormalizer + ?Sized,
    S: Store,
    P: Stream<Item = Result<Bytes, Error>>,
{
    State::Received.enter();

    validate_media_type(&request.media_type)?;

    let staging = tmp_dir
        .staging_area()
        .await
        .map_err(IngestError::Staging)?;

    let res = run_pipeline(inspector, normalizer, store, &staging, request).await;

    if let Err(e) = staging.cleanup().await {
        tracing::warn!("Failed to release staging area: {e}");
    }

    match &res {
        Ok(_) => State::Done.enter(),
        Err(e) => State::Failed(e.stage()).enter(),
    };

    res
}

async fn run_pipeline<I, N, S, P>(
    inspector: &I,
    normalizer: &N,
    store: &S,
    staging: &StagingArea,
    request: UploadRequest<P>,
) -> Result<StoredAsset, IngestError>
where
    I: MediaInspector + ?Sized,
    N: ContainerNormalizer + ?Sized,
    S: Store,
    P: Stream<Item = Result<Bytes, Error>>,
{
    let UploadRequest {
        media_type,
        limits,
        stream,
    } = request;

    let extension = format!(".{}", media_type.subtype());

    let staged = staging
        .stage(stream, Some(&extension), limits)
        .await
        .map_err(IngestError::Staging)?;
    State::Staged.enter();

    metrics::histogram!(UPLOAD_BYTES).record(staged.len() as f64);

    let geometry = inspector.probe(&staged).await.map_err(IngestError::Probe)?;
    State::Probed.enter();

    let category = geometry.category();
    State::Classified.enter();

    let normalized = staging.tmp_file(Some(&extension));

    normalizer
        .normalize(&staged, &normalized)
        .await
        .map_err(IngestError::Normalize)?;

    let len = normalize::verify_output(&normalized)
        .await
        .map_err(IngestError::Normalize)?;
    State::Normalized.enter();

    if let Err(e) = staged.cleanup().await {
        tracing::warn!("Failed to remove staged upload: {e}");
    }

    let key = ObjectKey::generate(media_type.essence_str(), category);
    State::KeyBuilt.enter();

    store
        .save_file(&key, &normalized, media_type.essence_str())
        .await
        .map_err(IngestError::Store)?;

    let url = store.public_url(&key).map_err(IngestError::Store)?;
    State::Stored.enter();

    if let Err(e) = normalized.cleanup().await {
        tracing::warn!("Failed to remove normalized upload: {e}");
    }

    tracing::debug!(%key, %category, "stored upload");

    Ok(StoredAsset {
        key,
        url,
        geometry,
        len,
    })
}

/// Ingest an upload for an existing video record and point the record at the result
///
/// The record is written exactly once, after the object store confirmed the upload. A failed
/// write leaves the object in the bucket, and the returned error names its key.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip(repo, inspector, normalizer, store, tmp_dir, request))]
pub(crate) async fn ingest_video_record<R, I, N, S, P>(
    repo: &R,
    inspector: &I,
    normalizer: &N,
    store: &S,
    tmp_dir: &TmpDir,
    owner_id: &str,
    video_id: VideoId,
    request: UploadRequest<P>,
) -> Result<(Video, StoredAsset), IngestError>
where
    R: VideoRepo + ?Sized,
    I: MediaInspector + ?Sized,
    N: ContainerNormalizer + ?Sized,
    S: Store,
    P: Stream<Item = Result<Bytes, Error>>,
{
    let start = Instant::now();

    let res = ingest_video_record_inner(
        repo, inspector, normalizer, store, tmp_dir, owner_id, video_id, request,
    )
    .await;

    match &res {
        Ok((_, asset)) => {
            metrics::counter!(UPLOADS, "outcome" => "done").increment(1);
            metrics::counter!(UPLOAD_CATEGORY, "category" => asset.category().prefix())
                .increment(1);
        }
        Err(e) => {
            metrics::counter!(UPLOADS, "outcome" => "failed", "stage" => e.stage().as_str())
                .increment(1);
        }
    }

    metrics::histogram!(UPLOAD_DURATION, "completed" => res.is_ok().to_string())
        .record(start.elapsed().as_secs_f64());

    res
}

#[allow(clippy::too_many_arguments)]
async fn ingest_video_record_inner<R, I, N, S, P>(
    repo: &R,
    inspector: &I,
    normalizer: &N,
    store: &S,
    tmp_dir: &TmpDir,
    owner_id: &str,
    video_id: VideoId,
    request: UploadRequest<P>,
) -> Result<(Video, StoredAsset), IngestError>
where
    R: VideoRepo + ?Sized,
    I: MediaInspector + ?Sized,
    N: ContainerNormalizer + ?Sized,
    S: Store,
    P: Stream<Item = Result<Bytes, Error>>,
{
    validate_media_type(&request.media_type)?;

    let mut video = repo
        .get_video(video_id)
        .await
        .map_err(IngestError::Lookup)?
        .ok_or(IngestError::NotFound)?;

    if !video.is_owned_by(owner_id) {
        return Err(IngestError::NotOwner);
    }

    let asset = ingest(inspector, normalizer, store, tmp_dir, request).await?;

    video.set_video_url(asset.url.clone());

    repo.update_video(&video)
        .with_metrics(REPO_UPDATE_VIDEO)
        .await
        .map_err(|source| {
            tracing::error!(key = %asset.key, "Stored video is not referenced by any record");

            IngestError::MetadataUpdate {
                key: asset.key.to_string(),
                source,
            }
        })?;

    Ok((video, asset))
}
