use sled::{CompareAndSwapError, Db, Tree};

use crate::repo::{RepoError, Video, VideoId, VideoRepo};

macro_rules! b {
    ($self:ident.$ident:ident, $expr:expr) => {{
        let $ident = $self.$ident.clone();

        actix_rt::task::spawn_blocking(move || $expr)
            .await
            .map_err(SledError::from)
            .map_err(RepoError::from)?
            .map_err(SledError::from)
            .map_err(RepoError::from)?
    }};
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SledError {
    #[error("Error in database")]
    Sled(#[from] sled::Error),

    #[error("Invalid video json")]
    Video(#[from] serde_json::Error),

    #[error("Operation panicked")]
    Panic,
}

#[derive(Clone)]
pub(crate) struct SledRepo {
    videos: Tree,
    db: Db,
}

impl std::fmt::Debug for SledRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledRepo").finish()
    }
}

impl SledRepo {
    pub(crate) fn new(db: Db) -> Result<Self, SledError> {
        Ok(SledRepo {
            videos: db.open_tree("reel-rs-videos-tree")?,
            db,
        })
    }
}

#[async_trait::async_trait(?Send)]
impl VideoRepo for SledRepo {
    async fn health_check(&self) -> Result<(), RepoError> {
        let next = self.db.generate_id().map_err(SledError::from)?;

        tracing::trace!(next, "sled is writable");

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %video.id))]
    async fn create_video(&self, video: &Video) -> Result<(), RepoError> {
        let key = video.id.as_bytes().to_vec();
        let value = serde_json::to_vec(video).map_err(SledError::from)?;

        let res = b!(
            self.videos,
            videos.compare_and_swap(key, None as Option<&[u8]>, Some(value))
        );

        match res {
            Ok(()) => Ok(()),
            Err(CompareAndSwapError { .. }) => Err(RepoError::AlreadyExists),
        }
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get_video(&self, id: VideoId) -> Result<Option<Video>, RepoError> {
        let key = id.as_bytes().to_vec();

        let opt = b!(self.videos, videos.get(key));

        opt.map(|ivec| serde_json::from_slice(&ivec).map_err(SledError::from))
            .transpose()
            .map_err(RepoError::from)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %video.id))]
    async fn update_video(&self, video: &Video) -> Result<(), RepoError> {
        let key = video.id.as_bytes().to_vec();
        let value = serde_json::to_vec(video).map_err(SledError::from)?;

        b!(self.videos, videos.insert(key, value));

        Ok(())
    }
}

impl From<actix_rt::task::JoinError> for SledError {
    fn from(_: actix_rt::task::JoinError) -> Self {
        SledError::Panic
    }
}
