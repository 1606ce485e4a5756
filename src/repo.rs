use std::{fmt::Debug, str::FromStr, sync::Arc};

use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::{config, error_code::ErrorCode};

pub(crate) mod sled;

pub(crate) type ArcRepo = Arc<dyn VideoRepo>;

#[derive(Clone, Debug)]
pub(crate) enum Repo {
    Sled(self::sled::SledRepo),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RepoError {
    #[error("Error in sled")]
    SledError(#[from] self::sled::SledError),

    #[error("Video already exists")]
    AlreadyExists,

    #[error("Invalid video id")]
    InvalidVideoId(#[source] uuid::Error),
}

impl RepoError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::SledError(self::sled::SledError::Panic) => ErrorCode::PANIC,
            Self::SledError(_) | Self::AlreadyExists => ErrorCode::SLED_ERROR,
            Self::InvalidVideoId(_) => ErrorCode::INVALID_VIDEO_ID,
        }
    }

    pub(crate) const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidVideoId(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct VideoId {
    id: Uuid,
}

impl VideoId {
    pub(crate) fn generate() -> Self {
        VideoId { id: Uuid::now_v7() }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.id.as_bytes()
    }
}

impl FromStr for VideoId {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(VideoId {
            id: s.parse().map_err(RepoError::InvalidVideoId)?,
        })
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.id, f)
    }
}

impl serde::Serialize for VideoId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.id.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for VideoId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Uuid::deserialize(deserializer).map(|id| VideoId { id })
    }
}

/// A video's metadata record
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub(crate) struct Video {
    pub(crate) id: VideoId,

    pub(crate) owner_id: String,

    pub(crate) title: String,

    pub(crate) description: String,

    pub(crate) video_url: Option<Url>,

    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,
}

impl Video {
    pub(crate) fn new(owner_id: String, title: String, description: String) -> Self {
        let now = OffsetDateTime::now_utc();

        Video {
            id: VideoId::generate(),
            owner_id,
            title,
            description,
            video_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }

    /// Point the record at its stored video
    pub(crate) fn set_video_url(&mut self, url: Url) {
        self.video_url = Some(url);
        self.updated_at = OffsetDateTime::now_utc();
    }
}

#[async_trait::async_trait(?Send)]
pub(crate) trait VideoRepo: Debug + Send + Sync {
    async fn health_check(&self) -> Result<(), RepoError>;

    /// Insert a brand new record, failing if the id is taken
    async fn create_video(&self, video: &Video) -> Result<(), RepoError>;

    async fn get_video(&self, id: VideoId) -> Result<Option<Video>, RepoError>;

    /// Overwrite the stored record with `video`
    async fn update_video(&self, video: &Video) -> Result<(), RepoError>;
}

#[async_trait::async_trait(?Send)]
impl<T> VideoRepo for Arc<T>
where
    T: VideoRepo + ?Sized,
{
    async fn health_check(&self) -> Result<(), RepoError> {
        T::health_check(self).await
    }

    async fn create_video(&self, video: &Video) -> Result<(), RepoError> {
        T::create_video(self, video).await
    }

    async fn get_video(&self, id: VideoId) -> Result<Option<Video>, RepoError> {
        T::get_video(self, id).await
    }

    async fn update_video(&self, video: &Video) -> Result<(), RepoError> {
        T::update_video(self, video).await
    }
}

impl Repo {
    #[tracing::instrument]
    pub(crate) fn open(config: config::Repo) -> color_eyre::Result<Self> {
        match config {
            config::Repo::Sled(config::Sled {
                path,
                cache_capacity,
            }) => {
                let db = ::sled::Config::new()
                    .cache_capacity(cache_capacity)
                    .path(path)
                    .open()?;

                Ok(Self::Sled(self::sled::SledRepo::new(db)?))
            }
        }
    }

    pub(crate) fn to_arc(&self) -> ArcRepo {
        match self {
            Self::Sled(sled_repo) => Arc::new(sled_repo.clone()),
        }
    }
}
