use std::{
    collections::HashMap,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use actix_web::web::Bytes;
use futures_core::Stream;
use url::Url;

use crate::{
    discover::{GeometryInfo, MediaInspector, ProbeError},
    error::Error,
    normalize::{ContainerNormalizer, NormalizeError},
    object_key::ObjectKey,
    repo::{sled::SledError, RepoError, Video, VideoId, VideoRepo},
    store::{object_store::ObjectStore, Store, StoreError},
};

/// Write an executable shell script standing in for an external tool
pub(crate) fn fake_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join(format!("fake-tool-{}", uuid::Uuid::new_v4()));

    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Wrote script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Made script executable");

    path
}

/// Count regular files anywhere beneath `path`
pub(crate) fn count_files(path: &Path) -> usize {
    std::fs::read_dir(path)
        .expect("Read dir")
        .map(|entry| {
            let entry = entry.expect("Read entry");

            if entry.file_type().expect("File type").is_dir() {
                count_files(&entry.path())
            } else {
                1
            }
        })
        .sum()
}

pub(crate) fn chunks(
    parts: &[&'static [u8]],
) -> impl Stream<Item = Result<Bytes, Error>> + Unpin + 'static {
    futures_util::stream::iter(
        parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part)))
            .collect::<Vec<_>>(),
    )
}

/// An `X-Request-Deadline` value `duration` from now
pub(crate) fn deadline_in(duration: Duration) -> String {
    (time::OffsetDateTime::now_utc() + duration)
        .unix_timestamp_nanos()
        .to_string()
}

pub(crate) const BOUNDARY: &str = "reel-rs-boundary";

/// A multipart/form-data body holding a single file part
pub(crate) fn multipart_body(field: &str, content_type: Option<&str>, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"clip.mp4\"\r\n"
    )
    .into_bytes();

    if let Some(content_type) = content_type {
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    }

    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    body
}

/// Whether `pid` has exited, counting zombies awaiting their reaper
pub(crate) fn process_gone(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state == "Z" || state == "X"),
        Err(_) => true,
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct FakeInspector(pub(crate) Option<GeometryInfo>);

impl FakeInspector {
    pub(crate) const fn sized(width: u32, height: u32) -> Self {
        FakeInspector(Some(GeometryInfo { width, height }))
    }
}

#[async_trait::async_trait(?Send)]
impl MediaInspector for FakeInspector {
    async fn probe(&self, path: &Path) -> Result<GeometryInfo, ProbeError> {
        assert!(path.exists(), "probed a file that was not staged");

        self.0.ok_or(ProbeError::NoVideoStream)
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum FakeNormalizer {
    /// Copy the input unchanged
    Copy,
    /// Write half a file, then fail
    Partial,
    /// Succeed without writing anything
    Silent,
}

#[async_trait::async_trait(?Send)]
impl ContainerNormalizer for FakeNormalizer {
    async fn normalize(&self, input: &Path, output: &Path) -> Result<(), NormalizeError> {
        match self {
            Self::Copy => {
                tokio::fs::copy(input, output)
                    .await
                    .map_err(NormalizeError::MissingOutput)?;

                Ok(())
            }
            Self::Partial => {
                tokio::fs::write(output, b"moov")
                    .await
                    .map_err(NormalizeError::MissingOutput)?;

                Err(NormalizeError::EmptyOutput)
            }
            Self::Silent => Ok(()),
        }
    }
}

/// An in-memory bucket that remembers every put
#[derive(Clone, Debug)]
pub(crate) struct RecordingStore {
    inner: ObjectStore,
    puts: Arc<AtomicUsize>,
    keys: Arc<Mutex<Vec<ObjectKey>>>,
    fail: bool,
}

impl RecordingStore {
    pub(crate) fn new() -> Self {
        RecordingStore {
            inner: ObjectStore::in_memory("videos", "s3.us-east-1.amazonaws.com"),
            puts: Arc::new(AtomicUsize::new(0)),
            keys: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        RecordingStore {
            fail: true,
            ..Self::new()
        }
    }

    pub(crate) fn puts(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    pub(crate) fn keys(&self) -> Vec<ObjectKey> {
        self.keys.lock().expect("Lock keys").clone()
    }

    pub(crate) async fn get_bytes(&self, key: &ObjectKey) -> Option<(Vec<u8>, Option<String>)> {
        self.inner.get_bytes(key).await
    }
}

#[async_trait::async_trait(?Send)]
impl Store for RecordingStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }

    async fn save_file(
        &self,
        key: &ObjectKey,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.keys.lock().expect("Lock keys").push(key.clone());

        if self.fail {
            return Err(StoreError::ReadFile(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "bucket unavailable",
            )));
        }

        self.inner.save_file(key, path, content_type).await
    }

    fn public_url(&self, key: &ObjectKey) -> Result<Url, StoreError> {
        self.inner.public_url(key)
    }
}

/// A metadata store held in a map, counting writes
#[derive(Debug, Default)]
pub(crate) struct MemoryRepo {
    videos: Mutex<HashMap<VideoId, Video>>,
    updates: AtomicUsize,
    fail_updates: bool,
}

impl MemoryRepo {
    pub(crate) fn failing_updates() -> Self {
        MemoryRepo {
            fail_updates: true,
            ..Default::default()
        }
    }

    pub(crate) fn insert(&self, video: Video) {
        self.videos
            .lock()
            .expect("Lock videos")
            .insert(video.id, video);
    }

    pub(crate) fn updates(&self) -> usize {
        self.updates.load(Ordering::Relaxed)
    }

    pub(crate) fn stored(&self, id: VideoId) -> Option<Video> {
        self.videos.lock().expect("Lock videos").get(&id).cloned()
    }
}

#[async_trait::async_trait(?Send)]
impl VideoRepo for MemoryRepo {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn create_video(&self, video: &Video) -> Result<(), RepoError> {
        let mut videos = self.videos.lock().expect("Lock videos");

        if videos.contains_key(&video.id) {
            return Err(RepoError::AlreadyExists);
        }

        videos.insert(video.id, video.clone());

        Ok(())
    }

    async fn get_video(&self, id: VideoId) -> Result<Option<Video>, RepoError> {
        Ok(self.stored(id))
    }

    async fn update_video(&self, video: &Video) -> Result<(), RepoError> {
        self.updates.fetch_add(1, Ordering::Relaxed);

        if self.fail_updates {
            return Err(RepoError::SledError(SledError::Panic));
        }

        self.insert(video.clone());

        Ok(())
    }
}
