use std::{path::Path, sync::Arc};

use object_store::{
    aws::AmazonS3Builder, path::Path as ObjectPath, Attribute, Attributes, PutOptions, PutPayload,
};
use tokio::sync::Semaphore;
use url::Url;

use crate::{
    error_code::ErrorCode,
    future::WithMetrics,
    object_key::ObjectKey,
    store::{Store, StoreError},
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum ObjectError {
    #[error("Failed to configure object storage")]
    Build(#[source] object_store::Error),

    #[error("Error making object storage request")]
    Request(#[source] object_store::Error),

    #[error("Invalid public url for object")]
    Url(#[source] url::ParseError),

    #[error("Object uploads are shut down")]
    Closed,
}

impl ObjectError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Build(_) | Self::Request(_) | Self::Url(_) | Self::Closed => {
                ErrorCode::OBJECT_REQUEST_ERROR
            }
        }
    }
}

const DEFAULT_PUT_PERMITS: usize = 4;

/// An S3-compatible bucket
///
/// Objects are sent as a single PUT, so each upload holds its whole file in memory. The number
/// of uploads in flight is capped by `put_permits`.
#[derive(Clone)]
pub(crate) struct ObjectStore {
    inner: Arc<dyn object_store::ObjectStore>,
    bucket_name: Arc<str>,
    public_endpoint: Arc<str>,
    put_permits: Arc<Semaphore>,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("bucket_name", &self.bucket_name)
            .field("public_endpoint", &self.public_endpoint)
            .field("available_puts", &self.put_permits.available_permits())
            .finish()
    }
}

impl ObjectStore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        endpoint: Option<Url>,
        bucket_name: String,
        use_path_style: bool,
        region: String,
        access_key: Option<String>,
        secret_key: Option<String>,
        session_token: Option<String>,
        public_endpoint: Option<String>,
    ) -> Result<Self, ObjectError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&bucket_name)
            .with_region(&region)
            .with_virtual_hosted_style_request(!use_path_style);

        if let Some(endpoint) = endpoint {
            builder = builder
                .with_allow_http(endpoint.scheme() == "http")
                .with_endpoint(endpoint.as_str().trim_end_matches('/'));
        }

        if let Some(access_key) = access_key {
            builder = builder.with_access_key_id(access_key);
        }

        if let Some(secret_key) = secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }

        if let Some(session_token) = session_token {
            builder = builder.with_token(session_token);
        }

        let inner = builder.build().map_err(ObjectError::Build)?;

        let public_endpoint =
            public_endpoint.unwrap_or_else(|| format!("s3.{region}.amazonaws.com"));

        Ok(ObjectStore {
            inner: Arc::new(inner),
            bucket_name: Arc::from(bucket_name),
            public_endpoint: Arc::from(public_endpoint),
            put_permits: Arc::new(Semaphore::new(DEFAULT_PUT_PERMITS)),
        })
    }

    pub(crate) fn with_put_limit(self, max_concurrent_puts: usize) -> Self {
        ObjectStore {
            put_permits: Arc::new(Semaphore::new(max_concurrent_puts.max(1))),
            ..self
        }
    }

    #[cfg(test)]
    pub(crate) fn in_memory(bucket_name: &str, public_endpoint: &str) -> Self {
        ObjectStore {
            inner: Arc::new(object_store::memory::InMemory::new()),
            bucket_name: Arc::from(bucket_name),
            public_endpoint: Arc::from(public_endpoint),
            put_permits: Arc::new(Semaphore::new(DEFAULT_PUT_PERMITS)),
        }
    }

    #[cfg(test)]
    pub(crate) async fn get_bytes(&self, key: &ObjectKey) -> Option<(Vec<u8>, Option<String>)> {
        let result = self
            .inner
            .get(&ObjectPath::from(key.to_string()))
            .await
            .ok()?;

        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.to_string());

        let bytes = result.bytes().await.ok()?;

        Some((bytes.to_vec(), content_type))
    }
}

#[async_trait::async_trait(?Send)]
impl Store for ObjectStore {
    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner
            .list_with_delimiter(None)
            .await
            .map_err(ObjectError::Request)?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(key = %key))]
    async fn save_file(
        &self,
        key: &ObjectKey,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let _permit = self
            .put_permits
            .acquire()
            .await
            .map_err(|_| ObjectError::Closed)?;

        let bytes = tokio::fs::read(path).await.map_err(StoreError::ReadFile)?;

        let len = bytes.len();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.inner
            .put_opts(
                &ObjectPath::from(key.to_string()),
                PutPayload::from(bytes),
                opts,
            )
            .with_metrics(crate::init_metrics::OBJECT_STORAGE_PUT_OBJECT_REQUEST)
            .await
            .map_err(ObjectError::Request)?;

        tracing::debug!(len, "stored object");

        Ok(())
    }

    fn public_url(&self, key: &ObjectKey) -> Result<Url, StoreError> {
        let url = format!("https://{}.{}/{}", self.bucket_name, self.public_endpoint, key);

        Ok(Url::parse(&url).map_err(ObjectError::Url)?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ObjectStore;
    use crate::{aspect::AspectCategory, object_key::ObjectKey, store::Store};

    #[tokio::test]
    async fn saves_file_with_content_type() {
        let dir = tempfile::tempdir().expect("Created tempdir");
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"moov+mdat").expect("Wrote file");

        let store = ObjectStore::in_memory("videos", "s3.eu-west-1.amazonaws.com");
        let key = ObjectKey::generate("video/mp4", AspectCategory::Horizontal);

        store
            .save_file(&key, &path, "video/mp4")
            .await
            .expect("Saved file");

        let (bytes, content_type) = store.get_bytes(&key).await.expect("Object exists");

        assert_eq!(bytes, b"moov+mdat");
        assert_eq!(content_type.as_deref(), Some("video/mp4"));
    }

    #[tokio::test]
    async fn puts_wait_for_a_free_permit() {
        let dir = tempfile::tempdir().expect("Created tempdir");
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"moov+mdat").expect("Wrote file");

        let store =
            ObjectStore::in_memory("videos", "s3.eu-west-1.amazonaws.com").with_put_limit(1);
        let key = ObjectKey::generate("video/mp4", AspectCategory::Horizontal);

        let held = store
            .put_permits
            .clone()
            .acquire_owned()
            .await
            .expect("Acquired permit");

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            store.save_file(&key, &path, "video/mp4"),
        )
        .await;

        assert!(blocked.is_err());
        assert!(store.get_bytes(&key).await.is_none());

        drop(held);

        store
            .save_file(&key, &path, "video/mp4")
            .await
            .expect("Saved file");
        assert!(store.get_bytes(&key).await.is_some());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("Created tempdir");
        let store = ObjectStore::in_memory("videos", "s3.eu-west-1.amazonaws.com");
        let key = ObjectKey::generate("video/mp4", AspectCategory::Other);

        let res = store
            .save_file(&key, &dir.path().join("missing.mp4"), "video/mp4")
            .await;

        assert!(matches!(res, Err(crate::store::StoreError::ReadFile(_))));
        assert!(store.get_bytes(&key).await.is_none());
    }

    #[test]
    fn public_url_uses_virtual_host() {
        let store = ObjectStore::in_memory("videos", "s3.eu-west-1.amazonaws.com");
        let key = ObjectKey::generate("video/mp4", AspectCategory::Portrait);

        let url = store.public_url(&key).expect("Valid url");

        assert_eq!(
            url.as_str(),
            format!("https://videos.s3.eu-west-1.amazonaws.com/{key}")
        );
    }

    #[test]
    fn default_public_endpoint_follows_region() {
        let store = ObjectStore::build(
            None,
            String::from("videos"),
            false,
            String::from("us-east-2"),
            Some(String::from("access")),
            Some(String::from("secret")),
            None,
            None,
        )
        .expect("Built store");

        let key = ObjectKey::generate("video/mp4", AspectCategory::Horizontal);
        let url = store.public_url(&key).expect("Valid url");

        assert!(url
            .as_str()
            .starts_with("https://videos.s3.us-east-2.amazonaws.com/horizontal/"));
    }
}
