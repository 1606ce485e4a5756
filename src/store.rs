use std::{fmt::Debug, path::Path};

use url::Url;

use crate::{error_code::ErrorCode, object_key::ObjectKey};

pub(crate) mod object_store;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("Error in object store")]
    ObjectStore(#[source] crate::store::object_store::ObjectError),

    #[error("Error reading file for upload")]
    ReadFile(#[source] std::io::Error),
}

impl StoreError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::ObjectStore(e) => e.error_code(),
            Self::ReadFile(_) => ErrorCode::OBJECT_IO_ERROR,
        }
    }
}

impl From<crate::store::object_store::ObjectError> for StoreError {
    fn from(value: crate::store::object_store::ObjectError) -> Self {
        Self::ObjectStore(value)
    }
}

#[async_trait::async_trait(?Send)]
pub(crate) trait Store: Clone + Debug {
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Upload a local file under `key` in a single request
    async fn save_file(
        &self,
        key: &ObjectKey,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StoreError>;

    /// The address clients use to fetch the object stored under `key`
    fn public_url(&self, key: &ObjectKey) -> Result<Url, StoreError>;
}
