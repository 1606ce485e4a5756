use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use color_eyre::Report;

use crate::{error_code::ErrorCode, ingest::IngestError};

pub(crate) struct Error {
    inner: color_eyre::Report,
}

impl Error {
    fn kind(&self) -> Option<&UploadError> {
        self.inner.downcast_ref()
    }

    pub(crate) fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        self.inner.root_cause()
    }

    pub(crate) fn error_code(&self) -> ErrorCode {
        self.kind()
            .map(|e| e.error_code())
            .unwrap_or(ErrorCode::UNKNOWN_ERROR)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl<T> From<T> for Error
where
    UploadError: From<T>,
{
    fn from(error: T) -> Self {
        Error {
            inner: Report::from(UploadError::from(error)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum UploadError {
    #[error("Couldn't upload file")]
    Upload(#[from] actix_form_data::Error),

    #[error("Error ingesting video")]
    Ingest(#[from] IngestError),

    #[error("Error in DB")]
    Repo(#[from] crate::repo::RepoError),

    #[error("Error in store")]
    Store(#[from] crate::store::StoreError),

    #[error("Error interacting with filesystem")]
    Io(#[from] std::io::Error),

    #[error("No files present in upload")]
    NoFiles,

    #[error("Missing or invalid X-Owner-Id header")]
    MissingOwner,

    #[error("Requested a video that doesn't exist")]
    MissingVideo,

    #[error("Upload did not finish before the request deadline")]
    DeadlineExceeded(#[from] crate::future::DeadlineExceeded),
}

impl UploadError {
    const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Upload(_) => ErrorCode::FILE_UPLOAD_ERROR,
            Self::Ingest(e) => e.error_code(),
            Self::Repo(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::Io(_) => ErrorCode::IO_ERROR,
            Self::NoFiles => ErrorCode::VALIDATE_NO_FILES,
            Self::MissingOwner => ErrorCode::INVALID_OWNER,
            Self::MissingVideo => ErrorCode::VIDEO_NOT_FOUND,
            Self::DeadlineExceeded(_) => ErrorCode::REQUEST_TIMEOUT,
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            Some(UploadError::NoFiles | UploadError::Upload(_)) => StatusCode::BAD_REQUEST,
            Some(UploadError::Repo(e)) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Some(UploadError::Ingest(IngestError::NotOwner)) => StatusCode::FORBIDDEN,
            Some(UploadError::Ingest(IngestError::NotFound) | UploadError::MissingVideo) => {
                StatusCode::NOT_FOUND
            }
            Some(UploadError::Ingest(e)) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Some(UploadError::MissingOwner) => StatusCode::UNAUTHORIZED,
            Some(UploadError::DeadlineExceeded(_)) => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("application/json")
            .body(
                serde_json::to_string(&serde_json::json!({
                    "msg": self.root_cause().to_string(),
                    "code": self.error_code()
                }))
                .unwrap_or_else(|_| {
                    r#"{"msg":"Request failed","code":"unknown-error"}"#.to_string()
                }),
            )
    }
}
