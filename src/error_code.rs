#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub(crate) struct ErrorCode {
    code: &'static str,
}

impl ErrorCode {
    pub(crate) const COMMAND_TIMEOUT: ErrorCode = ErrorCode {
        code: "command-timeout",
    };
    pub(crate) const COMMAND_ERROR: ErrorCode = ErrorCode {
        code: "command-error",
    };
    pub(crate) const COMMAND_FAILURE: ErrorCode = ErrorCode {
        code: "command-failure",
    };
    pub(crate) const COMMAND_NOT_FOUND: ErrorCode = ErrorCode {
        code: "command-not-found",
    };
    pub(crate) const COMMAND_PERMISSION_DENIED: ErrorCode = ErrorCode {
        code: "command-permission-denied",
    };
    pub(crate) const INVALID_VIDEO_ID: ErrorCode = ErrorCode {
        code: "invalid-video-id",
    };
    pub(crate) const INVALID_OWNER: ErrorCode = ErrorCode {
        code: "invalid-owner",
    };
    pub(crate) const UNSUPPORTED_MEDIA_TYPE: ErrorCode = ErrorCode {
        code: "unsupported-media-type",
    };
    pub(crate) const VIDEO_NOT_FOUND: ErrorCode = ErrorCode {
        code: "video-not-found",
    };
    pub(crate) const NOT_OWNER: ErrorCode = ErrorCode { code: "not-owner" };
    pub(crate) const STAGING_IO_ERROR: ErrorCode = ErrorCode {
        code: "staging-io-error",
    };
    pub(crate) const FILE_UPLOAD_ERROR: ErrorCode = ErrorCode {
        code: "file-upload-error",
    };
    pub(crate) const VALIDATE_FILE_EMPTY: ErrorCode = ErrorCode {
        code: "validate-file-empty",
    };
    pub(crate) const VALIDATE_FILE_SIZE: ErrorCode = ErrorCode {
        code: "validate-file-size",
    };
    pub(crate) const PROBE_OUTPUT: ErrorCode = ErrorCode {
        code: "probe-output",
    };
    pub(crate) const NO_VIDEO_STREAM: ErrorCode = ErrorCode {
        code: "no-video-stream",
    };
    pub(crate) const INVALID_FILE_PATH: ErrorCode = ErrorCode {
        code: "invalid-file-path",
    };
    pub(crate) const NORMALIZE_OUTPUT: ErrorCode = ErrorCode {
        code: "normalize-output",
    };
    pub(crate) const OBJECT_REQUEST_ERROR: ErrorCode = ErrorCode {
        code: "object-request-error",
    };
    pub(crate) const OBJECT_IO_ERROR: ErrorCode = ErrorCode {
        code: "object-io-error",
    };
    pub(crate) const SLED_ERROR: ErrorCode = ErrorCode { code: "sled-error" };
    pub(crate) const METADATA_UPDATE: ErrorCode = ErrorCode {
        code: "metadata-update",
    };
    pub(crate) const PANIC: ErrorCode = ErrorCode { code: "panic" };
    pub(crate) const VALIDATE_NO_FILES: ErrorCode = ErrorCode {
        code: "validate-no-files",
    };
    pub(crate) const REQUEST_TIMEOUT: ErrorCode = ErrorCode {
        code: "request-timeout",
    };
    pub(crate) const PARSE_DEADLINE: ErrorCode = ErrorCode {
        code: "parse-deadline",
    };
    pub(crate) const INVALID_API_TOKEN: ErrorCode = ErrorCode {
        code: "invalid-api-token",
    };
    pub(crate) const IO_ERROR: ErrorCode = ErrorCode { code: "io-error" };
    pub(crate) const UNKNOWN_ERROR: ErrorCode = ErrorCode {
        code: "unknown-error",
    };
}
