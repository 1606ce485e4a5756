pub(super) fn init_metrics() {
    describe_toplevel();
    describe_ingest();
    describe_repo();
    describe_process();
    describe_middleware();
    describe_object_storage();
}

fn describe_toplevel() {
    metrics::describe_counter!(VIDEOS_CREATED, "How many video records have been created");
}

pub(crate) const VIDEOS_CREATED: &str = "reel-rs.videos.created";

fn describe_ingest() {
    metrics::describe_counter!(
        UPLOADS,
        "How many uploads reached a final state, labeled by the stage they stopped at"
    );
    metrics::describe_histogram!(
        UPLOAD_DURATION,
        "Timings for uploads from receipt to metadata update"
    );
    metrics::describe_histogram!(UPLOAD_BYTES, "Size in bytes of staged uploads");
    metrics::describe_counter!(
        UPLOAD_CATEGORY,
        "How many stored videos fell into each aspect category"
    );
}

pub(crate) const UPLOADS: &str = "reel-rs.uploads";
pub(crate) const UPLOAD_DURATION: &str = "reel-rs.uploads.duration";
pub(crate) const UPLOAD_BYTES: &str = "reel-rs.uploads.bytes";
pub(crate) const UPLOAD_CATEGORY: &str = "reel-rs.uploads.category";

fn describe_repo() {
    metrics::describe_histogram!(
        REPO_UPDATE_VIDEO,
        "Timings for writing the stored video url to the metadata record"
    );
}

pub(crate) const REPO_UPDATE_VIDEO: &str = "reel-rs.repo.update-video";

fn describe_process() {
    metrics::describe_counter!(
        PROCESS_START,
        "How many subprocesses reel-rs has spawned"
    );
    metrics::describe_histogram!(
        PROCESS_DURATION,
        "Timings for all subprocesses spawned by reel-rs"
    );
    metrics::describe_counter!(
        PROCESS_END,
        "How many subprocesses reel-rs has seen finish"
    );
}

pub(crate) const PROCESS_START: &str = "reel-rs.process.start";
pub(crate) const PROCESS_DURATION: &str = "reel-rs.process.duration";
pub(crate) const PROCESS_END: &str = "reel-rs.process.end";

fn describe_middleware() {
    metrics::describe_counter!(
        REQUEST_START,
        "How many requests have been made to reel-rs, by requested path"
    );
    metrics::describe_counter!(
        REQUEST_END,
        "How many requests reel-rs has finished serving, by requested path"
    );
    metrics::describe_histogram!(
        REQUEST_TIMINGS,
        "How long reel-rs takes to serve requests"
    );
}

pub(crate) const REQUEST_START: &str = "reel-rs.request.start";
pub(crate) const REQUEST_END: &str = "reel-rs.request.end";
pub(crate) const REQUEST_TIMINGS: &str = "reel-rs.request.timings";

fn describe_object_storage() {
    metrics::describe_histogram!(
        OBJECT_STORAGE_PUT_OBJECT_REQUEST,
        "Timings for uploading a whole object to object storage"
    );
}

pub(crate) const OBJECT_STORAGE_PUT_OBJECT_REQUEST: &str =
    "reel-rs.object-storage.put-object-request";
