use crate::{
    config::Configuration, discover::FfProbe, normalize::FfMpegFastStart, repo::ArcRepo,
    tmp_file::ArcTmpDir,
};

#[derive(Clone)]
pub(crate) struct State<S> {
    pub(super) config: Configuration,
    pub(super) tmp_dir: ArcTmpDir,
    pub(super) repo: ArcRepo,
    pub(super) store: S,
    pub(super) inspector: FfProbe,
    pub(super) normalizer: FfMpegFastStart,
}
