mod aspect;
mod config;
mod discover;
mod error;
mod error_code;
mod future;
mod ingest;
mod init_metrics;
mod init_tracing;
mod middleware;
mod normalize;
mod object_key;
mod process;
mod repo;
mod state;
mod store;
mod tmp_file;

#[cfg(test)]
mod testing;

use actix_form_data::{Field, Form, FormData, Multipart, Value};
use actix_web::{web, App, HttpMessage, HttpRequest, HttpResponse, HttpServer};
use futures_util::TryStreamExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{marker::PhantomData, path::Path, time::Duration};
use tracing::Instrument;
use tracing_actix_web::TracingLogger;

use self::{
    discover::FfProbe,
    error::{Error, UploadError},
    future::WithTimeout,
    ingest::{StoredAsset, UploadRequest},
    init_metrics::VIDEOS_CREATED,
    init_tracing::init_tracing,
    middleware::{Deadline, Internal, Metrics, RequestDeadline},
    normalize::FfMpegFastStart,
    repo::{Repo, Video, VideoId},
    state::State,
    store::{object_store::ObjectStore, Store},
    tmp_file::{StageLimits, TmpDir},
};

pub use self::config::{ConfigSource, ReelConfiguration};

const MEGABYTES: usize = 1024 * 1024;

const OWNER_HEADER: &str = "x-owner-id";

/// The caller's identity, as set by the authenticating proxy in front of reel-rs
fn owner_id(req: &HttpRequest) -> Result<String, Error> {
    let owner_id = req
        .headers()
        .get(OWNER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(UploadError::MissingOwner)?;

    Ok(owner_id.to_owned())
}

struct Upload<S: Store + 'static>(Value<(Video, StoredAsset)>, PhantomData<S>);

impl<S: Store + 'static> FormData for Upload<S> {
    type Item = (Video, StoredAsset);
    type Error = Error;

    fn form(req: &HttpRequest) -> Result<Form<Self::Item, Self::Error>, Self::Error> {
        // Create a new Multipart Form validator
        //
        // This form is expecting a single file field, 'video'
        let state = req
            .app_data::<web::Data<State<S>>>()
            .expect("No state in request")
            .clone();

        let owner_id = owner_id(req)?;
        let video_id: VideoId = req.match_info().query("video_id").parse()?;

        // ingest runs in a task the Deadline middleware can't drop, so enforce it in there
        let deadline = req
            .extensions()
            .get::<RequestDeadline>()
            .map(RequestDeadline::claim);

        let max_file_size = state.config.media.max_file_size * MEGABYTES;

        Ok(Form::new()
            .max_files(1)
            .max_file_size(max_file_size)
            .transform_error(transform_error)
            .field(
                "video",
                Field::file(move |filename, content_type, stream| {
                    let state = state.clone();
                    let owner_id = owner_id.clone();

                    let span = tracing::info_span!("file-upload", ?filename, %video_id);

                    let stream = stream.map_err(Error::from);

                    Box::pin(
                        async move {
                            let request = UploadRequest {
                                media_type: content_type
                                    .unwrap_or(mime::APPLICATION_OCTET_STREAM),
                                limits: StageLimits {
                                    max_size: Some(max_file_size as u64),
                                },
                                stream,
                            };

                            let res = ingest::ingest_video_record(
                                &state.repo,
                                &state.inspector,
                                &state.normalizer,
                                &state.store,
                                &state.tmp_dir,
                                &owner_id,
                                video_id,
                                request,
                            )
                            .with_deadline(deadline)
                            .await??;

                            Ok::<_, Error>(res)
                        }
                        .instrument(span),
                    )
                }),
            ))
    }

    fn extract(value: Value<Self::Item>) -> Result<Self, Self::Error> {
        Ok(Upload(value, PhantomData))
    }
}

/// Handle responding to a successful upload
#[tracing::instrument(name = "Uploaded video", skip(value))]
async fn upload<S: Store + 'static>(
    Multipart(Upload(value, _)): Multipart<Upload<S>>,
) -> Result<HttpResponse, Error> {
    let file = value
        .map()
        .and_then(|mut m| m.remove("video"))
        .and_then(|video| video.file())
        .ok_or(UploadError::NoFiles)?;

    let (video, asset) = file.result;

    tracing::debug!("Uploaded {} as {}", file.filename, asset.key);

    Ok(HttpResponse::Created().json(&serde_json::json!({
        "msg": "ok",
        "video": video,
        "upload": {
            "key": asset.key.to_string(),
            "category": asset.category(),
            "width": asset.geometry.width,
            "height": asset.geometry.height,
            "size": asset.len,
        },
    })))
}

#[derive(Debug, serde::Deserialize)]
struct NewVideo {
    title: String,

    #[serde(default)]
    description: String,
}

#[tracing::instrument(name = "Create video", skip(req, state))]
async fn create_video<S: Store + 'static>(
    req: HttpRequest,
    payload: web::Json<NewVideo>,
    state: web::Data<State<S>>,
) -> Result<HttpResponse, Error> {
    let owner_id = owner_id(&req)?;

    let NewVideo { title, description } = payload.into_inner();

    let video = Video::new(owner_id, title, description);

    state.repo.create_video(&video).await?;

    metrics::counter!(VIDEOS_CREATED).increment(1);

    Ok(HttpResponse::Created().json(&serde_json::json!({
        "msg": "ok",
        "video": video,
    })))
}

#[tracing::instrument(name = "Fetch video", skip(state))]
async fn get_video<S: Store + 'static>(
    video_id: web::Path<String>,
    state: web::Data<State<S>>,
) -> Result<HttpResponse, Error> {
    let video_id: VideoId = video_id.parse()?;

    let video = state
        .repo
        .get_video(video_id)
        .await?
        .ok_or(UploadError::MissingVideo)?;

    Ok(HttpResponse::Ok().json(&serde_json::json!({
        "msg": "ok",
        "video": video,
    })))
}

async fn healthz<S: Store>(state: web::Data<State<S>>) -> Result<HttpResponse, Error> {
    state.repo.health_check().await?;
    state.store.health_check().await?;
    Ok(HttpResponse::Ok().finish())
}

fn transform_error(error: actix_form_data::Error) -> actix_web::Error {
    let error: Error = error.into();
    let error: actix_web::Error = error.into();
    error
}

fn configure_endpoints<S: Store + 'static>(config: &mut web::ServiceConfig, state: State<S>) {
    let api_key = state.config.server.api_key.clone();

    config
        .app_data(web::Data::new(state))
        .route("/healthz", web::get().to(healthz::<S>))
        .service(
            web::scope("/api")
                .wrap(Internal(api_key))
                .service(web::resource("/videos").route(web::post().to(create_video::<S>)))
                .service(
                    web::resource("/videos/{video_id}").route(web::get().to(get_video::<S>)),
                )
                .service(
                    web::resource("/videos/{video_id}/upload")
                        .route(web::post().to(upload::<S>)),
                ),
        );
}

async fn launch<S: Store + Send + 'static>(state: State<S>) -> std::io::Result<()> {
    let address = state.config.server.address;

    tracing::info!("Starting reel-rs on {address}");

    HttpServer::new(move || {
        let state = state.clone();

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Deadline)
            .wrap(Metrics)
            .configure(move |sc| configure_endpoints(sc, state))
    })
    .bind(address)?
    .run()
    .await
}

impl<P: AsRef<Path>, T: serde::Serialize> ConfigSource<P, T> {
    /// Initialize the reel-rs configuration
    ///
    /// This takes an optional config_file path which is a valid reel-rs configuration file, and an
    /// optional save_to path, which the generated configuration will be saved into. Since many
    /// parameters have defaults, it can be useful to dump a valid configuration with default values to
    /// see what is available for tweaking.
    ///
    /// When running reel-rs as a library, configuration is limited to environment variables and
    /// configuration files. Commandline options are not available.
    ///
    /// ```rust
    /// fn main() -> color_eyre::Result<()> {
    ///     reel_rs::ConfigSource::memory(serde_json::json!({
    ///         "server": {
    ///             "address": "127.0.0.1:8080",
    ///             "temporary_directory": "/tmp/t1"
    ///         },
    ///         "repo": {
    ///             "type": "sled",
    ///             "path": "./sled-repo"
    ///         },
    ///         "store": {
    ///             "type": "object_storage",
    ///             "bucket_name": "videos",
    ///             "region": "eu-west-1"
    ///         }
    ///     })).init::<&str>(None)?;
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn init<Q: AsRef<Path>>(
        self,
        save_to: Option<Q>,
    ) -> color_eyre::Result<ReelConfiguration> {
        config::configure_without_clap(self, save_to)
    }
}

impl ReelConfiguration {
    /// Build the reel-rs configuration from commandline arguments
    ///
    /// This is probably not useful for 3rd party applications that handle their own commandline
    pub fn build_default() -> color_eyre::Result<Self> {
        config::configure()
    }

    /// Install the default reel-rs tracer
    ///
    /// This is probably not useful for 3rd party applications that install their own tracing
    /// subscribers.
    pub fn install_tracing(self) -> color_eyre::Result<Self> {
        init_tracing(&self.config.tracing)?;
        Ok(self)
    }

    pub fn install_metrics(self) -> color_eyre::Result<Self> {
        if let Some(addr) = self.config.metrics.prometheus_address {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()?;

            tracing::info!("Starting prometheus endpoint on {addr}");
        }

        init_metrics::init_metrics();

        Ok(self)
    }

    /// Run the reel-rs application
    ///
    /// This must be called after `init` or `build_default`, since those produce the configuration
    /// it runs with.
    pub async fn run(self) -> color_eyre::Result<()> {
        let ReelConfiguration { config } = self;

        let repo = Repo::open(config.repo.clone())?;

        let tmp_dir = TmpDir::init(&config.server.temporary_directory).await?;

        let timeout = Duration::from_secs(config.media.process_timeout);
        let inspector = FfProbe::new(&config.media.ffprobe_path, timeout);
        let normalizer = FfMpegFastStart::new(&config.media.ffmpeg_path, timeout);

        match config.store.clone() {
            config::Store::ObjectStorage(config::ObjectStorage {
                endpoint,
                bucket_name,
                use_path_style,
                region,
                access_key,
                secret_key,
                session_token,
                public_endpoint,
            }) => {
                let store = ObjectStore::build(
                    endpoint,
                    bucket_name,
                    use_path_style,
                    region,
                    access_key,
                    secret_key,
                    session_token,
                    public_endpoint,
                )?
                .with_put_limit(config.media.max_concurrent_puts);

                launch(State {
                    config,
                    tmp_dir: tmp_dir.clone(),
                    repo: repo.to_arc(),
                    store,
                    inspector,
                    normalizer,
                })
                .await?;
            }
        }

        tmp_dir.cleanup().await?;

        Ok(())
    }
}
