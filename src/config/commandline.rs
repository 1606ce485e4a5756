use crate::config::primitives::{LogFormat, Targets};
use clap::{Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf};
use url::Url;

impl Args {
    pub(super) fn into_output(self) -> Output {
        let Args {
            config_file,
            log_format,
            log_targets,
            log_spans,
            opentelemetry_url,
            opentelemetry_service_name,
            opentelemetry_targets,
            save_to,
            command,
        } = self;

        let tracing = Tracing {
            logging: Logging {
                format: log_format,
                targets: log_targets,
                log_spans,
            },
            opentelemetry: OpenTelemetry {
                url: opentelemetry_url,
                service_name: opentelemetry_service_name,
                targets: opentelemetry_targets,
            },
        };

        match command {
            Command::Run(Run {
                address,
                api_key,
                temporary_directory,
                metrics_prometheus_address,
                media_max_file_size,
                media_process_timeout,
                media_ffprobe_path,
                media_ffmpeg_path,
                media_max_concurrent_puts,
                store,
            }) => {
                let server = Server {
                    address,
                    api_key,
                    temporary_directory,
                };

                let metrics = Metrics {
                    prometheus_address: metrics_prometheus_address,
                };

                let media = Media {
                    max_file_size: media_max_file_size,
                    process_timeout: media_process_timeout,
                    ffprobe_path: media_ffprobe_path,
                    ffmpeg_path: media_ffmpeg_path,
                    max_concurrent_puts: media_max_concurrent_puts,
                };

                let (store, repo) = match store {
                    Some(RunStore::ObjectStorage(RunObjectStorage { storage, repo })) => {
                        (Some(storage), repo)
                    }
                    None => (None, None),
                };

                Output {
                    config_format: ConfigFormat {
                        server,
                        tracing,
                        metrics,
                        media,
                        repo,
                        store,
                    },
                    save_to,
                    config_file,
                }
            }
        }
    }
}

pub(super) struct Output {
    pub(super) config_format: ConfigFormat,
    pub(super) save_to: Option<PathBuf>,
    pub(super) config_file: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct ConfigFormat {
    server: Server,
    tracing: Tracing,
    metrics: Metrics,
    media: Media,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo: Option<Repo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<ObjectStorage>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Server {
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<SocketAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temporary_directory: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Tracing {
    logging: Logging,
    opentelemetry: OpenTelemetry,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Logging {
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<LogFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Targets>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    log_spans: bool,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct OpenTelemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Targets>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Metrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    prometheus_address: Option<SocketAddr>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Media {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_file_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    process_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ffprobe_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ffmpeg_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_concurrent_puts: Option<usize>,
}

/// Run the reel-rs application
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(super) struct Args {
    /// Path to the reel-rs configuration file
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Format of logs printed to stdout
    #[arg(long)]
    log_format: Option<LogFormat>,
    /// Log levels to print to stdout, respects RUST_LOG formatting
    #[arg(long)]
    log_targets: Option<Targets>,
    /// Whether to log openning and closing of tracing spans to stdout
    #[arg(long)]
    log_spans: bool,

    /// URL to send OpenTelemetry metrics
    #[arg(long)]
    opentelemetry_url: Option<Url>,
    /// Service Name to use for OpenTelemetry
    #[arg(long)]
    opentelemetry_service_name: Option<String>,
    /// Log levels to use for OpenTelemetry, respects RUST_LOG formatting
    #[arg(long)]
    opentelemetry_targets: Option<Targets>,

    /// File to save the current configuration for reproducible runs
    #[arg(long)]
    save_to: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the reel-rs web server
    Run(Run),
}

#[derive(Debug, Parser)]
struct Run {
    /// The address and port to bind the reel-rs web server
    #[arg(short, long)]
    address: Option<SocketAddr>,

    /// The API KEY required to access the video routes
    #[arg(long)]
    api_key: Option<String>,

    /// The temporary directory reel-rs should stage uploads in
    #[arg(long)]
    temporary_directory: Option<PathBuf>,

    /// Whether to enable the prometheus scrape endpoint
    #[arg(long)]
    metrics_prometheus_address: Option<SocketAddr>,

    /// The maximum size, in megabytes, for uploaded videos
    #[arg(long)]
    media_max_file_size: Option<usize>,

    /// Timeout, in seconds, for each ffprobe or ffmpeg invocation
    #[arg(long)]
    media_process_timeout: Option<u64>,

    /// Path or name of the ffprobe binary
    #[arg(long)]
    media_ffprobe_path: Option<String>,

    /// Path or name of the ffmpeg binary
    #[arg(long)]
    media_ffmpeg_path: Option<String>,

    /// How many normalized videos may be held in memory for upload at once
    #[arg(long)]
    media_max_concurrent_puts: Option<usize>,

    #[command(subcommand)]
    store: Option<RunStore>,
}

/// Run reel-rs with the provided storage
#[derive(Debug, Subcommand)]
enum RunStore {
    /// Run reel-rs with object storage
    ObjectStorage(RunObjectStorage),
}

/// Run reel-rs with the provided object storage
#[derive(Debug, Parser)]
struct RunObjectStorage {
    #[command(flatten)]
    storage: ObjectStorage,

    #[command(subcommand)]
    repo: Option<Repo>,
}

/// Configuration for data repositories
#[derive(Debug, Subcommand, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
enum Repo {
    /// Run reel-rs with the provided sled-backed data repository
    Sled(Sled),
}

/// Configuration for Object Storage
#[derive(Clone, Debug, Parser, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type", rename = "object_storage")]
struct ObjectStorage {
    /// The base endpoint for the object storage API
    ///
    /// Examples:
    /// - `http://localhost:9000`
    /// - `https://s3.dualstack.eu-west-1.amazonaws.com`
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<Url>,

    /// Determines whether to use path style or virtualhost style for accessing objects
    ///
    /// When this is true, objects will be fetched from {endpoint}/{bucket_name}/{object}
    /// When false, objects will be fetched from {bucket_name}.{endpoint}/{object}
    #[arg(short, long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    use_path_style: bool,

    /// The bucket in which to store videos
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    bucket_name: Option<String>,

    /// The region the bucket is located in
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,

    /// The Access Key for the user accessing the bucket
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    access_key: Option<String>,

    /// The secret key for the user accessing the bucket
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_key: Option<String>,

    /// The session token for accessing the bucket
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,

    /// The host written into public video urls as https://{bucket_name}.{public_endpoint}/{key}
    ///
    /// This defaults to s3.{region}.amazonaws.com
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    public_endpoint: Option<String>,
}

/// Configuration for the sled-backed data repository
#[derive(Debug, Parser, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Sled {
    /// The path to store the sled database
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,

    /// The cache capacity, in bytes, allowed to sled for in-memory operations
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_capacity: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::Args;
    use clap::Parser;

    #[test]
    fn parses_object_storage_run() {
        let args = Args::try_parse_from([
            "reel-rs",
            "--log-format",
            "json",
            "run",
            "--media-max-file-size",
            "50",
            "--media-max-concurrent-puts",
            "2",
            "object-storage",
            "--bucket-name",
            "videos",
            "--region",
            "eu-west-1",
            "sled",
            "--path",
            "/tmp/sled",
        ])
        .expect("Parsed args");

        let output = args.into_output();
        let json = serde_json::to_value(&output.config_format).expect("Serialized");

        assert_eq!(json["tracing"]["logging"]["format"], "json");
        assert_eq!(json["media"]["max_file_size"], 50);
        assert_eq!(json["media"]["max_concurrent_puts"], 2);
        assert_eq!(json["store"]["type"], "object_storage");
        assert_eq!(json["store"]["bucket_name"], "videos");
        assert_eq!(json["repo"]["type"], "sled");
        assert_eq!(json["repo"]["path"], "/tmp/sled");
        assert!(json["server"].get("address").is_none());
    }

    #[test]
    fn command_definition_is_valid() {
        use clap::CommandFactory;

        Args::command().debug_assert();
    }
}
