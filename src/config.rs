use clap::Parser;
use std::path::{Path, PathBuf};

mod commandline;
mod defaults;
mod file;
mod primitives;

use commandline::{Args, Output};
use config::Config;
use defaults::Defaults;

pub(crate) use file::{
    ConfigFile as Configuration, ObjectStorage, OpenTelemetry, Repo, Sled, Store, Tracing,
};
pub(crate) use primitives::LogFormat;

/// Source for reel-rs configuration when embedding as a library
pub enum ConfigSource<P, T> {
    Memory(T),
    File(P),
    Empty,
}

/// A fully layered reel-rs configuration, ready to run
#[derive(Clone, Debug)]
pub struct ReelConfiguration {
    pub(crate) config: Configuration,
}

impl ConfigSource<PathBuf, ()> {
    pub fn memory<T: serde::Serialize>(value: T) -> ConfigSource<PathBuf, T> {
        ConfigSource::Memory(value)
    }

    pub fn file<P: AsRef<Path>>(path: P) -> ConfigSource<P, ()> {
        ConfigSource::File(path)
    }

    pub fn empty() -> ConfigSource<PathBuf, ()> {
        ConfigSource::Empty
    }
}

pub(crate) fn configure_without_clap<P: AsRef<Path>, T: serde::Serialize, Q: AsRef<Path>>(
    source: ConfigSource<P, T>,
    save_to: Option<Q>,
) -> color_eyre::Result<ReelConfiguration> {
    let config = Config::builder().add_source(config::Config::try_from(&Defaults::default())?);

    let config = match source {
        ConfigSource::Memory(memory) => config.add_source(config::Config::try_from(&memory)?),
        ConfigSource::File(path) => config.add_source(config::File::from(path.as_ref())),
        ConfigSource::Empty => config,
    };

    let built = config
        .add_source(
            config::Environment::with_prefix("REEL")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Configuration = built.try_deserialize()?;

    if let Some(save_to) = save_to {
        let output = toml::to_string_pretty(&config)?;
        std::fs::write(save_to, output)?;
    }

    Ok(ReelConfiguration { config })
}

pub(crate) fn configure() -> color_eyre::Result<ReelConfiguration> {
    let Output {
        config_format,
        save_to,
        config_file,
    } = Args::parse().into_output();

    let config = Config::builder().add_source(config::Config::try_from(&Defaults::default())?);

    let config = if let Some(config_file) = config_file {
        config.add_source(config::File::from(config_file))
    } else {
        config
    };

    let built = config
        .add_source(
            config::Environment::with_prefix("REEL")
                .separator("__")
                .try_parsing(true),
        )
        .add_source(config::Config::try_from(&config_format)?)
        .build()?;

    let config: Configuration = built.try_deserialize()?;

    if let Some(save_to) = save_to {
        let output = toml::to_string_pretty(&config)?;
        std::fs::write(save_to, output)?;
    }

    Ok(ReelConfiguration { config })
}

#[cfg(test)]
mod tests {
    use super::{configure_without_clap, ConfigSource, LogFormat, Repo, Store};

    #[test]
    fn memory_source_layers_over_defaults() {
        let configuration = configure_without_clap::<_, _, &str>(
            ConfigSource::memory(serde_json::json!({
                "server": {
                    "address": "127.0.0.1:9090"
                },
                "store": {
                    "type": "object_storage",
                    "bucket_name": "videos",
                    "region": "eu-west-1"
                }
            })),
            None,
        )
        .expect("Built configuration");

        let config = configuration.config;

        assert_eq!(config.server.address.port(), 9090);
        assert_eq!(config.media.max_file_size, 1024);
        assert_eq!(config.media.ffmpeg_path, "ffmpeg");
        assert_eq!(config.media.max_concurrent_puts, 4);
        assert_eq!(config.tracing.logging.format, LogFormat::Normal);
        assert!(config.metrics.prometheus_address.is_none());

        let Store::ObjectStorage(storage) = config.store;
        assert_eq!(storage.bucket_name, "videos");
        assert_eq!(storage.region, "eu-west-1");
        assert!(!storage.use_path_style);

        let Repo::Sled(sled) = config.repo;
        assert_eq!(sled.cache_capacity, 1024 * 1024 * 64);
    }

    #[test]
    fn missing_bucket_is_an_error() {
        let res = configure_without_clap::<_, _, &str>(ConfigSource::empty(), None);

        assert!(res.is_err());
    }

    #[test]
    fn saved_configuration_reloads() {
        let dir = tempfile::tempdir().expect("Created tempdir");
        let save_to = dir.path().join("reel-rs.toml");

        configure_without_clap(
            ConfigSource::memory(serde_json::json!({
                "media": {
                    "max_file_size": 5
                },
                "store": {
                    "type": "object_storage",
                    "bucket_name": "videos",
                    "region": "us-east-1"
                }
            })),
            Some(&save_to),
        )
        .expect("Built configuration");

        let reloaded = configure_without_clap::<_, (), &str>(ConfigSource::file(&save_to), None)
            .expect("Reloaded configuration");

        assert_eq!(reloaded.config.media.max_file_size, 5);
    }
}
