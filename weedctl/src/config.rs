//! Client configuration.
//!
//! Configuration is loaded from an optional YAML file with environment variable overrides. The file
//! path defaults to `config.yaml` and can be changed with `-f` or `WEEDCTL_CONFIG`.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`, may be absent)
//! 2. **Environment variables** - Variables prefixed with `WEEDCTL_` override YAML values
//!
//! Nested values use double underscores, e.g. `WEEDCTL_ENDPOINTS__REGISTER=signup`.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Point at a remote server
//! WEEDCTL_SERVER_URL=https://weeds.example.com/
//! WEEDCTL_PUSH_CHANNEL_URL=wss://weeds.example.com/ws
//!
//! # Give up on slow uploads
//! WEEDCTL_REQUEST_TIMEOUT=10m
//! ```

use clap::{Parser, Subcommand};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::{Error, Result};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "WEEDCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print push-channel messages until the channel closes
    Listen,
    /// Upload a GeoTIFF and save the returned shapefile archive
    Upload {
        /// GeoTIFF to upload
        file: Option<PathBuf>,
    },
    /// Upload an image with its corner coordinates
    UploadImage {
        #[arg(long)]
        top_left: String,
        #[arg(long)]
        top_right: String,
        #[arg(long)]
        bottom_right: String,
        #[arg(long)]
        bottom_left: String,
        /// Image to upload
        image: Option<PathBuf>,
    },
    /// Register a user and follow the redirect
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        address: String,
    },
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Origin of the detection service; endpoint paths are resolved against it
    pub server_url: Url,
    /// Push channel the server broadcasts progress messages on
    pub push_channel_url: Url,
    pub endpoints: EndpointsConfig,
    /// Page the registration flow redirects to
    pub app_path: String,
    /// Name given to the archive returned by the GeoTIFF upload
    pub download_filename: String,
    /// Directory the CLI writes downloads into
    pub download_dir: PathBuf,
    /// Delay between a successful registration and the redirect
    #[serde(with = "humantime_serde")]
    pub redirect_delay: Duration,
    /// Overall timeout for a single request (no timeout if unset)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

/// Endpoint paths relative to `server_url`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointsConfig {
    pub archive_upload: String,
    pub image_upload: String,
    pub register: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            archive_upload: "upload_geotiff/".to_string(),
            image_upload: "upload-image/".to_string(),
            register: "register".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: Url::parse("http://127.0.0.1:8000/").expect("default server url is valid"),
            push_channel_url: Url::parse("ws://127.0.0.1:8000/ws").expect("default push channel url is valid"),
            endpoints: EndpointsConfig::default(),
            app_path: "/app".to_string(),
            download_filename: "weed_detections.zip".to_string(),
            download_dir: PathBuf::from("."),
            redirect_delay: Duration::from_secs(2),
            request_timeout: None,
        }
    }
}

/// Fully resolved endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub archive_upload: Url,
    pub image_upload: Url,
    pub register: Url,
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> std::result::Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // WEEDCTL_CONFIG names the file itself, not a config key
            .merge(Env::prefixed("WEEDCTL_").ignore(&["config"]).split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.server_url.scheme(), "http" | "https") {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: server_url must use http or https, got '{}'",
                self.server_url.scheme()
            )));
        }

        if !matches!(self.push_channel_url.scheme(), "ws" | "wss") {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: push_channel_url must use ws or wss, got '{}'",
                self.push_channel_url.scheme()
            )));
        }

        if self.download_filename.is_empty() || self.download_filename.contains(['/', '\\']) {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: download_filename must be a plain file name, got '{}'",
                self.download_filename
            )));
        }

        if !self.app_path.starts_with('/') {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: app_path must be absolute, got '{}'",
                self.app_path
            )));
        }

        self.endpoints()?;
        Ok(())
    }

    pub fn endpoints(&self) -> Result<Endpoints> {
        Ok(Endpoints {
            archive_upload: self.server_url.join(&self.endpoints.archive_upload)?,
            image_upload: self.server_url.join(&self.endpoints.image_upload)?,
            register: self.server_url.join(&self.endpoints.register)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
            command: None,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.download_filename, "weed_detections.zip");
            assert_eq!(config.redirect_delay, Duration::from_secs(2));
            assert_eq!(config.app_path, "/app");

            let endpoints = config.endpoints().unwrap();
            assert_eq!(endpoints.archive_upload.as_str(), "http://127.0.0.1:8000/upload_geotiff/");
            assert_eq!(endpoints.image_upload.as_str(), "http://127.0.0.1:8000/upload-image/");
            assert_eq!(endpoints.register.as_str(), "http://127.0.0.1:8000/register");
            assert_eq!(config.push_channel_url.as_str(), "ws://127.0.0.1:8000/ws");
            Ok(())
        });
    }

    #[test]
    fn test_yaml_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
server_url: https://weeds.example.com/
redirect_delay: 500ms
request_timeout: 10m
endpoints:
  register: api/register
"#,
            )?;
            jail.set_env("WEEDCTL_DOWNLOAD_DIR", "/tmp/out");
            jail.set_env("WEEDCTL_ENDPOINTS__IMAGE_UPLOAD", "images/");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.redirect_delay, Duration::from_millis(500));
            assert_eq!(config.request_timeout, Some(Duration::from_secs(600)));
            assert_eq!(config.download_dir, PathBuf::from("/tmp/out"));

            let endpoints = config.endpoints().unwrap();
            assert_eq!(endpoints.register.as_str(), "https://weeds.example.com/api/register");
            assert_eq!(endpoints.image_upload.as_str(), "https://weeds.example.com/images/");
            Ok(())
        });
    }

    #[test]
    fn test_config_path_variable_is_not_a_key() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.yaml", "app_path: /dashboard\n")?;
            jail.set_env("WEEDCTL_CONFIG", "custom.yaml");

            let config = Config::load(&args("custom.yaml"))?;
            assert_eq!(config.app_path, "/dashboard");
            Ok(())
        });
    }

    #[test]
    fn test_rejects_unknown_fields() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "retry_count: 3\n")?;
            assert!(Config::load(&args("test.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_rejects_bad_push_channel_scheme() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "push_channel_url: http://127.0.0.1:8000/ws\n")?;
            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(err.to_string().contains("push_channel_url"));
            Ok(())
        });
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_url.as_str(), "http://127.0.0.1:8000/");
    }

    #[test]
    fn test_rejects_download_filename_with_path() {
        let config = Config {
            download_filename: "../evil.zip".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
