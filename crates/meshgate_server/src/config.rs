//! Startup configuration.
//!
//! Everything here is resolved once before the router is built and never re-read while serving.

use axum::http::{HeaderValue, Method, header};
use meshgate_core::prelude::{defaults, env};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid deployment mode '{0}', expected 'local' or 'production'")]
    InvalidMode(String),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Any origin may call the gateway.
    Local,
    /// Only the main server's origin may call the gateway.
    Production,
}

impl FromStr for DeploymentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

/// Settings of the build-and-run pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory sent to the runtime as build context.
    pub build_context: PathBuf,
    /// Build descriptor inside [`Self::build_context`].
    pub build_file: String,
    /// Host directory whose `input`/`output` subdirectories are mounted into GPU containers.
    pub host_workdir: PathBuf,
    /// Tag used when a request names none.
    pub default_tag: String,
    /// Tag that selects the GPU profile.
    pub gpu_tag: String,
    /// Append a JSON summary line after a successful run.
    pub json_summary: bool,
    /// Bounds the build and the streaming phase. [`None`] waits forever.
    pub job_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            build_context: PathBuf::from(defaults::BUILD_CONTEXT),
            build_file: defaults::BUILD_FILE.to_string(),
            host_workdir: PathBuf::from("."),
            default_tag: defaults::CPU_TAG.to_string(),
            gpu_tag: defaults::GPU_TAG.to_string(),
            json_summary: true,
            job_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub mode: DeploymentMode,
    /// The only allowed CORS origin in [`DeploymentMode::Production`].
    pub main_server_url: Option<HeaderValue>,
    pub port: u16,
    pub pipeline: PipelineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Local,
            main_server_url: None,
            port: 3000,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode: DeploymentMode = get(env::DEPLOYMENT_MODE)
            .ok_or(ConfigError::Missing(env::DEPLOYMENT_MODE))?
            .parse()?;

        // Only production restricts origins, local mode never reads the URL.
        let main_server_url = match mode {
            DeploymentMode::Local => None,
            DeploymentMode::Production => {
                let url = get(env::MAIN_SERVER_URL)
                    .ok_or(ConfigError::Missing(env::MAIN_SERVER_URL))?;
                Some(HeaderValue::from_str(&url).map_err(|e| ConfigError::Invalid {
                    key: env::MAIN_SERVER_URL,
                    message: e.to_string(),
                })?)
            }
        };

        let base = PipelineConfig::default();
        let pipeline = PipelineConfig {
            build_context: get("BUILD_CONTEXT_DIR")
                .map(PathBuf::from)
                .unwrap_or(base.build_context),
            build_file: get("BUILD_FILE").unwrap_or(base.build_file),
            host_workdir: get("HOST_WORKDIR")
                .map(PathBuf::from)
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or(base.host_workdir),
            default_tag: get("DEFAULT_IMAGE_TAG").unwrap_or(base.default_tag),
            gpu_tag: get("GPU_IMAGE_TAG").unwrap_or(base.gpu_tag),
            json_summary: parse_or("JSON_SUMMARY", get("JSON_SUMMARY"), base.json_summary)?,
            job_timeout: get("JOB_TIMEOUT_SECS")
                .map(|v| parse("JOB_TIMEOUT_SECS", &v).map(Duration::from_secs))
                .transpose()?,
        };

        Ok(Self {
            mode,
            main_server_url,
            port: parse_or("PORT", get("PORT"), 3000)?,
            pipeline,
        })
    }

    pub fn cors_layer(&self) -> CorsLayer {
        match (self.mode, &self.main_server_url) {
            (DeploymentMode::Production, Some(origin)) => CorsLayer::new()
                .allow_origin(origin.clone())
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
            _ => CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        }
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}

fn parse_or<T: FromStr>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.map(|v| parse(key, &v)).unwrap_or(Ok(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn local_mode_needs_no_main_server() {
        let config = ServerConfig::from_lookup(lookup(&[("DEPLOYMENT_MODE", "local")])).unwrap();

        assert_eq!(config.mode, DeploymentMode::Local);
        assert_eq!(config.port, 3000);
        assert!(config.main_server_url.is_none());
        assert!(config.pipeline.json_summary);
        assert_eq!(config.pipeline.job_timeout, None);
    }

    #[test]
    fn production_requires_main_server_url() {
        let err = ServerConfig::from_lookup(lookup(&[("DEPLOYMENT_MODE", "production")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("MAIN_SERVER_URL"));

        let config = ServerConfig::from_lookup(lookup(&[
            ("DEPLOYMENT_MODE", "production"),
            ("MAIN_SERVER_URL", "https://main.example.com"),
        ]))
        .unwrap();
        assert_eq!(
            config.main_server_url,
            Some(HeaderValue::from_static("https://main.example.com"))
        );
    }

    #[test]
    fn local_mode_ignores_main_server_url() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("DEPLOYMENT_MODE", "local"),
            ("MAIN_SERVER_URL", "https://main.example.com\n"),
        ]))
        .unwrap();
        assert!(config.main_server_url.is_none());

        let err = ServerConfig::from_lookup(lookup(&[
            ("DEPLOYMENT_MODE", "production"),
            ("MAIN_SERVER_URL", "https://main.example.com\n"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAIN_SERVER_URL", .. }));
    }

    #[test]
    fn unknown_or_missing_mode_is_fatal() {
        assert_eq!(
            ServerConfig::from_lookup(lookup(&[("DEPLOYMENT_MODE", "staging")])).unwrap_err(),
            ConfigError::InvalidMode("staging".into())
        );
        assert_eq!(
            ServerConfig::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::Missing("DEPLOYMENT_MODE")
        );
    }

    #[test]
    fn pipeline_overrides_are_parsed() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("DEPLOYMENT_MODE", "local"),
            ("PORT", "8080"),
            ("GPU_IMAGE_TAG", "mesh-gpu"),
            ("HOST_WORKDIR", "/srv/jobs"),
            ("JSON_SUMMARY", "false"),
            ("JOB_TIMEOUT_SECS", "900"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.pipeline.gpu_tag, "mesh-gpu");
        assert_eq!(config.pipeline.host_workdir, PathBuf::from("/srv/jobs"));
        assert!(!config.pipeline.json_summary);
        assert_eq!(config.pipeline.job_timeout, Some(Duration::from_secs(900)));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[
            ("DEPLOYMENT_MODE", "local"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }
}
