//! Runtime configuration from the environment.
//!
//! `main` loads a `.env` file first (if present), so every variable below can
//! live there instead of the shell. Credentials are only ever read here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::guide::{ChatClientParams, OPENAI_BASE_URL, OPENAI_MODEL};
use crate::mapbox::{MapboxClientParams, MAPBOX_BASE_URL};
use crate::routing::{DEFAULT_RADIUS_M, OVERPASS_URL};

const DEFAULT_CACHE_DIR: &str = ".osm_cache";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:7860";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Everything the service needs to start.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub mapbox_access_token: String,
    pub mapbox_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub overpass_url: String,
    pub sites_path: Option<PathBuf>,
    pub boundary_path: Option<PathBuf>,
    pub road_cache_dir: PathBuf,
    pub road_radius_m: f64,
    pub http_timeout: Duration,
    pub concurrent_legs: bool,
    pub bind_addr: SocketAddr,
}

impl PlannerConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mapbox_access_token =
            get("MAPBOX_ACCESS_TOKEN").ok_or(ConfigError::Missing("MAPBOX_ACCESS_TOKEN"))?;

        let road_radius_m = parse_or(get("ROAD_RADIUS_M"), "ROAD_RADIUS_M", DEFAULT_RADIUS_M)?;
        if !(road_radius_m.is_finite() && road_radius_m > 0.0) {
            return Err(ConfigError::Invalid {
                key: "ROAD_RADIUS_M",
                value: road_radius_m.to_string(),
            });
        }

        let timeout_secs: u64 =
            parse_or(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let concurrent_legs = match get("CONCURRENT_LEGS") {
            None => false,
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid {
                key: "CONCURRENT_LEGS",
                value: v,
            })?,
        };
        let bind_addr = parse_or(
            get("BIND_ADDR"),
            "BIND_ADDR",
            DEFAULT_BIND_ADDR.parse().map_err(|_| ConfigError::Invalid {
                key: "BIND_ADDR",
                value: DEFAULT_BIND_ADDR.to_string(),
            })?,
        )?;

        Ok(Self {
            mapbox_access_token,
            mapbox_base_url: get("MAPBOX_BASE_URL").unwrap_or_else(|| MAPBOX_BASE_URL.to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| OPENAI_MODEL.to_string()),
            overpass_url: get("OVERPASS_URL").unwrap_or_else(|| OVERPASS_URL.to_string()),
            sites_path: get("TOUR_SITES_PATH").map(PathBuf::from),
            boundary_path: get("TOUR_BOUNDARY_PATH").map(PathBuf::from),
            road_cache_dir: get("ROAD_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            road_radius_m,
            http_timeout: Duration::from_secs(timeout_secs),
            concurrent_legs,
            bind_addr,
        })
    }

    pub fn mapbox_params(&self) -> MapboxClientParams {
        MapboxClientParams {
            base_url: self.mapbox_base_url.clone(),
            access_token: self.mapbox_access_token.clone(),
            timeout: self.http_timeout,
        }
    }

    /// Chat client parameters, or `None` when no API key is configured.
    pub fn chat_params(&self) -> Option<ChatClientParams> {
        self.openai_api_key.as_ref().map(|key| ChatClientParams {
            base_url: self.openai_base_url.clone(),
            api_key: key.clone(),
            model: self.openai_model.clone(),
            timeout: self.http_timeout,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<PlannerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PlannerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("MAPBOX_ACCESS_TOKEN", "tok")]).unwrap();
        assert_eq!(cfg.mapbox_base_url, MAPBOX_BASE_URL);
        assert_eq!(cfg.openai_model, "gpt-4o-mini");
        assert_eq!(cfg.road_radius_m, 3000.0);
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(cfg.road_cache_dir, PathBuf::from(".osm_cache"));
        assert!(!cfg.concurrent_legs);
        assert_eq!(cfg.bind_addr.port(), 7860);
        assert!(cfg.chat_params().is_none());
        assert!(cfg.sites_path.is_none());
    }

    #[test]
    fn test_missing_token() {
        assert!(matches!(
            config(&[]),
            Err(ConfigError::Missing("MAPBOX_ACCESS_TOKEN"))
        ));
        assert!(matches!(
            config(&[("MAPBOX_ACCESS_TOKEN", "  ")]),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("MAPBOX_ACCESS_TOKEN", "tok"),
            ("OPENAI_API_KEY", "sk-test"),
            ("ROAD_RADIUS_M", "1500"),
            ("HTTP_TIMEOUT_SECS", "5"),
            ("CONCURRENT_LEGS", "true"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("TOUR_SITES_PATH", "data/sites.geojson"),
        ])
        .unwrap();
        assert_eq!(cfg.road_radius_m, 1500.0);
        assert!(cfg.concurrent_legs);
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(cfg.sites_path, Some(PathBuf::from("data/sites.geojson")));

        let chat = cfg.chat_params().unwrap();
        assert_eq!(chat.api_key, "sk-test");
        assert_eq!(chat.timeout, Duration::from_secs(5));
        assert_eq!(cfg.mapbox_params().access_token, "tok");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("MAPBOX_ACCESS_TOKEN", "tok"), ("ROAD_RADIUS_M", "far")]),
            Err(ConfigError::Invalid { key: "ROAD_RADIUS_M", .. })
        ));
        assert!(matches!(
            config(&[("MAPBOX_ACCESS_TOKEN", "tok"), ("ROAD_RADIUS_M", "-5")]),
            Err(ConfigError::Invalid { key: "ROAD_RADIUS_M", .. })
        ));
        assert!(matches!(
            config(&[("MAPBOX_ACCESS_TOKEN", "tok"), ("CONCURRENT_LEGS", "maybe")]),
            Err(ConfigError::Invalid { key: "CONCURRENT_LEGS", .. })
        ));
    }
}
