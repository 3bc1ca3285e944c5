// Configuration - locator.toml, every field optional

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable pointing at the config file
pub const CONFIG_ENV: &str = "LOCATOR_CONFIG";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub share: ShareConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Published sheet, CSV output
    #[serde(default = "default_sheet_url")]
    pub sheet_url: String,
    /// Local CSV used instead of the sheet when set
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            sheet_url: default_sheet_url(),
            csv_path: None,
        }
    }
}

fn default_sheet_url() -> String {
    "https://docs.google.com/spreadsheets/d/e/2PACX-1vRgahhaYEpmPE30syFjzumKEgX065hSh8TZZwfbgeNwr5wypmd0IQNpvV7zVQH-dEZrPthRgfJYL5lZ/pub?gid=0&single=true&output=csv".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeocodingConfig {
    #[serde(default = "default_geocode_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_geocode_key_env")]
    pub api_key_env: String,
    /// Appended to every apartment address before geocoding
    #[serde(default = "default_address_suffix")]
    pub address_suffix: String,
    /// Cap on in-flight geocode calls per search; unbounded when unset
    #[serde(default)]
    pub max_concurrent_geocodes: Option<usize>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_geocode_endpoint(),
            api_key_env: default_geocode_key_env(),
            address_suffix: default_address_suffix(),
            max_concurrent_geocodes: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_geocode_endpoint() -> String {
    "https://maps.googleapis.com/maps/api/geocode/json".to_string()
}
fn default_geocode_key_env() -> String {
    "GOOGLE_MAPS_API_KEY".to_string()
}
fn default_address_suffix() -> String {
    ", Cannes, France".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    /// Palais des Festivals
    #[serde(default = "default_center_lat")]
    pub center_lat: f64,
    #[serde(default = "default_center_lng")]
    pub center_lng: f64,
    #[serde(default = "default_agency_address")]
    pub agency_address: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lat: default_center_lat(),
            center_lng: default_center_lng(),
            agency_address: default_agency_address(),
        }
    }
}

fn default_center_lat() -> f64 {
    43.5511
}
fn default_center_lng() -> f64 {
    7.0178
}
fn default_agency_address() -> String {
    "21 rue félix faure 06400 Cannes".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShareConfig {
    /// Public URL of the locator page, used as the share-link base
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8888/".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Read on every request, never cached
    #[serde(default = "default_extraction_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest request body accepted, base64 and JSON overhead included
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_extraction_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_extraction_key_env() -> String {
    "CLAUDE_API_KEY".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_bind() -> String {
    "0.0.0.0:8888".to_string()
}
// A 32 MB PDF grows by a third once base64-encoded
fn default_max_body_bytes() -> usize {
    48 * 1024 * 1024
}

impl Config {
    /// Parse a config document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse config")
    }

    /// Load `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load from `$LOCATOR_CONFIG`, or `./locator.toml`
    pub fn load_default() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("locator.toml"));
        Self::load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.geocoding.address_suffix, ", Cannes, France");
        assert_eq!(config.extraction.api_key_env, "CLAUDE_API_KEY");
        assert_eq!(config.extraction.max_tokens, 1024);
        assert_eq!(config.extraction.max_body_bytes, 48 * 1024 * 1024);
        assert!(config.geocoding.max_concurrent_geocodes.is_none());
        assert!(config.data.csv_path.is_none());
    }

    #[test]
    fn test_partial_sections_override() {
        let config = Config::from_toml(
            r#"
            [data]
            csv_path = "appartements.csv"

            [geocoding]
            max_concurrent_geocodes = 4

            [extraction]
            model = "some-other-model"
            bind = "127.0.0.1:9000"
            "#,
        )
        .unwrap();

        assert_eq!(config.data.csv_path, Some(PathBuf::from("appartements.csv")));
        assert_eq!(config.geocoding.max_concurrent_geocodes, Some(4));
        assert_eq!(config.extraction.model, "some-other-model");
        assert_eq!(config.extraction.bind, "127.0.0.1:9000");
        assert_eq!(config.extraction.max_tokens, 1024);
        assert_eq!(config.map.center_lat, 43.5511);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/definitely/not/here/locator.toml")).unwrap();
        assert_eq!(config.share.base_url, "http://localhost:8888/");
    }

    #[test]
    fn test_invalid_document_is_an_error() {
        assert!(Config::from_toml("[geocoding]\nmax_concurrent_geocodes = \"many\"").is_err());
    }
}
