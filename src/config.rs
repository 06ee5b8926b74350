//! Configuration management for the travel companion
//!
//! Loaded from a TOML file (default `~/.config/travel-companion/config.toml`) with
//! environment overrides such as `TRAVEL_COMPANION_CHAT__API_KEY`. Every setting has
//! a default, so an empty file is a valid configuration apart from the API keys,
//! which are only checked when the client that needs them is built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{CompanionError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanionConfig {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub places: PlacesConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Conversational AI (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Ask the model for bare JSON output
    #[serde(default = "default_true")]
    pub structured_output: bool,
    #[serde(default = "default_chat_timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Number of past messages sent with each turn
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

/// Place lookup (Google Places API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_places_base_url")]
    pub base_url: String,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_photo_limit")]
    pub photo_limit: usize,
    /// Location bias radius around the user
    #[serde(default = "default_search_radius")]
    pub search_radius_m: f64,
}

/// Routing (GraphHopper API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_routing_base_url")]
    pub base_url: String,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Re-queries after a closed venue before giving up on a recommendation
    #[serde(default = "default_verification_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_location")]
    pub location: String,
    #[serde(default = "default_route_ttl")]
    pub route_ttl_hours: u32,
    /// Decimal places of the coordinates in route cache keys
    #[serde(default = "default_cache_precision")]
    pub precision: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// OTLP/HTTP endpoint for traces, disabled when unset
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u32,
    /// Request body limit, large enough for an image attachment
    #[serde(default = "default_body_limit")]
    pub body_limit_kb: usize,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_chat_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_chat_timeout() -> u32 {
    30
}

fn default_oracle_timeout() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_history_limit() -> usize {
    10
}

fn default_places_base_url() -> String {
    "https://places.googleapis.com/v1".to_string()
}

fn default_photo_limit() -> usize {
    3
}

fn default_search_radius() -> f64 {
    2000.0
}

fn default_routing_base_url() -> String {
    "https://graphhopper.com/api/1".to_string()
}

fn default_verification_retries() -> u32 {
    3
}

fn default_cache_location() -> String {
    "~/.cache/travel-companion".to_string()
}

fn default_route_ttl() -> u32 {
    168
}

fn default_cache_precision() -> u32 {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_service_name() -> String {
    "travel-companion".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_request_timeout() -> u32 {
    90
}

fn default_body_limit() -> usize {
    10 * 1024
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_chat_base_url(),
            model: default_chat_model(),
            structured_output: default_true(),
            timeout_seconds: default_chat_timeout(),
            max_retries: default_max_retries(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_places_base_url(),
            timeout_seconds: default_oracle_timeout(),
            max_retries: default_max_retries(),
            photo_limit: default_photo_limit(),
            search_radius_m: default_search_radius(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_routing_base_url(),
            timeout_seconds: default_oracle_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_verification_retries(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            location: default_cache_location(),
            route_ttl_hours: default_route_ttl(),
            precision: default_cache_precision(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            otlp_endpoint: None,
            service_name: default_service_name(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_seconds: default_request_timeout(),
            body_limit_kb: default_body_limit(),
        }
    }
}

impl ChatConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }
}

impl PlacesConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }
}

impl RoutingConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }
}

impl CacheConfig {
    #[must_use]
    pub fn route_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.route_ttl_hours) * 3600)
    }

    /// Cache directory with a leading `~` expanded
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        expand_home(&self.location)
    }
}

impl CompanionConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("TRAVEL_COMPANION")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| CompanionError::config(format!("Failed to build configuration: {e}")))?;

        let mut config: CompanionConfig = settings.try_deserialize().map_err(|e| {
            CompanionError::config(format!("Failed to deserialize configuration: {e}"))
        })?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("travel-companion").join("config.toml"))
    }

    /// Apply default values to empty or zeroed fields
    pub fn apply_defaults(&mut self) {
        if self.chat.base_url.is_empty() {
            self.chat.base_url = default_chat_base_url();
        }
        if self.chat.model.is_empty() {
            self.chat.model = default_chat_model();
        }
        if self.chat.timeout_seconds == 0 {
            self.chat.timeout_seconds = default_chat_timeout();
        }
        if self.places.base_url.is_empty() {
            self.places.base_url = default_places_base_url();
        }
        if self.places.timeout_seconds == 0 {
            self.places.timeout_seconds = default_oracle_timeout();
        }
        if self.places.search_radius_m <= 0.0 {
            self.places.search_radius_m = default_search_radius();
        }
        if self.routing.base_url.is_empty() {
            self.routing.base_url = default_routing_base_url();
        }
        if self.routing.timeout_seconds == 0 {
            self.routing.timeout_seconds = default_oracle_timeout();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.cache.route_ttl_hours == 0 {
            self.cache.route_ttl_hours = default_route_ttl();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if self.logging.service_name.is_empty() {
            self.logging.service_name = default_service_name();
        }
        if self.server.bind.is_empty() {
            self.server.bind = default_bind();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        for (name, timeout) in [
            ("Chat", self.chat.timeout_seconds),
            ("Places", self.places.timeout_seconds),
            ("Routing", self.routing.timeout_seconds),
        ] {
            if timeout > 300 {
                return Err(CompanionError::config(format!(
                    "{name} API timeout cannot exceed 300 seconds"
                )));
            }
        }

        for (name, retries) in [
            ("Chat", self.chat.max_retries),
            ("Places", self.places.max_retries),
            ("Routing", self.routing.max_retries),
        ] {
            if retries > 10 {
                return Err(CompanionError::config(format!(
                    "{name} API max retries cannot exceed 10"
                )));
            }
        }

        if self.verification.max_retries > 10 {
            return Err(CompanionError::config(
                "Verification retries cannot exceed 10",
            ));
        }

        if self.places.photo_limit > 10 {
            return Err(CompanionError::config("Photo limit cannot exceed 10"));
        }

        if self.places.search_radius_m > 50_000.0 {
            return Err(CompanionError::config(
                "Search radius cannot exceed 50000 meters",
            ));
        }

        if self.cache.precision > 8 {
            return Err(CompanionError::config(
                "Cache key precision cannot exceed 8 decimal places",
            ));
        }

        if self.cache.route_ttl_hours > 24 * 30 {
            return Err(CompanionError::config(
                "Route cache TTL cannot exceed 720 hours (30 days)",
            ));
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(CompanionError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(CompanionError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            )));
        }

        for (name, url) in [
            ("Chat", &self.chat.base_url),
            ("Places", &self.places.base_url),
            ("Routing", &self.routing.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(CompanionError::config(format!(
                    "{name} API base URL must be a valid HTTP or HTTPS URL"
                )));
            }
        }

        if let Some(endpoint) = &self.logging.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(CompanionError::config(
                    "OTLP endpoint must be a valid HTTP or HTTPS URL",
                ));
            }
        }

        Ok(())
    }
}

fn expand_home(location: &str) -> PathBuf {
    match location.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| Path::new(location).to_path_buf()),
        None => PathBuf::from(location),
    }
}
