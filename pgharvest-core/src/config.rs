//! Run and data API configuration.

use crate::error::HarvestError;
use crate::models::DEFAULT_SCHEMA;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rows requested per page from the data API.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Largest page the data API is trusted to return in full.
///
/// PostgREST silently truncates responses at its `max-rows` setting (1000 on
/// Supabase). A truncated page is indistinguishable from the last page, so
/// larger pages would end extraction early.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Path of the REST endpoint below the project URL.
pub const DEFAULT_REST_PATH: &str = "rest/v1";

/// Settings of one extraction run.
///
/// # Example
/// ```rust
/// use pgharvest_core::config::HarvestConfig;
///
/// let config = HarvestConfig::new().with_page_size(500).with_include_drops(true);
/// assert_eq!(config.schema, "public");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// The one schema a run works against
    pub schema: String,
    /// Rows per page
    pub page_size: usize,
    /// Emit `DROP TABLE IF EXISTS` guards in the full script
    pub include_drops: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            include_drops: false,
        }
    }
}

impl HarvestConfig {
    /// Creates a configuration with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Builder method to set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Builder method to toggle drop guards.
    pub fn with_include_drops(mut self, include_drops: bool) -> Self {
        self.include_drops = include_drops;
        self
    }

    /// Validates the run settings.
    ///
    /// # Errors
    /// Returns error if the schema is blank or the page size is zero or
    /// above [`MAX_PAGE_SIZE`]
    pub fn validate(&self) -> Result<()> {
        if self.schema.trim().is_empty() {
            return Err(HarvestError::configuration("schema cannot be empty"));
        }

        if self.page_size == 0 {
            return Err(HarvestError::configuration(
                "page_size must be greater than 0",
            ));
        }

        if self.page_size > MAX_PAGE_SIZE {
            return Err(HarvestError::configuration(format!(
                "page_size must not exceed {} (the data API truncates larger pages)",
                MAX_PAGE_SIZE
            )));
        }

        Ok(())
    }
}

/// Connection settings for the restricted data API.
///
/// The key is never printed by `Debug` or included in errors.
#[derive(Clone)]
pub struct ApiConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`
    pub base_url: String,
    pub api_key: String,
    pub rest_path: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"****")
            .field("rest_path", &self.rest_path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Creates a configuration with the default REST path and timeout.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            rest_path: DEFAULT_REST_PATH.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Builder method to set the REST path.
    pub fn with_rest_path(mut self, rest_path: impl Into<String>) -> Self {
        self.rest_path = rest_path.into();
        self
    }

    /// Builder method to set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the API settings.
    ///
    /// # Errors
    /// Returns error if the URL is not an absolute http(s) URL, the key is
    /// empty or the timeout is zero
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| HarvestError::configuration(format!("invalid API URL: {}", e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(HarvestError::configuration(format!(
                "unsupported API URL scheme '{}'",
                url.scheme()
            )));
        }

        if url.cannot_be_a_base() {
            return Err(HarvestError::configuration("API URL cannot be a base URL"));
        }

        if self.api_key.trim().is_empty() {
            return Err(HarvestError::configuration("API key cannot be empty"));
        }

        if self.timeout.is_zero() {
            return Err(HarvestError::configuration(
                "timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harvest_config_defaults() {
        let config = HarvestConfig::default();
        assert_eq!(config.schema, "public");
        assert_eq!(config.page_size, 1000);
        assert!(!config.include_drops);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_harvest_config_validation() {
        assert!(HarvestConfig::new().with_page_size(0).validate().is_err());
        assert!(HarvestConfig::new().with_page_size(MAX_PAGE_SIZE).validate().is_ok());
        assert!(HarvestConfig::new().with_page_size(5000).validate().is_err());
        assert!(HarvestConfig::new().with_schema("  ").validate().is_err());
        assert!(HarvestConfig::new().with_schema("app").validate().is_ok());
    }

    #[test]
    fn test_api_config_validation() {
        let valid = ApiConfig::new("https://abc.supabase.co", "key");
        assert!(valid.validate().is_ok());

        assert!(ApiConfig::new("not a url", "key").validate().is_err());
        assert!(ApiConfig::new("ftp://abc.example", "key").validate().is_err());
        assert!(ApiConfig::new("https://abc.supabase.co", "").validate().is_err());
        assert!(
            ApiConfig::new("https://abc.supabase.co", "key")
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_api_config_debug_hides_key() {
        let config = ApiConfig::new("https://abc.supabase.co", "service-role-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("service-role-secret"));
        assert!(debug.contains("abc.supabase.co"));
    }
}
