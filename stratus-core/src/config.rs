//! Provider configuration
//!
//! Read once from the host's `provider` block, overlaid with the standard AWS
//! environment variables, validated, then shared read-only.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::tags::{IgnoreTagsConfig, KeyValueTags};

pub const DEFAULT_MAX_RETRIES: u32 = 25;

static REGION_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-gov|-iso[a-z]?)?-[a-z]+-\d+$"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid provider configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("region is required (set it in the provider block or AWS_REGION)")]
    MissingRegion,

    #[error("invalid region '{0}'")]
    InvalidRegion(String),

    #[error("invalid endpoint for {service}: '{url}' must start with http:// or https://")]
    InvalidEndpoint { service: String, url: String },

    #[error("invalid value '{value}' for {variable}")]
    InvalidEnv { variable: String, value: String },
}

/// Custom service endpoints, for local stacks and testing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub cloudcontrol: Option<String>,
    pub s3: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Attempts granted to the SDK; also bounds the provider's own retries
    pub max_retries: u32,
    pub endpoints: EndpointsConfig,
    pub default_tags: HashMap<String, String>,
    pub ignore_tags: IgnoreTagsConfig,
    pub skip_region_validation: bool,
    pub s3_use_path_style: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            max_retries: DEFAULT_MAX_RETRIES,
            endpoints: EndpointsConfig::default(),
            default_tags: HashMap::new(),
            ignore_tags: IgnoreTagsConfig::default(),
            skip_region_validation: false,
            s3_use_path_style: false,
        }
    }
}

impl ProviderConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            ..Default::default()
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Overlay `AWS_REGION`/`AWS_DEFAULT_REGION`, `AWS_PROFILE` and `AWS_MAX_ATTEMPTS`
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Like [`Self::with_env_overrides`] with an explicit variable lookup
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(region) = non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION")) {
            self.region = Some(region);
        }
        if let Some(profile) = non_empty("AWS_PROFILE") {
            self.profile = Some(profile);
        }
        if let Some(attempts) = non_empty("AWS_MAX_ATTEMPTS") {
            self.max_retries = attempts.parse().map_err(|_| ConfigError::InvalidEnv {
                variable: "AWS_MAX_ATTEMPTS".to_string(),
                value: attempts.clone(),
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let region = self
            .region
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or(ConfigError::MissingRegion)?;
        if !self.skip_region_validation {
            let valid = match REGION_PATTERN.as_ref() {
                Ok(re) => re.is_match(region),
                Err(_) => false,
            };
            if !valid {
                return Err(ConfigError::InvalidRegion(region.to_string()));
            }
        }

        for (service, url) in [
            ("cloudcontrol", &self.endpoints.cloudcontrol),
            ("s3", &self.endpoints.s3),
        ] {
            if let Some(url) = url
                && !(url.starts_with("http://") || url.starts_with("https://"))
            {
                return Err(ConfigError::InvalidEndpoint {
                    service: service.to_string(),
                    url: url.clone(),
                });
            }
        }
        Ok(())
    }

    /// Region, empty when unset. Only meaningful after [`Self::validate`].
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or_default()
    }

    pub fn default_tags(&self) -> KeyValueTags {
        KeyValueTags::from(self.default_tags.clone())
    }

    /// Policy for the provider's own retries of transient failures
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().max_retries(self.max_retries)
    }
}
