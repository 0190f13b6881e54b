//! Handler configuration.
//!
//! Budgets and delays are per resource type. A JSON file may override the
//! defaults each resource model ships with:
//!
//! ```json
//! { "resourceTypes": { "vm": { "maxRetryBudget": 120, "pollDelaySeconds": 5 } } }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Read(String, std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{resource_type}: {reason}")]
    Invalid {
        resource_type: String,
        reason: String,
    },
}

/// Stabilization budgets for one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilizationConfig {
    /// Status polls before the operation is declared not stabilized.
    pub max_retry_budget: u32,
    /// Corrective re-issues allowed after timeout-correctable failures.
    pub max_timeout_retries: u32,
    pub poll_delay_seconds: u32,
    /// Consecutive not-found reads required before a delete counts as done.
    #[serde(default = "default_absent_confirmations")]
    pub absent_confirmations: u32,
}

fn default_absent_confirmations() -> u32 {
    1
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            max_retry_budget: 60,
            max_timeout_retries: 0,
            poll_delay_seconds: 15,
            absent_confirmations: 1,
        }
    }
}

impl StabilizationConfig {
    pub fn validate(&self, resource_type: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            resource_type: resource_type.to_string(),
            reason: reason.to_string(),
        };
        if self.max_retry_budget == 0 {
            return Err(invalid("maxRetryBudget must be at least 1"));
        }
        if self.absent_confirmations == 0 {
            return Err(invalid("absentConfirmations must be at least 1"));
        }
        Ok(())
    }
}

/// Partial override read from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilizationOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_budget: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_delay_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absent_confirmations: Option<u32>,
}

impl StabilizationOverride {
    pub fn apply(&self, base: StabilizationConfig) -> StabilizationConfig {
        StabilizationConfig {
            max_retry_budget: self.max_retry_budget.unwrap_or(base.max_retry_budget),
            max_timeout_retries: self.max_timeout_retries.unwrap_or(base.max_timeout_retries),
            poll_delay_seconds: self.poll_delay_seconds.unwrap_or(base.poll_delay_seconds),
            absent_confirmations: self
                .absent_confirmations
                .unwrap_or(base.absent_confirmations),
        }
    }
}

/// Handler configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerConfig {
    #[serde(default)]
    pub resource_types: HashMap<String, StabilizationOverride>,
}

impl HandlerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }

    /// Effective config for a resource type, layered over its defaults.
    pub fn resolve(
        &self,
        resource_type: &str,
        defaults: StabilizationConfig,
    ) -> Result<StabilizationConfig, ConfigError> {
        let config = match self.resource_types.get(resource_type) {
            Some(o) => o.apply(defaults),
            None => defaults,
        };
        config.validate(resource_type)?;
        Ok(config)
    }
}
