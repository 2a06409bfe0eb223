/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Operator-facing pipeline configuration.
//!
//! A [`PipelineConfig`] is the TOML record the operator supplies at
//! pipeline-registration time. It carries the recognized options — schedule,
//! retry budget and delay, notification recipient, the external command to
//! run — and converts them into the core's typed policies. Unknown fields
//! are rejected so a typo fails loudly at load time instead of silently
//! using a default.
//!
//! ```toml
//! pipeline_name = "my_python_operator_dag"
//! schedule = "0 6 * * *"          # omit or "manual" for manual-only
//! retries = 2
//! retry_delay_secs = 300
//! backoff = "fixed"               # or "exponential"
//! notify_recipient = "ops@example.com"
//! command = ["python", "/opt/pipelines/workflow_one.py"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::{BackoffStrategy, RetryPolicy};
use crate::schedule::Schedule;

fn default_retries() -> u32 {
    1
}

fn default_retry_delay_secs() -> u64 {
    300
}

/// Backoff strategy as spelled in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Constant delay between attempts.
    #[default]
    Fixed,
    /// Delay doubles after each failed attempt.
    Exponential,
}

impl From<BackoffKind> for BackoffStrategy {
    fn from(kind: BackoffKind) -> Self {
        match kind {
            BackoffKind::Fixed => BackoffStrategy::Fixed,
            BackoffKind::Exponential => BackoffStrategy::Exponential { base: 2.0 },
        }
    }
}

/// Recognized options supplied by the operator at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline name; used in notification subject lines.
    pub pipeline_name: String,

    /// Cron-like expression, or absent/"manual" for manual-only triggering.
    #[serde(default)]
    pub schedule: Option<String>,

    /// Upper bound on attempts per task (at least 1).
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Wait between attempts, in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// How the wait scales across attempts.
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Destination address for the outcome notification.
    pub notify_recipient: String,

    /// The external command the work unit runs: program followed by args.
    pub command: Vec<String>,
}

impl PipelineConfig {
    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: "<inline>".into(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retries < 1 {
            return Err(ConfigError::InvalidRetries(self.retries));
        }
        if self.command.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        // Fail on a bad cron expression now, not at the first trigger.
        self.schedule()?;
        Ok(())
    }

    /// The parsed schedule.
    pub fn schedule(&self) -> Result<Schedule, ConfigError> {
        Schedule::parse(self.schedule.as_deref())
    }

    /// The retry policy the work unit task runs under.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.retries)
            .initial_delay(Duration::from_secs(self.retry_delay_secs))
            .backoff(self.backoff.into())
            .build()
    }
}
