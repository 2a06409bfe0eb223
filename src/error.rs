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

//! Error types for every component of the orchestration core.
//!
//! Each component owns its own error enum so that callers can match on the
//! failures they actually care about:
//!
//! - [`GraphError`]: static pipeline definition defects, raised at
//!   registration time before any run exists
//! - [`OperationError`]: a work unit's external operation failed; retryable
//!   up to the task's retry policy limit
//! - [`ChannelError`]: a missing or duplicate status-channel key, which is a
//!   core-logic bug and is surfaced loudly rather than defaulted
//! - [`DispatchError`]: notification transport failure; reported but never
//!   retried and never changes a run's outcome
//! - [`RunnerError`]: run-level failures (retry exhaustion, aborts)
//! - [`ConfigError`]: operator configuration that cannot be loaded or is
//!   internally inconsistent

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while defining or validating a pipeline graph.
///
/// All variants describe static configuration defects. They are produced at
/// registration time, which guarantees that no run is ever created from a
/// structurally invalid pipeline.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A task with this name is already registered in the pipeline.
    #[error("duplicate task name: {0}")]
    DuplicateTask(String),

    /// Adding the task's dependency edges would close a cycle.
    #[error("cyclic dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency {
        /// The tasks participating in the cycle, in traversal order.
        cycle: Vec<String>,
    },

    /// A declared dependency names a task that does not exist.
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    /// The pipeline contains no tasks at all.
    #[error("pipeline contains no tasks")]
    EmptyPipeline,
}

/// Failure of a work unit's external operation.
///
/// Raised (or returned) errors from the operation boundary are converted
/// into this type exactly once, so the retry policy only ever has to
/// interpret a single failure shape. Operation errors are retryable by
/// default; only exhaustion of the retry budget is fatal to a task.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct OperationError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl OperationError {
    /// Create an operation error from a plain message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation error that wraps an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The human-readable failure message recorded as attempt error detail.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ChannelError> for OperationError {
    /// Lets operations propagate channel failures with `?`; the channel
    /// error stays attached as the source for diagnostics.
    fn from(e: ChannelError) -> Self {
        OperationError::with_source("status channel rejected operation", e)
    }
}

/// Errors raised by the run-scoped status channel.
///
/// The channel is strict: a key is written at most once per run, and reading
/// a key that was never published is an error. Both conditions indicate a
/// bug in task wiring (double execution, or a read that is not ordered
/// behind the producing task), so neither is silently defaulted.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The key already has a value in this run.
    #[error("status key '{key}' already published in run {run_id}")]
    DuplicateKey { key: String, run_id: Uuid },

    /// The key was never published in this run.
    #[error("status key '{key}' was never published in run {run_id}")]
    KeyNotFound { key: String, run_id: Uuid },

    /// The value could not be serialized for the channel.
    #[error("failed to serialize status value for key '{key}'")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Notification transport failure.
///
/// Dispatch is best-effort: a failed send is logged and recorded, but it is
/// not retried and it never alters the run's recorded outcome.
#[derive(Debug, Error)]
#[error("notification dispatch failed: {0}")]
pub struct DispatchError(pub String);

/// Run-level execution errors.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A task failed on every attempt allowed by its retry policy.
    #[error("task '{task}' permanently failed after {attempts} attempt(s)")]
    RetryExhausted { task: String, attempts: u32 },

    /// The run was aborted before it could finish scheduling tasks.
    #[error("run {run_id} was aborted")]
    Aborted { run_id: Uuid },

    /// The pipeline definition was invalid.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Errors loading or validating operator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected schema.
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// `retries` must allow at least one attempt.
    #[error("retries must be at least 1, got {0}")]
    InvalidRetries(u32),

    /// The configured command is empty.
    #[error("command must name a program to run")]
    EmptyCommand,
}
