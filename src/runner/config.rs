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

//! Configuration for the pipeline runner.

use std::time::Duration;

/// Runtime parameters controlling how a [`PipelineRunner`] executes runs.
///
/// [`PipelineRunner`]: crate::runner::PipelineRunner
///
/// # Construction
///
/// ```rust
/// use std::time::Duration;
/// use aqueduct::RunnerConfig;
///
/// let config = RunnerConfig::builder()
///     .max_concurrent_tasks(8)
///     .task_timeout(Some(Duration::from_secs(600)))
///     .build();
/// assert_eq!(config.max_concurrent_tasks(), 8);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RunnerConfig {
    max_concurrent_tasks: usize,
    task_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            task_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl RunnerConfig {
    /// Create a configuration builder with default values.
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    /// Maximum number of tasks executing concurrently within one run.
    pub fn max_concurrent_tasks(&self) -> usize {
        self.max_concurrent_tasks
    }

    /// Maximum wall time for a single task attempt; `None` disables the
    /// timeout. A timed-out attempt counts as a failed attempt and is
    /// retryable under the task's policy.
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout
    }
}

/// Builder for [`RunnerConfig`].
#[derive(Debug, Default)]
pub struct RunnerConfigBuilder {
    config: Option<RunnerConfig>,
}

impl RunnerConfigBuilder {
    fn config(&mut self) -> &mut RunnerConfig {
        self.config.get_or_insert_with(RunnerConfig::default)
    }

    /// Maximum number of tasks executing concurrently within one run.
    /// Values below 1 are clamped to 1.
    pub fn max_concurrent_tasks(mut self, value: usize) -> Self {
        self.config().max_concurrent_tasks = value.max(1);
        self
    }

    /// Per-attempt timeout; `None` disables it.
    pub fn task_timeout(mut self, value: Option<Duration>) -> Self {
        self.config().task_timeout = value;
        self
    }

    /// Finish building the configuration.
    pub fn build(mut self) -> RunnerConfig {
        self.config.take().unwrap_or_default()
    }
}
