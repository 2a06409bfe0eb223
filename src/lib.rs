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

//! # Aqueduct
//!
//! Aqueduct is an execution core for scheduled automation pipelines. A
//! pipeline is an explicit value: a named set of tasks connected by a
//! dependency graph, validated at registration time (unknown dependencies,
//! duplicate names, and cycles are all rejected before a run exists).
//!
//! ## Core pieces
//!
//! - [`Pipeline`] / [`PipelineBuilder`]: the validated dependency graph of
//!   [`TaskDefinition`]s
//! - [`Operation`]: the async work-unit trait tasks implement;
//!   [`ScriptOperation`] runs an external command, [`StatusNotifier`]
//!   dispatches an outcome-branching notification
//! - [`StatusChannel`]: run-scoped, write-once key/value channel tasks use
//!   to pass status downstream
//! - [`RetryPolicy`] / [`BackoffStrategy`]: per-task attempt budget and
//!   delay schedule
//! - [`TriggerRule`]: when a task runs relative to its dependencies'
//!   outcomes (`AllSuccess` skips after upstream failure, `AllDone` always
//!   runs)
//! - [`PipelineRunner`]: drives a run level by level to a terminal [`Run`]
//! - [`Schedule`] and [`PipelineConfig`]: cron/manual triggering and the
//!   TOML operator surface
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use aqueduct::{
//!     LogTransport, Pipeline, PipelineRunner, RunnerConfig, ScriptOperation,
//!     StatusNotifier, TaskDefinition, TriggerRule,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::builder("nightly-report")
//!     .add_task(TaskDefinition::new(
//!         "run_python_script",
//!         ScriptOperation::new(["python3", "/opt/scripts/report.py"]),
//!     ))?
//!     .add_task(
//!         TaskDefinition::new(
//!             "email_notification",
//!             StatusNotifier::new(
//!                 "run_python_script",
//!                 "ops@example.com",
//!                 Arc::new(LogTransport),
//!             ),
//!         )
//!         .depends_on(["run_python_script"])
//!         .with_trigger_rule(TriggerRule::AllDone),
//!     )?
//!     .build()?;
//!
//! let runner = PipelineRunner::new(pipeline, RunnerConfig::default())?;
//! let run = runner.trigger().await;
//! println!("run {} finished: {:?}", run.id, run.status);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod runner;
pub mod schedule;
pub mod script;
pub mod task;
pub mod trigger;

pub use channel::StatusChannel;
pub use config::{BackoffKind, PipelineConfig};
pub use error::{
    ChannelError, ConfigError, DispatchError, GraphError, OperationError, RunnerError,
};
pub use notify::{LogTransport, Notification, NotificationTransport, StatusNotifier};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use retry::{BackoffStrategy, RetryPolicy, RetryPolicyBuilder};
pub use runner::{
    AttemptOutcome, PipelineRunner, Run, RunHandle, RunStatus, RunnerConfig,
    RunnerConfigBuilder, TaskAttempt, TaskState,
};
pub use schedule::{CronSchedule, Schedule};
pub use script::ScriptOperation;
pub use task::{Operation, OperationContext, TaskDefinition, TaskOutcome};
pub use trigger::TriggerRule;

/// Initialize tracing for tests. Safe to call from every test; only the
/// first call installs the subscriber.
#[doc(hidden)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("aqueduct=debug")),
        )
        .with_test_writer()
        .try_init();
}
