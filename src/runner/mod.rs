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

//! Pipeline Runner
//!
//! The runner drives one run of a pipeline to a terminal state:
//!
//! 1. Tasks execute level by level in topological order; tasks within a
//!    level have no dependency relationship and run concurrently, bounded by
//!    a semaphore. Correctness never depends on intra-level ordering.
//! 2. Before a task starts, its trigger rule is evaluated against the
//!    terminal outcomes of its dependencies; a declined task is recorded as
//!    skipped and its skip cascades to `AllSuccess` dependents.
//! 3. Each task runs an attempt loop under its retry policy. A failed
//!    attempt is recorded with its error detail; the inter-attempt delay is
//!    a scheduled re-submission raced against the run's abort signal.
//! 4. Successful attempts commit their staged status-channel writes; failed
//!    attempts leave no trace in the channel.
//!
//! Aborting a run stops scheduling further attempts and tasks but never
//! rewrites already-recorded attempt outcomes.

mod config;
mod run_state;

pub use config::{RunnerConfig, RunnerConfigBuilder};
pub use run_state::{AttemptOutcome, Run, RunStatus, TaskAttempt, TaskState};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::StatusChannel;
use crate::error::{OperationError, RunnerError};
use crate::pipeline::Pipeline;
use crate::task::{OperationContext, TaskDefinition, TaskOutcome};

/// Handle to an in-flight run, used to abort it.
///
/// Dropping the handle does not abort the run; it only forfeits the ability
/// to do so.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    abort: watch::Sender<bool>,
}

impl RunHandle {
    /// Identifier of the run this handle controls.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Stop scheduling further tasks and retry attempts.
    ///
    /// Attempts already executing are allowed to finish and their outcomes
    /// are recorded unchanged; the run terminates as failed.
    pub fn abort(&self) {
        let _ = self.abort.send(true);
    }
}

/// Executes runs of one validated pipeline.
///
/// The runner owns no global state: it holds the explicit [`Pipeline`]
/// value it was constructed with, and every run gets an independent status
/// channel and per-task state, so concurrent runs never observe each other.
///
/// # Examples
///
/// ```rust,ignore
/// let runner = PipelineRunner::new(pipeline, RunnerConfig::default())?;
/// let run = runner.trigger().await;
/// assert!(run.is_succeeded());
/// ```
pub struct PipelineRunner {
    pipeline: Arc<Pipeline>,
    config: RunnerConfig,
    levels: Vec<Vec<String>>,
}

impl PipelineRunner {
    /// Create a runner for the given pipeline.
    ///
    /// The pipeline is validated here, so structural defects fail before
    /// any run is created.
    pub fn new(pipeline: Pipeline, config: RunnerConfig) -> Result<Self, RunnerError> {
        let levels = pipeline.execution_levels()?;
        Ok(Self {
            pipeline: Arc::new(pipeline),
            config,
            levels,
        })
    }

    /// The pipeline this runner executes.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Trigger one run immediately and drive it to a terminal state.
    ///
    /// This is the manual-trigger entry point; the run's outcome is
    /// observable via the returned [`Run`]'s terminal status.
    pub async fn trigger(&self) -> Run {
        let (abort_tx, abort_rx) = watch::channel(false);
        let run = Self::execute_run(
            Arc::clone(&self.pipeline),
            self.levels.clone(),
            self.config.clone(),
            Uuid::new_v4(),
            abort_rx,
        )
        .await;
        drop(abort_tx);
        run
    }

    /// Start one run in the background, returning an abort handle and the
    /// join handle resolving to the terminal [`Run`].
    pub fn launch(&self) -> (RunHandle, JoinHandle<Run>) {
        let (abort_tx, abort_rx) = watch::channel(false);
        let run_id = Uuid::new_v4();
        let join = tokio::spawn(Self::execute_run(
            Arc::clone(&self.pipeline),
            self.levels.clone(),
            self.config.clone(),
            run_id,
            abort_rx,
        ));
        (
            RunHandle {
                run_id,
                abort: abort_tx,
            },
            join,
        )
    }

    async fn execute_run(
        pipeline: Arc<Pipeline>,
        levels: Vec<Vec<String>>,
        config: RunnerConfig,
        run_id: Uuid,
        abort_rx: watch::Receiver<bool>,
    ) -> Run {
        let mut run = Run::new(pipeline.name());
        run.id = run_id;
        run.status = RunStatus::Running;

        info!(
            run_id = %run_id,
            pipeline = %pipeline.name(),
            tasks = pipeline.len(),
            "run started"
        );

        let channel = Arc::new(StatusChannel::new(run_id));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks()));
        let mut outcomes: HashMap<String, TaskOutcome> = HashMap::new();
        let mut aborted = false;

        'levels: for level in &levels {
            if *abort_rx.borrow() {
                aborted = true;
                break 'levels;
            }

            let mut handles: Vec<(String, JoinHandle<TaskState>)> = Vec::new();

            for name in level {
                let Some(task) = pipeline.task(name) else {
                    continue;
                };

                // Every dependency sits in an earlier level, so its outcome
                // is terminal and recorded by now.
                let upstream_outcomes: Vec<TaskOutcome> = task
                    .dependencies()
                    .iter()
                    .filter_map(|dep| outcomes.get(dep))
                    .copied()
                    .collect();

                if !task.trigger_rule().admits(&upstream_outcomes) {
                    info!(
                        run_id = %run_id,
                        task = %name,
                        rule = ?task.trigger_rule(),
                        "task skipped by trigger rule"
                    );
                    run.tasks.insert(name.clone(), TaskState::skipped(name));
                    outcomes.insert(name.clone(), TaskOutcome::Skipped);
                    continue;
                }

                let handle = tokio::spawn(run_task(
                    task.clone(),
                    Arc::clone(&channel),
                    pipeline.name().to_string(),
                    outcomes.clone(),
                    config.task_timeout(),
                    Arc::clone(&semaphore),
                    abort_rx.clone(),
                ));
                handles.push((name.clone(), handle));
            }

            for (name, handle) in handles {
                let state = match handle.await {
                    Ok(state) => state,
                    Err(e) => {
                        error!(run_id = %run_id, task = %name, error = %e, "task panicked");
                        let now = Utc::now();
                        TaskState {
                            name: name.clone(),
                            attempts: vec![TaskAttempt {
                                number: 1,
                                started_at: now,
                                finished_at: now,
                                outcome: AttemptOutcome::Failed,
                                error_detail: Some(format!("task panicked: {e}")),
                            }],
                            outcome: TaskOutcome::Failed,
                        }
                    }
                };
                outcomes.insert(name.clone(), state.outcome);
                run.tasks.insert(name, state);
            }
        }

        run.finished_at = Some(Utc::now());
        let any_failed = run
            .tasks
            .values()
            .any(|t| t.outcome == TaskOutcome::Failed);
        run.status = if aborted || any_failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        if aborted {
            run.detail = Some("run aborted before all tasks were scheduled".to_string());
            warn!(run_id = %run_id, "run aborted");
        }

        info!(
            run_id = %run_id,
            pipeline = %pipeline.name(),
            status = ?run.status,
            "run finished"
        );
        run
    }
}

/// Drive one task through its attempt loop to a terminal outcome.
async fn run_task(
    task: TaskDefinition,
    channel: Arc<StatusChannel>,
    pipeline_name: String,
    upstream: HashMap<String, TaskOutcome>,
    timeout: Option<Duration>,
    semaphore: Arc<Semaphore>,
    mut abort_rx: watch::Receiver<bool>,
) -> TaskState {
    let run_id = channel.run_id();

    // Hold one concurrency slot for the task's whole attempt loop.
    let _permit = match Arc::clone(&semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            let now = Utc::now();
            return TaskState {
                name: task.name().to_string(),
                attempts: vec![TaskAttempt {
                    number: 1,
                    started_at: now,
                    finished_at: now,
                    outcome: AttemptOutcome::Failed,
                    error_detail: Some("executor semaphore closed".to_string()),
                }],
                outcome: TaskOutcome::Failed,
            };
        }
    };

    let policy = task.retry_policy().clone();
    let mut attempts: Vec<TaskAttempt> = Vec::new();
    let mut attempt: u32 = 1;

    let outcome = loop {
        let started_at = Utc::now();
        debug!(
            run_id = %run_id,
            task = %task.name(),
            attempt,
            "Task state change: Ready -> Running"
        );

        let mut ctx = OperationContext::new(
            Arc::clone(&channel),
            pipeline_name.clone(),
            task.name().to_string(),
            attempt,
            upstream.clone(),
        );

        let operation = task.operation();
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, operation.execute(&mut ctx)).await {
                Ok(result) => result,
                Err(_) => Err(OperationError::new(format!(
                    "attempt timed out after {limit:?}"
                ))),
            },
            None => operation.execute(&mut ctx).await,
        };

        // Staged channel writes land only when the attempt succeeded; a
        // commit rejection is a wiring bug and fails the attempt loudly.
        let result = match result {
            Ok(()) => channel.commit(ctx.into_staged()).map_err(|e| {
                error!(
                    run_id = %run_id,
                    task = %task.name(),
                    error = %e,
                    "status channel rejected commit"
                );
                OperationError::new(format!("status channel rejected commit: {e}"))
            }),
            Err(e) => Err(e),
        };

        let finished_at = Utc::now();
        match result {
            Ok(()) => {
                attempts.push(TaskAttempt {
                    number: attempt,
                    started_at,
                    finished_at,
                    outcome: AttemptOutcome::Succeeded,
                    error_detail: None,
                });
                info!(
                    run_id = %run_id,
                    task = %task.name(),
                    attempt,
                    "Task state change: Running -> Completed"
                );
                break TaskOutcome::Succeeded;
            }
            Err(e) => {
                attempts.push(TaskAttempt {
                    number: attempt,
                    started_at,
                    finished_at,
                    outcome: AttemptOutcome::Failed,
                    error_detail: Some(e.to_string()),
                });

                if policy.should_retry(attempt) {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        run_id = %run_id,
                        task = %task.name(),
                        attempt,
                        delay = ?delay,
                        error = %e,
                        "task attempt failed, retry scheduled"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            attempt += 1;
                        }
                        _ = wait_abort(&mut abort_rx) => {
                            warn!(
                                run_id = %run_id,
                                task = %task.name(),
                                "pending retry cancelled by abort"
                            );
                            break TaskOutcome::Failed;
                        }
                    }
                } else {
                    error!(
                        run_id = %run_id,
                        task = %task.name(),
                        attempts = attempt,
                        error = %e,
                        "Task state change: Running -> Failed (retries exhausted)"
                    );
                    break TaskOutcome::Failed;
                }
            }
        }
    };

    TaskState {
        name: task.name().to_string(),
        attempts,
        outcome,
    }
}

/// Resolve when the run is aborted; never resolves if no abort can arrive.
async fn wait_abort(abort_rx: &mut watch::Receiver<bool>) {
    loop {
        if *abort_rx.borrow() {
            return;
        }
        if abort_rx.changed().await.is_err() {
            // Every handle is gone; an abort can no longer be requested.
            std::future::pending::<()>().await;
        }
    }
}
