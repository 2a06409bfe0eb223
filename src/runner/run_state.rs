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

//! Per-run execution state: the run record, per-task state, and attempts.
//!
//! One [`Run`] is created per trigger. Each task the run schedules gets an
//! independent [`TaskState`] holding its recorded [`TaskAttempt`]s; attempt
//! numbers are monotonically increasing from 1, and a task's final outcome
//! is the outcome of its last attempt (failure once the retry limit is
//! exhausted). Recorded attempts are never rewritten, not even by an abort.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RunnerError;
use crate::task::TaskOutcome;

/// Terminal (or in-flight) state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but not yet executing.
    Pending,
    /// Tasks are being scheduled and executed.
    Running,
    /// Every scheduled task succeeded or was skipped by its trigger rule
    /// without an upstream failure.
    Succeeded,
    /// At least one task permanently failed, or the run was aborted.
    Failed,
}

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// One execution of a task within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAttempt {
    /// 1-based attempt number, monotonically increasing per task per run.
    pub number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    /// Failure message, present on failed attempts.
    pub error_detail: Option<String>,
}

/// Recorded state of one task within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub name: String,
    /// Every attempt made, in order. Empty for skipped tasks.
    pub attempts: Vec<TaskAttempt>,
    /// Final outcome once the task is terminal.
    pub outcome: TaskOutcome,
}

impl TaskState {
    /// State for a task whose trigger rule declined to run it.
    pub(crate) fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempts: Vec::new(),
            outcome: TaskOutcome::Skipped,
        }
    }

    /// Error detail of the last failed attempt, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.attempts
            .iter()
            .rev()
            .find_map(|a| a.error_detail.as_deref())
    }
}

/// One execution instance of a pipeline.
///
/// Returned by the runner once the run is terminal; the external runner's
/// retention policy decides how long it lives after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub pipeline_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// State per scheduled task. Tasks the abort prevented from scheduling
    /// are absent.
    pub tasks: HashMap<String, TaskState>,
    /// Human-readable reason when the run failed without a failing task
    /// (currently only aborts).
    pub detail: Option<String>,
}

impl Run {
    pub(crate) fn new(pipeline_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_name: pipeline_name.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Pending,
            tasks: HashMap::new(),
            detail: None,
        }
    }

    /// Recorded state for a task, if it was scheduled or skipped.
    pub fn task(&self, name: &str) -> Option<&TaskState> {
        self.tasks.get(name)
    }

    /// Number of attempts recorded for a task.
    pub fn attempt_count(&self, name: &str) -> usize {
        self.task(name).map(|t| t.attempts.len()).unwrap_or(0)
    }

    /// Whether the run reached a failed terminal state.
    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    /// The dominant failure of a failed run.
    ///
    /// `None` for successful or still-running runs. A run with a permanently
    /// failed task reports that task's retry exhaustion; a run that failed
    /// without one was aborted.
    pub fn failure(&self) -> Option<RunnerError> {
        if self.status != RunStatus::Failed {
            return None;
        }
        match self
            .tasks
            .values()
            .find(|t| t.outcome == TaskOutcome::Failed)
        {
            Some(state) => Some(RunnerError::RetryExhausted {
                task: state.name.clone(),
                attempts: state.attempts.len() as u32,
            }),
            None => Some(RunnerError::Aborted { run_id: self.id }),
        }
    }

    /// Whether the run reached a successful terminal state.
    pub fn is_succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}
