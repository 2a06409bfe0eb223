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

//! Tasks and the operation boundary.
//!
//! A task is a named node in the pipeline graph; its work is an
//! [`Operation`], an opaque external unit of work invoked with a run-scoped
//! [`OperationContext`]. The operation reports success by returning `Ok(())`
//! and failure by returning an [`OperationError`]; nothing else is assumed
//! about its internals (file I/O, network calls, database writes are all
//! opaque to the core).
//!
//! Failure signaling is an explicit result type rather than an exception
//! escaping the boundary: whatever goes wrong inside an operation is
//! converted into `OperationError` exactly once, and the retry policy
//! interprets that single shape.
//!
//! # Attempt staging
//!
//! `OperationContext::publish` does not write to the status channel
//! directly. Writes are staged inside the context and committed by the
//! runner only when the attempt succeeds, so a failed attempt leaves no
//! trace in the channel and a later retry cannot trip the channel's
//! duplicate-key check.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::channel::StatusChannel;
use crate::error::{ChannelError, OperationError};
use crate::retry::RetryPolicy;
use crate::trigger::TriggerRule;

/// Final recorded outcome of a task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task's last attempt succeeded.
    Succeeded,
    /// Every attempt up to the retry limit failed.
    Failed,
    /// The task's trigger rule declined to run it.
    Skipped,
}

/// A single external unit of work invoked by the orchestrator.
///
/// Implementations report success or failure through the return value; the
/// retry policy and trigger rules handle everything downstream of that.
///
/// # Examples
///
/// ```rust
/// use aqueduct::{Operation, OperationContext, OperationError};
/// use async_trait::async_trait;
///
/// struct SayHello;
///
/// #[async_trait]
/// impl Operation for SayHello {
///     async fn execute(&self, ctx: &mut OperationContext) -> Result<(), OperationError> {
///         ctx.publish("status", "success")?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Operation: Send + Sync {
    /// Run the operation once.
    ///
    /// A normal return is a successful attempt; an error is a failed attempt
    /// whose message is recorded as the attempt's error detail.
    async fn execute(&self, ctx: &mut OperationContext) -> Result<(), OperationError>;
}

/// Run-scoped context handed to an operation for a single attempt.
///
/// The context exposes the status channel (reads see committed values,
/// writes are staged until the attempt succeeds), the identity of the run
/// and attempt, and the recorded outcomes of upstream tasks.
pub struct OperationContext {
    channel: Arc<StatusChannel>,
    staged: Vec<(String, Value)>,
    pipeline_name: String,
    task_name: String,
    attempt: u32,
    upstream: HashMap<String, TaskOutcome>,
}

impl OperationContext {
    pub(crate) fn new(
        channel: Arc<StatusChannel>,
        pipeline_name: String,
        task_name: String,
        attempt: u32,
        upstream: HashMap<String, TaskOutcome>,
    ) -> Self {
        Self {
            channel,
            staged: Vec::new(),
            pipeline_name,
            task_name,
            attempt,
            upstream,
        }
    }

    /// Identifier of the run this attempt belongs to.
    pub fn run_id(&self) -> Uuid {
        self.channel.run_id()
    }

    /// Name of the pipeline, as used in notification subject lines.
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Name of the task being attempted.
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// 1-based number of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Stage a value for publication under `key`.
    ///
    /// The write becomes visible to downstream tasks only once this attempt
    /// succeeds. Duplicates are rejected eagerly against both the committed
    /// channel contents and this attempt's own staged writes; the commit
    /// re-checks atomically.
    pub fn publish<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), ChannelError> {
        if self.channel.contains(key) || self.staged.iter().any(|(k, _)| k == key) {
            return Err(ChannelError::DuplicateKey {
                key: key.to_string(),
                run_id: self.channel.run_id(),
            });
        }

        let value = serde_json::to_value(value).map_err(|source| ChannelError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.staged.push((key.to_string(), value));
        Ok(())
    }

    /// Read a committed value from the status channel.
    ///
    /// Fails with [`ChannelError::KeyNotFound`] if the key was never
    /// published in this run. Staged writes of the current attempt are not
    /// readable; ordering between tasks comes from dependency edges, not
    /// from reads within an attempt.
    pub fn read(&self, key: &str) -> Result<Value, ChannelError> {
        self.channel.read(key)
    }

    /// Final recorded outcome of an upstream task, if it has one.
    ///
    /// Only tasks that reached a terminal state before this attempt started
    /// are visible; independent tasks running concurrently are not.
    pub fn upstream_outcome(&self, task: &str) -> Option<TaskOutcome> {
        self.upstream.get(task).copied()
    }

    pub(crate) fn into_staged(self) -> Vec<(String, Value)> {
        self.staged
    }
}

/// Tagged configuration record for one node of the pipeline graph.
///
/// Definitions are validated at registration time and immutable thereafter;
/// each run instantiates independent per-task state.
///
/// # Examples
///
/// ```rust,ignore
/// let task = TaskDefinition::new("run_python_script", ScriptOperation::new(command))
///     .with_retry_policy(RetryPolicy::builder().max_attempts(2).build());
///
/// let notifier = TaskDefinition::new("email_notification", notifier_op)
///     .depends_on(["run_python_script"])
///     .with_trigger_rule(TriggerRule::AllDone);
/// ```
#[derive(Clone)]
pub struct TaskDefinition {
    name: String,
    operation: Arc<dyn Operation>,
    depends_on: Vec<String>,
    trigger_rule: TriggerRule,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("trigger_rule", &self.trigger_rule)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl TaskDefinition {
    /// Create a definition with no dependencies, the default trigger rule
    /// (`AllSuccess`) and the default retry policy (one attempt).
    pub fn new(name: impl Into<String>, operation: impl Operation + 'static) -> Self {
        Self {
            name: name.into(),
            operation: Arc::new(operation),
            depends_on: Vec::new(),
            trigger_rule: TriggerRule::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Declare the tasks this one depends on.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the trigger rule.
    pub fn with_trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.trigger_rule = rule;
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// The task's unique name within the pipeline.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The operation invoked when this task runs.
    pub fn operation(&self) -> Arc<dyn Operation> {
        Arc::clone(&self.operation)
    }

    /// Names of the tasks this one depends on.
    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    /// The trigger rule governing whether this task runs.
    pub fn trigger_rule(&self) -> TriggerRule {
        self.trigger_rule
    }

    /// The retry policy applied to failed attempts.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}
