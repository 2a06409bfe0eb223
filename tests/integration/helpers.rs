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

//! Shared fixtures for the integration tests: canned operations, a
//! recording notification transport, and the standard two-task pipeline
//! shape (work unit plus all-done notifier).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use aqueduct::{
    BackoffStrategy, DispatchError, Notification, NotificationTransport, Operation,
    OperationContext, OperationError, Pipeline, RetryPolicy, StatusNotifier, TaskDefinition,
    TriggerRule,
};

pub const WORK_TASK: &str = "run_python_script";
pub const NOTIFY_TASK: &str = "email_notification";
pub const RECIPIENT: &str = "ops@example.com";

/// Fails its first `fail_times` attempts, then succeeds and publishes a
/// success status.
pub struct FlakyOperation {
    fail_times: u32,
    calls: Arc<AtomicU32>,
}

impl FlakyOperation {
    pub fn new(fail_times: u32) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                fail_times,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl Operation for FlakyOperation {
    async fn execute(&self, ctx: &mut OperationContext) -> Result<(), OperationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_times {
            Err(OperationError::new(format!(
                "synthetic failure on call {call}"
            )))
        } else {
            ctx.publish("status", json!({ "status": "success" }))?;
            Ok(())
        }
    }
}

/// Fails every attempt; never publishes anything.
pub fn always_fails() -> (FlakyOperation, Arc<AtomicU32>) {
    FlakyOperation::new(u32::MAX)
}

/// Transport that records every notification it is asked to deliver.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Retry policy with delays short enough for tests.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .initial_delay(Duration::from_millis(5))
        .backoff(BackoffStrategy::Fixed)
        .build()
}

/// The standard two-task pipeline: the given work operation under the given
/// retry policy, watched by an all-done notifier delivering through the
/// given transport.
pub fn two_task_pipeline(
    pipeline_name: &str,
    work: impl Operation + 'static,
    retry: RetryPolicy,
    transport: Arc<RecordingTransport>,
) -> Pipeline {
    Pipeline::builder(pipeline_name)
        .add_task(TaskDefinition::new(WORK_TASK, work).with_retry_policy(retry))
        .expect("work task registers")
        .add_task(
            TaskDefinition::new(
                NOTIFY_TASK,
                StatusNotifier::new(WORK_TASK, RECIPIENT, transport),
            )
            .depends_on([WORK_TASK])
            .with_trigger_rule(TriggerRule::AllDone),
        )
        .expect("notify task registers")
        .build()
        .expect("pipeline validates")
}
