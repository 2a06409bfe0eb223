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

//! End-to-end run scenarios: success, hard failure, and recovery after a
//! failed attempt, each checked against recorded attempt history and run
//! status.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use aqueduct::{PipelineRunner, RunnerConfig, TaskOutcome};

use crate::helpers::{
    always_fails, fast_retry, two_task_pipeline, FlakyOperation, RecordingTransport, NOTIFY_TASK,
    WORK_TASK,
};

#[tokio::test]
async fn clean_success_records_one_attempt() {
    aqueduct::init_test_logging();

    let (work, calls) = FlakyOperation::new(0);
    let transport = Arc::new(RecordingTransport::default());
    let pipeline = two_task_pipeline(
        "my_python_operator_dag",
        work,
        fast_retry(2),
        Arc::clone(&transport),
    );
    let runner = PipelineRunner::new(pipeline, RunnerConfig::default()).unwrap();

    let run = runner.trigger().await;

    assert!(run.is_succeeded());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.attempt_count(WORK_TASK), 1);
    assert_eq!(run.task(WORK_TASK).unwrap().outcome, TaskOutcome::Succeeded);
    assert_eq!(
        run.task(NOTIFY_TASK).unwrap().outcome,
        TaskOutcome::Succeeded
    );
}

#[tokio::test]
async fn single_attempt_failure_fails_the_run() {
    aqueduct::init_test_logging();

    let (work, calls) = always_fails();
    let transport = Arc::new(RecordingTransport::default());
    let pipeline = two_task_pipeline(
        "my_python_operator_dag",
        work,
        fast_retry(1),
        Arc::clone(&transport),
    );
    let runner = PipelineRunner::new(pipeline, RunnerConfig::default()).unwrap();

    let run = runner.trigger().await;

    assert!(run.is_failed());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.attempt_count(WORK_TASK), 1);
    assert_eq!(run.task(WORK_TASK).unwrap().outcome, TaskOutcome::Failed);
    assert!(run
        .task(WORK_TASK)
        .unwrap()
        .last_error()
        .unwrap()
        .contains("synthetic failure"));
}

#[tokio::test]
async fn retry_budget_is_spent_exactly() {
    aqueduct::init_test_logging();

    let (work, calls) = always_fails();
    let transport = Arc::new(RecordingTransport::default());
    let pipeline = two_task_pipeline(
        "my_python_operator_dag",
        work,
        fast_retry(3),
        Arc::clone(&transport),
    );
    let runner = PipelineRunner::new(pipeline, RunnerConfig::default()).unwrap();

    let run = runner.trigger().await;

    assert!(run.is_failed());
    // Exactly max_attempts executions, no more.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(run.attempt_count(WORK_TASK), 3);

    // Attempt numbers are 1-based and monotonically increasing.
    let numbers: Vec<u32> = run
        .task(WORK_TASK)
        .unwrap()
        .attempts
        .iter()
        .map(|a| a.number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test]
async fn recovery_after_failed_attempt_succeeds_the_run() {
    aqueduct::init_test_logging();

    let (work, calls) = FlakyOperation::new(1);
    let transport = Arc::new(RecordingTransport::default());
    let pipeline = two_task_pipeline(
        "my_python_operator_dag",
        work,
        fast_retry(3),
        Arc::clone(&transport),
    );
    let runner = PipelineRunner::new(pipeline, RunnerConfig::default()).unwrap();

    let run = runner.trigger().await;

    assert!(run.is_succeeded());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(run.attempt_count(WORK_TASK), 2);

    // The failed first attempt stays on the record next to the success.
    let attempts = &run.task(WORK_TASK).unwrap().attempts;
    assert!(attempts[0].error_detail.is_some());
    assert!(attempts[1].error_detail.is_none());
    assert_eq!(run.task(WORK_TASK).unwrap().outcome, TaskOutcome::Succeeded);
}
