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

//! The notifier fires exactly once per run, on every path to a terminal
//! work-unit outcome, with the outcome-specific message.

use std::sync::Arc;

use aqueduct::{PipelineRunner, RunnerConfig};

use crate::helpers::{
    always_fails, fast_retry, two_task_pipeline, FlakyOperation, RecordingTransport, RECIPIENT,
};

#[tokio::test]
async fn success_sends_the_success_message_once() {
    aqueduct::init_test_logging();

    let (work, _calls) = FlakyOperation::new(0);
    let transport = Arc::new(RecordingTransport::default());
    let pipeline = two_task_pipeline(
        "my_python_operator_dag",
        work,
        fast_retry(1),
        Arc::clone(&transport),
    );
    let runner = PipelineRunner::new(pipeline, RunnerConfig::default()).unwrap();

    runner.trigger().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, RECIPIENT);
    assert_eq!(
        sent[0].subject,
        "Task Execution Status: my_python_operator_dag"
    );
    assert_eq!(sent[0].body, "Task run_python_script is successful.");
}

#[tokio::test]
async fn failure_sends_the_failure_message_once() {
    aqueduct::init_test_logging();

    let (work, _calls) = always_fails();
    let transport = Arc::new(RecordingTransport::default());
    let pipeline = two_task_pipeline(
        "my_python_operator_dag",
        work,
        fast_retry(1),
        Arc::clone(&transport),
    );
    let runner = PipelineRunner::new(pipeline, RunnerConfig::default()).unwrap();

    runner.trigger().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].subject,
        "Task Execution Status: my_python_operator_dag"
    );
    assert_eq!(sent[0].body, "Task run_python_script has failed.");
}

#[tokio::test]
async fn exhausted_retries_still_notify_failure_exactly_once() {
    aqueduct::init_test_logging();

    let (work, _calls) = always_fails();
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
    // Failed attempts never commit to the status channel, so the notifier
    // resolves the outcome from the task's recorded state.
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "Task run_python_script has failed.");
}

#[tokio::test]
async fn recovered_run_notifies_success() {
    aqueduct::init_test_logging();

    let (work, _calls) = FlakyOperation::new(2);
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
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "Task run_python_script is successful.");
}
