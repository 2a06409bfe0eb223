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

//! Status-channel scoping across concurrent runs: every run gets its own
//! channel, so identical keys published by overlapping runs never collide.

use std::sync::Arc;

use aqueduct::{PipelineRunner, RunnerConfig};

use crate::helpers::{fast_retry, two_task_pipeline, FlakyOperation, RecordingTransport};

#[tokio::test]
async fn concurrent_runs_do_not_share_status_keys() {
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

    // Both runs publish the same "status" key; with run-scoped channels
    // neither trips the write-once rule.
    let (handle_a, join_a) = runner.launch();
    let (handle_b, join_b) = runner.launch();
    assert_ne!(handle_a.run_id(), handle_b.run_id());

    let (run_a, run_b) = tokio::join!(join_a, join_b);
    let run_a = run_a.unwrap();
    let run_b = run_b.unwrap();

    assert!(run_a.is_succeeded());
    assert!(run_b.is_succeeded());
    assert_ne!(run_a.id, run_b.id);

    // One notification per run.
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn sequential_runs_start_from_a_clean_channel() {
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

    let first = runner.trigger().await;
    let second = runner.trigger().await;

    assert!(first.is_succeeded());
    assert!(second.is_succeeded());
    assert_eq!(transport.sent().len(), 2);
}
