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

//! Outcome notification.
//!
//! The [`StatusNotifier`] is an [`Operation`] that consumes the final status
//! recorded for the watched task and dispatches exactly one outcome-specific
//! message per run. It is meant to be declared with
//! [`TriggerRule::AllDone`](crate::TriggerRule::AllDone) against the work
//! unit task so it fires whether that task succeeded, failed, or exhausted
//! its retries.
//!
//! Actual delivery (SMTP or equivalent) is an external collaborator behind
//! the [`NotificationTransport`] trait; the core only requires a single
//! `send` call. Dispatch failure is reported, not retried, and never alters
//! the run's recorded outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info};

use crate::error::{ChannelError, DispatchError, OperationError};
use crate::task::{Operation, OperationContext, TaskOutcome};

/// A single outcome message. Derived per run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Destination address.
    pub recipient: String,
    /// Subject line, branded with the pipeline name.
    pub subject: String,
    /// Outcome-specific body.
    pub body: String,
}

/// Message delivery boundary.
///
/// Implementations wrap whatever transport the deployment uses; the core
/// never assumes more than this one call.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// Transport that writes notifications to the log stream.
///
/// Useful as a stand-in when no mail relay is configured; the message is
/// still observable, just not delivered anywhere.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            body = %notification.body,
            "notification dispatched to log"
        );
        Ok(())
    }
}

/// Operation that sends the per-run outcome notification.
///
/// The notifier reads the status value the watched task published to the
/// status channel. If the task never published anything (it crashed before
/// writing, or failed every attempt so its staged writes were discarded),
/// the notifier falls back to the task's recorded outcome in the run state.
///
/// The outcome maps onto the message as:
///
/// - success: subject `Task Execution Status: <pipeline_name>`, body
///   `Task <task_name> is successful.`
/// - failure: same subject, body `Task <task_name> has failed.`
pub struct StatusNotifier {
    watch_task: String,
    status_key: String,
    recipient: String,
    transport: Arc<dyn NotificationTransport>,
}

impl StatusNotifier {
    /// Default status-channel key consulted for the watched task's outcome.
    pub const DEFAULT_STATUS_KEY: &'static str = "status";

    /// Create a notifier watching `watch_task` and delivering to
    /// `recipient` through the given transport.
    pub fn new(
        watch_task: impl Into<String>,
        recipient: impl Into<String>,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        Self {
            watch_task: watch_task.into(),
            status_key: Self::DEFAULT_STATUS_KEY.to_string(),
            recipient: recipient.into(),
            transport,
        }
    }

    /// Override the status-channel key to consult.
    pub fn with_status_key(mut self, key: impl Into<String>) -> Self {
        self.status_key = key.into();
        self
    }

    /// Interpret a published status value as success or failure.
    ///
    /// Both the bare string `"success"` and a record with a `status` field
    /// equal to `"success"` count as success; anything else is failure.
    fn value_is_success(value: &Value) -> bool {
        match value {
            Value::String(s) => s == "success",
            Value::Object(map) => map.get("status").and_then(Value::as_str) == Some("success"),
            _ => false,
        }
    }

    /// Resolve the watched task's outcome: channel first, run state second.
    fn resolve_outcome(&self, ctx: &OperationContext) -> Result<bool, OperationError> {
        match ctx.read(&self.status_key) {
            Ok(value) => Ok(Self::value_is_success(&value)),
            Err(ChannelError::KeyNotFound { .. }) => match ctx.upstream_outcome(&self.watch_task) {
                Some(TaskOutcome::Succeeded) => Ok(true),
                Some(TaskOutcome::Failed) | Some(TaskOutcome::Skipped) => Ok(false),
                None => Err(OperationError::new(format!(
                    "no published status and no recorded outcome for task '{}'",
                    self.watch_task
                ))),
            },
            Err(e) => Err(OperationError::with_source(
                format!("failed to read status key '{}'", self.status_key),
                e,
            )),
        }
    }
}

#[async_trait]
impl Operation for StatusNotifier {
    async fn execute(&self, ctx: &mut OperationContext) -> Result<(), OperationError> {
        let success = self.resolve_outcome(ctx)?;

        let body = if success {
            format!("Task {} is successful.", self.watch_task)
        } else {
            format!("Task {} has failed.", self.watch_task)
        };
        let notification = Notification {
            recipient: self.recipient.clone(),
            subject: format!("Task Execution Status: {}", ctx.pipeline_name()),
            body,
        };

        // Delivery is best-effort: a transport failure is reported but does
        // not fail the notifier task and is not retried.
        if let Err(e) = self.transport.send(&notification).await {
            error!(
                run_id = %ctx.run_id(),
                recipient = %notification.recipient,
                error = %e,
                "notification dispatch failed; not retrying"
            );
        } else {
            info!(
                run_id = %ctx.run_id(),
                recipient = %notification.recipient,
                subject = %notification.subject,
                "notification sent"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::StatusChannel;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Transport that records everything it is asked to send.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationTransport for RecordingTransport {
        async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail {
                Err(DispatchError("transport unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn context(
        channel: Arc<StatusChannel>,
        upstream: HashMap<String, TaskOutcome>,
    ) -> OperationContext {
        OperationContext::new(
            channel,
            "my_python_operator_dag".to_string(),
            "email_notification".to_string(),
            1,
            upstream,
        )
    }

    #[tokio::test]
    async fn success_status_produces_success_body() {
        let channel = Arc::new(StatusChannel::new(Uuid::new_v4()));
        channel.publish("status", json!({"status": "success"})).unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let notifier = StatusNotifier::new(
            "run_python_script",
            "ops@example.com",
            Arc::clone(&transport) as Arc<dyn NotificationTransport>,
        );

        let mut ctx = context(channel, HashMap::new());
        notifier.execute(&mut ctx).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Task Execution Status: my_python_operator_dag");
        assert_eq!(sent[0].body, "Task run_python_script is successful.");
        assert_eq!(sent[0].recipient, "ops@example.com");
    }

    #[tokio::test]
    async fn bare_string_status_is_understood() {
        let channel = Arc::new(StatusChannel::new(Uuid::new_v4()));
        channel.publish("status", "success").unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let notifier = StatusNotifier::new(
            "run_python_script",
            "ops@example.com",
            Arc::clone(&transport) as Arc<dyn NotificationTransport>,
        );

        let mut ctx = context(channel, HashMap::new());
        notifier.execute(&mut ctx).await.unwrap();

        assert_eq!(
            transport.sent()[0].body,
            "Task run_python_script is successful."
        );
    }

    #[tokio::test]
    async fn missing_status_falls_back_to_recorded_outcome() {
        let channel = Arc::new(StatusChannel::new(Uuid::new_v4()));
        let upstream =
            HashMap::from([("run_python_script".to_string(), TaskOutcome::Failed)]);

        let transport = Arc::new(RecordingTransport::default());
        let notifier = StatusNotifier::new(
            "run_python_script",
            "ops@example.com",
            Arc::clone(&transport) as Arc<dyn NotificationTransport>,
        );

        let mut ctx = context(channel, upstream);
        notifier.execute(&mut ctx).await.unwrap();

        assert_eq!(
            transport.sent()[0].body,
            "Task run_python_script has failed."
        );
    }

    #[tokio::test]
    async fn missing_status_and_outcome_is_an_error() {
        let channel = Arc::new(StatusChannel::new(Uuid::new_v4()));

        let transport = Arc::new(RecordingTransport::default());
        let notifier = StatusNotifier::new(
            "run_python_script",
            "ops@example.com",
            Arc::clone(&transport) as Arc<dyn NotificationTransport>,
        );

        let mut ctx = context(channel, HashMap::new());
        assert!(notifier.execute(&mut ctx).await.is_err());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_fail_the_task() {
        let channel = Arc::new(StatusChannel::new(Uuid::new_v4()));
        channel.publish("status", "success").unwrap();

        let transport = Arc::new(RecordingTransport::failing());
        let notifier = StatusNotifier::new(
            "run_python_script",
            "ops@example.com",
            Arc::clone(&transport) as Arc<dyn NotificationTransport>,
        );

        let mut ctx = context(channel, HashMap::new());
        assert!(notifier.execute(&mut ctx).await.is_ok());
    }

    #[test]
    fn value_interpretation() {
        assert!(StatusNotifier::value_is_success(&json!("success")));
        assert!(StatusNotifier::value_is_success(
            &json!({"status": "success", "detail": "done"})
        ));
        assert!(!StatusNotifier::value_is_success(&json!("failed")));
        assert!(!StatusNotifier::value_is_success(&json!({"status": "failed"})));
        assert!(!StatusNotifier::value_is_success(&json!(true)));
    }
}
