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

//! Work unit that runs an external command.
//!
//! [`ScriptOperation`] spawns the configured program, captures its output,
//! and maps the exit status onto the operation boundary: exit code 0 is a
//! successful attempt (publishing `{status: "success"}` to the status
//! channel), anything else is an [`OperationError`] carrying the tail of
//! stderr. The command's internals are opaque to the core.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::error::OperationError;
use crate::task::{Operation, OperationContext};

/// Maximum bytes of stderr carried into an error message.
const STDERR_TAIL_BYTES: usize = 1024;

/// An [`Operation`] that executes an external command.
pub struct ScriptOperation {
    program: String,
    args: Vec<String>,
    status_key: String,
}

impl ScriptOperation {
    /// Build from a command line: the program followed by its arguments.
    ///
    /// The command must not be empty; configuration validation enforces that
    /// before a pipeline is registered.
    pub fn new(command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut parts: Vec<String> = command.into_iter().map(Into::into).collect();
        let program = if parts.is_empty() {
            String::new()
        } else {
            parts.remove(0)
        };
        Self {
            program,
            args: parts,
            status_key: "status".to_string(),
        }
    }

    /// Override the status-channel key published on success.
    pub fn with_status_key(mut self, key: impl Into<String>) -> Self {
        self.status_key = key.into();
        self
    }

    fn stderr_tail(stderr: &[u8]) -> String {
        let text = String::from_utf8_lossy(stderr);
        let trimmed = text.trim_end();
        if trimmed.len() <= STDERR_TAIL_BYTES {
            trimmed.to_string()
        } else {
            let start = trimmed.len() - STDERR_TAIL_BYTES;
            // Avoid splitting a UTF-8 sequence.
            let start = (start..trimmed.len())
                .find(|i| trimmed.is_char_boundary(*i))
                .unwrap_or(start);
            trimmed[start..].to_string()
        }
    }
}

#[async_trait]
impl Operation for ScriptOperation {
    async fn execute(&self, ctx: &mut OperationContext) -> Result<(), OperationError> {
        if self.program.is_empty() {
            return Err(OperationError::new("no program configured"));
        }

        info!(
            run_id = %ctx.run_id(),
            program = %self.program,
            attempt = ctx.attempt(),
            "running external command"
        );

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                OperationError::with_source(format!("failed to spawn '{}'", self.program), e)
            })?;

        if output.status.success() {
            debug!(
                run_id = %ctx.run_id(),
                stdout_bytes = output.stdout.len(),
                "command succeeded"
            );
            ctx.publish(&self.status_key, json!({ "status": "success" }))?;
            Ok(())
        } else {
            let detail = Self::stderr_tail(&output.stderr);
            Err(OperationError::new(format!(
                "command '{}' exited with {}: {}",
                self.program, output.status, detail
            )))
        }
    }
}
