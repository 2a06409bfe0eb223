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

//! Run-scoped status channel: key/value handoff between tasks.
//!
//! The channel lets a later task read a small structured value (a success
//! flag, an error message) produced by an earlier task in the same run,
//! without coupling the two tasks directly. Values are JSON; there is no
//! large-payload guarantee.
//!
//! # Write discipline
//!
//! The channel is **strict**: each key is written at most once per run, and
//! a second publish fails with [`ChannelError::DuplicateKey`]. Silent
//! overwrite could mask a double-execution bug, so re-writes are treated as
//! core-logic errors rather than defaulted away.
//!
//! Strictness coexists with retries because operations do not write to the
//! channel directly: their publishes are staged per attempt (see
//! [`OperationContext`](crate::task::OperationContext)) and committed in one
//! batch only when the attempt succeeds. A failed attempt's writes are
//! discarded, so the channel only ever reflects a task's successful attempt.
//!
//! # Scope
//!
//! One channel exists per run. Two runs of the same pipeline never observe
//! each other's values; the runner constructs a fresh channel for every run
//! and the channel carries its run id for error reporting.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::ChannelError;

/// Key/value handoff mechanism scoped to a single run.
///
/// Many tasks may read a key; exactly one task writes it. The dependency
/// edge in the pipeline graph is the only ordering mechanism between a
/// publish and a downstream read.
#[derive(Debug)]
pub struct StatusChannel {
    run_id: Uuid,
    values: RwLock<HashMap<String, Value>>,
}

impl StatusChannel {
    /// Create an empty channel for the given run.
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            values: RwLock::new(HashMap::new()),
        }
    }

    /// The run this channel belongs to.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Publish a value under `key`.
    ///
    /// Fails with [`ChannelError::DuplicateKey`] if the key already has a
    /// value in this run, and with [`ChannelError::Serialization`] if the
    /// value cannot be converted to JSON.
    pub fn publish<T: serde::Serialize>(&self, key: &str, value: T) -> Result<(), ChannelError> {
        let value = serde_json::to_value(value).map_err(|source| ChannelError::Serialization {
            key: key.to_string(),
            source,
        })?;

        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        if values.contains_key(key) {
            return Err(ChannelError::DuplicateKey {
                key: key.to_string(),
                run_id: self.run_id,
            });
        }

        debug!(run_id = %self.run_id, key, "status published");
        values.insert(key.to_string(), value);
        Ok(())
    }

    /// Read the value published under `key`.
    ///
    /// Fails with [`ChannelError::KeyNotFound`] if the key was never
    /// published in this run.
    pub fn read(&self, key: &str) -> Result<Value, ChannelError> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values
            .get(key)
            .cloned()
            .ok_or_else(|| ChannelError::KeyNotFound {
                key: key.to_string(),
                run_id: self.run_id,
            })
    }

    /// Whether `key` has a value in this run.
    pub fn contains(&self, key: &str) -> bool {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.contains_key(key)
    }

    /// All keys published so far, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.keys().cloned().collect()
    }

    /// Commit a batch of staged writes atomically.
    ///
    /// Either every entry lands or none does: the batch is validated against
    /// the committed map (and against itself) under a single write lock
    /// before anything is inserted. The runner calls this once per
    /// successful task attempt.
    pub(crate) fn commit(&self, staged: Vec<(String, Value)>) -> Result<(), ChannelError> {
        if staged.is_empty() {
            return Ok(());
        }

        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());

        for (key, _) in &staged {
            if values.contains_key(key) {
                return Err(ChannelError::DuplicateKey {
                    key: key.clone(),
                    run_id: self.run_id,
                });
            }
        }

        let count = staged.len();
        for (key, value) in staged {
            debug!(run_id = %self.run_id, key = %key, "status committed");
            values.insert(key, value);
        }
        debug!(run_id = %self.run_id, count, "staged statuses committed");
        Ok(())
    }
}
