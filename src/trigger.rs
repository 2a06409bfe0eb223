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

//! Trigger rules: whether a task runs given its dependencies' outcomes.
//!
//! A rule is evaluated only once every dependency has reached a terminal
//! outcome, so evaluation never has to reason about in-flight tasks.

use serde::{Deserialize, Serialize};

use crate::task::TaskOutcome;

/// Policy determining whether a task runs based on upstream outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRule {
    /// Run only if every dependency finished with success. A failed or
    /// skipped dependency skips this task, and the skip cascades downstream.
    #[default]
    AllSuccess,
    /// Run once every dependency is terminal, regardless of outcome. This is
    /// what lets a notifier fire on both the success and failure paths.
    AllDone,
}

impl TriggerRule {
    /// Whether a task governed by this rule should run, given the terminal
    /// outcomes of all of its dependencies.
    pub fn admits<'a>(&self, upstream: impl IntoIterator<Item = &'a TaskOutcome>) -> bool {
        match self {
            TriggerRule::AllSuccess => upstream
                .into_iter()
                .all(|outcome| *outcome == TaskOutcome::Succeeded),
            // Terminality of every dependency is the caller's precondition.
            TriggerRule::AllDone => true,
        }
    }
}
