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

//! Run scheduling: manual-only pipelines or cron-like expressions.
//!
//! The orchestration core does not run its own scheduler loop; it only
//! validates the operator's schedule at registration time and answers "when
//! is the next fire time". The CLI (or any external runner) uses that to
//! decide when to trigger runs.

use chrono::{DateTime, Utc};
use croner::Cron;

use crate::error::ConfigError;

/// A parsed, validated cron expression.
#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl std::fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronSchedule")
            .field("expression", &self.expression)
            .finish()
    }
}

impl CronSchedule {
    /// Parse a cron expression, failing at configuration time if invalid.
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let cron = Cron::new(expression)
            .parse()
            .map_err(|e| ConfigError::InvalidSchedule {
                expression: expression.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            expression: expression.to_string(),
            cron,
        })
    }

    /// The original expression text.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The next fire time strictly after `now`, if the expression has one.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.find_next_occurrence(&now, false).ok()
    }
}

/// When runs of a pipeline are triggered.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Runs start only via the manual trigger entry point.
    Manual,
    /// Runs start on a cron-like schedule (and may still be triggered
    /// manually in between).
    Cron(CronSchedule),
}

impl Schedule {
    /// Parse an operator-supplied schedule string.
    ///
    /// `None`, `"manual"` and the empty string mean manual-only; anything
    /// else must be a valid cron expression.
    pub fn parse(source: Option<&str>) -> Result<Self, ConfigError> {
        match source.map(str::trim) {
            None | Some("") | Some("manual") => Ok(Schedule::Manual),
            Some(expression) => Ok(Schedule::Cron(CronSchedule::parse(expression)?)),
        }
    }

    /// The next fire time strictly after `now`; `None` for manual-only.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Manual => None,
            Schedule::Cron(cron) => cron.next_after(now),
        }
    }

    /// Whether this schedule ever fires on its own.
    pub fn is_manual(&self) -> bool {
        matches!(self, Schedule::Manual)
    }
}
