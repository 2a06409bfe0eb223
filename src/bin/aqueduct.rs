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

//! Command-line front end.
//!
//! Loads a pipeline from its TOML configuration, wires the standard
//! two-task shape (external command plus outcome notification) and either
//! triggers a single run or follows the configured cron schedule.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use aqueduct::{
    LogTransport, Pipeline, PipelineConfig, PipelineRunner, RunnerConfig, Schedule,
    ScriptOperation, StatusNotifier, TaskDefinition, TriggerRule,
};

#[derive(Parser)]
#[command(name = "aqueduct", about = "Scheduled automation pipeline runner", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger a run of the configured pipeline.
    Run {
        /// Path to the pipeline's TOML configuration.
        #[arg(short, long)]
        config: PathBuf,

        /// Keep running, triggering on the configured cron schedule,
        /// until interrupted.
        #[arg(long)]
        follow: bool,
    },
    /// Load and validate a configuration without running anything.
    Validate {
        /// Path to the pipeline's TOML configuration.
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Wire the standard pipeline shape from its configuration: the external
/// command task, and a notification task that fires on every outcome.
fn build_pipeline(config: &PipelineConfig) -> anyhow::Result<Pipeline> {
    const WORK_TASK: &str = "run_python_script";
    const NOTIFY_TASK: &str = "email_notification";

    let pipeline = Pipeline::builder(&config.pipeline_name)
        .add_task(
            TaskDefinition::new(WORK_TASK, ScriptOperation::new(config.command.clone()))
                .with_retry_policy(config.retry_policy()),
        )?
        .add_task(
            TaskDefinition::new(
                NOTIFY_TASK,
                StatusNotifier::new(WORK_TASK, &config.notify_recipient, Arc::new(LogTransport)),
            )
            .depends_on([WORK_TASK])
            .with_trigger_rule(TriggerRule::AllDone),
        )?
        .build()?;
    Ok(pipeline)
}

async fn run_once(runner: &PipelineRunner) -> anyhow::Result<()> {
    let run = runner.trigger().await;
    if let Some(err) = run.failure() {
        return Err(anyhow::Error::new(err).context(format!(
            "run {} of pipeline '{}' failed",
            run.id, run.pipeline_name
        )));
    }
    info!(run_id = %run.id, "run succeeded");
    Ok(())
}

/// Trigger a run at every scheduled fire time until interrupted.
async fn follow_schedule(runner: &PipelineRunner, schedule: &Schedule) -> anyhow::Result<()> {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            bail!("schedule has no upcoming fire time; nothing to follow");
        };
        let wait = (next - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        info!(next = %next, "waiting for next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; stopping schedule follower");
                return Ok(());
            }
        }

        let run = runner.trigger().await;
        if run.is_failed() {
            warn!(run_id = %run.id, "scheduled run failed");
        } else {
            info!(run_id = %run.id, "scheduled run succeeded");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("aqueduct=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, follow } => {
            let config = PipelineConfig::from_toml_file(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let schedule = config.schedule()?;
            let pipeline = build_pipeline(&config)?;
            let runner = PipelineRunner::new(pipeline, RunnerConfig::default())?;

            if follow {
                if schedule.is_manual() {
                    bail!(
                        "pipeline '{}' has no schedule; --follow needs a cron expression",
                        config.pipeline_name
                    );
                }
                follow_schedule(&runner, &schedule).await
            } else {
                run_once(&runner).await
            }
        }
        Commands::Validate { config } => {
            let loaded = PipelineConfig::from_toml_file(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            build_pipeline(&loaded)?;
            println!(
                "configuration ok: pipeline '{}', schedule {}",
                loaded.pipeline_name,
                loaded
                    .schedule
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or("manual")
            );
            Ok(())
        }
    }
}
