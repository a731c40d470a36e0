// Execution guard - Single-flight, cooldown and the policy pipeline around model runs
use crate::application::model_runner::{ModelRunner, RunArtifacts};
use crate::application::policies::{BreakerSnapshot, PolicyPipeline};
use crate::application::result_cache::CacheControl;
use crate::domain::error::ExecutionError;
use crate::domain::execution::{ExecutionReport, ExecutionStatus};
use crate::infrastructure::config::ExecutionSettings;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

pub const ALREADY_RUNNING: &str = "Model is already running";
pub const COOLDOWN_ACTIVE: &str = "Model executed recently. Use force=True to override.";

#[derive(Debug, Default)]
struct GuardState {
    in_flight: usize,
    current_execution: Option<String>,
    last_success: Option<(Instant, DateTime<Utc>)>,
    last_error: Option<String>,
}

/// Clears the in-flight marker however the run ends, including cancellation.
struct InFlight<'a> {
    guard: &'a ExecutionGuard,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.guard.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            state.current_execution = None;
        }
    }
}

pub struct ExecutionGuard {
    runner: Arc<dyn ModelRunner>,
    policies: PolicyPipeline,
    cooldown: Duration,
    caches: Vec<Arc<dyn CacheControl>>,
    state: Mutex<GuardState>,
    run_lock: tokio::sync::Mutex<()>,
}

impl ExecutionGuard {
    pub fn new(
        runner: Arc<dyn ModelRunner>,
        policies: PolicyPipeline,
        cooldown: Duration,
        caches: Vec<Arc<dyn CacheControl>>,
    ) -> Self {
        Self {
            runner,
            policies,
            cooldown,
            caches,
            state: Mutex::new(GuardState::default()),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_settings(
        runner: Arc<dyn ModelRunner>,
        settings: &ExecutionSettings,
        caches: Vec<Arc<dyn CacheControl>>,
    ) -> Self {
        Self::new(
            runner,
            PolicyPipeline::from_settings(settings),
            Duration::from_secs(settings.cooldown_secs),
            caches,
        )
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims the run slot, or explains why not. Forced calls skip both checks
    /// and queue behind any run in progress.
    fn admit(&self, force: bool) -> Result<(String, InFlight<'_>), ExecutionReport> {
        let mut state = self.lock();
        if !force {
            if state.in_flight > 0 {
                return Err(ExecutionReport::rejected(ALREADY_RUNNING));
            }
            if let Some((at, _)) = state.last_success {
                if at.elapsed() < self.cooldown {
                    return Err(ExecutionReport::rejected(COOLDOWN_ACTIVE));
                }
            }
        }

        let execution_id = Uuid::new_v4().to_string();
        state.in_flight += 1;
        state.current_execution = Some(execution_id.clone());
        Ok((execution_id, InFlight { guard: self }))
    }

    /// Never fails: every outcome, including timeouts and an open breaker,
    /// is reported as `success = false` with a message.
    pub async fn trigger_execution(&self, force: bool) -> ExecutionReport {
        let (execution_id, _in_flight) = match self.admit(force) {
            Ok(admitted) => admitted,
            Err(report) => {
                tracing::info!(force, reason = %report.message, "Model execution rejected");
                return report;
            }
        };

        let _run = self.run_lock.lock().await;
        tracing::info!(execution_id = %execution_id, force, "Starting model execution");

        let result = self
            .policies
            .run(|attempt| {
                let runner = self.runner.clone();
                let execution_id = execution_id.clone();
                async move {
                    tracing::debug!(execution_id = %execution_id, attempt, "Model attempt");
                    run_once(runner.as_ref(), &execution_id).await
                }
            })
            .await;

        match result {
            Ok(artifacts) => {
                {
                    let mut state = self.lock();
                    state.last_success = Some((Instant::now(), Utc::now()));
                    state.last_error = None;
                }
                for cache in &self.caches {
                    cache.clear_cache().await;
                }
                tracing::info!(
                    execution_id = %execution_id,
                    forecasted = artifacts.forecasted.len(),
                    degraded = artifacts.degraded.len(),
                    "Model execution completed"
                );
                ExecutionReport {
                    success: true,
                    message: format!(
                        "Model executed successfully for {} location(s), {} degraded",
                        artifacts.forecasted.len(),
                        artifacts.degraded.len()
                    ),
                    execution_id: Some(execution_id),
                }
            }
            Err(e) => {
                self.lock().last_error = Some(e.to_string());
                tracing::error!(
                    execution_id = %execution_id,
                    code = %e.code,
                    details = %e.details,
                    "Model execution failed: {}",
                    e.message
                );
                ExecutionReport {
                    success: false,
                    message: e.to_string(),
                    execution_id: Some(execution_id),
                }
            }
        }
    }

    /// `next_scheduled_run` is left empty; the scheduler fills it in.
    pub fn status(&self) -> ExecutionStatus {
        let state = self.lock();
        ExecutionStatus {
            is_running: state.in_flight > 0,
            last_run: state.last_success.map(|(_, at)| at),
            last_error: state.last_error.clone(),
            next_scheduled_run: None,
        }
    }

    pub fn current_execution(&self) -> Option<String> {
        self.lock().current_execution.clone()
    }

    pub fn breaker(&self) -> BreakerSnapshot {
        self.policies.breaker().snapshot()
    }
}

async fn run_once(runner: &dyn ModelRunner, execution_id: &str) -> Result<RunArtifacts, ExecutionError> {
    runner.preflight().await?;
    let artifacts = runner.execute(execution_id).await?;
    runner.verify(&artifacts).await?;
    Ok(artifacts)
}
