//! Batch execution over many instances.
//!
//! Each instance gets a fresh sandbox from the [`EnvironmentFactory`], one
//! agent run, a saved trajectory and one prediction in `preds.json`. With
//! more than one worker, instances run as tokio tasks bounded by a
//! semaphore; every task records its own prediction as soon as it finishes.
//!
//! Shutdown is signalled through a `watch` channel: no new instance is
//! launched afterwards, in-flight agent runs are dropped at their next
//! await point, and every started sandbox is stopped before its task ends.
//!
//! A container runtime that cannot be executed at all aborts the batch: no
//! further instance is launched, in-flight ones finish, and the affected
//! instances are left out of the checkpoint so a later run retries them.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use super::checkpoint::{Prediction, PredictionStore, ENVIRONMENT_ERROR_STATUS};
use super::docker_sandbox::{DockerConfig, DockerEnvironment};
use super::local::LocalEnvironment;
use super::{SandboxEnvironment, SweInstance};
use crate::error::{BatchError, StorageError};
use crate::llm::{CostTracker, LlmProvider};
use crate::scaffold::{format_task_prompt, AgentConfig, AgentLoop};
use crate::trajectory::{ExitStatus, TrajectoryStorage};

/// Builds a fresh, unstarted environment for an instance.
pub type EnvironmentFactory =
    Arc<dyn Fn(&SweInstance) -> Box<dyn SandboxEnvironment> + Send + Sync>;

/// Factory for container-backed environments.
pub fn docker_factory(config: DockerConfig) -> EnvironmentFactory {
    Arc::new(move |_: &SweInstance| {
        Box::new(DockerEnvironment::new(config.clone())) as Box<dyn SandboxEnvironment>
    })
}

/// Factory for host environments running `<ash_binary> call` in `working_dir`.
pub fn local_factory(ash_binary: impl Into<String>, working_dir: impl Into<PathBuf>) -> EnvironmentFactory {
    let ash_binary = ash_binary.into();
    let working_dir = working_dir.into();
    Arc::new(move |_: &SweInstance| {
        Box::new(LocalEnvironment::new(ash_binary.clone(), working_dir.clone()))
            as Box<dyn SandboxEnvironment>
    })
}

/// How one instance ended from the batch's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceOutcome {
    Completed(Prediction),
    /// Interrupted by shutdown; nothing is recorded and a resume retries it.
    Cancelled,
    /// The sandbox runtime is unusable; nothing is recorded and the batch stops.
    Aborted(String),
}

/// Counters for one batch invocation.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Already present in the checkpoint and not re-run.
    pub skipped: usize,
    pub processed: usize,
    pub submitted: usize,
    pub environment_errors: usize,
    pub errors: usize,
    pub cancelled: usize,
    /// Predictions with a non-empty patch.
    pub patches: usize,
    pub total_cost: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub predictions_path: PathBuf,
}

impl BatchSummary {
    fn new(total: usize, skipped: usize, predictions_path: PathBuf) -> Self {
        Self {
            total,
            skipped,
            processed: 0,
            submitted: 0,
            environment_errors: 0,
            errors: 0,
            cancelled: 0,
            patches: 0,
            total_cost: 0.0,
            started_at: Utc::now(),
            finished_at: None,
            predictions_path,
        }
    }

    fn observe(&mut self, outcome: &InstanceOutcome) {
        let prediction = match outcome {
            InstanceOutcome::Completed(p) => p,
            InstanceOutcome::Cancelled => {
                self.cancelled += 1;
                return;
            }
            InstanceOutcome::Aborted(_) => return,
        };
        self.processed += 1;
        if prediction.exit_status == ExitStatus::Submitted.as_str() {
            self.submitted += 1;
        } else if prediction.exit_status == ENVIRONMENT_ERROR_STATUS {
            self.environment_errors += 1;
        } else if prediction.exit_status.starts_with("Error:") {
            self.errors += 1;
        }
        if prediction.has_patch() {
            self.patches += 1;
        }
    }

    /// True when shutdown left instances unprocessed.
    pub fn interrupted(&self) -> bool {
        self.cancelled > 0
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

/// Resolves once shutdown is requested; never if the sender goes away first.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// State shared by every instance task.
struct BatchContext {
    llm_client: Arc<dyn LlmProvider>,
    agent_config: AgentConfig,
    environment_factory: EnvironmentFactory,
    trajectories: TrajectoryStorage,
    cost_tracker: Arc<CostTracker>,
}

impl BatchContext {
    fn model(&self) -> &str {
        &self.agent_config.model
    }

    /// Run one instance, turning any panic into an `Error:` prediction.
    async fn run_guarded(&self, instance: SweInstance, shutdown: watch::Receiver<bool>) -> InstanceOutcome {
        let instance_id = instance.instance_id.clone();
        match AssertUnwindSafe(self.process_instance(instance, shutdown))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(instance = %instance_id, error = %message, "Instance panicked");
                InstanceOutcome::Completed(Prediction::error(instance_id, self.model(), message))
            }
        }
    }

    async fn process_instance(
        &self,
        instance: SweInstance,
        mut shutdown: watch::Receiver<bool>,
    ) -> InstanceOutcome {
        let instance_id = instance.instance_id.clone();
        if *shutdown.borrow() {
            return InstanceOutcome::Cancelled;
        }

        tracing::info!(instance = %instance_id, "Starting instance");
        let mut env = (self.environment_factory)(&instance);
        if let Err(e) = env.start(&instance).await {
            env.stop().await;
            if e.is_fatal() {
                tracing::error!(instance = %instance_id, error = %e, "Sandbox runtime unavailable");
                return InstanceOutcome::Aborted(e.to_string());
            }
            tracing::warn!(instance = %instance_id, error = %e, "Environment failed to start");
            return InstanceOutcome::Completed(Prediction::environment_error(
                instance_id,
                self.model(),
            ));
        }

        let task = format_task_prompt(&instance, &self.agent_config.cwd);
        let agent = AgentLoop::new(Arc::clone(&self.llm_client), self.agent_config.clone());
        let run = AssertUnwindSafe(agent.run(env.executor(), &task, &instance_id)).catch_unwind();

        let result = tokio::select! {
            result = run => Some(result),
            _ = wait_for_shutdown(&mut shutdown) => None,
        };
        env.stop().await;

        let prediction = match result {
            None => {
                tracing::warn!(instance = %instance_id, "Instance cancelled");
                return InstanceOutcome::Cancelled;
            }
            Some(Ok(Ok(outcome))) => {
                if let Err(e) = self.trajectories.save(&outcome.trajectory).await {
                    tracing::warn!(instance = %instance_id, error = %e, "Failed to save trajectory");
                }
                self.cost_tracker.record(
                    self.model(),
                    outcome.model_stats.api_calls,
                    outcome.model_stats.instance_cost,
                );
                outcome.trajectory.to_prediction(self.model())
            }
            Some(Ok(Err(e))) => {
                tracing::warn!(instance = %instance_id, error = %e, "Agent run failed");
                Prediction::error(&instance_id, self.model(), e)
            }
            Some(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(instance = %instance_id, error = %message, "Agent run panicked");
                Prediction::error(&instance_id, self.model(), message)
            }
        };

        tracing::info!(
            instance = %instance_id,
            exit_status = %prediction.exit_status,
            patch_chars = prediction.model_patch.len(),
            "Instance finished"
        );
        InstanceOutcome::Completed(prediction)
    }
}

/// Runs an agent over a set of instances with resumable checkpointing.
pub struct BatchRunner {
    context: Arc<BatchContext>,
    output_dir: PathBuf,
    workers: usize,
}

impl BatchRunner {
    pub fn new(
        llm_client: Arc<dyn LlmProvider>,
        agent_config: AgentConfig,
        environment_factory: EnvironmentFactory,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            context: Arc::new(BatchContext {
                llm_client,
                agent_config,
                environment_factory,
                trajectories: TrajectoryStorage::new(output_dir.join("trajectories")),
                cost_tracker: Arc::new(CostTracker::new()),
            }),
            output_dir,
            workers: 1,
        }
    }

    /// Number of instances run at once; `<= 1` runs them in order.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn cost_tracker(&self) -> Arc<CostTracker> {
        Arc::clone(&self.context.cost_tracker)
    }

    async fn ensure_output_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| StorageError::Io {
                path: self.output_dir.display().to_string(),
                source,
            })
    }

    /// Run one instance without touching the checkpoint.
    ///
    /// The trajectory is still saved. Returns `None` if shutdown interrupted it.
    pub async fn run_single(
        &self,
        instance: SweInstance,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Option<Prediction>, BatchError> {
        self.ensure_output_dir().await?;
        match self.context.run_guarded(instance, shutdown).await {
            InstanceOutcome::Completed(prediction) => Ok(Some(prediction)),
            InstanceOutcome::Cancelled => Ok(None),
            InstanceOutcome::Aborted(reason) => Err(BatchError::RuntimeUnavailable(reason)),
        }
    }

    /// Run every instance that has no prediction in `<output>/preds.json` yet.
    ///
    /// Fails without recording the affected instances when the sandbox
    /// runtime cannot be executed.
    pub async fn run(
        &self,
        instances: Vec<SweInstance>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<BatchSummary, BatchError> {
        self.ensure_output_dir().await?;
        let store = Arc::new(PredictionStore::open(&self.output_dir).await?);

        let completed = store.completed_ids().await;
        let total = instances.len();
        let pending: Vec<SweInstance> = instances
            .into_iter()
            .filter(|i| !completed.contains(&i.instance_id))
            .collect();
        let mut summary = BatchSummary::new(total, total - pending.len(), store.path().to_path_buf());

        tracing::info!(
            total = total,
            skipped = summary.skipped,
            remaining = pending.len(),
            workers = self.workers,
            "Starting batch"
        );

        let aborted = if self.workers <= 1 {
            self.run_sequential(pending, &store, shutdown, &mut summary).await?
        } else {
            self.run_parallel(pending, &store, shutdown, &mut summary).await?
        };

        store.flush().await?;
        if let Some(reason) = aborted {
            tracing::error!(
                processed = summary.processed,
                path = %store.path().display(),
                "Batch aborted: {}",
                reason
            );
            return Err(BatchError::RuntimeUnavailable(reason));
        }
        summary.total_cost = self.context.cost_tracker.total_cost();
        summary.finished_at = Some(Utc::now());

        tracing::info!(
            processed = summary.processed,
            submitted = summary.submitted,
            errors = summary.errors,
            environment_errors = summary.environment_errors,
            cancelled = summary.cancelled,
            total_cost = summary.total_cost,
            path = %store.path().display(),
            "Batch finished"
        );
        Ok(summary)
    }

    async fn run_sequential(
        &self,
        pending: Vec<SweInstance>,
        store: &PredictionStore,
        shutdown: watch::Receiver<bool>,
        summary: &mut BatchSummary,
    ) -> Result<Option<String>, StorageError> {
        let count = pending.len();
        for (idx, instance) in pending.into_iter().enumerate() {
            if *shutdown.borrow() {
                summary.cancelled += count - idx;
                tracing::warn!(remaining = count - idx, "Shutdown requested, stopping batch");
                break;
            }
            tracing::info!(progress = %format!("{}/{}", idx + 1, count), instance = %instance.instance_id, "Next instance");

            let outcome = self.context.run_guarded(instance, shutdown.clone()).await;
            match &outcome {
                InstanceOutcome::Completed(prediction) => store.record(prediction.clone()).await?,
                InstanceOutcome::Aborted(reason) => return Ok(Some(reason.clone())),
                InstanceOutcome::Cancelled => {}
            }
            summary.observe(&outcome);
        }
        Ok(None)
    }

    async fn run_parallel(
        &self,
        pending: Vec<SweInstance>,
        store: &Arc<PredictionStore>,
        shutdown: watch::Receiver<bool>,
        summary: &mut BatchSummary,
    ) -> Result<Option<String>, StorageError> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<Result<InstanceOutcome, StorageError>> = JoinSet::new();
        let mut launch_rx = shutdown.clone();
        let (abort_tx, mut abort_rx) = watch::channel(false);
        let abort_tx = Arc::new(abort_tx);
        let count = pending.len();
        let mut launched = 0usize;

        for instance in pending {
            let permit = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut launch_rx) => None,
                _ = wait_for_shutdown(&mut abort_rx) => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                tracing::warn!(remaining = count - launched, "Not launching more instances");
                break;
            };
            launched += 1;

            let context = Arc::clone(&self.context);
            let store = Arc::clone(store);
            let shutdown = shutdown.clone();
            let abort_tx = Arc::clone(&abort_tx);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = context.run_guarded(instance, shutdown).await;
                match &outcome {
                    InstanceOutcome::Completed(prediction) => store.record(prediction.clone()).await?,
                    InstanceOutcome::Aborted(_) => {
                        abort_tx.send_replace(true);
                    }
                    InstanceOutcome::Cancelled => {}
                }
                Ok(outcome)
            });
        }
        let aborted_launch = *abort_rx.borrow();
        if !aborted_launch {
            summary.cancelled += count - launched;
        }

        let mut first_error = None;
        let mut abort_reason = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(InstanceOutcome::Aborted(reason))) => {
                    abort_reason.get_or_insert(reason);
                }
                Ok(Ok(outcome)) => summary.observe(&outcome),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Failed to write checkpoint");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Instance task failed");
                    summary.errors += 1;
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(abort_reason),
        }
    }
}
