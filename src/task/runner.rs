//! Task runner
//!
//! Composes the layer orchestrator, workspace isolator, checkout and
//! context synchronizer into a single task execution.

use crate::audit::{events, AuditLog};
use crate::checkout::Checkout;
use crate::config::Config;
use crate::context::{self, SyncOutcome, SyncRequest};
use crate::error::{StrataError, StrataResult};
use crate::layer::{LayerChainSpec, LayerOrchestrator, OrchestratorOptions, ResolvedImage};
use crate::orchestration::{ContainerRuntime, Mount, OutputFn, RunSpec};
use crate::preflight::{self, ExecutionPlan};
use crate::task::{PreflightScripts, TaskReport, TaskSpec};
use crate::workspace::{TaskOutcome, TaskWorkspace, WorkspaceManager};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Environment variable holding the task id inside the container
pub const TASK_ID_ENV: &str = "TASK_ID";

/// Environment variable holding the descriptor path inside the container
pub const CONTEXT_ENV: &str = "STRATA_CONTEXT";

/// How the container phase ended
enum Finish {
    Exited(i32),
    Errored(StrataError),
    Cancelled,
}

/// Runs tasks end to end
pub struct TaskRunner {
    config: Config,
    runtime: Arc<dyn ContainerRuntime>,
    orchestrator: LayerOrchestrator,
    workspaces: WorkspaceManager,
    checkout: Arc<dyn Checkout>,
    audit: AuditLog,
    build_output: Option<Arc<OutputFn>>,
}

impl TaskRunner {
    pub fn new(config: Config, runtime: Arc<dyn ContainerRuntime>, checkout: Arc<dyn Checkout>) -> Self {
        let audit = AuditLog::new(&config);
        let orchestrator =
            LayerOrchestrator::new(Arc::clone(&runtime), OrchestratorOptions::from_config(&config))
                .with_audit(audit.clone());
        let workspaces = WorkspaceManager::from_config(&config);

        Self {
            config,
            runtime,
            orchestrator,
            workspaces,
            checkout,
            audit,
            build_output: None,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: LayerOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn with_workspaces(mut self, workspaces: WorkspaceManager) -> Self {
        self.workspaces = workspaces;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Send layer build output here instead of the debug log
    pub fn with_build_output(mut self, on_output: Arc<OutputFn>) -> Self {
        self.build_output = Some(on_output);
        self
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn orchestrator(&self) -> &LayerOrchestrator {
        &self.orchestrator
    }

    /// Plan setup and resolve the image, without touching any workspace
    pub async fn prepare(&self, scripts: &PreflightScripts) -> (ExecutionPlan, ResolvedImage) {
        let plan = preflight::plan(&scripts.cached, &scripts.run, self.config.cache.enabled);
        for warning in &plan.warnings {
            warn!("Cached setup {}", warning);
        }

        let environment = plan.cached.as_ref().map(|s| s.body.as_str()).unwrap_or_default();
        let chain = LayerChainSpec::tiers(
            &self.config.runtime.base_image,
            &self.config.cache,
            &scripts.desktop,
            environment,
        );

        let resolved = match self.build_output {
            Some(ref on_output) => {
                self.orchestrator
                    .resolve_image_with(&chain, Arc::clone(on_output))
                    .await
            }
            None => self.orchestrator.resolve_image(&chain).await,
        };
        if let Some(ref degradation) = resolved.degradation {
            warn!("{}", degradation);
        } else if resolved.used_cache {
            info!("Using cached image {}", resolved.image_ref);
        }

        let unbaked = resolved.uncached_scripts();
        let plan = plan.with_fallback(&unbaked);
        (plan, resolved)
    }

    /// Run one task to completion, streaming container output to `on_output`.
    ///
    /// Setting `cancel` to true stops the task container and reclaims the
    /// workspace as cancelled. Cancelling while the image is still being
    /// resolved returns `TaskCancelled` before any workspace exists; shared
    /// layer builds keep going for other tasks. A checkout failure is
    /// returned as an error after the workspace is reclaimed as failed.
    pub async fn run(
        &self,
        spec: &TaskSpec,
        scripts: &PreflightScripts,
        mut cancel: watch::Receiver<bool>,
        on_output: Arc<OutputFn>,
    ) -> StrataResult<TaskReport> {
        let started = Instant::now();
        let container = spec.container_name()?;

        let (plan, resolved) = tokio::select! {
            prepared = self.prepare(scripts) => prepared,
            _ = cancelled(&mut cancel) => {
                info!("Task {} cancelled while resolving its image", spec.task_id);
                self.audit
                    .log(
                        events::TASK_FINISHED,
                        &json!({
                            "task_id": spec.task_id,
                            "environment_id": spec.environment_id,
                            "outcome": TaskOutcome::Cancelled,
                        }),
                    )
                    .await;
                return Err(StrataError::TaskCancelled(spec.task_id.clone()));
            }
        };

        let workspace = self
            .workspaces
            .allocate(&spec.environment_id, &spec.task_id)
            .await?;
        let guard = self.workspaces.activate(&workspace)?;

        let prepared = tokio::select! {
            result = self.prepare_workspace(spec, &workspace) => Some(result),
            _ = cancelled(&mut cancel) => None,
        };

        let (finish, context) = match prepared {
            Some(Ok(context)) => {
                let run_spec = self.run_spec(spec, &workspace, &plan, &resolved, container);
                debug!("Running task {} on {}", spec.task_id, run_spec.image);
                let finish = self.run_job(&run_spec, &mut cancel, on_output.as_ref()).await;
                (finish, context)
            }
            Some(Err(e)) => {
                drop(guard);
                self.finish_failed(spec, &e).await;
                return Err(e);
            }
            None => {
                info!("Task {} cancelled before its container started", spec.task_id);
                (Finish::Cancelled, None)
            }
        };

        let (outcome, exit_code, error) = match finish {
            Finish::Exited(0) => (TaskOutcome::Success, Some(0), None),
            Finish::Exited(code) => (TaskOutcome::Failure, Some(code), None),
            Finish::Errored(e) => (TaskOutcome::Failure, None, Some(e.to_string())),
            Finish::Cancelled => (TaskOutcome::Cancelled, None, None),
        };

        drop(guard);
        let reclaim = match self
            .workspaces
            .reclaim(&spec.environment_id, &spec.task_id, outcome)
            .await
        {
            Ok(action) => Some(action),
            Err(e) => {
                warn!("Failed to reclaim workspace for {}: {}", spec.task_id, e);
                None
            }
        };

        self.audit
            .log(
                events::TASK_FINISHED,
                &json!({
                    "task_id": spec.task_id,
                    "environment_id": spec.environment_id,
                    "outcome": outcome,
                    "exit_code": exit_code,
                    "image": resolved.image_ref,
                    "used_cache": resolved.used_cache,
                    "context_populated": context.as_ref().is_some_and(SyncOutcome::is_populated),
                    "error": error,
                }),
            )
            .await;

        Ok(TaskReport {
            task_id: spec.task_id.clone(),
            outcome,
            exit_code,
            image: resolved,
            context,
            workspace: workspace.path().to_path_buf(),
            reclaim,
            error,
            warnings: plan.warnings,
            duration: started.elapsed(),
        })
    }

    /// Run the task container until it exits or `cancel` fires
    async fn run_job(
        &self,
        run_spec: &RunSpec,
        cancel: &mut watch::Receiver<bool>,
        on_output: &OutputFn,
    ) -> Finish {
        let finish = tokio::select! {
            result = self.runtime.run_container(run_spec, on_output) => match result {
                Ok(code) => Finish::Exited(code),
                Err(e) => Finish::Errored(e),
            },
            _ = cancelled(cancel) => Finish::Cancelled,
        };

        // Killing the engine client leaves the container itself running
        if let (Finish::Cancelled, Some(name)) = (&finish, &run_spec.name) {
            info!("Stopping container {}", name);
            if let Err(e) = self.runtime.kill_container(name).await {
                warn!("Could not stop container {}: {}", name, e);
            }
        }
        finish
    }

    /// Phase 1 descriptor, checkout, then Phase 2
    async fn prepare_workspace(
        &self,
        spec: &TaskSpec,
        workspace: &TaskWorkspace,
    ) -> StrataResult<Option<SyncOutcome>> {
        let descriptor = workspace.descriptor_path();
        context::write_placeholder(&descriptor, &spec.task_id, spec.hints()).await?;

        let checkout_dir = workspace.checkout_dir();
        let Some(ref remote_url) = spec.remote_url else {
            tokio::fs::create_dir_all(&checkout_dir).await.map_err(|e| {
                StrataError::io(format!("creating {}", checkout_dir.display()), e)
            })?;
            return Ok(None);
        };

        let commit = self
            .checkout
            .checkout(remote_url, &checkout_dir, &spec.base_branch)
            .await?;
        self.checkout
            .start_branch(&checkout_dir, &spec.task_branch()?)
            .await?;

        let request = SyncRequest {
            base_branch: &spec.base_branch,
            remote_url: Some(remote_url.as_str()),
        };
        let outcome = context::sync(&descriptor, &checkout_dir, &Ok(commit), request).await;

        self.audit
            .log(
                events::CONTEXT_SYNCED,
                &json!({
                    "task_id": spec.task_id,
                    "populated": outcome.is_populated(),
                    "detail": outcome.to_string(),
                }),
            )
            .await;
        Ok(Some(outcome))
    }

    fn run_spec(
        &self,
        spec: &TaskSpec,
        workspace: &TaskWorkspace,
        plan: &ExecutionPlan,
        resolved: &ResolvedImage,
        container: String,
    ) -> RunSpec {
        let mount_point = self.config.runtime.workdir.trim_end_matches('/');
        let in_container = |host: &Path| {
            host.strip_prefix(workspace.path())
                .map(|rel| format!("{}/{}", mount_point, rel.display()))
                .unwrap_or_else(|_| mount_point.to_string())
        };

        let mut env = spec.env.clone();
        env.insert(TASK_ID_ENV.to_string(), spec.task_id.clone());
        env.insert(CONTEXT_ENV.to_string(), in_container(&workspace.descriptor_path()));

        RunSpec {
            image: resolved.image_ref.clone(),
            commands: plan.render_commands(&spec.command),
            mounts: vec![Mount {
                host: workspace.path().to_path_buf(),
                container: mount_point.to_string(),
                readonly: false,
            }],
            env,
            workdir: in_container(&workspace.checkout_dir()),
            name: Some(container),
        }
    }

    async fn finish_failed(&self, spec: &TaskSpec, error: &StrataError) {
        warn!("Task {} failed before start: {}", spec.task_id, error);

        if let Err(e) = self
            .workspaces
            .reclaim(&spec.environment_id, &spec.task_id, TaskOutcome::Failure)
            .await
        {
            warn!("Failed to reclaim workspace for {}: {}", spec.task_id, e);
        }

        self.audit
            .log(
                events::TASK_FINISHED,
                &json!({
                    "task_id": spec.task_id,
                    "environment_id": spec.environment_id,
                    "outcome": TaskOutcome::Failure,
                    "error": error.to_string(),
                }),
            )
            .await;
    }
}

/// Resolve once `cancel` reads true. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let sender_gone = cancel.wait_for(|c| *c).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::CheckoutError;
    use crate::config::ChainFailurePolicy;
    use crate::error::StrataResult;
    use crate::orchestration::{BuildRequest, ImageInfo};
    use crate::workspace::ReclaimAction;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeRuntime {
        images: Mutex<HashSet<String>>,
        builds: AtomicUsize,
        fail_builds: bool,
        exit_code: i32,
        build_delay: Option<Duration>,
        run_delay: Option<Duration>,
        runs: Mutex<Vec<RunSpec>>,
        killed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn image_exists(&self, image: &str) -> StrataResult<bool> {
            Ok(self.images.lock().unwrap().contains(image))
        }

        async fn inspect_image(&self, image: &str) -> StrataResult<ImageInfo> {
            Ok(ImageInfo {
                id: format!("sha256:{}", image),
                user: String::new(),
            })
        }

        async fn build_image(&self, request: &BuildRequest, _on_output: &OutputFn) -> StrataResult<String> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.build_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_builds {
                return Err(StrataError::ImageBuild {
                    tag: request.tag.clone(),
                    reason: "exit status 100".to_string(),
                });
            }
            self.images.lock().unwrap().insert(request.tag.clone());
            Ok(request.tag.clone())
        }

        async fn run_container(&self, spec: &RunSpec, on_output: &OutputFn) -> StrataResult<i32> {
            self.runs.lock().unwrap().push(spec.clone());
            on_output("job output".to_string());
            if let Some(delay) = self.run_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.exit_code)
        }

        async fn kill_container(&self, name: &str) -> StrataResult<()> {
            self.killed.lock().unwrap().push(name.to_string());
            Ok(())
        }

        fn runtime_name(&self) -> &'static str {
            "Fake"
        }
    }

    /// Creates the destination directory without running git
    #[derive(Default)]
    struct FakeCheckout {
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Checkout for FakeCheckout {
        async fn checkout(&self, remote_url: &str, dest: &Path, _branch: &str) -> Result<String, CheckoutError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(CheckoutError::Unreachable {
                    url: remote_url.to_string(),
                    reason: "could not resolve host".to_string(),
                });
            }
            tokio::fs::create_dir_all(dest).await.map_err(CheckoutError::Spawn)?;
            Ok("0123456789abcdef0123456789abcdef01234567".to_string())
        }

        async fn start_branch(&self, _dest: &Path, _branch: &str) -> Result<(), CheckoutError> {
            Ok(())
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.runtime.base_image = "base:1".to_string();
        config
    }

    fn runner(temp: &TempDir, config: Config, runtime: Arc<FakeRuntime>, fail_checkout: bool) -> TaskRunner {
        let checkout = FakeCheckout {
            fail: fail_checkout,
            ..Default::default()
        };
        runner_with(temp, config, runtime, checkout)
    }

    fn runner_with(temp: &TempDir, config: Config, runtime: Arc<FakeRuntime>, checkout: FakeCheckout) -> TaskRunner {
        let options = OrchestratorOptions {
            namespace: "test-cache".to_string(),
            build_timeout: Duration::from_secs(5),
            on_failure: ChainFailurePolicy::LastResolved,
            lock_dir: None,
        };
        let orchestrator = LayerOrchestrator::new(runtime.clone(), options);
        let workspaces = WorkspaceManager::new(temp.path().join("ws"));

        TaskRunner::new(config, runtime, Arc::new(checkout))
            .with_orchestrator(orchestrator)
            .with_workspaces(workspaces)
            .with_audit(AuditLog::at(temp.path().join("events.log"), true))
    }

    fn scripts() -> PreflightScripts {
        PreflightScripts {
            desktop: String::new(),
            cached: "apt-get install -y git".to_string(),
            run: "echo $TASK_ID".to_string(),
        }
    }

    fn spec() -> TaskSpec {
        let mut spec = TaskSpec::new("t1", "env");
        spec.command = vec!["make".to_string(), "test".to_string()];
        spec
    }

    fn quiet() -> Arc<OutputFn> {
        Arc::new(|_line: String| {})
    }

    fn never_cancelled() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    /// Receiver that reads true after `after`
    fn cancel_after(after: Duration) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tx.send(true).unwrap();
        });
        rx
    }

    #[tokio::test]
    async fn successful_task_uses_cached_image_and_removes_workspace() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::default());
        let runner = runner(&temp, config(), runtime.clone(), false);

        let report = runner.run(&spec(), &scripts(), never_cancelled(), quiet()).await.unwrap();

        assert!(report.succeeded());
        assert!(report.image.used_cache);
        assert_eq!(report.reclaim, Some(ReclaimAction::Removed));
        assert!(!report.workspace.exists());

        let runs = runtime.runs.lock().unwrap();
        let run = &runs[0];
        assert_eq!(run.image, report.image.image_ref);
        assert_eq!(run.workdir, "/workspace/repo");
        assert_eq!(run.env.get(TASK_ID_ENV).map(String::as_str), Some("t1"));
        assert_eq!(
            run.env.get(CONTEXT_ENV).map(String::as_str),
            Some("/workspace/.strata/context.json")
        );
        // Cached setup is baked, so only the run phase is in the command
        assert!(!run.commands[2].contains("apt-get"));
        assert!(run.commands[2].contains("echo $TASK_ID"));
        assert!(run.commands[2].ends_with("exec 'make' 'test'\n"));
    }

    #[tokio::test]
    async fn second_task_reuses_layers() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::default());
        let runner = runner(&temp, config(), runtime.clone(), false);

        runner.run(&spec(), &scripts(), never_cancelled(), quiet()).await.unwrap();
        let mut second = spec();
        second.task_id = "t2".to_string();
        runner.run(&second, &scripts(), never_cancelled(), quiet()).await.unwrap();

        assert_eq!(runtime.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_build_runs_cached_setup_at_task_start() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime {
            fail_builds: true,
            ..Default::default()
        });
        let runner = runner(&temp, config(), runtime.clone(), false);

        let report = runner.run(&spec(), &scripts(), never_cancelled(), quiet()).await.unwrap();

        assert!(report.succeeded());
        assert!(!report.image.used_cache);
        assert_eq!(report.image.image_ref, "base:1");
        assert!(report.image.degradation.is_some());

        let runs = runtime.runs.lock().unwrap();
        let script = &runs[0].commands[2];
        let cached_at = script.find("apt-get install -y git").unwrap();
        let run_at = script.find("echo $TASK_ID").unwrap();
        assert!(cached_at < run_at);
    }

    #[tokio::test]
    async fn caching_disabled_runs_everything_in_order() {
        let temp = TempDir::new().unwrap();
        let mut config = config();
        config.cache.enabled = false;
        let runtime = Arc::new(FakeRuntime::default());
        let runner = runner(&temp, config, runtime.clone(), false);

        let report = runner.run(&spec(), &scripts(), never_cancelled(), quiet()).await.unwrap();

        assert_eq!(runtime.builds.load(Ordering::SeqCst), 0);
        assert_eq!(report.image.image_ref, "base:1");
        let runs = runtime.runs.lock().unwrap();
        assert_eq!(
            runs[0].commands[2],
            "set -e\napt-get install -y git\necho $TASK_ID\nexec 'make' 'test'\n"
        );
    }

    #[tokio::test]
    async fn nonzero_exit_retains_workspace() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime {
            exit_code: 2,
            ..Default::default()
        });
        let runner = runner(&temp, config(), runtime, false);

        let report = runner.run(&spec(), &scripts(), never_cancelled(), quiet()).await.unwrap();

        assert_eq!(report.outcome, TaskOutcome::Failure);
        assert_eq!(report.exit_code, Some(2));
        assert_eq!(report.reclaim, Some(ReclaimAction::Retained));
        assert!(report.workspace.exists());
    }

    #[tokio::test]
    async fn cancellation_stops_the_container() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime {
            run_delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let runner = runner(&temp, config(), runtime.clone(), false);

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            runner.run(&spec(), &scripts(), cancel_after(Duration::from_millis(100)), quiet()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.outcome, TaskOutcome::Cancelled);
        assert_eq!(report.exit_code, None);
        assert_eq!(report.reclaim, Some(ReclaimAction::Retained));

        let started = runtime.runs.lock().unwrap()[0].name.clone().unwrap();
        assert_eq!(*runtime.killed.lock().unwrap(), vec![started]);
    }

    #[tokio::test]
    async fn cancellation_during_checkout_skips_the_container() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::default());
        let checkout = FakeCheckout {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let runner = runner_with(&temp, config(), runtime.clone(), checkout);
        let mut spec = spec();
        spec.remote_url = Some("https://github.com/acme/widgets.git".to_string());

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            runner.run(&spec, &scripts(), cancel_after(Duration::from_millis(100)), quiet()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.outcome, TaskOutcome::Cancelled);
        assert!(report.context.is_none());
        assert_eq!(report.reclaim, Some(ReclaimAction::Retained));
        assert!(runtime.runs.lock().unwrap().is_empty());
        assert!(runtime.killed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_a_slow_build_returns_promptly() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime {
            build_delay: Some(Duration::from_secs(3)),
            ..Default::default()
        });
        let runner = runner(&temp, config(), runtime.clone(), false);

        let err = tokio::time::timeout(
            Duration::from_secs(1),
            runner.run(&spec(), &scripts(), cancel_after(Duration::from_millis(50)), quiet()),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(matches!(err, StrataError::TaskCancelled(ref id) if id == "t1"));
        assert!(runtime.runs.lock().unwrap().is_empty());
        let dir = runner.workspaces().workspace_dir("env", "t1").unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn awkward_task_ids_get_valid_container_names() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::default());
        let runner = runner(&temp, config(), runtime.clone(), false);
        let mut spec = spec();
        spec.task_id = "org/repo#42".to_string();

        let report = runner.run(&spec, &scripts(), never_cancelled(), quiet()).await.unwrap();
        assert!(report.succeeded());

        let runs = runtime.runs.lock().unwrap();
        let name = runs[0].name.clone().unwrap();
        assert!(name.starts_with("strata-org_repo_42-"));
        assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-')));
        // The raw id still reaches the job
        assert_eq!(runs[0].env.get(TASK_ID_ENV).map(String::as_str), Some("org/repo#42"));
    }

    #[tokio::test]
    async fn checkout_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::default());
        let runner = runner(&temp, config(), runtime.clone(), true);
        let mut spec = spec();
        spec.remote_url = Some("https://git.invalid/acme/widgets.git".to_string());

        let err = runner.run(&spec, &scripts(), never_cancelled(), quiet()).await.unwrap_err();

        assert!(matches!(err, StrataError::Checkout(CheckoutError::Unreachable { .. })));
        assert!(runtime.runs.lock().unwrap().is_empty());
        // Retained for diagnosis, with the placeholder still unpopulated
        let dir = runner.workspaces().workspace_dir("env", "t1").unwrap();
        assert!(!context::verify_populated(&context::descriptor_path(&dir)).await);
    }

    #[tokio::test]
    async fn undetectable_checkout_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::default());
        let runner = runner(&temp, config(), runtime, false);
        let mut spec = spec();
        spec.remote_url = Some("https://github.com/acme/widgets.git".to_string());
        spec.title = Some("Fix login".to_string());

        let report = runner.run(&spec, &scripts(), never_cancelled(), quiet()).await.unwrap();

        assert!(report.succeeded());
        assert!(matches!(report.context, Some(SyncOutcome::NotDetected { .. })));
    }

    #[tokio::test]
    async fn finished_tasks_are_audited() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp, config(), Arc::new(FakeRuntime::default()), false);

        runner.run(&spec(), &scripts(), never_cancelled(), quiet()).await.unwrap();

        let log = tokio::fs::read_to_string(temp.path().join("events.log")).await.unwrap();
        assert!(log.contains(events::TASK_FINISHED));
        assert!(log.contains("\"outcome\":\"success\""));
    }
}
