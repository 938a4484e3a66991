//! Integration tests for strata

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// Binary with config and state isolated under `home`
    fn strata(home: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("strata");
        cmd.env("XDG_CONFIG_HOME", home.join("config"))
            .env("XDG_STATE_HOME", home.join("state"))
            .env("HOME", home)
            .env("STRATA_CONFIG", home.join("strata.toml"))
            .env_remove("CI")
            .arg("--no-local");
        cmd
    }

    fn write_config(home: &Path, body: &str) {
        std::fs::write(home.join("strata.toml"), body).unwrap();
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        strata(home.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("layered build cache"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        strata(home.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("strata"));
    }

    #[test]
    fn config_path_follows_override() {
        let home = TempDir::new().unwrap();
        strata(home.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("strata.toml"));
    }

    #[test]
    fn config_show_has_sections() {
        let home = TempDir::new().unwrap();
        strata(home.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]").and(predicate::str::contains("[workspace]")));
    }

    #[test]
    fn config_set_then_show() {
        let home = TempDir::new().unwrap();
        write_config(home.path(), "# keep me\n[cache]\ndesktop = true\n");

        strata(home.path())
            .args(["config", "set", "cache.desktop", "false"])
            .assert()
            .success();

        let text = std::fs::read_to_string(home.path().join("strata.toml")).unwrap();
        assert!(text.contains("# keep me"));

        strata(home.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("desktop = false"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let home = TempDir::new().unwrap();
        strata(home.path())
            .args(["config", "set", "cache.bogus", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown configuration key"));
    }

    #[test]
    fn key_is_deterministic() {
        let home = TempDir::new().unwrap();
        let script = home.path().join("setup.sh");
        std::fs::write(&script, "apt-get install -y git\n").unwrap();

        let run = || {
            let output = strata(home.path())
                .args(["key", script.to_str().unwrap(), "--base-id", "sha256:5a81ad7e"])
                .output()
                .unwrap();
            assert!(output.status.success());
            String::from_utf8(output.stdout).unwrap()
        };

        let first = run();
        assert_eq!(first, run());

        let key = first.lines().next().unwrap();
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(first.contains(&format!("strata-cache:{}", key)));
    }

    #[test]
    fn key_rejects_bad_parent() {
        let home = TempDir::new().unwrap();
        let script = home.path().join("setup.sh");
        std::fs::write(&script, "true\n").unwrap();

        strata(home.path())
            .args(["key", script.to_str().unwrap(), "--parent", "not-a-key"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Not a cache key"));
    }

    #[test]
    fn classify_marks_lines() {
        let home = TempDir::new().unwrap();
        let script = home.path().join("setup.sh");
        std::fs::write(&script, "apt-get install -y git\necho $TASK_ID > /tmp/id\n").unwrap();
        let cached_out = home.path().join("cached.sh");

        strata(home.path())
            .args(["classify", script.to_str().unwrap(), "--cached-out"])
            .arg(&cached_out)
            .assert()
            .success()
            .stdout(predicate::str::contains("C    1").and(predicate::str::contains("R    2")));

        let cached = std::fs::read_to_string(&cached_out).unwrap();
        assert_eq!(cached, "apt-get install -y git");
    }

    #[test]
    fn plan_renders_task_command() {
        let home = TempDir::new().unwrap();
        write_config(
            home.path(),
            "[preflight.cached]\ninline = \"apt-get install -y git\"\n\n[preflight.run]\ninline = \"echo ready\"\n",
        );

        strata(home.path())
            .args(["plan", "--json", "--", "make", "test"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("exec 'make' 'test'")
                    .and(predicate::str::contains("\"caching_enabled\": true")),
            );
    }

    #[test]
    fn plan_without_cache_runs_everything_at_start() {
        let home = TempDir::new().unwrap();
        write_config(
            home.path(),
            "[preflight.cached]\ninline = \"apt-get install -y git\"\n\n[preflight.run]\ninline = \"echo ready\"\n",
        );

        strata(home.path())
            .args(["plan", "--json", "--no-cache"])
            .assert()
            .success()
            .stdout(predicate::str::contains("set -e\\napt-get install -y git\\necho ready\\n"));
    }

    #[test]
    fn workspace_list_empty() {
        let home = TempDir::new().unwrap();
        let root = home.path().join("ws");
        write_config(
            home.path(),
            &format!("[workspace]\nroot = \"{}\"\n", root.display()),
        );

        strata(home.path())
            .args(["workspace", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No task workspaces"));
    }

    #[test]
    fn workspace_reclaim_absent() {
        let home = TempDir::new().unwrap();
        let root = home.path().join("ws");
        write_config(
            home.path(),
            &format!("[workspace]\nroot = \"{}\"\n", root.display()),
        );

        strata(home.path())
            .args(["workspace", "reclaim", "missing-task"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No workspace"));
    }

    #[test]
    fn context_verify_placeholder_fails() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("context.json");
        std::fs::write(&path, r#"{"version":1,"taskId":"t1","repository":null}"#).unwrap();

        strata(home.path())
            .args(["context", "verify"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("not populated"));

        strata(home.path())
            .args(["context", "show"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"taskId\": \"t1\""));
    }

    #[test]
    fn context_show_malformed_fails() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("context.json");
        std::fs::write(&path, "{ not json").unwrap();

        strata(home.path())
            .args(["context", "show"])
            .arg(&path)
            .assert()
            .failure();
    }

    #[test]
    fn run_requires_command() {
        let home = TempDir::new().unwrap();
        strata(home.path()).arg("run").assert().failure();
    }

    #[test]
    fn completions_generate() {
        let home = TempDir::new().unwrap();
        strata(home.path())
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("strata"));
    }
}

mod scenario_tests {
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use strata::checkout::{Checkout, CheckoutError};
    use strata::config::{ChainFailurePolicy, Config};
    use strata::context;
    use strata::layer::{LayerChainSpec, LayerOrchestrator, OrchestratorOptions};
    use strata::orchestration::{BuildRequest, ContainerRuntime, ImageInfo, OutputFn, RunSpec};
    use strata::task::{PreflightScripts, TaskOutcome, TaskRunner, TaskSpec};
    use strata::workspace::{WorkspaceManager, WorkspaceRecord};
    use strata::{StrataError, StrataResult};
    use tempfile::TempDir;
    use tokio::sync::watch;

    #[derive(Default)]
    struct FakeRuntime {
        images: Mutex<HashSet<String>>,
        builds: AtomicUsize,
        runs: AtomicUsize,
        fail_builds: bool,
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
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail_builds {
                return Err(StrataError::ImageBuild {
                    tag: request.tag.clone(),
                    reason: "exit status 1".to_string(),
                });
            }
            self.images.lock().unwrap().insert(request.tag.clone());
            Ok(request.tag.clone())
        }

        async fn run_container(&self, _spec: &RunSpec, _on_output: &OutputFn) -> StrataResult<i32> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }

        async fn kill_container(&self, _name: &str) -> StrataResult<()> {
            Ok(())
        }

        fn runtime_name(&self) -> &'static str {
            "Fake"
        }
    }

    struct NoCheckout;

    #[async_trait]
    impl Checkout for NoCheckout {
        async fn checkout(&self, url: &str, _dest: &Path, _branch: &str) -> Result<String, CheckoutError> {
            Err(CheckoutError::NotARepository(url.to_string()))
        }

        async fn start_branch(&self, _dest: &Path, _branch: &str) -> Result<(), CheckoutError> {
            Ok(())
        }
    }

    fn options() -> OrchestratorOptions {
        OrchestratorOptions {
            namespace: "it-cache".to_string(),
            build_timeout: Duration::from_secs(5),
            on_failure: ChainFailurePolicy::LastResolved,
            lock_dir: None,
        }
    }

    fn chain() -> LayerChainSpec {
        LayerChainSpec::new("base:1")
            .layer("desktop", "apt-get install -y xfce4", true)
            .layer("environment", "pip install ruff", true)
    }

    fn runner(temp: &TempDir, runtime: Arc<FakeRuntime>) -> TaskRunner {
        let mut config = Config::default();
        config.runtime.base_image = "base:1".to_string();
        config.general.audit_log = false;

        TaskRunner::new(config, runtime.clone(), Arc::new(NoCheckout))
            .with_orchestrator(LayerOrchestrator::new(runtime, options()))
            .with_workspaces(WorkspaceManager::new(temp.path()))
    }

    fn scripts() -> PreflightScripts {
        PreflightScripts {
            desktop: "apt-get install -y xfce4".to_string(),
            cached: "pip install ruff".to_string(),
            run: "echo start".to_string(),
        }
    }

    fn task(id: &str) -> TaskSpec {
        let mut spec = TaskSpec::new(id, "env");
        spec.command = vec!["true".to_string()];
        spec
    }

    #[tokio::test]
    async fn cold_then_warm_start() {
        let runtime = Arc::new(FakeRuntime::default());
        let orchestrator = LayerOrchestrator::new(runtime.clone(), options());

        let cold = orchestrator.resolve_image(&chain()).await;
        assert!(cold.used_cache);
        assert_eq!(runtime.builds.load(Ordering::SeqCst), 2);

        let warm = orchestrator.resolve_image(&chain()).await;
        assert_eq!(warm.image_ref, cold.image_ref);
        assert_eq!(runtime.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_tasks_build_each_layer_once() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::default());
        let runner = Arc::new(runner(&temp, runtime.clone()));

        let mut handles = vec![];
        for i in 0..6 {
            let runner = Arc::clone(&runner);
            handles.push(tokio::spawn(async move {
                let quiet: Arc<OutputFn> = Arc::new(|_line: String| {});
                runner
                    .run(&task(&format!("t{}", i)), &scripts(), watch::channel(false).1, quiet)
                    .await
            }));
        }

        for handle in handles {
            let report = handle.await.unwrap().unwrap();
            assert_eq!(report.outcome, TaskOutcome::Success);
            assert!(report.image.used_cache);
        }
        assert_eq!(runtime.builds.load(Ordering::SeqCst), 2);
        assert_eq!(runtime.runs.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn build_failure_still_runs_the_task() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime {
            fail_builds: true,
            ..Default::default()
        });
        let runner = runner(&temp, runtime.clone());
        let quiet: Arc<OutputFn> = Arc::new(|_line: String| {});

        let report = runner
            .run(&task("t1"), &scripts(), watch::channel(false).1, quiet)
            .await
            .unwrap();

        assert_eq!(report.outcome, TaskOutcome::Success);
        assert_eq!(report.image.image_ref, "base:1");
        assert!(!report.image.used_cache);
        let degradation = report.image.degradation.unwrap();
        assert!(degradation.to_string().contains("startup will be slower"));
    }

    #[tokio::test]
    async fn checkout_failure_keeps_placeholder_unpopulated() {
        let temp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::default());
        let runner = runner(&temp, runtime.clone());
        let mut spec = task("t1");
        spec.remote_url = Some("/srv/git/acme/widgets.git".to_string());
        let quiet: Arc<OutputFn> = Arc::new(|_line: String| {});

        let err = runner
            .run(&spec, &scripts(), watch::channel(false).1, quiet)
            .await
            .unwrap_err();

        assert!(matches!(err, StrataError::Checkout(_)));
        assert_eq!(runtime.runs.load(Ordering::SeqCst), 0);

        let dir = runner.workspaces().workspace_dir("env", "t1").unwrap();
        let descriptor = context::read(&context::descriptor_path(&dir)).await.unwrap();
        assert_eq!(descriptor.task_id, "t1");
        assert!(descriptor.repository.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_workspaces() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());

        let old = manager.allocate("env", "old").await.unwrap();
        let recent = manager.allocate("env", "recent").await.unwrap();
        age(old.path(), 10).await;
        age(recent.path(), 2).await;

        let report = manager.sweep_older_than("env", 7).await.unwrap();

        assert_eq!(report.removed, vec![old.path().to_path_buf()]);
        assert!(!old.path().exists());
        assert!(recent.path().exists());
    }

    async fn age(dir: &Path, days: i64) {
        let then = chrono::Utc::now() - chrono::Duration::days(days);
        let mut record = WorkspaceRecord::load(dir).await.unwrap().unwrap();
        record.last_activity = then;
        record.created_at = then;
        record.save(dir).await.unwrap();
        std::fs::File::open(dir)
            .unwrap()
            .set_modified(std::time::SystemTime::from(then))
            .unwrap();
    }
}
