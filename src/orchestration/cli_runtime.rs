//! CLI-driven container runtime
//!
//! Implements the ContainerRuntime trait by shelling out to `podman` or
//! `docker`. Both accept the same `build`/`run`/`rm` surface we use,
//! except Docker has no `image exists` and needs `image inspect`.

use crate::error::{StrataError, StrataResult};
use crate::orchestration::runtime::{ContainerRuntime, OutputFn};
use crate::orchestration::types::{BuildRequest, ImageInfo, RunSpec};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Name of the generated Containerfile inside a build context
const CONTAINERFILE: &str = "Containerfile";

/// `image inspect` format producing `<id>|<user>`
const INSPECT_FORMAT: &str = "{{.Id}}|{{.Config.User}}";

/// Supported engine binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Podman,
    Docker,
}

impl Engine {
    /// Parse from the `runtime.engine` config value
    pub fn parse(name: &str) -> StrataResult<Self> {
        match name {
            "podman" => Ok(Self::Podman),
            "docker" => Ok(Self::Docker),
            other => Err(StrataError::UnsupportedEngine(other.to_string())),
        }
    }

    /// Executable name
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }
}

/// Container runtime that drives an engine CLI
pub struct CliRuntime {
    engine: Engine,
    builds_dir: PathBuf,
}

impl CliRuntime {
    /// Create a runtime for the given engine, staging build contexts under `builds_dir`
    pub fn new(engine: Engine, builds_dir: PathBuf) -> Self {
        Self { engine, builds_dir }
    }

    /// Execute an engine command and return the output
    async fn exec(&self, args: &[&str]) -> StrataResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.engine.binary(), args);

        Command::new(self.engine.binary())
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(args, e))
    }

    fn spawn_error<S: std::fmt::Debug>(&self, args: &[S], e: std::io::Error) -> StrataError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StrataError::RuntimeNotFound(self.engine.binary().to_string())
        } else {
            StrataError::command_failed(format!("{} {:?}", self.engine.binary(), args), e)
        }
    }

    /// Spawn an engine command with piped output, killed if the handle is dropped
    fn spawn_piped(&self, args: &[String]) -> StrataResult<tokio::process::Child> {
        debug!("Spawning: {} {:?}", self.engine.binary(), args);

        Command::new(self.engine.binary())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(args, e))
    }

    /// Write the Containerfile and context files into a fresh directory
    async fn prepare_context(&self, request: &BuildRequest) -> StrataResult<BuildDir> {
        let path = self.builds_dir.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StrataError::io("creating build directory", e))?;
        let build_dir = BuildDir(path);
        let path = build_dir.path();

        for (name, content) in &request.context_files {
            validate_context_name(name)?;
            tokio::fs::write(path.join(name), content)
                .await
                .map_err(|e| StrataError::io(format!("writing {}", name), e))?;
        }

        tokio::fs::write(path.join(CONTAINERFILE), &request.instructions)
            .await
            .map_err(|e| StrataError::io("writing Containerfile", e))?;

        Ok(build_dir)
    }

    async fn build_in(
        &self,
        build_dir: &Path,
        request: &BuildRequest,
        on_output: &OutputFn,
    ) -> StrataResult<String> {
        let args = vec![
            "build".to_string(),
            "-t".to_string(),
            request.tag.clone(),
            "-f".to_string(),
            build_dir.join(CONTAINERFILE).display().to_string(),
            build_dir.display().to_string(),
        ];
        let mut child = self.spawn_piped(&args)?;

        let all_output = super::stream_child_output(&mut child, on_output).await;

        let status = child
            .wait()
            .await
            .map_err(|e| StrataError::command_failed(format!("{} build", self.engine.binary()), e))?;

        if !status.success() {
            let combined = all_output.join("\n");
            return Err(StrataError::ImageBuild {
                tag: request.tag.clone(),
                reason: super::build_error_output(&combined, ""),
            });
        }

        info!("Built image {}", request.tag);
        Ok(request.tag.clone())
    }
}

/// Staged build context, removed when dropped.
///
/// The orchestrator bounds builds with a timeout that drops the build
/// future, so cleanup cannot wait for the build to return.
struct BuildDir(PathBuf);

impl BuildDir {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for BuildDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            debug!("Could not remove build directory {}: {}", self.0.display(), e);
        }
    }
}

/// Parse `INSPECT_FORMAT` output
fn parse_inspect(image: &str, stdout: &str) -> StrataResult<ImageInfo> {
    let line = stdout.lines().next().unwrap_or_default().trim();
    match line.split_once('|') {
        Some((id, user)) if !id.is_empty() => Ok(ImageInfo {
            id: id.to_string(),
            user: user.trim().to_string(),
        }),
        _ => Err(StrataError::Internal(format!(
            "unexpected inspect output for {}: '{}'",
            image, line
        ))),
    }
}

/// Build context file names must stay inside the context directory
fn validate_context_name(name: &str) -> StrataResult<()> {
    let valid = !name.is_empty()
        && name != CONTAINERFILE
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StrataError::Internal(format!(
            "invalid build context file name '{}'",
            name
        )))
    }
}

/// Assemble `run` arguments for a task container
pub(crate) fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--rm".to_string()];

    if let Some(ref name) = spec.name {
        args.push("--name".to_string());
        args.push(name.clone());
    }

    args.push("-w".to_string());
    args.push(spec.workdir.clone());

    for mount in &spec.mounts {
        args.push("-v".to_string());
        args.push(mount.volume_arg());
    }

    for (k, v) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", k, v));
    }

    args.push(spec.image.clone());
    args.extend(spec.commands.iter().cloned());
    args
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn image_exists(&self, image: &str) -> StrataResult<bool> {
        let output = match self.engine {
            Engine::Podman => self.exec(&["image", "exists", image]).await?,
            Engine::Docker => self.exec(&["image", "inspect", image]).await?,
        };
        Ok(output.status.success())
    }

    async fn inspect_image(&self, image: &str) -> StrataResult<ImageInfo> {
        if !self.image_exists(image).await? {
            info!("Pulling {}", image);
            let output = self.exec(&["pull", image]).await?;
            if !output.status.success() {
                return Err(StrataError::command_exec(
                    format!("{} pull {}", self.engine.binary(), image),
                    String::from_utf8_lossy(&output.stderr),
                ));
            }
        }

        let output = self
            .exec(&["image", "inspect", "--format", INSPECT_FORMAT, image])
            .await?;
        if !output.status.success() {
            return Err(StrataError::command_exec(
                format!("{} image inspect {}", self.engine.binary(), image),
                String::from_utf8_lossy(&output.stderr),
            ));
        }
        parse_inspect(image, &String::from_utf8_lossy(&output.stdout))
    }

    async fn build_image(
        &self,
        request: &BuildRequest,
        on_output: &OutputFn,
    ) -> StrataResult<String> {
        let build_dir = self.prepare_context(request).await?;
        self.build_in(build_dir.path(), request, on_output).await
    }

    async fn run_container(&self, spec: &RunSpec, on_output: &OutputFn) -> StrataResult<i32> {
        let args = run_args(spec);
        let mut child = self.spawn_piped(&args)?;

        let all_output = super::stream_child_output(&mut child, on_output).await;

        let status = child
            .wait()
            .await
            .map_err(|e| StrataError::command_failed(format!("{} run", self.engine.binary()), e))?;

        match status.code() {
            Some(code) => Ok(code),
            None => Err(StrataError::ContainerRun {
                image: spec.image.clone(),
                reason: format!(
                    "terminated by signal\n{}",
                    super::build_error_output(&all_output.join("\n"), "")
                ),
            }),
        }
    }

    async fn kill_container(&self, name: &str) -> StrataResult<()> {
        let output = self.exec(&["rm", "-f", name]).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || stderr.to_lowercase().contains("no such container") {
            debug!("Removed container {}", name);
            Ok(())
        } else {
            Err(StrataError::command_exec(
                format!("{} rm -f {}", self.engine.binary(), name),
                stderr,
            ))
        }
    }

    fn runtime_name(&self) -> &'static str {
        match self.engine {
            Engine::Podman => "Podman",
            Engine::Docker => "Docker",
        }
    }
}
