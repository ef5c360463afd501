//! Docker-backed sandbox.
//!
//! The sandbox is a throwaway container (`docker run -d --rm ... sleep
//! infinity`) driven through the Docker CLI. Each command is a separate
//! `docker exec <container> bash -c <script>`, with stdout and stderr
//! captured separately.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::{in_directory, quote, ExecOutput, SandboxExecutor};
use crate::config::SandboxConfig;

/// One command of the initial container setup.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupStep {
    pub description: &'static str,
    pub command: String,
}

/// A running sandbox container.
///
/// Owned exclusively by one session. `stop()` must be called when the
/// session ends; if it never runs (panic path), `Drop` issues a blocking
/// best-effort `docker stop`.
pub struct DockerSandbox {
    docker: String,
    name: String,
    stopped: AtomicBool,
}

impl DockerSandbox {
    /// Starts a fresh container and runs the initial setup.
    ///
    /// Any failure here is fatal for the session: the container (if it was
    /// started) is stopped before the error is returned.
    pub async fn provision(config: &SandboxConfig) -> Result<Self> {
        let version = run_docker(
            &config.docker,
            &["version", "--format", "{{.Server.Version}}"],
        )
        .await;
        if !version.succeeded() {
            bail!(
                "Docker is not available ({}): {}",
                config.docker,
                version.stderr
            );
        }
        info!("Docker connected (server {})", version.stdout);

        let inspect =
            run_docker(&config.docker, &["image", "inspect", config.image.as_str()]).await;
        if inspect.succeeded() {
            info!("Image '{}' found locally", config.image);
        } else {
            info!("Image '{}' not found locally, pulling...", config.image);
            let pull = run_docker(&config.docker, &["pull", config.image.as_str()]).await;
            if !pull.succeeded() {
                bail!("Failed to pull image '{}': {}", config.image, pull.stderr);
            }
            info!("Image '{}' pulled", config.image);
        }

        let name = container_name(&config.name_prefix);
        let started = run_docker(
            &config.docker,
            &[
                "run",
                "-d",
                "--rm",
                "--name",
                name.as_str(),
                config.image.as_str(),
                "sleep",
                "infinity",
            ],
        )
        .await;
        if !started.succeeded() {
            bail!("Failed to start container from '{}': {}", config.image, started.stderr);
        }

        let id: String = started.stdout.chars().take(12).collect();
        info!("Container '{name}' ({id}) is up from image '{}'", config.image);

        let sandbox = Self {
            docker: config.docker.clone(),
            name,
            stopped: AtomicBool::new(false),
        };

        if config.setup {
            if let Err(e) = sandbox.perform_setup(config).await {
                error!("Initial container setup failed: {e}");
                if let Err(stop_err) = sandbox.stop().await {
                    warn!("Failed to stop container after setup failure: {stop_err}");
                }
                return Err(e);
            }
        }

        Ok(sandbox)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `script` through `bash -c` in the container, as-is.
    pub async fn exec_script(&self, script: &str) -> ExecOutput {
        run_docker(&self.docker, &["exec", self.name.as_str(), "bash", "-c", script]).await
    }

    async fn perform_setup(&self, config: &SandboxConfig) -> Result<()> {
        let steps = setup_steps(config);
        info!("Performing initial setup for container '{}'", self.name);

        for (i, step) in steps.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, steps.len(), step.description);
            let output = self.exec_script(&step.command).await;
            if !output.succeeded() {
                return Err(anyhow!(
                    "Setup step '{}' failed (exit {}): {}",
                    step.description,
                    output.exit_code,
                    if output.stderr.is_empty() { &output.stdout } else { &output.stderr }
                ));
            }
            if !output.stdout.is_empty() {
                debug!("Setup output: {}", output.stdout);
            }
            if !output.stderr.is_empty() {
                debug!("Setup stderr (warning): {}", output.stderr);
            }
        }

        info!("Initial container setup completed");
        Ok(())
    }

    /// Stops (and, through `--rm`, removes) the container. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        info!("Stopping container '{}'", self.name);
        let output = run_docker(&self.docker, &["stop", self.name.as_str()]).await;
        if output.succeeded() {
            info!("Container '{}' stopped", self.name);
        } else if output.stderr.contains("No such container") {
            info!("Container '{}' already gone", self.name);
        } else {
            // Left unset so `Drop` still tries
            return Err(anyhow!("docker stop {}: {}", self.name, output.stderr));
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SandboxExecutor for DockerSandbox {
    async fn run(&self, command: &str, working_directory: &str) -> ExecOutput {
        match in_directory(command, working_directory) {
            Some(script) => {
                debug!("Exec in '{working_directory}': {command}");
                self.exec_script(&script).await
            }
            None => ExecOutput::transport_error(format!(
                "working directory cannot be quoted: {working_directory:?}"
            )),
        }
    }
}

impl Drop for DockerSandbox {
    fn drop(&mut self) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        warn!("Container '{}' was not stopped, stopping it now", self.name);
        let _ = std::process::Command::new(&self.docker)
            .args(["stop", self.name.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// Runs the Docker CLI and captures its output. Never fails: spawn errors
/// come back as a transport failure.
async fn run_docker(docker: &str, args: &[&str]) -> ExecOutput {
    let output = Command::new(docker)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(out) => ExecOutput {
            exit_code: out.status.code().unwrap_or(super::TRANSPORT_FAILURE),
            stdout: String::from_utf8_lossy(&out.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        },
        Err(e) => {
            error!("Failed to run {docker} {}: {e}", args.first().unwrap_or(&""));
            ExecOutput::transport_error(format!("failed to run {docker}: {e}"))
        }
    }
}

fn container_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..8])
}

/// The initial setup sequence for an apt-based image.
pub fn setup_steps(config: &SandboxConfig) -> Vec<SetupStep> {
    let mut steps = Vec::new();

    if let Some(mirror) = config.mirror.as_deref() {
        let mirror = mirror.trim_end_matches('/');
        let release = &config.release;
        let sources = ["", "-updates", "-backports", "-security"]
            .iter()
            .map(|suffix| {
                format!("deb {mirror}/ {release}{suffix} main restricted universe multiverse")
            })
            .collect::<Vec<_>>()
            .join("\n");
        // Quoting only fails on NUL, which a TOML string cannot produce
        if let Some(quoted) = quote(&sources) {
            steps.push(SetupStep {
                description: "Writing apt sources for the configured mirror",
                command: format!("echo {quoted} > /etc/apt/sources.list"),
            });
            steps.push(SetupStep {
                description: "Clearing additional apt source lists",
                command: "rm -f /etc/apt/sources.list.d/* || true".to_string(),
            });
        }
    }

    steps.push(SetupStep {
        description: "Making apt non-interactive",
        command: "echo 'DEBIAN_FRONTEND=noninteractive' >> /etc/environment".to_string(),
    });
    steps.push(SetupStep {
        description: "Updating package lists",
        command: "apt-get update -y".to_string(),
    });
    steps.push(SetupStep {
        description: "Upgrading system packages",
        command: "apt-get upgrade -y -o Dpkg::Options::=--force-confdef \
                  -o Dpkg::Options::=--force-confold"
            .to_string(),
    });
    steps.push(SetupStep {
        description: "Cleaning up unused packages",
        command: "apt-get autoremove -y && apt-get clean -y".to_string(),
    });
    steps.push(SetupStep {
        description: "Verifying apt configuration",
        command: "apt-cache policy".to_string(),
    });

    for step in &mut steps {
        if step.command.contains("apt-get") {
            step.command = format!("DEBIAN_FRONTEND=noninteractive {}", step.command);
        }
    }

    steps
}
