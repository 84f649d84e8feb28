//! Container engine seam.
//!
//! The `ContainerEngine` trait abstracts over the daemon that pulls, tags and
//! pushes images. `DockerCli` drives the `docker` command line; tests use a
//! recording fake.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::{RegistryError, Result};

/// Abstract container engine.
pub trait ContainerEngine {
    /// Authenticate against `registry`.
    fn login(&self, registry: &str, username: &str, password: &str) -> Result<()>;

    /// Pull `image` (a name with optional tag).
    fn pull(&self, image: &str) -> Result<()>;

    /// Add the reference `target` to the local image `source`.
    fn tag(&self, source: &str, target: &str) -> Result<()>;

    /// Push `reference`; returns the manifest digest if the engine reports one.
    fn push(&self, reference: &str) -> Result<Option<String>>;

    /// Local images as `repository:tag` strings.
    fn list_images(&self) -> Result<Vec<String>>;
}

/// Engine backed by the `docker` executable.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        DockerCli::new("docker")
    }
}

impl DockerCli {
    /// Use `program` (a path or a name on `PATH`) as the docker binary.
    pub fn new(program: &str) -> Self {
        DockerCli {
            program: program.to_string(),
        }
    }

    fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let command = format!("{} {}", self.program, args.first().unwrap_or(&""));
        let engine_error = |detail: String| RegistryError::Engine {
            command: command.clone(),
            detail,
        };

        tracing::debug!(%command, "running container engine");
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| engine_error(format!("cannot start {}: {e}", self.program)))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .map_err(|e| engine_error(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| engine_error(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(engine_error(format!(
                "exit status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ContainerEngine for DockerCli {
    fn login(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        self.run(
            &["login", registry, "--username", username, "--password-stdin"],
            Some(password),
        )?;
        Ok(())
    }

    fn pull(&self, image: &str) -> Result<()> {
        self.run(&["pull", image], None)?;
        Ok(())
    }

    fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.run(&["tag", source, target], None)?;
        Ok(())
    }

    fn push(&self, reference: &str) -> Result<Option<String>> {
        let output = self.run(&["push", reference], None)?;
        Ok(parse_push_digest(&output))
    }

    fn list_images(&self) -> Result<Vec<String>> {
        let output = self.run(&["images", "--format", "{{.Repository}}:{{.Tag}}"], None)?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Find `digest: sha256:...` in `docker push` output.
fn parse_push_digest(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("digest: ")?;
        let digest = rest.split_whitespace().next()?;
        digest.starts_with("sha256:").then(|| digest.to_string())
    })
}
