// Container runtime invocation, startup detection and image provisioning

use crate::error::RuntimeError;
use log::{info, warn};
use std::fmt;
use std::fs;
use std::process::{Command, Stdio};

const DOCKERFILE: &str = include_str!("../docker/Dockerfile");

/// How to invoke the container runtime, e.g. `docker` or `sudo -n docker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCommand {
    program: String,
    prefix: Vec<String>,
}

impl RuntimeCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix: Vec::new(),
        }
    }

    pub fn with_prefix<I, S>(program: impl Into<String>, prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            prefix: prefix.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a whitespace-separated invocation such as `sudo -n docker`.
    pub fn parse(spec: &str) -> Option<Self> {
        let mut words = spec.split_whitespace();
        let program = words.next()?;
        Some(Self::with_prefix(program, words))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// A fresh `Command` with the invocation prefix already applied.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix);
        cmd
    }
}

impl Default for RuntimeCommand {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl fmt::Display for RuntimeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.prefix {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Find a usable runtime invocation for `spec`, once, at startup.
///
/// The program must be on PATH and `<runtime> ps` must succeed. A bare
/// program name that lacks permission is retried through `sudo -n`.
pub fn detect(spec: &str) -> Result<RuntimeCommand, RuntimeError> {
    let runtime = RuntimeCommand::parse(spec).unwrap_or_default();
    let path = which::which(runtime.program()).map_err(|source| RuntimeError::BinaryNotFound {
        binary: runtime.program().to_string(),
        source,
    })?;
    info!("container runtime `{}` found at {}", runtime, path.display());

    if probe(&runtime)? {
        info!("`{runtime} ps` succeeded; using direct invocation");
        return Ok(runtime);
    }

    if runtime.prefix.is_empty() && which::which("sudo").is_ok() {
        warn!("`{runtime} ps` failed; trying passwordless sudo");
        let elevated = RuntimeCommand::with_prefix("sudo", ["-n", runtime.program()]);
        if probe(&elevated)? {
            info!("`{elevated} ps` succeeded; using sudo invocation");
            return Ok(elevated);
        }
    }

    Err(RuntimeError::PermissionDenied {
        binary: runtime.program().to_string(),
    })
}

fn probe(runtime: &RuntimeCommand) -> Result<bool, RuntimeError> {
    let status = runtime
        .command()
        .arg("ps")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    Ok(status.success())
}

/// Build the sandbox image unless the runtime already has it.
pub fn ensure_image(runtime: &RuntimeCommand, image: &str) -> Result<(), RuntimeError> {
    let present = runtime
        .command()
        .args(["image", "inspect", image])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?
        .success();
    if present {
        info!("image `{image}` already present");
        return Ok(());
    }
    build_image(runtime, image)
}

/// Build `image` from the bundled Dockerfile in a scratch directory.
pub fn build_image(runtime: &RuntimeCommand, image: &str) -> Result<(), RuntimeError> {
    let context = tempfile::TempDir::new()?;
    fs::write(context.path().join("Dockerfile"), DOCKERFILE)?;

    info!("building image `{image}`");
    let status = runtime
        .command()
        .args(["build", "-t", image, "."])
        .current_dir(context.path())
        .stdin(Stdio::null())
        .status()?;

    if !status.success() {
        return Err(RuntimeError::ImageBuild {
            image: image.to_string(),
            status: status.to_string(),
        });
    }
    info!("image `{image}` ready");
    Ok(())
}
