// Shared helpers for tests that need a container runtime

#![allow(dead_code)]

use shellblocks::{RuntimeCommand, SandboxConfig, SandboxExecutor};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stands in for `docker`: skips the `run` flags and image name, then runs
/// `bash -c <payload>` on the host. The image `broken-image` fails the way a
/// runtime does when it cannot start a container.
const FAKE_RUNTIME: &str = r#"case "$1" in
  run) ;;
  *) exit 0 ;;
esac
while [ "$#" -gt 0 ]; do
  case "$1" in
    broken-image)
      echo "Unable to find image 'broken-image' locally" >&2
      exit 125
      ;;
    bash)
      shift
      exec bash "$@"
      ;;
  esac
  shift
done
exit 0
"#;

/// Write the fake runtime into `dir` and return its path.
pub fn write_fake_runtime(dir: &Path) -> PathBuf {
    write_runtime_script(dir, "")
}

/// Write the fake runtime with `prelude` run first, e.g. to override `kill`.
pub fn write_runtime_script(dir: &Path, prelude: &str) -> PathBuf {
    let path = dir.join("fake-runtime.sh");
    fs::write(&path, format!("{prelude}\n{FAKE_RUNTIME}")).unwrap();
    path
}

/// Invocation for the fake runtime. It runs through `sh` so the test never
/// execs a file it has just written.
pub fn fake_runtime(dir: &Path) -> RuntimeCommand {
    runtime_for(&write_fake_runtime(dir))
}

pub fn runtime_for(script: &Path) -> RuntimeCommand {
    RuntimeCommand::with_prefix("sh", [script.to_string_lossy().into_owned()])
}

pub fn fake_config(dir: &Path) -> SandboxConfig {
    SandboxConfig {
        runtime: fake_runtime(dir),
        image: "test-image".to_string(),
        timeout: Duration::from_secs(5),
        ..SandboxConfig::default()
    }
}

pub fn fake_executor(dir: &Path) -> SandboxExecutor {
    SandboxExecutor::new(fake_config(dir))
}

/// Helper to create a temporary directory for tests
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().unwrap()
}
