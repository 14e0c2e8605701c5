// Sandbox executor: runs a graded payload inside a throwaway container
//
// A run is one container process: level setup, then the learner's script,
// then the verification script, all in a single `bash -c`. The container has
// no network, capped memory and CPU, and is removed when it exits. Whatever
// happens, the caller gets an `ExecutionResult` back.

use crate::runtime::RuntimeCommand;
use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::ops::RangeInclusive;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;
use wait_timeout::ChildExt;

/// Exit status reported when a run hits the wall-clock limit.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Statuses the container runtime uses for "could not start the payload".
pub const RUNTIME_FAILURE_CODES: RangeInclusive<i32> = 125..=127;

/// Environment variable naming the file that holds the learner's output.
pub const OUTPUT_VAR: &str = "SHELLBLOCKS_OUTPUT";

const SETUP_FAILED: &str = "shellblocks: level setup failed";

/// How long `<runtime> kill` may take before it is abandoned.
const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl ExecutionResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// The verification script accepted the learner's program.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub runtime: RuntimeCommand,
    pub image: String,
    /// Memory ceiling in the runtime's syntax, e.g. `128m`.
    pub memory: String,
    /// Fractional CPU ceiling, e.g. `0.5`.
    pub cpus: String,
    pub timeout: Duration,
    /// Bytes kept per captured stream.
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeCommand::default(),
            image: "shellblocks-env".to_string(),
            memory: "128m".to_string(),
            cpus: "0.5".to_string(),
            timeout: Duration::from_secs(5),
            max_output_bytes: 64 * 1024,
        }
    }
}

/// Build the single script a sandbox run executes.
///
/// Setup output is discarded and a failed setup stops the run. The learner's
/// stdout and stderr are merged, shown, and copied to `$SHELLBLOCKS_OUTPUT`.
/// The verification script runs last, so its status is the run's status.
pub fn assemble_payload(
    user_script: &str,
    setup_commands: &[String],
    verification_script: &str,
) -> String {
    let mut payload = format!(
        "export {OUTPUT_VAR}=\"$(mktemp)\"\ntrap 'rm -f \"${OUTPUT_VAR}\"' EXIT\n"
    );

    let setup: Vec<&str> = setup_commands
        .iter()
        .map(|c| c.trim().trim_end_matches(';').trim_end())
        .filter(|c| !c.is_empty())
        .collect();
    if !setup.is_empty() {
        payload.push_str(&format!(
            "{{ {}; }} > /dev/null 2>&1 || {{ echo '{SETUP_FAILED}' >&2; exit 1; }}\n",
            setup.join("; ")
        ));
    }

    let user = if user_script.trim().is_empty() {
        ":"
    } else {
        user_script.trim_end()
    };
    payload.push_str(&format!("{{\n{user}\n}} 2>&1 | tee \"${OUTPUT_VAR}\"\n"));

    if verification_script.trim().is_empty() {
        payload.push_str("true");
    } else {
        payload.push_str(verification_script.trim_end());
    }
    payload
}

/// Runs payloads in isolated containers. Holds configuration only.
#[derive(Debug, Clone, Default)]
pub struct SandboxExecutor {
    config: SandboxConfig,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run one graded payload and wait for it, at most `timeout` plus cleanup.
    pub fn run(
        &self,
        user_script: &str,
        setup_commands: &[String],
        verification_script: &str,
    ) -> ExecutionResult {
        let payload = assemble_payload(user_script, setup_commands, verification_script);
        let container = format!("shellblocks-{}", Uuid::new_v4().simple());

        match self.launch(&container, &payload) {
            Ok(result) => result,
            Err(e) => {
                error!("sandbox run {container} failed: {e}");
                ExecutionResult::new("", e.to_string(), 1)
            }
        }
    }

    /// Same as `run`, on a worker thread.
    pub fn spawn(
        &self,
        user_script: String,
        setup_commands: Vec<String>,
        verification_script: String,
    ) -> JoinHandle<ExecutionResult> {
        let executor = self.clone();
        thread::spawn(move || executor.run(&user_script, &setup_commands, &verification_script))
    }

    fn launch(&self, container: &str, payload: &str) -> io::Result<ExecutionResult> {
        let config = &self.config;
        info!(
            "starting {container} (image {}, memory {}, cpus {}, timeout {:?})",
            config.image, config.memory, config.cpus, config.timeout
        );
        debug!("payload for {container}:\n{payload}");

        let mut cmd = config.runtime.command();
        cmd.args(["run", "--rm", "--net", "none"])
            .args(["--memory", config.memory.as_str()])
            .args(["--cpus", config.cpus.as_str()])
            .args(["--name", container])
            .arg(&config.image)
            .args(["bash", "-c", payload])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = cmd.spawn()?;
        let group = Pid::from_raw(child.id() as i32);
        let stdout = spawn_reader(child.stdout.take(), config.max_output_bytes);
        let stderr = spawn_reader(child.stderr.take(), config.max_output_bytes);

        let status = match child.wait_timeout(config.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!("{container} timed out after {:?}", config.timeout);
                self.terminate(&mut child, container);
                return Ok(ExecutionResult::new(
                    "",
                    format!(
                        "shellblocks: execution timed out after {}s",
                        config.timeout.as_secs_f64()
                    ),
                    TIMEOUT_EXIT_CODE,
                ));
            }
            Err(e) => {
                self.terminate(&mut child, container);
                return Err(e);
            }
        };

        // Background jobs left behind would keep the output pipes open.
        sweep_group(group, container);

        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;
        let code = exit_code(status);
        debug!("{container} exited with {code}; stdout:\n{stdout}");

        if RUNTIME_FAILURE_CODES.contains(&code) {
            warn!("{container}: runtime could not start the payload (exit {code})");
            let stderr = format!(
                "shellblocks: container runtime could not start the payload (exit {code})\n{stderr}"
            );
            return Ok(ExecutionResult::new(stdout, stderr, code));
        }
        info!("{container} finished with exit code {code}");
        Ok(ExecutionResult::new(stdout, stderr, code))
    }

    /// Kill the runtime client's process group, then the container itself.
    fn terminate(&self, child: &mut Child, container: &str) {
        let group = Pid::from_raw(child.id() as i32);
        if let Err(e) = killpg(group, Signal::SIGKILL) {
            debug!("killpg({group}) failed: {e}; killing client only");
            let _ = child.kill();
        }
        let _ = child.wait();

        // The runtime client dying does not stop a container that already started.
        let killed = self
            .config
            .runtime
            .command()
            .args(["kill", container])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn();
        match killed {
            Ok(kill) => reap_within(kill, KILL_GRACE, &format!("kill {container}")),
            Err(e) => warn!("could not kill container {container}: {e}"),
        }
    }
}

/// SIGKILL whatever is left in a finished run's process group.
///
/// The group id stays reserved while any member is alive, so an empty group
/// shows up as `ESRCH` rather than hitting an unrelated process. Returns
/// whether anything was signalled.
fn sweep_group(group: Pid, container: &str) -> bool {
    match killpg(group, Signal::SIGKILL) {
        Ok(()) => {
            debug!("{container}: killed leftover processes in group {group}");
            true
        }
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!("{container}: could not sweep process group {group}: {e}");
            false
        }
    }
}

/// Wait up to `grace` for a helper command, then kill its whole group.
fn reap_within(mut child: Child, grace: Duration, what: &str) {
    match child.wait_timeout(grace) {
        Ok(Some(status)) => debug!("`{what}` exited with {status}"),
        Ok(None) => {
            warn!("`{what}` still running after {grace:?}; abandoning it");
            if killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL).is_err() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
        Err(e) => {
            warn!("waiting for `{what}` failed: {e}");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

fn spawn_reader<R>(stream: Option<R>, limit: usize) -> Option<JoinHandle<io::Result<Captured>>>
where
    R: Read + Send + 'static,
{
    stream.map(|mut stream| thread::spawn(move || read_bounded(&mut stream, limit)))
}

/// Keep the first `limit` bytes and drain the rest so the writer never blocks.
fn read_bounded<R: Read>(stream: &mut R, limit: usize) -> io::Result<Captured> {
    let mut bytes = Vec::new();
    stream.by_ref().take(limit as u64).read_to_end(&mut bytes)?;
    let rest = io::copy(stream, &mut io::sink())?;
    Ok(Captured {
        bytes,
        truncated: rest > 0,
    })
}

fn collect(reader: Option<JoinHandle<io::Result<Captured>>>) -> io::Result<String> {
    let Some(reader) = reader else {
        return Ok(String::new());
    };
    let captured = reader
        .join()
        .map_err(|_| io::Error::other("output reader thread panicked"))??;

    let mut text = String::from_utf8_lossy(&captured.bytes).into_owned();
    if captured.truncated {
        text.push_str(&format!(
            "\n[shellblocks: output truncated after {} bytes]",
            captured.bytes.len()
        ));
    }
    Ok(text)
}

fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Instant;

    #[test]
    fn sweep_kills_leftover_group_members() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 30 & echo started"])
            .stdout(Stdio::piped())
            .process_group(0)
            .spawn()
            .unwrap();
        let group = Pid::from_raw(child.id() as i32);
        let mut stdout = child.stdout.take().unwrap();
        child.wait().unwrap();

        let started = Instant::now();
        assert!(sweep_group(group, "test"));
        // EOF arrives only once the backgrounded sleep is gone.
        let mut text = String::new();
        stdout.read_to_string(&mut text).unwrap();
        assert_eq!(text, "started\n");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn sweeping_an_empty_group_signals_nothing() {
        let mut child = Command::new("true").process_group(0).spawn().unwrap();
        let group = Pid::from_raw(child.id() as i32);
        child.wait().unwrap();
        assert!(!sweep_group(group, "test"));
    }

    #[test]
    fn hung_helper_is_abandoned_after_grace() {
        let child = Command::new("sh")
            .args(["-c", "sleep 30"])
            .process_group(0)
            .spawn()
            .unwrap();
        let started = Instant::now();
        reap_within(child, Duration::from_millis(200), "sleep 30");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn payload_runs_setup_user_then_verification() {
        let payload = assemble_payload(
            "touch /tmp/x/f",
            &["mkdir -p /tmp/x".to_string(), "cd /tmp/x;".to_string()],
            "test -f /tmp/x/f",
        );
        let setup = payload.find("{ mkdir -p /tmp/x; cd /tmp/x; } > /dev/null 2>&1 ||").unwrap();
        let user = payload.find("{\ntouch /tmp/x/f\n} 2>&1 | tee").unwrap();
        let verification = payload.find("test -f /tmp/x/f").unwrap();
        assert!(setup < user && user < verification);
        assert!(payload.ends_with("test -f /tmp/x/f"));
    }

    #[test]
    fn payload_without_setup_or_verification() {
        let payload = assemble_payload("echo hi", &[], "   ");
        assert!(!payload.contains(SETUP_FAILED));
        assert!(payload.ends_with("\ntrue"));
    }

    #[test]
    fn blank_setup_lines_are_ignored() {
        let payload = assemble_payload("echo hi", &["".to_string(), "  ".to_string()], "");
        assert!(!payload.contains("/dev/null"));
    }

    #[test]
    fn empty_user_script_is_a_no_op() {
        let payload = assemble_payload("", &[], "");
        assert!(payload.contains("{\n:\n} 2>&1"));
    }

    #[test]
    fn bounded_reader_drains_and_flags_overflow() {
        let mut input: &[u8] = b"abcdefghij";
        let captured = read_bounded(&mut input, 4).unwrap();
        assert_eq!(captured.bytes, b"abcd");
        assert!(captured.truncated);
        assert!(input.is_empty());

        let mut short: &[u8] = b"ab";
        assert!(!read_bounded(&mut short, 4).unwrap().truncated);
    }

    #[test]
    fn result_serializes_camel_case() {
        let json = serde_json::to_value(ExecutionResult::new("out", "err", 3)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"stdout": "out", "stderr": "err", "exitCode": 3})
        );
    }
}
