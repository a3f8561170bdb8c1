//! Process invoker: launch an external command, feed it input, collect its
//! output, and bound its lifetime.
//!
//! This is the only place that touches OS process primitives. Every call
//! owns its child and its buffers, so any number of invocations can run
//! concurrently.
//!
//! Timeout escalation:
//!
//! ```text
//! spawn ──► wait ──(timeout)──► SIGTERM ──(KILL_GRACE)──► SIGKILL
//! ```
//!
//! On unix the child leads its own process group and both signals go to the
//! whole group, so helpers the agent forked do not outlive a timed-out call.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Time between the termination signal and the forced kill.
pub const KILL_GRACE: Duration = Duration::from_millis(1000);

/// How long output readers may keep draining after the process is gone.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Exit code reported when the process could not be launched or was
/// terminated by a signal.
pub const FAILURE_EXIT_CODE: i32 = 1;

/// A command to run.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// Executable to launch.
    pub program: PathBuf,
    /// Positional arguments.
    pub args: Vec<String>,
    /// Extra environment variables, layered over the inherited environment.
    pub env: Vec<(String, String)>,
    /// Data written to the child's stdin before it is closed.
    pub stdin: Option<String>,
    /// Wall-clock limit before termination starts.
    pub timeout: Duration,
    /// Working directory for the child.
    pub current_dir: Option<PathBuf>,
}

impl InvokeRequest {
    /// Creates a request for `program` with no arguments and a 5 minute limit.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            timeout: Duration::from_secs(300),
            current_dir: None,
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several positional arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the stdin payload.
    pub fn with_stdin(mut self, input: Option<String>) -> Self {
        self.stdin = input;
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the working directory.
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

/// Everything collected from one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Captured standard output, decoded lossily.
    pub stdout: String,
    /// Captured standard error, decoded lossily.
    pub stderr: String,
    /// Exit code; [`FAILURE_EXIT_CODE`] on launch failure or signal death.
    pub exit_code: i32,
    /// Milliseconds from invocation start to exit or forced kill.
    pub wall_time_ms: u64,
    /// Whether the timeout fired.
    pub timed_out: bool,
}

impl ProcessOutput {
    fn launch_failure(wall_time_ms: u64) -> Self {
        Self {
            exit_code: FAILURE_EXIT_CODE,
            wall_time_ms,
            ..Default::default()
        }
    }
}

/// Runs `request` to completion and returns what it produced.
///
/// Never fails: a launch failure comes back as exit code 1 with empty
/// output, and a process that outlives its timeout is terminated and
/// reported with a non-zero exit code.
pub async fn invoke(request: &InvokeRequest) -> ProcessOutput {
    let start = Instant::now();

    let mut command = Command::new(&request.program);
    command
        .args(&request.args)
        .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &request.current_dir {
        command.current_dir(dir);
    }
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(
                program = %request.program.display(),
                error = %e,
                "Failed to launch process"
            );
            return ProcessOutput::launch_failure(elapsed_ms(start));
        }
    };

    debug!(
        program = %request.program.display(),
        pid = ?child.id(),
        "Process started"
    );

    let stdin_task = child.stdin.take().map(|mut stdin| {
        let input = request.stdin.clone();
        tokio::spawn(async move {
            if let Some(input) = input {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(error = %e, "Process closed stdin before input was written");
                }
            }
            let _ = stdin.shutdown().await;
        })
    });
    let stdout_task = child.stdout.take().map(spawn_reader);
    let stderr_task = child.stderr.take().map(spawn_reader);

    let (status, timed_out) = match tokio::time::timeout(request.timeout, child.wait()).await {
        Ok(status) => (status.ok(), false),
        Err(_) => {
            warn!(
                program = %request.program.display(),
                timeout_ms = request.timeout.as_millis() as u64,
                "Process exceeded timeout, terminating"
            );
            (terminate(&mut child).await, true)
        }
    };
    let wall_time_ms = elapsed_ms(start);

    if let Some(task) = stdin_task {
        task.abort();
    }
    let (stdout, stderr) = tokio::join!(drain(stdout_task), drain(stderr_task));

    let exit_code = status
        .and_then(|s| s.code())
        .unwrap_or(FAILURE_EXIT_CODE);

    debug!(
        program = %request.program.display(),
        exit_code,
        wall_time_ms,
        timed_out,
        "Process finished"
    );

    ProcessOutput {
        stdout,
        stderr,
        exit_code,
        wall_time_ms,
        timed_out,
    }
}

/// Sends the graceful signal, then force-kills after [`KILL_GRACE`].
async fn terminate(child: &mut Child) -> Option<ExitStatus> {
    let pid = child.id();
    send_termination_signal(child);

    let status = match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(status) => status.ok(),
        Err(_) => {
            warn!(pid = ?pid, "Process ignored termination signal, killing");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill process");
            }
            child.wait().await.ok()
        }
    };
    kill_process_group(pid);
    status
}

#[cfg(unix)]
fn send_termination_signal(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!(pid, error = %e, "SIGTERM failed");
        }
    }
}

#[cfg(not(unix))]
fn send_termination_signal(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Failed to signal process");
    }
}

/// Force-kills whatever is left of the child's process group.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => debug!(pid, error = %e, "Failed to kill process group"),
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn spawn_reader<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!(error = %e, "Output stream read failed");
        }
        buf
    })
}

/// Waits for a reader to hit EOF, giving up after [`OUTPUT_DRAIN_GRACE`].
///
/// A descendant that inherited the pipe can hold it open after the child
/// itself is gone; its output is dropped rather than stalling the caller.
async fn drain(task: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };

    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            warn!(error = %e, "Output reader task failed");
            String::new()
        }
        Err(_) => {
            task.abort();
            warn!("Output stream still open after process exit, discarding");
            String::new()
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
