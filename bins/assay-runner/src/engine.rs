/// Execution Engine - Subprocess Driver
///
/// **Core Responsibility:**
/// Run an external compile or run command, capture its raw output, and
/// classify that output into an [`ExecutionOutcome`].
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (spawn, feed stdin, capture, time out)
/// - Engine does NOT know the expected answers
/// - Engine does NOT score anything
///
/// **Failure channels:**
/// - A program that runs and fails is a normal outcome (`Error`, `TimedOut`)
/// - A command that cannot be started is a fatal [`PipelineError::Spawn`]
/// - A non-zero exit with no output at all is a fatal
///   [`PipelineError::SilentFailure`]
///
/// Isolation and resource limits are provided by the sandbox that hosts the
/// whole pipeline; this module only enforces the wall-clock limit.

use assay_common::codec;
use assay_common::types::{ExecutionOutcome, TestRecord, Value};
use assay_common::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

/// Upper bound on the standard input handed to one invocation.
const MAX_STDIN_BYTES: usize = 10 * 1024 * 1024; // 10MB

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Compile,
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Compile => write!(f, "compile"),
            Phase::Run => write!(f, "run"),
        }
    }
}

/// An external command: program plus arguments, never interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace.
    pub fn parse(line: &str) -> PipelineResult<Self> {
        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        Self::from_argv(&tokens)
    }

    pub fn from_argv(argv: &[String]) -> PipelineResult<Self> {
        match argv.split_first() {
            Some((program, args)) => Ok(Self::new(program.clone(), args.to_vec())),
            None => Err(PipelineError::MalformedSpec("empty command".to_string())),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Optional compile step followed by the run step.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub compile: Option<CommandSpec>,
    pub run: CommandSpec,
}

/// Everything one invocation produced, before classification.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    /// `None` when the process was killed (signal or timeout).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub execution_time_ms: u64,
}

impl RawOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Map raw output onto the outcome taxonomy.
    ///
    /// 1. non-zero exit with stderr → `Error(stderr)`
    /// 2. non-zero exit with stdout → `Error(stdout)`
    /// 3. non-zero exit with neither → fatal
    /// 4. clean exit → `Checked(stdout)` without trailing line breaks
    pub fn classify(self, command: &CommandSpec) -> PipelineResult<ExecutionOutcome> {
        if self.timed_out {
            return Ok(ExecutionOutcome::TimedOut(self.stderr));
        }
        if self.exit_code == Some(0) {
            return Ok(ExecutionOutcome::Checked(
                self.stdout.trim_end_matches(['\n', '\r']).to_string(),
            ));
        }
        if !self.stderr.is_empty() {
            return Ok(ExecutionOutcome::Error(self.stderr));
        }
        if !self.stdout.is_empty() {
            return Ok(ExecutionOutcome::Error(self.stdout));
        }
        Err(PipelineError::SilentFailure {
            command: command.to_string(),
            exit_code: self.exit_code.unwrap_or(-1),
        })
    }
}

#[cfg(unix)]
fn termination_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn signal_note(signal: i32) -> String {
    match signal {
        9 => "[Process killed: likely exceeded a resource limit]".to_string(),
        11 => "[Process killed: segmentation fault]".to_string(),
        other => format!("[Process terminated by signal {}]", other),
    }
}

/// Local subprocess engine with a hard wall-clock limit per invocation.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl ProcessEngine {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one command to completion (or until the timeout) and capture
    /// both output streams in full.
    ///
    /// A non-zero exit is NOT an error here; only a failure to start is.
    pub async fn execute(
        &self,
        phase: Phase,
        command: &CommandSpec,
        stdin: Option<&str>,
    ) -> PipelineResult<RawOutput> {
        if let Some(input) = stdin {
            if input.len() > MAX_STDIN_BYTES {
                return Err(PipelineError::MalformedSpec(format!(
                    "test input of {} bytes exceeds the {} byte limit",
                    input.len(),
                    MAX_STDIN_BYTES
                )));
            }
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let start_time = Instant::now();
        let mut child = cmd.spawn().map_err(|source| PipelineError::Spawn {
            command: command.to_string(),
            source,
        })?;

        // Feed stdin from its own task so a child that writes a lot before
        // reading cannot deadlock against us.
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            let payload = input.as_bytes().to_vec();
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&payload).await {
                    debug!(error = %e, "Child closed stdin early");
                }
            });
        }

        let waited = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        let raw = match waited {
            Ok(Ok(output)) => {
                let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if let Some(signal) = termination_signal(&output.status) {
                    if !stderr.is_empty() && !stderr.ends_with('\n') {
                        stderr.push('\n');
                    }
                    stderr.push_str(&signal_note(signal));
                }
                RawOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr,
                    timed_out: false,
                    execution_time_ms,
                }
            }
            Ok(Err(source)) => {
                return Err(PipelineError::Spawn {
                    command: command.to_string(),
                    source,
                })
            }
            Err(_) => {
                // The child was owned by the dropped future; kill_on_drop reaps it.
                warn!(
                    phase = %phase,
                    command = %command,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Execution timed out"
                );
                RawOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!(
                        "[Execution timed out after {}ms]",
                        self.timeout.as_millis()
                    ),
                    timed_out: true,
                    execution_time_ms,
                }
            }
        };

        debug!(
            phase = %phase,
            command = %command,
            exit_code = ?raw.exit_code,
            execution_ms = raw.execution_time_ms,
            stdout_bytes = raw.stdout.len(),
            stderr_bytes = raw.stderr.len(),
            "Process finished"
        );

        Ok(raw)
    }

    /// Compile step alone. `Ok(None)` means a clean exit; anything else is
    /// the outcome that must stand in for every run of this actor.
    pub async fn compile(&self, command: &CommandSpec) -> PipelineResult<Option<ExecutionOutcome>> {
        let raw = self.execute(Phase::Compile, command, None).await?;
        if raw.succeeded() {
            return Ok(None);
        }
        warn!(
            command = %command,
            exit_code = ?raw.exit_code,
            error_preview = raw.stderr.lines().next().unwrap_or(""),
            "Compilation failed"
        );
        raw.classify(command).map(Some)
    }

    pub async fn run(&self, command: &CommandSpec, stdin: Option<&str>) -> PipelineResult<ExecutionOutcome> {
        self.execute(Phase::Run, command, stdin).await?.classify(command)
    }

    /// Two-phase execution for a single input. A failed compile is
    /// returned as-is and the run step is never attempted.
    pub async fn compile_and_run(
        &self,
        plan: &ExecutionPlan,
        stdin: Option<&str>,
    ) -> PipelineResult<ExecutionOutcome> {
        if let Some(compile) = &plan.compile {
            if let Some(failure) = self.compile(compile).await? {
                return Ok(failure);
            }
        }
        self.run(&plan.run, stdin).await
    }
}

/// Why a dispatched call produced no answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The code under test raised; payload is the exception's description.
    Raised(String),
    TimedOut(String),
    /// The adapter itself failed or went away.
    Crashed(String),
}

impl EvalError {
    pub fn into_outcome(self) -> ExecutionOutcome {
        match self {
            EvalError::Raised(description) => ExecutionOutcome::Exception(description),
            EvalError::TimedOut(detail) => ExecutionOutcome::TimedOut(detail),
            EvalError::Crashed(detail) => ExecutionOutcome::Error(detail),
        }
    }
}

/// Capability supplied by a language adapter: evaluate the function under
/// test on one argument list. How the adapter locates and loads the code
/// is not the engine's concern.
#[async_trait]
pub trait Dispatch: Send {
    async fn call(&mut self, args: &[Value]) -> Result<String, EvalError>;
}

struct Session {
    // Held so the process is killed when the session is dropped.
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Long-lived adapter process queried once per record.
///
/// Protocol: one dataset-encoded record per stdin line; the adapter answers
/// each with one outcome line, `checked:<value>` or `exception:<description>`.
/// A timeout or a premature exit fails that record only: the session is
/// dropped and a fresh one is started for the next call.
pub struct PersistentProcess {
    command: CommandSpec,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    session: Option<Session>,
}

impl PersistentProcess {
    /// Start the adapter. Failing to start it at all is fatal.
    pub fn spawn(command: CommandSpec, engine: &ProcessEngine) -> PipelineResult<Self> {
        let mut adapter = Self {
            command,
            working_dir: engine.working_dir.clone(),
            timeout: engine.timeout,
            session: None,
        };
        adapter.session = Some(adapter.start()?);
        Ok(adapter)
    }

    fn start(&self) -> PipelineResult<Session> {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let spawn_error = |source: std::io::Error| PipelineError::Spawn {
            command: self.command.to_string(),
            source,
        };
        let mut child = cmd.spawn().map_err(spawn_error)?;
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(spawn_error(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "adapter pipes unavailable",
                )))
            }
        };
        debug!(command = %self.command, "Adapter session started");

        Ok(Session {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    async fn exchange(session: &mut Session, request: &str) -> std::io::Result<Option<String>> {
        session.stdin.write_all(request.as_bytes()).await?;
        session.stdin.flush().await?;
        let mut reply = String::new();
        if session.stdout.read_line(&mut reply).await? == 0 {
            return Ok(None);
        }
        Ok(Some(reply))
    }

    /// Close the adapter's stdin and give it one timeout period to exit.
    pub async fn shutdown(mut self) {
        if let Some(session) = self.session.take() {
            let Session {
                _child: mut child,
                stdin,
                ..
            } = session;
            drop(stdin);
            if tokio::time::timeout(self.timeout, child.wait()).await.is_err() {
                warn!(command = %self.command, "Adapter did not exit after stdin closed");
            }
        }
    }
}

#[async_trait]
impl Dispatch for PersistentProcess {
    async fn call(&mut self, args: &[Value]) -> Result<String, EvalError> {
        let mut session = match self.session.take() {
            Some(session) => session,
            None => self
                .start()
                .map_err(|e| EvalError::Crashed(e.to_string()))?,
        };

        let record = TestRecord::new(args.iter().map(Value::to_string).collect());
        let request = format!("{}\n", codec::encode_record(&record));

        let reply = match tokio::time::timeout(self.timeout, Self::exchange(&mut session, &request)).await
        {
            Err(_) => {
                return Err(EvalError::TimedOut(format!(
                    "[Execution timed out after {}ms]",
                    self.timeout.as_millis()
                )))
            }
            Ok(Err(e)) => return Err(EvalError::Crashed(format!("adapter I/O failed: {}", e))),
            Ok(Ok(None)) => {
                return Err(EvalError::Crashed(
                    "adapter exited before answering".to_string(),
                ))
            }
            Ok(Ok(Some(reply))) => reply,
        };
        self.session = Some(session);

        match codec::decode_outcome(reply.trim_end_matches(['\n', '\r'])) {
            Ok(ExecutionOutcome::Checked(value)) => Ok(value),
            Ok(ExecutionOutcome::Exception(description)) => Err(EvalError::Raised(description)),
            Ok(ExecutionOutcome::Error(detail)) => Err(EvalError::Crashed(detail)),
            Ok(ExecutionOutcome::TimedOut(detail)) => Err(EvalError::TimedOut(detail)),
            Err(reason) => Err(EvalError::Crashed(format!(
                "unreadable adapter reply: {}",
                reason
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(exit_code: Option<i32>, stdout: &str, stderr: &str) -> RawOutput {
        RawOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out: false,
            execution_time_ms: 1,
        }
    }

    fn cmd() -> CommandSpec {
        CommandSpec::new("prog", vec!["--flag".to_string()])
    }

    #[test]
    fn test_clean_exit_is_checked_without_trailing_separators() {
        let outcome = raw(Some(0), "42\r\n\n", "").classify(&cmd()).unwrap();
        assert_eq!(outcome, ExecutionOutcome::Checked("42".to_string()));
    }

    #[test]
    fn test_clean_exit_keeps_leading_whitespace_and_ignores_stderr() {
        let outcome = raw(Some(0), "  a b\n", "warning: unused").classify(&cmd()).unwrap();
        assert_eq!(outcome, ExecutionOutcome::Checked("  a b".to_string()));
    }

    #[test]
    fn test_failure_prefers_stderr() {
        let outcome = raw(Some(1), "partial", "ZeroDivisionError").classify(&cmd()).unwrap();
        assert_eq!(outcome, ExecutionOutcome::Error("ZeroDivisionError".to_string()));
    }

    #[test]
    fn test_failure_falls_back_to_stdout() {
        let outcome = raw(Some(2), "usage: prog", "").classify(&cmd()).unwrap();
        assert_eq!(outcome, ExecutionOutcome::Error("usage: prog".to_string()));
    }

    #[test]
    fn test_silent_failure_is_fatal() {
        let err = raw(Some(3), "", "").classify(&cmd()).unwrap_err();
        match err {
            PipelineError::SilentFailure { command, exit_code } => {
                assert_eq!(command, "prog --flag");
                assert_eq!(exit_code, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_killed_without_output_is_fatal() {
        let err = raw(None, "", "").classify(&cmd()).unwrap_err();
        assert!(matches!(err, PipelineError::SilentFailure { exit_code: -1, .. }));
    }

    #[test]
    fn test_timeout_is_its_own_outcome() {
        let mut output = raw(None, "", "[Execution timed out after 10ms]");
        output.timed_out = true;
        assert!(!output.succeeded());
        let outcome = output.classify(&cmd()).unwrap();
        assert!(matches!(outcome, ExecutionOutcome::TimedOut(_)));
    }

    #[test]
    fn test_command_parsing() {
        let spec = CommandSpec::parse("  javac  -d out Main.java ").unwrap();
        assert_eq!(spec.program, "javac");
        assert_eq!(spec.args, vec!["-d", "out", "Main.java"]);
        assert_eq!(spec.to_string(), "javac -d out Main.java");

        assert!(CommandSpec::parse("   ").is_err());
        assert!(CommandSpec::from_argv(&[]).is_err());
    }

    #[test]
    fn test_eval_errors_map_to_outcomes() {
        assert_eq!(
            EvalError::Raised("ValueError: bad".to_string()).into_outcome(),
            ExecutionOutcome::Exception("ValueError: bad".to_string())
        );
        assert_eq!(
            EvalError::Crashed("gone".to_string()).into_outcome(),
            ExecutionOutcome::Error("gone".to_string())
        );
        assert!(matches!(
            EvalError::TimedOut("slow".to_string()).into_outcome(),
            ExecutionOutcome::TimedOut(_)
        ));
    }

    #[test]
    fn test_signal_notes() {
        assert!(signal_note(11).contains("segmentation fault"));
        assert!(signal_note(15).contains("signal 15"));
    }
}
