//! Subprocess runner (spec.md §4.7): deadline-bounded spawn with structured
//! progress capture, an enforced per-attempt timeout, a SIGTERM→SIGKILL kill
//! boundary, and a retry loop that sits strictly *above* that boundary.
//!
//! The retry-placement contract is the point of this module: retries wired
//! inside the child process are ineffective once the parent kills the child
//! at its per-attempt deadline, so the loop below owns both the deadline and
//! the retry budget, and a composite `total_timeout` bounds the whole loop
//! independent of `per_attempt_timeout * max_retries`.

use acm_contracts::{AcmError, ErrorKind};
use acm_resilience::{full_jitter_delay, RetryConfig};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    pub per_attempt_timeout: Duration,
    pub total_timeout: Duration,
    pub max_retries: u32,
    pub kill_grace: Duration,
    pub heartbeat_interval: Duration,
    pub backoff: RetryConfig,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            per_attempt_timeout: Duration::from_secs(120),
            total_timeout: Duration::from_secs(600),
            max_retries: 3,
            kill_grace: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(15),
            backoff: RetryConfig::default(),
        }
    }
}

/// Outcome of a single attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration: Duration,
}

/// Classifies a finished attempt into success or a retryable/terminal
/// `ErrorKind`. Adapters supply this since only they know their
/// subprocess's exit-code taxonomy (e.g. FPF's grounding/reasoning codes).
pub trait ExitClassifier {
    fn classify(&self, outcome: &AttemptOutcome) -> Result<(), ErrorKind>;
}

enum AttemptEnd {
    StdoutClosed,
    DeadlineHit,
}

pub struct SubprocessRunner {
    config: SubprocessConfig,
}

impl SubprocessRunner {
    pub fn new(config: SubprocessConfig) -> Self {
        Self { config }
    }

    /// Runs `command_builder()` up to `max_retries` times. `total_timeout`
    /// is the loop's hard ceiling: a new attempt is never started once it
    /// has elapsed, regardless of how `per_attempt_timeout * max_retries`
    /// compares to it (spec.md §4.7).
    pub async fn run_with_retries<F, C>(
        &self,
        command_builder: F,
        classifier: &C,
        on_line: impl FnMut(&str),
    ) -> Result<AttemptOutcome, AcmError>
    where
        F: FnMut() -> Command,
        C: ExitClassifier,
    {
        self.run_with_retries_and_stdin(command_builder, |_attempt| None, classifier, on_line)
            .await
    }

    /// Like `run_with_retries`, but `stdin_for_attempt(attempt)` (1-indexed)
    /// supplies bytes written to the child's stdin before it is read, e.g.
    /// FPF's per-attempt escalating-instructions batch payload.
    pub async fn run_with_retries_and_stdin<F, S, C>(
        &self,
        mut command_builder: F,
        mut stdin_for_attempt: S,
        classifier: &C,
        mut on_line: impl FnMut(&str),
    ) -> Result<AttemptOutcome, AcmError>
    where
        F: FnMut() -> Command,
        S: FnMut(u32) -> Option<Vec<u8>>,
        C: ExitClassifier,
    {
        let loop_start = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if loop_start.elapsed() >= self.config.total_timeout {
                return Err(AcmError::new(
                    ErrorKind::Timeout,
                    format!(
                        "total_timeout of {:?} exceeded before attempt {attempt}",
                        self.config.total_timeout
                    ),
                ));
            }

            let command = command_builder();
            let stdin_bytes = stdin_for_attempt(attempt);
            let outcome = self.run_once(command, stdin_bytes, &mut on_line).await?;

            match classifier.classify(&outcome) {
                Ok(()) => return Ok(outcome),
                Err(kind) => {
                    let can_retry = kind.is_retryable() && attempt < self.config.max_retries;
                    if !can_retry {
                        return Err(AcmError::new(
                            kind,
                            format!(
                                "attempt {attempt} classified as {kind} (exit {:?})",
                                outcome.exit_code
                            ),
                        ));
                    }
                    let delay = full_jitter_delay(&self.config.backoff, attempt);
                    warn!(
                        attempt,
                        kind = %kind,
                        delay_ms = delay.as_millis() as u64,
                        "subprocess attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Deadline-clamped counterpart to `run_with_retries` (see
    /// `run_with_retries_and_stdin_by`).
    pub async fn run_with_retries_by<F, C>(
        &self,
        deadline: tokio::time::Instant,
        command_builder: F,
        classifier: &C,
        on_line: impl FnMut(&str),
    ) -> Result<AttemptOutcome, AcmError>
    where
        F: FnMut() -> Command,
        C: ExitClassifier,
    {
        self.run_with_retries_and_stdin_by(deadline, command_builder, |_attempt| None, classifier, on_line)
            .await
    }

    /// Like `run_with_retries_and_stdin`, but first clamps the configured
    /// `total_timeout` down to whatever remains before `deadline`, never up
    /// — a caller-supplied per-attempt deadline can only tighten the
    /// effective ceiling (spec.md §4.2: the adapter "MUST terminate and
    /// return before [the deadline]").
    pub async fn run_with_retries_and_stdin_by<F, S, C>(
        &self,
        deadline: tokio::time::Instant,
        command_builder: F,
        stdin_for_attempt: S,
        classifier: &C,
        on_line: impl FnMut(&str),
    ) -> Result<AttemptOutcome, AcmError>
    where
        F: FnMut() -> Command,
        S: FnMut(u32) -> Option<Vec<u8>>,
        C: ExitClassifier,
    {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let mut config = self.config.clone();
        config.total_timeout = config.total_timeout.min(remaining);
        SubprocessRunner::new(config)
            .run_with_retries_and_stdin(command_builder, stdin_for_attempt, classifier, on_line)
            .await
    }

    /// Spawns and waits out a single attempt, enforcing `per_attempt_timeout`
    /// via SIGTERM then SIGKILL, logging a heartbeat while the child is
    /// alive.
    async fn run_once(
        &self,
        mut command: Command,
        stdin_bytes: Option<Vec<u8>>,
        on_line: &mut impl FnMut(&str),
    ) -> Result<AttemptOutcome, AcmError> {
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin_bytes.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            AcmError::new(
                ErrorKind::ProcessError,
                format!("failed to spawn subprocess: {e}"),
            )
        })?;
        let pid = child.id();

        if let Some(bytes) = stdin_bytes {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(&bytes).await {
                    warn!(error = %e, "failed writing subprocess stdin");
                }
                drop(stdin);
            }
        }

        let stdout = child.stdout.take().expect("stdout was piped");
        let mut lines = BufReader::new(stdout).lines();

        // Stderr is drained on a background task purely so a chatty child
        // never blocks on a full pipe buffer; its content only matters for
        // diagnostics, collected after the child exits.
        let stderr = child.stderr.take().expect("stderr was piped");
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push(line);
            }
            collected
        });

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.tick().await; // first tick fires immediately; consume it

        let deadline = tokio::time::sleep_until((started + self.config.per_attempt_timeout).into());
        tokio::pin!(deadline);

        let mut stdout_lines = Vec::new();
        let end = loop {
            tokio::select! {
                biased;
                line = lines.next_line() => {
                    match line {
                        Ok(Some(l)) => {
                            on_line(&l);
                            stdout_lines.push(l);
                        }
                        Ok(None) | Err(_) => break AttemptEnd::StdoutClosed,
                    }
                }
                _ = &mut deadline => {
                    break AttemptEnd::DeadlineHit;
                }
                _ = heartbeat.tick() => {
                    info!(
                        pid,
                        elapsed_s = started.elapsed().as_secs_f64(),
                        "subprocess heartbeat"
                    );
                }
            }
        };

        let outcome = match end {
            AttemptEnd::StdoutClosed => match timeout(self.config.kill_grace, child.wait()).await {
                Ok(Ok(status)) => AttemptOutcome {
                    stdout_lines,
                    stderr_lines: Vec::new(),
                    exit_code: status.code(),
                    timed_out: false,
                    duration: started.elapsed(),
                },
                _ => {
                    kill_gracefully(&mut child, pid, self.config.kill_grace).await;
                    AttemptOutcome {
                        stdout_lines,
                        stderr_lines: Vec::new(),
                        exit_code: None,
                        timed_out: false,
                        duration: started.elapsed(),
                    }
                }
            },
            AttemptEnd::DeadlineHit => {
                kill_gracefully(&mut child, pid, self.config.kill_grace).await;
                AttemptOutcome {
                    stdout_lines,
                    stderr_lines: Vec::new(),
                    exit_code: None,
                    timed_out: true,
                    duration: started.elapsed(),
                }
            }
        };

        let stderr_lines = match timeout(Duration::from_millis(500), stderr_task).await {
            Ok(Ok(lines)) => lines,
            _ => Vec::new(),
        };

        Ok(AttemptOutcome {
            stderr_lines,
            ..outcome
        })
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL (spec.md §4.7, §5 cancellation).
async fn kill_gracefully(child: &mut Child, pid: Option<u32>, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if timeout(grace, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = pid;
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOk;
    impl ExitClassifier for AlwaysOk {
        fn classify(&self, outcome: &AttemptOutcome) -> Result<(), ErrorKind> {
            if outcome.exit_code == Some(0) {
                Ok(())
            } else {
                Err(ErrorKind::ProcessError)
            }
        }
    }

    struct AlwaysRetryable;
    impl ExitClassifier for AlwaysRetryable {
        fn classify(&self, _outcome: &AttemptOutcome) -> Result<(), ErrorKind> {
            Err(ErrorKind::ProcessError)
        }
    }

    fn fast_config() -> SubprocessConfig {
        SubprocessConfig {
            per_attempt_timeout: Duration::from_millis(500),
            total_timeout: Duration::from_secs(5),
            max_retries: 3,
            kill_grace: Duration::from_millis(200),
            heartbeat_interval: Duration::from_secs(10),
            backoff: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 1,
                max_delay_ms: 2,
                backoff_multiplier: 1.0,
            },
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let runner = SubprocessRunner::new(fast_config());
        let outcome = runner
            .run_with_retries(
                || {
                    let mut cmd = Command::new("true");
                    cmd
                },
                &AlwaysOk,
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn kills_process_that_exceeds_per_attempt_timeout() {
        let runner = SubprocessRunner::new(fast_config());
        let result = runner
            .run_with_retries(
                || {
                    let mut cmd = Command::new("sleep");
                    cmd.arg("10");
                    cmd
                },
                &AlwaysOk,
                |_| {},
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn exhausts_retries_on_persistently_failing_classifier() {
        let runner = SubprocessRunner::new(fast_config());
        let result = runner
            .run_with_retries(|| Command::new("true"), &AlwaysRetryable, |_| {})
            .await;
        assert!(result.is_err());
    }

    struct GroundingMissingThenOk {
        attempts: std::sync::atomic::AtomicU32,
        succeed_on: u32,
    }

    impl ExitClassifier for GroundingMissingThenOk {
        fn classify(&self, outcome: &AttemptOutcome) -> Result<(), ErrorKind> {
            let attempt = self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if attempt >= self.succeed_on && outcome.exit_code == Some(0) {
                Ok(())
            } else {
                Err(ErrorKind::GroundingMissing)
            }
        }
    }

    #[tokio::test]
    async fn grounding_missing_twice_then_ok_takes_exactly_three_attempts() {
        let runner = SubprocessRunner::new(fast_config());
        let classifier = GroundingMissingThenOk {
            attempts: std::sync::atomic::AtomicU32::new(0),
            succeed_on: 3,
        };
        let outcome = runner
            .run_with_retries(|| Command::new("true"), &classifier, |_| {})
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(classifier.attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn captures_stdout_lines() {
        let runner = SubprocessRunner::new(fast_config());
        let mut captured = Vec::new();
        let outcome = runner
            .run_with_retries(
                || {
                    let mut cmd = Command::new("printf");
                    cmd.arg("a\\nb\\n");
                    cmd
                },
                &AlwaysOk,
                |line| captured.push(line.to_string()),
            )
            .await
            .unwrap();
        assert_eq!(outcome.stdout_lines, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(captured, outcome.stdout_lines);
    }
}
