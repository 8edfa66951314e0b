use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context, Result};

use super::effects::Invocation;
use crate::progress::ProgressSuspendGuard;

const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const TRUNCATED_MARKER: &str = "\n[...truncated...]\n";

fn max_capture_bytes() -> usize {
    std::env::var("WHEELHOUSE_MAX_CAPTURE_BYTES")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES)
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Keeps at most `limit` bytes, dropping the oldest once full.
struct TailBuffer {
    bytes: VecDeque<u8>,
    limit: usize,
    truncated: bool,
}

impl TailBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: VecDeque::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let chunk = if chunk.len() > self.limit {
            self.truncated = true;
            self.bytes.clear();
            &chunk[chunk.len() - self.limit..]
        } else {
            chunk
        };
        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(self.limit);
        if overflow > 0 {
            self.truncated = true;
            self.bytes.drain(..overflow);
        }
        self.bytes.extend(chunk);
    }

    fn into_string(self) -> String {
        let (front, back) = self.bytes.as_slices();
        let mut text = String::from_utf8_lossy(&[front, back].concat()).into_owned();
        if self.truncated {
            text.push_str(TRUNCATED_MARKER);
        }
        text
    }
}

/// Drains `reader` into a bounded buffer, echoing to our stderr when `echo`
/// is set. The child's stdout is echoed to stderr too, so our stdout only
/// carries results.
fn pump(mut reader: impl Read + Send + 'static, echo: bool, limit: usize) -> JoinHandle<Result<String>> {
    thread::spawn(move || {
        let mut buffer = TailBuffer::new(limit);
        let mut chunk = [0u8; 8192];
        loop {
            let read = reader.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            if echo {
                io::stderr().write_all(&chunk[..read])?;
            }
            buffer.push(&chunk[..read]);
        }
        if echo {
            io::stderr().flush().ok();
        }
        Ok(buffer.into_string())
    })
}

fn join(handle: JoinHandle<Result<String>>, stream: &str) -> Result<String> {
    handle
        .join()
        .map_err(|_| anyhow!("{stream} reader panicked"))?
}

/// Runs `invocation` to completion, capturing both streams.
///
/// Streaming invocations also echo the child's output live and hide the
/// progress spinner meanwhile. When the timeout elapses the child is killed.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned, times out, or its
/// output streams cannot be read.
pub(crate) fn execute(invocation: &Invocation) -> Result<RunOutput> {
    let _suspend = invocation.stream.then(ProgressSuspendGuard::new);
    let program = invocation.program.as_str();
    let mut command = Command::new(program);
    command
        .args(&invocation.args)
        .envs(invocation.envs.iter().map(|(key, value)| (key, value)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &invocation.cwd {
        command.current_dir(cwd);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let limit = max_capture_bytes();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout missing for {program}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr missing for {program}"))?;
    let stdout = pump(stdout, invocation.stream, limit);
    let stderr = pump(stderr, invocation.stream, limit);

    let status = wait_with_timeout(&mut child, program, invocation.timeout)?;
    Ok(RunOutput {
        code: status.code().unwrap_or(-1),
        stdout: join(stdout, "stdout")?,
        stderr: join(stderr, "stderr")?,
    })
}

fn wait_with_timeout(
    child: &mut Child,
    program: &str,
    timeout: Option<Duration>,
) -> Result<ExitStatus> {
    let Some(timeout) = timeout else {
        return child
            .wait()
            .with_context(|| format!("failed to wait for {program}"));
    };
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("failed to wait for {program}"))?
        {
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }
    let _ = child.kill();
    let _ = child.wait();
    bail!("{program} timed out after {}s", timeout.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("/bin/sh").args(["-c", script])
    }

    #[test]
    fn tail_buffer_keeps_the_newest_bytes() {
        let mut buffer = TailBuffer::new(4);
        buffer.push(b"ab");
        buffer.push(b"cdef");
        assert_eq!(buffer.into_string(), format!("cdef{TRUNCATED_MARKER}"));

        let mut buffer = TailBuffer::new(3);
        buffer.push(b"abcdefg");
        assert_eq!(buffer.into_string(), format!("efg{TRUNCATED_MARKER}"));

        let mut buffer = TailBuffer::new(8);
        buffer.push(b"pip ok");
        assert_eq!(buffer.into_string(), "pip ok");
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_and_status() -> Result<()> {
        let output = execute(&sh("printf out && printf err >&2; exit 7"))?;
        assert_eq!(output.code, 7);
        assert!(!output.success());
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn bounds_large_output() -> Result<()> {
        let bytes = DEFAULT_MAX_CAPTURE_BYTES + 1024;
        let output = execute(&sh(&format!("head -c {bytes} /dev/zero | tr '\\0' a")))?;
        assert!(output.stdout.ends_with(TRUNCATED_MARKER));
        assert!(output.stdout.len() <= DEFAULT_MAX_CAPTURE_BYTES + TRUNCATED_MARKER.len());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn kills_child_after_timeout() {
        let started = Instant::now();
        let err = execute(&sh("exec sleep 5").timeout(Some(Duration::from_millis(200))))
            .expect_err("sleep should time out");
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn passes_env_and_cwd() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let output = execute(
            &sh("printf \"$WH_TEST_VAR:\" && pwd")
                .env("WH_TEST_VAR", "set")
                .cwd(temp.path()),
        )?;
        let canonical = std::fs::canonicalize(temp.path())?;
        assert_eq!(output.stdout.trim(), format!("set:{}", canonical.display()));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn streaming_still_captures() -> Result<()> {
        let output = execute(&sh("printf out && printf err >&2").streaming(true))?;
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        Ok(())
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = execute(&Invocation::new("wheelhouse-definitely-missing"))
            .expect_err("spawn should fail");
        assert!(err.to_string().contains("failed to start"));
    }
}
