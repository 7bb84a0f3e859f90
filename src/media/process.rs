use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::common::error::{PitchError, PitchResult};

/// Number of diagnostic lines kept for error reports.
pub const STDERR_TAIL_LINES: usize = 20;

/// Keeps only the most recent `capacity` lines.
#[derive(Debug)]
pub struct TailBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr_tail: TailBuffer,
}

/// Runs `cmd` to completion, draining stdout fully and stderr into a
/// bounded tail. A nonzero exit becomes [`PitchError::Transcode`] carrying
/// the tail.
pub async fn run_captured(
    label: &str,
    mut cmd: Command,
    tail_lines: usize,
) -> PitchResult<CapturedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = label, "spawning {:?}", cmd.as_std());

    let mut child = cmd
        .spawn()
        .map_err(|e| PitchError::Transcode(format!("failed to start {}: {}", label, e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let drain_stdout = async {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout {
            out.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };

    let drain_stderr = async {
        let mut tail = TailBuffer::new(tail_lines);
        if let Some(err) = stderr {
            let mut reader = BufReader::new(err);
            let mut line = Vec::new();
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line).await? == 0 {
                    break;
                }
                let text = String::from_utf8_lossy(&line).trim_end().to_string();
                if !text.is_empty() {
                    tail.push(text);
                }
            }
        }
        Ok::<_, std::io::Error>(tail)
    };

    let (stdout, stderr_tail, status) = tokio::try_join!(drain_stdout, drain_stderr, child.wait())?;

    if !status.success() {
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Err(PitchError::Transcode(format!(
            "{} exited with {}: {}",
            label,
            code,
            stderr_tail.joined()
        )));
    }

    Ok(CapturedOutput { stdout, stderr_tail })
}
