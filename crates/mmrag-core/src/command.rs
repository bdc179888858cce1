//! Runner for the external programs mmrag delegates to (embedding model,
//! captioning model, OCR and document converters).
//!
//! A [`ToolCommand`] is a program plus an argument template. `{name}`
//! placeholders are substituted per argument; nothing goes through a shell,
//! so substituted text never needs quoting.
use std::collections::HashMap;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Stdout of a successful run, or a `Tool` error carrying stderr.
    pub fn into_stdout(self, program: &str) -> Result<String> {
        if self.status.success() {
            Ok(self.stdout)
        } else {
            Err(Error::Tool { program: program.to_string(), message: self.failure_message() })
        }
    }

    fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exited with {}", self.status)
        } else {
            format!("exited with {}: {stderr}", self.status)
        }
    }
}

impl ToolCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { program: program.into(), args: args.into_iter().map(Into::into).collect() }
    }

    /// Arguments with every `{key}` replaced by its value.
    pub fn render_args(&self, vars: &HashMap<&str, &str>) -> Vec<String> {
        self.args.iter().map(|arg| render(arg, vars)).collect()
    }

    /// Run to completion, killing the child if it outlives `timeout`.
    pub fn run(&self, vars: &HashMap<&str, &str>, timeout: Duration) -> Result<ToolOutput> {
        let args = self.render_args(vars);
        debug!(program = %self.program, argc = args.len(), "spawning external tool");
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.error(format!("spawn failed: {e}")))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait_with_deadline(&mut child, timeout)?;

        Ok(ToolOutput { status, stdout: join_drain(stdout), stderr: join_drain(stderr) })
    }

    /// Run and return stdout, treating a non-zero exit as an error.
    pub fn run_stdout(&self, vars: &HashMap<&str, &str>, timeout: Duration) -> Result<String> {
        self.run(vars, timeout)?.into_stdout(&self.program)
    }

    fn wait_with_deadline(&self, child: &mut Child, timeout: Duration) -> Result<ExitStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                // The child may exit between try_wait and kill; either way it is gone.
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.error(format!("timed out after {}s", timeout.as_secs_f32())));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn error(&self, message: String) -> Error {
        Error::Tool { program: self.program.clone(), message }
    }
}

/// Substitute `{key}` placeholders in one left-to-right pass. Substituted
/// values are never rescanned, so a value containing `{other}` is kept
/// verbatim. Unknown placeholders are left as written.
pub fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| vars.get(&after[..close]).map(|v| (close, *v)));
        match value {
            Some((close, v)) => {
                out.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
