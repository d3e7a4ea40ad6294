//! `tokio::process` launcher.

use crate::ports::{DaemonProcess, LaunchSpec, ProcessExit, ProcessLauncher};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::warn;

/// Keep at most this much daemon stderr.
pub const DEFAULT_CAPTURE_LIMIT: usize = 16 * 1024;

/// Launches the daemon as a child process with stderr captured.
#[derive(Debug, Clone)]
pub struct TokioProcessLauncher {
    capture_limit: usize,
}

impl TokioProcessLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    #[must_use]
    pub fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }
}

impl Default for TokioProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

fn append_bounded(buf: &mut String, line: &str, limit: usize) {
    buf.push_str(line);
    buf.push('\n');
    if buf.len() > limit {
        let mut cut = buf.len() - limit;
        while !buf.is_char_boundary(cut) {
            cut += 1;
        }
        buf.drain(..cut);
    }
}

impl ProcessLauncher for TokioProcessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn DaemonProcess>> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let captured = Arc::new(Mutex::new(String::new()));

        if let Some(stderr) = child.stderr.take() {
            let sink = Arc::clone(&captured);
            let limit = self.capture_limit;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "commerciumd", "{line}");
                    append_bounded(&mut sink.lock(), &line, limit);
                }
            });
        }

        Ok(Box::new(TokioDaemonProcess { child, captured }))
    }
}

struct TokioDaemonProcess {
    child: Child,
    captured: Arc<Mutex<String>>,
}

#[async_trait]
impl DaemonProcess for TokioDaemonProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ProcessExit>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| ProcessExit { code: status.code() }))
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    fn captured_output(&self) -> String {
        self.captured.lock().clone()
    }
}
