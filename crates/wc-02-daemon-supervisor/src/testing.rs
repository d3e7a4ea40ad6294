//! Scripted launcher and downloader for tests.

use crate::ports::{
    ByteProgress, DaemonProcess, DownloadError, LaunchSpec, ParamsDownloader, ProcessExit,
    ProcessLauncher, ProgressSender,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// Process
// =============================================================================

#[derive(Debug, Default)]
struct ProcState {
    exit: Option<ProcessExit>,
    killed: bool,
    polls: u32,
    exit_after_polls: Option<(u32, Option<i32>)>,
    output: String,
}

/// Test-side control over one mock process.
#[derive(Debug, Clone, Default)]
pub struct ProcessHandle(Arc<Mutex<ProcState>>);

impl ProcessHandle {
    /// Make the process exit with `code` (`None` = signal).
    pub fn exit(&self, code: Option<i32>) {
        self.0.lock().exit = Some(ProcessExit { code });
    }

    /// Exit with `code` once `try_wait` has been called `polls` more times.
    pub fn exit_after_polls(&self, polls: u32, code: Option<i32>) {
        let mut state = self.0.lock();
        let at = state.polls + polls;
        state.exit_after_polls = Some((at, code));
    }

    pub fn write_output(&self, text: &str) {
        self.0.lock().output.push_str(text);
    }

    #[must_use]
    pub fn was_killed(&self) -> bool {
        self.0.lock().killed
    }

    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.0.lock().exit.is_some()
    }
}

struct MockProcess {
    pid: u32,
    handle: ProcessHandle,
}

#[async_trait]
impl DaemonProcess for MockProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ProcessExit>> {
        let mut state = self.handle.0.lock();
        state.polls += 1;
        if state.exit.is_none() {
            if let Some((at, code)) = state.exit_after_polls {
                if state.polls >= at {
                    state.exit = Some(ProcessExit { code });
                }
            }
        }
        Ok(state.exit)
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        let mut state = self.handle.0.lock();
        state.killed = true;
        state.exit.get_or_insert(ProcessExit { code: None });
        Ok(())
    }

    fn captured_output(&self) -> String {
        self.handle.0.lock().output.clone()
    }
}

/// Launcher that hands out controllable fake processes.
#[derive(Default)]
pub struct MockLauncher {
    launches: Mutex<Vec<LaunchSpec>>,
    handles: Mutex<Vec<ProcessHandle>>,
    fail: Mutex<Option<std::io::ErrorKind>>,
}

impl MockLauncher {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every launch fails with `kind` until cleared with `None`.
    pub fn fail_with(&self, kind: Option<std::io::ErrorKind>) {
        *self.fail.lock() = kind;
    }

    #[must_use]
    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().clone()
    }

    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }

    #[must_use]
    pub fn last_handle(&self) -> Option<ProcessHandle> {
        self.handles.lock().last().cloned()
    }
}

impl ProcessLauncher for MockLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn DaemonProcess>> {
        self.launches.lock().push(spec.clone());
        if let Some(kind) = *self.fail.lock() {
            return Err(std::io::Error::new(kind, "scripted launch failure"));
        }
        let handle = ProcessHandle::default();
        let mut handles = self.handles.lock();
        handles.push(handle.clone());
        Ok(Box::new(MockProcess {
            pid: 1000 + handles.len() as u32,
            handle,
        }))
    }
}

// =============================================================================
// Downloads
// =============================================================================

/// Downloader that writes zero-filled files and can be told to fail.
pub struct MockDownloader {
    size: u64,
    chunk: u64,
    failures: Mutex<HashMap<String, u32>>,
    fetched: Mutex<Vec<String>>,
}

impl MockDownloader {
    #[must_use]
    pub fn new(size: u64, chunk: u64) -> Arc<Self> {
        Arc::new(Self {
            size,
            chunk: chunk.max(1),
            failures: Mutex::new(HashMap::new()),
            fetched: Mutex::new(Vec::new()),
        })
    }

    /// Fail the next `times` attempts for `file`.
    pub fn fail_times(&self, file: &str, times: u32) {
        self.failures.lock().insert(file.to_string(), times);
    }

    /// Files requested, in order, including failed attempts.
    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl ParamsDownloader for MockDownloader {
    async fn fetch(
        &self,
        file: &str,
        dest: &Path,
        progress: ProgressSender,
    ) -> Result<(), DownloadError> {
        self.fetched.lock().push(file.to_string());
        let total = Some(self.size);

        let fail = {
            let mut failures = self.failures.lock();
            match failures.get_mut(file) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            let _ = progress.send(ByteProgress {
                done: self.chunk.min(self.size),
                total,
            });
            return Err(DownloadError::Http("scripted failure".into()));
        }

        let mut done = 0;
        while done < self.size {
            done = (done + self.chunk).min(self.size);
            let _ = progress.send(ByteProgress { done, total });
        }
        tokio::fs::write(dest, vec![0u8; self.size as usize])
            .await
            .map_err(|e| DownloadError::Io(e.to_string()))
    }
}
