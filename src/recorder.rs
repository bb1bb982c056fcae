use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::command::{build_args, command_line, output_file_name, CaptureOptions};
use crate::error::RecorderError;
use crate::runtime::runtime_handle;

/// How long ffmpeg gets to finalize the file after `q` before it is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    Started { output: PathBuf, command: String },
    Log(String),
    Stopped { session: u64, code: Option<i32>, output: PathBuf },
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopping,
}

struct Session {
    id: u64,
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    output: PathBuf,
    exited: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

/// Owns at most one running ffmpeg process. All waiting happens on the
/// shared runtime; results come back through [`Recorder::poll_events`].
pub struct Recorder {
    session: Option<Session>,
    next_id: u64,
    events_tx: Sender<RecorderEvent>,
    events_rx: Receiver<RecorderEvent>,
    grace: Duration,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            session: None,
            next_id: 0,
            events_tx,
            events_rx,
            grace: STOP_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn state(&self) -> RecorderState {
        match &self.session {
            None => RecorderState::Idle,
            Some(s) if s.stop_requested.load(Ordering::SeqCst) => RecorderState::Stopping,
            Some(_) => RecorderState::Recording,
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.child.lock().id())
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.output.as_path())
    }

    /// Validates the options, spawns ffmpeg and returns the path it will
    /// write to.
    pub fn start(&mut self, opts: &CaptureOptions) -> Result<PathBuf, RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let exe = resolve_ffmpeg(&opts.ffmpeg_path).ok_or_else(|| RecorderError::FfmpegNotFound {
            path: opts.ffmpeg_path.clone(),
        })?;

        ensure_writable_dir(&opts.output_directory)?;

        let output = opts.output_directory.join(output_file_name(chrono::Local::now()));
        let args = build_args(opts, &output);
        let command = command_line(&exe, &args);
        info!("Running: {}", command);

        let mut cmd = Command::new(&exe);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd.spawn().map_err(RecorderError::Spawn)?;
        info!("ffmpeg started (pid {})", child.id());

        // Drain stdout/stderr in background to avoid pipe blockage
        if let Some(stdout) = child.stdout.take() {
            let tx = self.events_tx.clone();
            runtime_handle().spawn_blocking(move || {
                drain_lines(stdout, |line| {
                    debug!("ffmpeg: {}", line);
                    let _ = tx.send(RecorderEvent::Log(line));
                });
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = self.events_tx.clone();
            runtime_handle().spawn_blocking(move || {
                drain_lines(stderr, |line| {
                    debug!("ffmpeg: {}", line);
                    let _ = tx.send(RecorderEvent::Log(line));
                });
            });
        }

        self.next_id += 1;
        let session = Session {
            id: self.next_id,
            stdin: child.stdin.take(),
            child: Arc::new(Mutex::new(child)),
            output: output.clone(),
            exited: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        };
        self.spawn_exit_watcher(&session);

        let _ = self.events_tx.send(RecorderEvent::Started {
            output: output.clone(),
            command,
        });
        self.session = Some(session);
        Ok(output)
    }

    fn spawn_exit_watcher(&self, session: &Session) {
        let child = Arc::clone(&session.child);
        let exited = Arc::clone(&session.exited);
        let stop_requested = Arc::clone(&session.stop_requested);
        let tx = self.events_tx.clone();
        let id = session.id;
        let output = session.output.clone();

        runtime_handle().spawn_blocking(move || loop {
            let polled = child.lock().try_wait();
            match polled {
                Ok(Some(status)) => {
                    exited.store(true, Ordering::SeqCst);
                    info!("ffmpeg exited with status {}", status);
                    if !status.success() && !stop_requested.load(Ordering::SeqCst) {
                        let err = match status.code() {
                            Some(code) => RecorderError::FfmpegFailed(code),
                            None => RecorderError::FfmpegFailed(-1),
                        };
                        let _ = tx.send(RecorderEvent::Error(err.to_string()));
                    }
                    let _ = tx.send(RecorderEvent::Stopped {
                        session: id,
                        code: status.code(),
                        output,
                    });
                    break;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    error!("Failed to poll ffmpeg process: {}", e);
                    exited.store(true, Ordering::SeqCst);
                    let _ = tx.send(RecorderEvent::Error(format!("Lost track of ffmpeg: {}", e)));
                    let _ = tx.send(RecorderEvent::Stopped { session: id, code: None, output });
                    break;
                }
            }
        });
    }

    /// Asks ffmpeg to finish (`q` on stdin) and returns immediately. The
    /// process is killed if it is still alive after the grace period.
    pub fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.stop_requested.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Stopping recording");
        request_quit(session);

        let child = Arc::clone(&session.child);
        let exited = Arc::clone(&session.exited);
        let grace = self.grace;
        runtime_handle().spawn_blocking(move || {
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline {
                if exited.load(Ordering::SeqCst) {
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }
            if !exited.load(Ordering::SeqCst) {
                warn!("ffmpeg did not exit gracefully, sending kill signal");
                if let Err(e) = child.lock().kill() {
                    warn!("Failed to kill ffmpeg: {}", e);
                }
            }
        });
    }

    /// Blocking stop used on shutdown: quit, wait up to `timeout`, kill,
    /// reap. The process is never left running.
    pub fn stop_and_wait(&mut self, timeout: Duration) -> Result<Option<ExitStatus>, RecorderError> {
        let Some(mut session) = self.session.take() else {
            return Ok(None);
        };
        session.stop_requested.store(true, Ordering::SeqCst);
        request_quit(&mut session);

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = session.child.lock().try_wait()? {
                info!("ffmpeg exited with status {}", status);
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL.min(timeout));
        }

        warn!("ffmpeg did not exit within {:?}, killing it", timeout);
        let mut child = session.child.lock();
        if let Err(e) = child.kill() {
            // already gone between the last poll and the kill
            debug!("kill failed: {}", e);
        }
        let status = child.wait()?;
        Ok(Some(status))
    }

    /// Drains pending events. A `Stopped` event for the current session
    /// clears it so a new recording can start.
    pub fn poll_events(&mut self) -> Vec<RecorderEvent> {
        let events: Vec<RecorderEvent> = self.events_rx.try_iter().collect();
        for event in &events {
            if let RecorderEvent::Stopped { session, .. } = event {
                if self.session.as_ref().map(|s| s.id) == Some(*session) {
                    self.session = None;
                }
            }
        }
        events
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(err) = self.stop_and_wait(self.grace) {
            error!("Failed to stop ffmpeg process: {}", err);
        }
    }
}

fn request_quit(session: &mut Session) {
    if let Some(mut stdin) = session.stdin.take() {
        if stdin.write_all(b"q\n").and_then(|_| stdin.flush()).is_err() {
            warn!("Could not send quit to ffmpeg (stdin closed, process likely exited)");
        }
        // dropping stdin closes the pipe
    }
}

/// Locates the ffmpeg binary: an existing file path is used as is,
/// otherwise the name is probed by running `-version`.
pub fn resolve_ffmpeg(path: &str) -> Option<String> {
    let trimmed = path.trim();
    let candidate = if trimmed.is_empty() { "ffmpeg" } else { trimmed };

    if Path::new(candidate).is_file() {
        return Some(candidate.to_string());
    }

    let mut cmd = Command::new(candidate);
    cmd.arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(0x0800_0000);
    }
    let runs = cmd.status().map(|s| s.success()).unwrap_or(false);
    if runs {
        Some(candidate.to_string())
    } else {
        warn!("ffmpeg not found at '{}'", candidate);
        None
    }
}

fn ensure_writable_dir(dir: &Path) -> Result<(), RecorderError> {
    let wrap = |source| RecorderError::OutputDir { path: dir.to_path_buf(), source };

    fs::create_dir_all(dir).map_err(wrap)?;

    let probe = dir.join(".screen-recorder-write-test");
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)
        .map_err(wrap)?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

/// Splits a byte stream into lines on `\n` or `\r` (ffmpeg redraws its
/// progress line with carriage returns). Empty lines are skipped.
pub fn drain_lines<R: Read>(mut reader: R, mut on_line: impl FnMut(String)) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        for &b in &buf[..n] {
            if b == b'\n' || b == b'\r' {
                flush_line(&mut pending, &mut on_line);
            } else {
                pending.push(b);
            }
        }
    }
    flush_line(&mut pending, &mut on_line);
}

fn flush_line(pending: &mut Vec<u8>, on_line: &mut dyn FnMut(String)) {
    if pending.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(pending).trim_end().to_string();
    if !line.is_empty() {
        on_line(line);
    }
    pending.clear();
}
