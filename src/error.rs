use std::io;
use std::path::PathBuf;

/// Failures surfaced to the user when driving the external encoder.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("A recording is already running")]
    AlreadyRecording,

    #[error("ffmpeg not found or not runnable: {path}")]
    FfmpegNotFound { path: String },

    #[error("ffmpeg exited with status {0}")]
    FfmpegFailed(i32),

    #[error("No monitors detected")]
    NoMonitor,

    #[error("Monitor #{0} is not available")]
    InvalidMonitor(usize),

    #[error("Output folder is not writable: {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to launch ffmpeg: {0}")]
    Spawn(#[source] io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
