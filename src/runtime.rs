use once_cell::sync::Lazy;
use tokio::runtime::{Builder, Handle, Runtime};

// Pipe draining and exit watching run here so the UI thread never waits
// on ffmpeg.
static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    Builder::new_multi_thread()
        .enable_all()
        .thread_name("screen-recorder-rt")
        .build()
        .expect("Failed to build Tokio runtime")
});

pub fn runtime_handle() -> Handle {
    RUNTIME.handle().clone()
}
