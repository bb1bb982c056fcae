pub mod command;
pub mod config;
pub mod devices;
pub mod encoder;
pub mod error;
pub mod gui;
pub mod recorder;
pub mod runtime;
pub mod screen;

#[cfg(test)]
mod test_fixes;

// Re-export main types
pub use config::Settings;
pub use error::RecorderError;
pub use gui::RecorderApp;
pub use recorder::{Recorder, RecorderEvent, RecorderState};
