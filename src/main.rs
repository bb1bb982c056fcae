use anyhow::Result;
use eframe::egui;
use log::{error, info, warn};

use screen_recorder::config::Settings;
use screen_recorder::gui::{AppState, RecorderApp};

fn main() -> Result<()> {
    // Initialize logging (default to info if RUST_LOG is not set)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting Screen Recorder");

    let settings = Settings::load().unwrap_or_else(|e| {
        warn!("Failed to load settings, using defaults: {:#}", e);
        Settings::default()
    });
    let app_state = AppState::new(settings);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 560.0])
            .with_min_inner_size([640.0, 480.0])
            .with_title("FFmpeg Screen & Audio Recorder"),
        ..Default::default()
    };

    if let Err(err) = eframe::run_native(
        "FFmpeg Screen & Audio Recorder",
        native_options,
        Box::new(|cc| Ok(Box::new(RecorderApp::new(cc, app_state)))),
    ) {
        error!("Failed to launch application: {}", err);
    }

    Ok(())
}
