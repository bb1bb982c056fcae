use egui::{
    Align2, CentralPanel, Color32, ComboBox, DragValue, Grid, Key, KeyboardShortcut, Modifiers,
    RichText, ScrollArea, Stroke, TextEdit, TopBottomPanel,
};
use crossbeam::channel::{bounded, Receiver, TryRecvError};
use log::{error, info, warn};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    command::CaptureOptions,
    config::{Settings, MAX_FRAME_RATE, MIN_FRAME_RATE, X264_PRESETS},
    devices::{self, AudioDevice, DeviceBackend},
    encoder::{self, VideoEncoder},
    error::RecorderError,
    recorder::{resolve_ffmpeg, Recorder, RecorderEvent, RecorderState, STOP_GRACE},
    runtime::runtime_handle,
    screen::{self, MonitorInfo},
};

pub const MAX_LOG_LINES: usize = 2000;
const REPAINT_INTERVAL: Duration = Duration::from_millis(200);

fn start_stop_shortcut() -> KeyboardShortcut {
    KeyboardShortcut::new(Modifiers::CTRL, Key::R)
}

/// Result of one device enumeration pass, gathered off the UI thread.
pub struct DeviceScan {
    pub ffmpeg: Option<String>,
    pub monitors: anyhow::Result<Vec<MonitorInfo>>,
    pub audio_devices: anyhow::Result<Vec<AudioDevice>>,
    pub encoders: Vec<VideoEncoder>,
}

/// Gathers everything that may block on ffmpeg or the display server.
pub fn scan_devices(ffmpeg_path: &str, backend: DeviceBackend) -> DeviceScan {
    let mut scan = scan_ffmpeg(ffmpeg_path, backend);
    scan.monitors = screen::list_monitors();
    scan
}

/// The ffmpeg half of a scan. The path is resolved once and the result
/// drives both listings.
fn scan_ffmpeg(ffmpeg_path: &str, backend: DeviceBackend) -> DeviceScan {
    let ffmpeg = resolve_ffmpeg(ffmpeg_path);
    let (audio_devices, encoders) = match &ffmpeg {
        Some(exe) => (devices::list_audio_devices(exe, backend), encoder::available_encoders(exe)),
        None => (
            Err(anyhow::anyhow!("ffmpeg not found at '{}'", ffmpeg_path.trim())),
            vec![VideoEncoder::X264],
        ),
    };
    DeviceScan {
        ffmpeg,
        monitors: Ok(Vec::new()),
        audio_devices,
        encoders,
    }
}

pub struct AppState {
    pub settings: Settings,
    pub backend: DeviceBackend,
    pub monitors: Vec<MonitorInfo>,
    pub audio_devices: Vec<AudioDevice>,
    pub encoders: Vec<VideoEncoder>,
    pub selected_monitor: Option<usize>,
    pub system_audio: Option<AudioDevice>,
    pub microphone: Option<AudioDevice>,
    pub log_lines: VecDeque<String>,
    pub error_message: Option<String>,
    /// Set once saved choices have been applied; later refreshes start
    /// from what is on screen.
    selection_restored: bool,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            backend: DeviceBackend::for_current_platform(),
            monitors: Vec::new(),
            audio_devices: Vec::new(),
            encoders: vec![VideoEncoder::X264],
            selected_monitor: None,
            system_audio: None,
            microphone: None,
            log_lines: VecDeque::new(),
            error_message: None,
            selection_restored: false,
        }
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        let line = line.into();
        if line.is_empty() {
            return;
        }
        self.log_lines.push_back(line);
        while self.log_lines.len() > MAX_LOG_LINES {
            self.log_lines.pop_front();
        }
    }

    pub fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.push_log(format!("[ERROR] {}", message));
        self.error_message = Some(message);
    }

    /// Re-applies saved choices after the device lists changed.
    pub fn restore_selection(&mut self) {
        if self.selection_restored {
            self.sync_settings();
        }
        self.selection_restored = true;

        self.selected_monitor = self
            .selected_monitor
            .filter(|idx| *idx < self.monitors.len())
            .or_else(|| screen::select_index(&self.monitors, self.settings.monitor_index));

        let keep_or_restore = |current: &Option<AudioDevice>, saved: &Option<String>, devices: &[AudioDevice]| {
            current
                .as_ref()
                .filter(|d| devices.contains(*d))
                .cloned()
                .or_else(|| saved.as_deref().and_then(|name| devices::pick_by_name(devices, name)).cloned())
        };
        self.system_audio = keep_or_restore(&self.system_audio, &self.settings.system_audio_device, &self.audio_devices);
        self.microphone = keep_or_restore(&self.microphone, &self.settings.microphone_device, &self.audio_devices);

        // nothing ever chosen: route system audio through a loopback device
        if self.system_audio.is_none() && self.settings.system_audio_device.is_none() {
            self.system_audio = devices::pick_virtual_audio(&self.audio_devices).cloned();
        }

        if !self.encoders.contains(&self.settings.encoder) {
            warn!("Encoder {} not available, using libx264", self.settings.encoder.codec());
            self.settings.encoder = VideoEncoder::X264;
        }
    }

    /// Copies the current form selections into the settings record. Does
    /// nothing until the saved choices have been applied at least once.
    pub fn sync_settings(&mut self) {
        if !self.selection_restored {
            return;
        }
        if let Some(idx) = self.selected_monitor {
            self.settings.monitor_index = idx;
        }
        let name = |device: &Option<AudioDevice>| {
            Some(device.as_ref().map(|d| d.label().to_string()).unwrap_or_default())
        };
        self.settings.system_audio_device = name(&self.system_audio);
        self.settings.microphone_device = name(&self.microphone);
    }

    /// Replaces the device lists with a finished scan and re-applies the
    /// selection.
    pub fn apply_scan(&mut self, scan: DeviceScan) {
        match scan.monitors {
            Ok(monitors) => self.monitors = monitors,
            Err(e) => {
                self.monitors.clear();
                self.report_error(format!("Failed to list monitors: {:#}", e));
            }
        }

        match scan.audio_devices {
            Ok(found) => self.audio_devices = found,
            Err(e) => {
                self.audio_devices.clear();
                self.report_error(format!("Failed to list audio devices: {:#}", e));
            }
        }

        if let Some(exe) = &scan.ffmpeg {
            info!("Using ffmpeg at {}", exe);
        }
        self.encoders = scan.encoders;
        self.restore_selection();
        self.push_log(format!(
            "Devices refreshed: {} monitor(s), {} audio device(s)",
            self.monitors.len(),
            self.audio_devices.len()
        ));
    }

    pub fn capture_options(&self) -> Result<CaptureOptions, RecorderError> {
        if self.monitors.is_empty() {
            return Err(RecorderError::NoMonitor);
        }
        let index = self.selected_monitor.unwrap_or(0);
        let monitor = *self.monitors.get(index).ok_or(RecorderError::InvalidMonitor(index))?;

        let mut audio_inputs: Vec<String> = Vec::new();
        for device in [&self.system_audio, &self.microphone].into_iter().flatten() {
            if let Some(arg) = device.input_arg(self.backend) {
                if !audio_inputs.contains(&arg) {
                    audio_inputs.push(arg);
                }
            }
        }

        Ok(CaptureOptions {
            ffmpeg_path: self.settings.ffmpeg_path.trim().to_string(),
            output_directory: self.settings.output_path(),
            frame_rate: self.settings.frame_rate,
            preset: self.settings.preset.clone(),
            encoder: self.settings.encoder,
            monitor,
            audio_inputs,
            backend: self.backend,
        })
    }
}

pub struct RecorderApp {
    state: AppState,
    recorder: Recorder,
    pending_scan: Option<Receiver<DeviceScan>>,
}

impl RecorderApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, state: AppState) -> Self {
        let mut app = Self {
            state,
            recorder: Recorder::new(),
            pending_scan: None,
        };

        // Initialize available devices
        app.refresh_devices();
        app
    }

    fn refresh_devices(&mut self) {
        if self.pending_scan.is_some() {
            return;
        }
        let (tx, rx) = bounded(1);
        let ffmpeg_path = self.state.settings.ffmpeg_path.clone();
        let backend = self.state.backend;
        runtime_handle().spawn_blocking(move || {
            let _ = tx.send(scan_devices(&ffmpeg_path, backend));
        });
        self.state.push_log("Scanning devices...");
        self.pending_scan = Some(rx);
    }

    fn poll_scan(&mut self) {
        let Some(rx) = &self.pending_scan else {
            return;
        };
        match rx.try_recv() {
            Ok(scan) => {
                self.pending_scan = None;
                self.state.apply_scan(scan);
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.pending_scan = None;
                self.state.report_error("Device scan was interrupted");
            }
        }
    }

    fn toggle_recording(&mut self) {
        match self.recorder.state() {
            RecorderState::Idle => self.start_recording(),
            RecorderState::Recording => self.stop_recording(),
            RecorderState::Stopping => {}
        }
    }

    fn start_recording(&mut self) {
        self.state.sync_settings();
        if let Err(e) = self.state.settings.save() {
            warn!("Failed to save settings: {:#}", e);
        }

        let result = self
            .state
            .capture_options()
            .and_then(|opts| self.recorder.start(&opts));
        match result {
            Ok(output) => info!("Recording to {}", output.display()),
            Err(e) => self.state.report_error(e.to_string()),
        }
    }

    fn stop_recording(&mut self) {
        self.state.push_log("Stopping...");
        self.recorder.stop();
    }

    fn handle_events(&mut self) {
        for event in self.recorder.poll_events() {
            match event {
                RecorderEvent::Started { output, command } => {
                    self.state.push_log(format!("Running: {}", command));
                    self.state.push_log(format!("Recording started: {}", output.display()));
                }
                RecorderEvent::Log(line) => self.state.push_log(line),
                RecorderEvent::Stopped { code, output, .. } => {
                    let code = code.map(|c| c.to_string()).unwrap_or_else(|| "killed".to_string());
                    self.state
                        .push_log(format!("Recording finished (exit={}): {}", code, output.display()));
                }
                RecorderEvent::Error(message) => self.state.report_error(message),
            }
        }
    }

    fn draw_settings_form(&mut self, ui: &mut egui::Ui) -> bool {
        let state = &mut self.state;
        let mut refresh_requested = false;

        Grid::new("settings_grid")
            .num_columns(2)
            .spacing([12.0, 8.0])
            .show(ui, |ui| {
                ui.label("FFmpeg path");
                ui.horizontal(|ui| {
                    ui.add(TextEdit::singleline(&mut state.settings.ffmpeg_path).desired_width(420.0));
                    if ui.button("Browse...").clicked() {
                        if let Some(path) = rfd::FileDialog::new().set_title("Select ffmpeg").pick_file() {
                            state.settings.ffmpeg_path = path.to_string_lossy().to_string();
                        }
                    }
                });
                ui.end_row();

                ui.label("Output folder");
                ui.horizontal(|ui| {
                    ui.add(TextEdit::singleline(&mut state.settings.output_directory).desired_width(420.0));
                    if ui.button("Folder...").clicked() {
                        let start = PathBuf::from(state.settings.output_directory.trim());
                        let mut dialog = rfd::FileDialog::new().set_title("Select output folder");
                        if start.is_dir() {
                            dialog = dialog.set_directory(start);
                        }
                        if let Some(dir) = dialog.pick_folder() {
                            state.settings.output_directory = dir.to_string_lossy().to_string();
                        }
                    }
                });
                ui.end_row();

                ui.label("Monitor");
                let selected_text = state
                    .selected_monitor
                    .and_then(|idx| state.monitors.get(idx))
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "No monitor".to_string());
                ComboBox::from_id_salt("monitor")
                    .width(320.0)
                    .selected_text(selected_text)
                    .show_ui(ui, |ui| {
                        for monitor in &state.monitors {
                            ui.selectable_value(&mut state.selected_monitor, Some(monitor.index), monitor.to_string());
                        }
                    });
                ui.end_row();

                ui.label("System audio");
                audio_combo(ui, "system_audio", &mut state.system_audio, &state.audio_devices);
                ui.end_row();

                ui.label("Microphone");
                audio_combo(ui, "microphone", &mut state.microphone, &state.audio_devices);
                ui.end_row();

                ui.label("FPS");
                ui.add(DragValue::new(&mut state.settings.frame_rate).range(MIN_FRAME_RATE..=MAX_FRAME_RATE));
                ui.end_row();

                ui.label("x264 preset");
                ComboBox::from_id_salt("preset")
                    .selected_text(state.settings.preset.clone())
                    .show_ui(ui, |ui| {
                        for preset in X264_PRESETS {
                            ui.selectable_value(&mut state.settings.preset, preset.to_string(), preset);
                        }
                    });
                ui.end_row();

                ui.label("Video encoder");
                ComboBox::from_id_salt("encoder")
                    .selected_text(state.settings.encoder.label())
                    .show_ui(ui, |ui| {
                        for enc in &state.encoders {
                            ui.selectable_value(&mut state.settings.encoder, *enc, enc.label());
                        }
                    });
                ui.end_row();
            });

        ui.add_space(4.0);
        let scanning = self.pending_scan.is_some();
        ui.horizontal(|ui| {
            if ui.add_enabled(!scanning, egui::Button::new("Refresh devices")).clicked() {
                refresh_requested = true;
            }
            if scanning {
                ui.spinner();
            }
        });

        refresh_requested
    }
}

fn audio_combo(ui: &mut egui::Ui, id: &str, selected: &mut Option<AudioDevice>, devices: &[AudioDevice]) {
    let selected_text = selected
        .as_ref()
        .map(|d| d.label().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    ComboBox::from_id_salt(id)
        .width(320.0)
        .selected_text(selected_text)
        .show_ui(ui, |ui| {
            ui.selectable_value(&mut *selected, None, "(none)");
            for device in devices {
                ui.selectable_value(&mut *selected, Some(device.clone()), device.label());
            }
        });
}

impl eframe::App for RecorderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_style(recorder_style());

        self.handle_events();
        self.poll_scan();

        let mut toggle_record = ctx.input_mut(|i| i.consume_shortcut(&start_stop_shortcut()));
        let recorder_state = self.recorder.state();

        TopBottomPanel::top("controls_panel").show(ctx, |ui| {
            ui.horizontal_centered(|ui| {
                let (label, color) = match recorder_state {
                    RecorderState::Idle => ("⏺ Start Recording", Color32::from_rgb(35, 165, 90)),
                    RecorderState::Recording => ("⏹ Stop", Color32::from_rgb(240, 71, 71)),
                    RecorderState::Stopping => ("Stopping...", Color32::from_rgb(116, 127, 141)),
                };
                let button = egui::Button::new(RichText::new(label).size(16.0))
                    .fill(color)
                    .corner_radius(10);
                if ui
                    .add_enabled_ui(recorder_state != RecorderState::Stopping, |ui| {
                        ui.add_sized([170.0, 40.0], button)
                    })
                    .inner
                    .clicked()
                {
                    toggle_record = true;
                }

                let (status_text, status_color) = match recorder_state {
                    RecorderState::Recording => ("● REC", Color32::from_rgb(240, 71, 71)),
                    RecorderState::Stopping => ("● STOPPING", Color32::from_rgb(255, 180, 0)),
                    RecorderState::Idle => ("● IDLE", Color32::from_rgb(116, 127, 141)),
                };
                ui.colored_label(status_color, RichText::new(status_text).size(14.0));

                if let Some(path) = self.recorder.output_file() {
                    ui.label(path.display().to_string());
                }
            });
        });

        let mut refresh_requested = false;
        CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(recorder_state == RecorderState::Idle, |ui| {
                refresh_requested = self.draw_settings_form(ui);
            });

            ui.separator();
            ui.heading("Log");
            ScrollArea::vertical()
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for line in &self.state.log_lines {
                        ui.monospace(line);
                    }
                });
        });

        if let Some(message) = self.state.error_message.clone() {
            let mut dismissed = false;
            egui::Window::new("Error")
                .collapsible(false)
                .resizable(false)
                .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label(message);
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            if dismissed {
                self.state.error_message = None;
            }
        }

        if refresh_requested {
            self.refresh_devices();
        }
        if toggle_record {
            self.toggle_recording();
        }

        if self.recorder.is_running() || self.pending_scan.is_some() {
            ctx.request_repaint_after(REPAINT_INTERVAL);
        }
    }
}

impl Drop for RecorderApp {
    fn drop(&mut self) {
        if let Err(e) = self.recorder.stop_and_wait(STOP_GRACE) {
            error!("Failed to stop ffmpeg on exit: {}", e);
        }
        self.state.sync_settings();
        if let Err(e) = self.state.settings.save() {
            error!("Failed to save settings on exit: {:#}", e);
        }
    }
}

fn recorder_style() -> egui::Style {
    let mut style = egui::Style::default();

    style.visuals.widgets.inactive.bg_fill = Color32::from_rgb(88, 101, 242);
    style.visuals.widgets.hovered.bg_fill = Color32::from_rgb(71, 82, 196);
    style.visuals.widgets.active.bg_fill = Color32::from_rgb(58, 67, 159);

    style.visuals.panel_fill = Color32::from_rgb(54, 57, 63);
    style.visuals.extreme_bg_color = Color32::from_rgb(47, 49, 54);
    style.visuals.code_bg_color = Color32::from_rgb(40, 42, 46);

    style.visuals.widgets.inactive.fg_stroke.color = Color32::from_rgb(255, 255, 255);
    style.visuals.widgets.noninteractive.fg_stroke.color = Color32::from_rgb(185, 187, 190);

    style.visuals.window_fill = Color32::from_rgb(54, 57, 63);
    style.visuals.window_stroke = Stroke::new(1.0, Color32::from_rgb(32, 34, 37));

    style.spacing.item_spacing = egui::Vec2::new(8.0, 8.0);
    style.spacing.window_margin = egui::Margin::same(8);

    style
}
