use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::devices::DeviceBackend;
use crate::encoder::VideoEncoder;
use crate::screen::MonitorInfo;

const AUDIO_BITRATE: &str = "192k";

/// Everything needed to build one ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub ffmpeg_path: String,
    pub output_directory: PathBuf,
    pub frame_rate: u32,
    pub preset: String,
    pub encoder: VideoEncoder,
    pub monitor: MonitorInfo,
    /// Ready-made `-i` values, at most two (system + microphone).
    pub audio_inputs: Vec<String>,
    pub backend: DeviceBackend,
}

pub fn output_file_name(now: DateTime<Local>) -> String {
    format!("record_{}.mp4", now.format("%Y%m%d_%H%M%S"))
}

/// Builds the argument vector (program name excluded).
pub fn build_args(opts: &CaptureOptions, out_file: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-hide_banner", "-v", "info"].iter().map(|s| s.to_string()).collect();

    args.extend(video_input_args(opts));

    let audio_inputs: Vec<&String> = opts.audio_inputs.iter().filter(|a| !a.is_empty()).take(2).collect();
    for input in &audio_inputs {
        args.extend([
            "-thread_queue_size".to_string(),
            "1024".to_string(),
            "-f".to_string(),
            opts.backend.audio_format().to_string(),
            "-i".to_string(),
            input.to_string(),
        ]);
    }

    if audio_inputs.len() == 2 {
        args.extend([
            "-filter_complex".to_string(),
            "[1:a][2:a]amix=inputs=2:duration=longest[aout]".to_string(),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "[aout]".to_string(),
        ]);
    }

    args.extend(["-c:v".to_string(), opts.encoder.codec().to_string()]);
    args.extend(opts.encoder.preset_args(&opts.preset));
    args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);

    if audio_inputs.is_empty() {
        args.push("-an".to_string());
    } else {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            AUDIO_BITRATE.to_string(),
        ]);
    }

    args.push(out_file.to_string_lossy().to_string());
    args
}

fn video_input_args(opts: &CaptureOptions) -> Vec<String> {
    let mon = &opts.monitor;
    let fps = opts.frame_rate.to_string();
    let args: Vec<String> = match opts.backend {
        DeviceBackend::DirectShow => vec![
            "-f".into(),
            "gdigrab".into(),
            "-framerate".into(),
            fps,
            "-offset_x".into(),
            mon.x.to_string(),
            "-offset_y".into(),
            mon.y.to_string(),
            "-video_size".into(),
            mon.video_size(),
            "-i".into(),
            "desktop".into(),
        ],
        DeviceBackend::Pulse => {
            let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0.0".to_string());
            vec![
                "-f".into(),
                "x11grab".into(),
                "-framerate".into(),
                fps,
                "-video_size".into(),
                mon.video_size(),
                "-i".into(),
                format!("{}+{},{}", display, mon.x, mon.y),
            ]
        }
        DeviceBackend::AvFoundation => vec![
            "-f".into(),
            "avfoundation".into(),
            "-framerate".into(),
            fps,
            "-capture_cursor".into(),
            "1".into(),
            "-i".into(),
            format!("Capture screen {}:none", mon.index),
        ],
    };
    args
}

/// Renders the invocation for the log, quoting arguments that contain
/// spaces.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(|a| {
            if a.is_empty() || a.contains(char::is_whitespace) {
                format!("\"{}\"", a)
            } else {
                a.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
