use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};

/// Video encoders offered in the UI. Hardware encoders depend on the
/// ffmpeg build and the GPU, see [`available_encoders`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VideoEncoder {
    #[default]
    X264,
    Nvenc,
    Qsv,
    Amf,
    HevcNvenc,
    HevcQsv,
    HevcAmf,
}

impl VideoEncoder {
    pub const ALL: [VideoEncoder; 7] = [
        VideoEncoder::X264,
        VideoEncoder::Nvenc,
        VideoEncoder::Qsv,
        VideoEncoder::Amf,
        VideoEncoder::HevcNvenc,
        VideoEncoder::HevcQsv,
        VideoEncoder::HevcAmf,
    ];

    pub fn codec(&self) -> &'static str {
        match self {
            VideoEncoder::X264 => "libx264",
            VideoEncoder::Nvenc => "h264_nvenc",
            VideoEncoder::Qsv => "h264_qsv",
            VideoEncoder::Amf => "h264_amf",
            VideoEncoder::HevcNvenc => "hevc_nvenc",
            VideoEncoder::HevcQsv => "hevc_qsv",
            VideoEncoder::HevcAmf => "hevc_amf",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VideoEncoder::X264 => "libx264 (software)",
            VideoEncoder::Nvenc => "NVIDIA (h264_nvenc)",
            VideoEncoder::Qsv => "Intel QSV (h264_qsv)",
            VideoEncoder::Amf => "AMD AMF (h264_amf)",
            VideoEncoder::HevcNvenc => "HEVC NVENC (hevc_nvenc)",
            VideoEncoder::HevcQsv => "HEVC QSV (hevc_qsv)",
            VideoEncoder::HevcAmf => "HEVC AMF (hevc_amf)",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, VideoEncoder::X264)
    }

    /// Translates an x264 preset name into the speed option the encoder
    /// understands.
    pub fn preset_args(&self, preset: &str) -> Vec<String> {
        match self {
            VideoEncoder::X264 => vec!["-preset".to_string(), preset.to_string()],
            VideoEncoder::Nvenc | VideoEncoder::HevcNvenc => {
                let p = match preset {
                    "ultrafast" | "superfast" => "p1",
                    "veryfast" => "p2",
                    "faster" | "fast" => "p3",
                    _ => "p4",
                };
                vec!["-preset".to_string(), p.to_string()]
            }
            VideoEncoder::Qsv | VideoEncoder::HevcQsv => {
                // QSV has no ultrafast/superfast
                let p = match preset {
                    "veryfast" | "faster" | "fast" | "medium" => preset,
                    _ => "veryfast",
                };
                vec!["-preset".to_string(), p.to_string()]
            }
            VideoEncoder::Amf | VideoEncoder::HevcAmf => {
                let q = match preset {
                    "medium" => "balanced",
                    _ => "speed",
                };
                vec!["-quality".to_string(), q.to_string()]
            }
        }
    }
}

/// Runs `ffmpeg -encoders` and reports which of our encoders the build
/// carries. Falls back to software only when ffmpeg can't be run.
pub fn available_encoders(ffmpeg_path: &str) -> Vec<VideoEncoder> {
    let output = match Command::new(ffmpeg_path)
        .arg("-hide_banner")
        .arg("-encoders")
        .stdin(Stdio::null())
        .output()
    {
        Ok(o) => o,
        Err(e) => {
            warn!("Could not query ffmpeg encoders ({}): {}", ffmpeg_path, e);
            return vec![VideoEncoder::X264];
        }
    };

    let listing = String::from_utf8_lossy(&output.stdout);
    let encoders = parse_encoder_listing(&listing);
    info!("ffmpeg encoders available: {:?}", encoders);
    encoders
}

pub fn parse_encoder_listing(listing: &str) -> Vec<VideoEncoder> {
    let names: Vec<&str> = listing
        .lines()
        .filter_map(|line| {
            // " V....D libx264   libx264 H.264 / AVC ..."
            let mut cols = line.split_whitespace();
            let flags = cols.next()?;
            if !flags.starts_with('V') {
                return None;
            }
            cols.next()
        })
        .collect();

    let mut found: Vec<VideoEncoder> = VideoEncoder::ALL
        .iter()
        .copied()
        .filter(|enc| enc.is_hardware() && names.contains(&enc.codec()))
        .collect();
    found.insert(0, VideoEncoder::X264);
    found
}
