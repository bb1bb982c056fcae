//! Audio capture device discovery through ffmpeg's own device listing.
//!
//! The listing format belongs to ffmpeg and differs per input backend, so
//! each backend has its own parser. Parsers are pure and work on the
//! decoded text so they can be tested against captured output.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::process::{Command, Stdio};

use crate::error::RecorderError;
use crate::recorder::resolve_ffmpeg;

/// Loopback/virtual cable names, preferred for "system audio".
pub const VIRTUAL_AUDIO_CANDIDATES: [&str; 6] = [
    "CABLE Output (VB-Audio Virtual Cable)",
    "CABLE Output(VB-Audio Virtual Cable)",
    "VoiceMeeter Output (VB-Audio VoiceMeeter VAIO)",
    "VoiceMeeter Aux Output (VB-Audio VoiceMeeter AUX VAIO)",
    "VoiceMeeter VAIO3 Output (VB-Audio VoiceMeeter VAIO3)",
    "VoiceMeeter AUX VAIO Output (VB-Audio VoiceMeeter AUX VAIO)",
];

const VIRTUAL_AUDIO_KEYWORDS: [&str; 6] = [
    "vb-audio",
    "virtual cable",
    "voicemeeter",
    "blackhole",
    "monitor of",
    ".monitor",
];

/// ffmpeg input formats used for capture on each platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceBackend {
    /// Windows: gdigrab video, dshow audio.
    DirectShow,
    /// Linux: x11grab video, PulseAudio/PipeWire audio.
    Pulse,
    /// macOS: avfoundation for both.
    AvFoundation,
}

impl DeviceBackend {
    pub fn for_current_platform() -> Self {
        if cfg!(target_os = "windows") {
            DeviceBackend::DirectShow
        } else if cfg!(target_os = "macos") {
            DeviceBackend::AvFoundation
        } else {
            DeviceBackend::Pulse
        }
    }

    pub fn audio_format(&self) -> &'static str {
        match self {
            DeviceBackend::DirectShow => "dshow",
            DeviceBackend::Pulse => "pulse",
            DeviceBackend::AvFoundation => "avfoundation",
        }
    }

    fn list_args(&self) -> Vec<&'static str> {
        match self {
            DeviceBackend::DirectShow => vec!["-hide_banner", "-list_devices", "true", "-f", "dshow", "-i", "dummy"],
            DeviceBackend::Pulse => vec!["-hide_banner", "-sources", "pulse"],
            DeviceBackend::AvFoundation => vec!["-hide_banner", "-f", "avfoundation", "-list_devices", "true", "-i", ""],
        }
    }

    /// Parses the text printed by the listing invocation.
    pub fn parse(&self, listing: &str) -> Vec<AudioDevice> {
        let devices = match self {
            DeviceBackend::DirectShow => parse_dshow(listing),
            DeviceBackend::Pulse => parse_pulse(listing),
            DeviceBackend::AvFoundation => parse_avfoundation(listing),
        };
        dedup(devices)
    }
}

/// One audio capture source. `alternative` is the stable identifier when
/// ffmpeg reports one (dshow moniker, pulse source name, avfoundation index).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AudioDevice {
    pub display: String,
    pub alternative: String,
}

impl AudioDevice {
    pub fn new(display: impl Into<String>, alternative: impl Into<String>) -> Self {
        Self { display: display.into(), alternative: alternative.into() }
    }

    pub fn label(&self) -> &str {
        if self.display.is_empty() {
            &self.alternative
        } else {
            &self.display
        }
    }

    /// The value passed to `-i` for this device, `None` when the entry has
    /// no usable name.
    pub fn input_arg(&self, backend: DeviceBackend) -> Option<String> {
        let alt = self.alternative.trim();
        let display = self.display.trim();
        let name = if !alt.is_empty() {
            alt
        } else if !display.is_empty() {
            display
        } else {
            return None;
        };

        Some(match backend {
            DeviceBackend::DirectShow => format!("audio={}", name),
            DeviceBackend::Pulse | DeviceBackend::AvFoundation => name.to_string(),
        })
    }
}

pub fn list_audio_devices(ffmpeg_path: &str, backend: DeviceBackend) -> Result<Vec<AudioDevice>> {
    let exe = resolve_ffmpeg(ffmpeg_path).ok_or_else(|| RecorderError::FfmpegNotFound {
        path: ffmpeg_path.to_string(),
    })?;
    info!("Listing {} audio devices using {}", backend.audio_format(), exe);

    let output = Command::new(&exe)
        .args(backend.list_args())
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to run {} for device listing", exe))?;

    // dshow/avfoundation print the listing as log output on stderr;
    // `-sources` prints to stdout.
    let raw = match backend {
        DeviceBackend::Pulse => &output.stdout,
        DeviceBackend::DirectShow | DeviceBackend::AvFoundation => &output.stderr,
    };
    let listing = decode_output(raw);
    debug!("Device listing:\n{}", listing);

    let devices = backend.parse(&listing);
    info!("Found {} audio device(s)", devices.len());
    Ok(devices)
}

/// ffmpeg prints device names in the system code page on some Windows
/// setups; anything that isn't UTF-8 is decoded lossily.
pub fn decode_output(raw: &[u8]) -> String {
    match String::from_utf8(raw.to_vec()) {
        Ok(text) => text,
        Err(_) => {
            warn!("Device listing is not valid UTF-8; some names may be garbled");
            String::from_utf8_lossy(raw).into_owned()
        }
    }
}

/// Drops a leading `[dshow @ 0000...]` style log prefix.
fn strip_log_prefix(line: &str) -> &str {
    let s = line.trim_start();
    if s.starts_with('[') {
        if let Some(end) = s.find(']') {
            if s[..end].contains(" @ ") {
                return s[end + 1..].trim_start();
            }
        }
    }
    s
}

/// Returns the text between the first pair of double quotes and what
/// follows the closing quote.
fn split_quoted(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some((&rest[..end], rest[end + 1..].trim()))
}

fn parse_dshow(listing: &str) -> Vec<AudioDevice> {
    let mut devices: Vec<AudioDevice> = Vec::new();
    let mut in_audio = false;
    // index of the last device line, so alternative names attach to it;
    // reset on video devices so their monikers are dropped
    let mut last: Option<usize> = None;
    let mut last_was_video = false;

    for raw in listing.lines() {
        let line = strip_log_prefix(raw.trim_end_matches(['\r', '\n']));

        if line.contains("DirectShow audio devices") {
            in_audio = true;
            continue;
        }
        if line.contains("DirectShow video devices") {
            in_audio = false;
            continue;
        }

        if let Some(alt_part) = line.strip_prefix("Alternative name") {
            let Some((alt, _)) = split_quoted(alt_part.trim()) else {
                continue;
            };
            if last_was_video {
                continue;
            }
            match last {
                Some(idx) => devices[idx].alternative = alt.to_string(),
                None => {
                    devices.push(AudioDevice::new("", alt));
                    last = Some(devices.len() - 1);
                }
            }
            continue;
        }

        if let Some((name, kind)) = split_quoted(line) {
            let kind = kind.to_ascii_lowercase();
            let is_audio = if kind.is_empty() {
                in_audio
            } else {
                kind.contains("audio")
            };
            if is_audio {
                devices.push(AudioDevice::new(name, ""));
                last = Some(devices.len() - 1);
                last_was_video = false;
            } else {
                last_was_video = true;
            }
        }
    }

    devices
}

fn parse_pulse(listing: &str) -> Vec<AudioDevice> {
    listing
        .lines()
        .filter_map(|raw| {
            let line = raw.trim();
            if line.is_empty() || line.ends_with(':') {
                return None;
            }
            let line = line.trim_start_matches('*').trim_start();
            let (name, rest) = match line.find(char::is_whitespace) {
                Some(pos) => (&line[..pos], &line[pos..]),
                None => (line, ""),
            };
            let description = match (rest.find('['), rest.rfind(']')) {
                (Some(open), Some(close)) if open < close => rest[open + 1..close].trim(),
                _ => "",
            };
            Some(AudioDevice::new(description, name))
        })
        .collect()
}

fn parse_avfoundation(listing: &str) -> Vec<AudioDevice> {
    let mut devices = Vec::new();
    let mut in_audio = false;

    for raw in listing.lines() {
        let line = strip_log_prefix(raw);
        if line.contains("AVFoundation audio devices") {
            in_audio = true;
            continue;
        }
        if line.contains("AVFoundation video devices") {
            in_audio = false;
            continue;
        }
        if !in_audio {
            continue;
        }

        let Some(rest) = line.strip_prefix('[') else {
            continue;
        };
        let Some(close) = rest.find(']') else {
            continue;
        };
        let index = &rest[..close];
        if index.parse::<u32>().is_err() {
            continue;
        }
        let name = rest[close + 1..].trim();
        devices.push(AudioDevice::new(name, format!(":{}", index)));
    }

    devices
}

fn dedup(devices: Vec<AudioDevice>) -> Vec<AudioDevice> {
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|d| seen.insert((d.display.clone(), d.alternative.clone())))
        .collect()
}

/// Picks a loopback / virtual cable device suitable for recording what
/// the system plays.
pub fn pick_virtual_audio(devices: &[AudioDevice]) -> Option<&AudioDevice> {
    for candidate in VIRTUAL_AUDIO_CANDIDATES {
        if let Some(d) = devices.iter().find(|d| d.display.eq_ignore_ascii_case(candidate)) {
            return Some(d);
        }
    }

    let has_keyword = |s: &str| {
        let s = s.to_lowercase();
        VIRTUAL_AUDIO_KEYWORDS.iter().any(|k| s.contains(k))
    };

    devices
        .iter()
        .find(|d| has_keyword(&d.display))
        .or_else(|| devices.iter().find(|d| has_keyword(&d.alternative)))
}

/// Finds a device by full or partial, case-insensitive name, checking the
/// display name before the alternative name.
pub fn pick_by_name<'a>(devices: &'a [AudioDevice], target: &str) -> Option<&'a AudioDevice> {
    let t = target.trim().to_lowercase();
    if t.is_empty() {
        return None;
    }

    devices
        .iter()
        .find(|d| d.display.to_lowercase() == t)
        .or_else(|| devices.iter().find(|d| d.display.to_lowercase().contains(&t)))
        .or_else(|| devices.iter().find(|d| d.alternative.to_lowercase().contains(&t)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DSHOW_MODERN: &str = r#"[dshow @ 000001d6c1a4e680] "Integrated Camera" (video)
[dshow @ 000001d6c1a4e680]   Alternative name "@device_pnp_\\?\usb#vid_04f2&pid_b6d0"
[dshow @ 000001d6c1a4e680] "Microphone (Realtek(R) Audio)" (audio)
[dshow @ 000001d6c1a4e680]   Alternative name "@device_cm_{33D9A762-90C8-11D0-BD43-00A0C911CE86}\wave_{A1B2}"
[dshow @ 000001d6c1a4e680] "CABLE Output (VB-Audio Virtual Cable)" (audio)
[dshow @ 000001d6c1a4e680]   Alternative name "@device_cm_{33D9A762-90C8-11D0-BD43-00A0C911CE86}\wave_{C3D4}"
dummy: Immediate exit requested
"#;

    const DSHOW_LEGACY: &str = r#"[dshow @ 0000020d] DirectShow video devices (some may be both video and audio devices)
[dshow @ 0000020d]  "OBS Virtual Camera"
[dshow @ 0000020d]     Alternative name "@device_sw_{860BB310}\{A3FCE0F5}"
[dshow @ 0000020d] DirectShow audio devices
[dshow @ 0000020d]  "마이크(USB Audio Device)"
[dshow @ 0000020d]     Alternative name "@device_cm_{33D9A762}\wave_{E5F6}"
[dshow @ 0000020d]  "Stereo Mix (Realtek Audio)"
"#;

    #[test]
    fn dshow_keeps_audio_devices_with_monikers() {
        let devices = DeviceBackend::DirectShow.parse(DSHOW_MODERN);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].display, "Microphone (Realtek(R) Audio)");
        assert_eq!(
            devices[0].alternative,
            r"@device_cm_{33D9A762-90C8-11D0-BD43-00A0C911CE86}\wave_{A1B2}"
        );
        assert_eq!(devices[1].display, "CABLE Output (VB-Audio Virtual Cable)");
    }

    #[test]
    fn dshow_legacy_sections_without_kind_markers() {
        let devices = DeviceBackend::DirectShow.parse(DSHOW_LEGACY);
        assert_eq!(
            devices,
            vec![
                AudioDevice::new("마이크(USB Audio Device)", r"@device_cm_{33D9A762}\wave_{E5F6}"),
                AudioDevice::new("Stereo Mix (Realtek Audio)", ""),
            ]
        );
    }

    #[test]
    fn dshow_parsing_is_stable() {
        let first = DeviceBackend::DirectShow.parse(DSHOW_MODERN);
        let second = DeviceBackend::DirectShow.parse(DSHOW_MODERN);
        assert_eq!(first, second);
    }

    #[test]
    fn dshow_orphan_alternative_name_creates_entry() {
        let listing = "[dshow @ 01] DirectShow audio devices\n[dshow @ 01]   Alternative name \"@device_cm_{X}\"\n";
        let devices = DeviceBackend::DirectShow.parse(listing);
        assert_eq!(devices, vec![AudioDevice::new("", "@device_cm_{X}")]);
        assert_eq!(devices[0].label(), "@device_cm_{X}");
    }

    #[test]
    fn dshow_duplicates_are_removed() {
        let listing = "\"Mic\" (audio)\n\"Mic\" (audio)\n\"Line In\" (audio)\n";
        let devices = DeviceBackend::DirectShow.parse(listing);
        assert_eq!(devices.len(), 2);
    }

    #[test]
    fn pulse_sources() {
        let listing = "Auto-detected sources for pulse:\n\
            * alsa_input.pci-0000_00_1f.3.analog-stereo [Built-in Audio Analog Stereo] (none)\n  \
            alsa_output.pci-0000_00_1f.3.analog-stereo.monitor [Monitor of Built-in Audio Analog Stereo] (none)\n";
        let devices = DeviceBackend::Pulse.parse(listing);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].display, "Built-in Audio Analog Stereo");
        assert_eq!(devices[0].alternative, "alsa_input.pci-0000_00_1f.3.analog-stereo");
        assert_eq!(
            devices[1].input_arg(DeviceBackend::Pulse).as_deref(),
            Some("alsa_output.pci-0000_00_1f.3.analog-stereo.monitor")
        );
    }

    #[test]
    fn avfoundation_audio_section_only() {
        let listing = "[AVFoundation indev @ 0x7f8] AVFoundation video devices:\n\
            [AVFoundation indev @ 0x7f8] [0] FaceTime HD Camera\n\
            [AVFoundation indev @ 0x7f8] [1] Capture screen 0\n\
            [AVFoundation indev @ 0x7f8] AVFoundation audio devices:\n\
            [AVFoundation indev @ 0x7f8] [0] MacBook Pro Microphone\n\
            [AVFoundation indev @ 0x7f8] [1] BlackHole 2ch\n\
            : Input/output error\n";
        let devices = DeviceBackend::AvFoundation.parse(listing);
        assert_eq!(
            devices,
            vec![
                AudioDevice::new("MacBook Pro Microphone", ":0"),
                AudioDevice::new("BlackHole 2ch", ":1"),
            ]
        );
    }

    #[test]
    fn input_arg_prefers_moniker() {
        let dev = AudioDevice::new("Mic", "@device_cm_{X}");
        assert_eq!(dev.input_arg(DeviceBackend::DirectShow).as_deref(), Some("audio=@device_cm_{X}"));

        let dev = AudioDevice::new("Mic", "");
        assert_eq!(dev.input_arg(DeviceBackend::DirectShow).as_deref(), Some("audio=Mic"));

        assert_eq!(AudioDevice::default().input_arg(DeviceBackend::DirectShow), None);
    }

    #[test]
    fn virtual_audio_prefers_known_cables() {
        let devices = vec![
            AudioDevice::new("Microphone (Realtek Audio)", ""),
            AudioDevice::new("VoiceMeeter Output (VB-Audio VoiceMeeter VAIO)", ""),
            AudioDevice::new("CABLE Output (VB-Audio Virtual Cable)", ""),
        ];
        let picked = pick_virtual_audio(&devices).unwrap();
        assert_eq!(picked.display, "CABLE Output (VB-Audio Virtual Cable)");
    }

    #[test]
    fn virtual_audio_falls_back_to_keywords() {
        let devices = vec![
            AudioDevice::new("Microphone", "alsa_input.usb"),
            AudioDevice::new("", "alsa_output.pci.analog-stereo.monitor"),
        ];
        let picked = pick_virtual_audio(&devices).unwrap();
        assert_eq!(picked.alternative, "alsa_output.pci.analog-stereo.monitor");

        assert!(pick_virtual_audio(&devices[..1]).is_none());
    }

    #[test]
    fn pick_by_name_matches_exact_then_partial() {
        let devices = vec![
            AudioDevice::new("USB Microphone Pro", ""),
            AudioDevice::new("USB Microphone", "@device_cm_{MIC}"),
        ];
        assert_eq!(pick_by_name(&devices, "usb microphone").unwrap().alternative, "@device_cm_{MIC}");
        assert_eq!(pick_by_name(&devices, "pro").unwrap().display, "USB Microphone Pro");
        assert_eq!(pick_by_name(&devices, "{mic}").unwrap().display, "USB Microphone");
        assert!(pick_by_name(&devices, "  ").is_none());
    }

    #[test]
    fn decode_tolerates_invalid_utf8() {
        let text = decode_output(b"\"Mic \xff\" (audio)");
        assert!(text.starts_with("\"Mic "));
    }
}
