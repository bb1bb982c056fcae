#[cfg(test)]
mod tests {
    use crate::command::CaptureOptions;
    use crate::config::Settings;
    use crate::devices::DeviceBackend;
    use crate::encoder::VideoEncoder;
    use crate::error::RecorderError;
    use crate::recorder::{Recorder, RecorderState};
    use crate::screen::MonitorInfo;
    use std::path::{Path, PathBuf};

    fn options(ffmpeg: &Path, output_directory: PathBuf) -> CaptureOptions {
        CaptureOptions {
            ffmpeg_path: ffmpeg.to_string_lossy().to_string(),
            output_directory,
            frame_rate: 30,
            preset: "veryfast".to_string(),
            encoder: VideoEncoder::X264,
            monitor: MonitorInfo { index: 0, x: 0, y: 0, width: 1280, height: 720, is_primary: true },
            audio_inputs: vec!["audio=Microphone".to_string()],
            backend: DeviceBackend::DirectShow,
        }
    }

    #[test]
    fn settings_default_has_output_dir() {
        let settings = Settings::default();
        assert!(!settings.output_path().as_os_str().is_empty());
    }

    #[test]
    fn unwritable_output_path_is_an_error() {
        // any existing file passes the ffmpeg lookup without being run
        let fake_ffmpeg = tempfile::NamedTempFile::new().unwrap();
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let out_dir = blocker.path().join("recordings");

        let mut recorder = Recorder::new();
        let err = recorder.start(&options(fake_ffmpeg.path(), out_dir)).unwrap_err();

        assert!(matches!(err, RecorderError::OutputDir { .. }));
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn missing_ffmpeg_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new();
        let err = recorder
            .start(&options(Path::new("/no/such/dir/ffmpeg-missing"), dir.path().to_path_buf()))
            .unwrap_err();

        assert!(matches!(err, RecorderError::FfmpegNotFound { .. }));
        assert!(!recorder.is_running());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::recorder::RecorderEvent;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::process::Command;
        use std::thread;
        use std::time::{Duration, Instant};

        /// A shell script standing in for ffmpeg.
        fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("ffmpeg");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn start(recorder: &mut Recorder, opts: &CaptureOptions) -> PathBuf {
            // a freshly written script can briefly be busy for exec
            for _ in 0..10 {
                match recorder.start(opts) {
                    Ok(path) => return path,
                    Err(RecorderError::Spawn(e)) if e.raw_os_error() == Some(26) => {
                        thread::sleep(Duration::from_millis(50))
                    }
                    Err(e) => panic!("start failed: {}", e),
                }
            }
            panic!("ffmpeg stand-in stayed busy");
        }

        fn wait_for_stop(recorder: &mut Recorder, timeout: Duration) -> Vec<RecorderEvent> {
            let deadline = Instant::now() + timeout;
            let mut events = Vec::new();
            while Instant::now() < deadline {
                events.extend(recorder.poll_events());
                if events.iter().any(|e| matches!(e, RecorderEvent::Stopped { .. })) {
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }
            events
        }

        fn process_alive(pid: u32) -> bool {
            Command::new("kill")
                .arg("-0")
                .arg(pid.to_string())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        }

        #[test]
        fn quit_keystroke_stops_ffmpeg() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(dir.path(), "read line\necho \"got $line\" >&2\nexit 0");
            let out_dir = dir.path().join("out");

            let mut recorder = Recorder::new();
            let opts = options(&ffmpeg, out_dir.clone());
            let output = start(&mut recorder, &opts);

            assert!(output.starts_with(&out_dir));
            assert!(output.file_name().unwrap().to_string_lossy().starts_with("record_"));
            assert_eq!(recorder.state(), RecorderState::Recording);
            assert!(matches!(recorder.start(&opts), Err(RecorderError::AlreadyRecording)));

            let pid = recorder.pid().unwrap();
            let status = recorder.stop_and_wait(Duration::from_secs(5)).unwrap().unwrap();
            assert!(status.success());
            assert_eq!(recorder.state(), RecorderState::Idle);
            assert!(!process_alive(pid));
        }

        #[test]
        fn unresponsive_ffmpeg_is_killed() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(dir.path(), "exec sleep 30");

            let mut recorder = Recorder::new();
            start(&mut recorder, &options(&ffmpeg, dir.path().join("out")));
            let pid = recorder.pid().unwrap();

            let status = recorder.stop_and_wait(Duration::from_millis(300)).unwrap().unwrap();
            assert!(!status.success());
            assert!(!recorder.is_running());
            assert!(!process_alive(pid));
        }

        #[test]
        fn background_stop_reports_exit() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(dir.path(), "read line\nexit 0");

            let mut recorder = Recorder::new().with_grace(Duration::from_secs(2));
            start(&mut recorder, &options(&ffmpeg, dir.path().join("out")));
            recorder.stop();
            assert_eq!(recorder.state(), RecorderState::Stopping);

            let events = wait_for_stop(&mut recorder, Duration::from_secs(10));
            assert!(events.iter().any(|e| matches!(e, RecorderEvent::Started { .. })));
            assert!(events
                .iter()
                .any(|e| matches!(e, RecorderEvent::Stopped { code: Some(0), .. })));
            assert!(!events.iter().any(|e| matches!(e, RecorderEvent::Error(_))));
            assert_eq!(recorder.state(), RecorderState::Idle);
        }

        #[test]
        fn background_stop_kills_after_grace() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(dir.path(), "exec sleep 30");

            let mut recorder = Recorder::new().with_grace(Duration::from_millis(200));
            start(&mut recorder, &options(&ffmpeg, dir.path().join("out")));
            let pid = recorder.pid().unwrap();
            recorder.stop();

            let events = wait_for_stop(&mut recorder, Duration::from_secs(10));
            assert!(events.iter().any(|e| matches!(e, RecorderEvent::Stopped { .. })));
            // a requested stop is not reported as a failure
            assert!(!events.iter().any(|e| matches!(e, RecorderEvent::Error(_))));
            assert_eq!(recorder.state(), RecorderState::Idle);
            assert!(!process_alive(pid));
        }

        #[test]
        fn ffmpeg_failure_is_surfaced() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(dir.path(), "echo 'Could not find audio only device' >&2\nexit 1");

            let mut recorder = Recorder::new();
            start(&mut recorder, &options(&ffmpeg, dir.path().join("out")));

            let events = wait_for_stop(&mut recorder, Duration::from_secs(10));
            assert!(events
                .iter()
                .any(|e| matches!(e, RecorderEvent::Error(msg) if msg.contains("status 1"))));
            assert!(events
                .iter()
                .any(|e| matches!(e, RecorderEvent::Stopped { code: Some(1), .. })));
            assert!(!recorder.is_running());
        }

        #[test]
        fn command_line_is_announced() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(dir.path(), "read line\nexit 0");

            let mut recorder = Recorder::new();
            start(&mut recorder, &options(&ffmpeg, dir.path().join("out")));
            let events = recorder.poll_events();
            recorder.stop_and_wait(Duration::from_secs(5)).unwrap();

            let command = events
                .iter()
                .find_map(|e| match e {
                    RecorderEvent::Started { command, .. } => Some(command.clone()),
                    _ => None,
                })
                .unwrap();
            assert!(command.contains("-f gdigrab"));
            assert!(command.contains("audio=Microphone"));
        }
    }
}
