//! Recorder (C7): taps the engine's output to a canonical WAV file.

use std::sync::Mutex;

use crate::config::{CHANNELS, SR};
use crate::error::{Error, Result};

struct ActiveRecording {
    writer: hound::WavWriter<std::io::BufWriter<std::fs::File>>,
}

/// Records every frame handed to [Recorder::write_block] to a 32-bit float, stereo, 48 kHz WAV
/// file until stopped.
pub struct Recorder {
    active: Mutex<Option<ActiveRecording>>,
}

impl Recorder {
    pub fn new() -> Self {
        Recorder {
            active: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    pub fn start(&self, path: &str) -> Result<()> {
        let mut guard = self.active.lock().unwrap();
        if guard.is_some() {
            return Err(Error::AlreadyRecording);
        }

        let spec = hound::WavSpec {
            channels: CHANNELS as u16,
            sample_rate: SR,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(path, spec)?;
        *guard = Some(ActiveRecording { writer });
        Ok(())
    }

    /// Stop recording, finalizing the WAV's `data` chunk size. A no-op error if nothing was
    /// active.
    pub fn stop(&self) -> Result<()> {
        let mut guard = self.active.lock().unwrap();
        let recording = guard.take().ok_or(Error::NotRecording)?;
        recording.writer.finalize()?;
        Ok(())
    }

    /// Append one rendered block of interleaved samples, if recording is active. Never blocks the
    /// caller on an inactive recorder and silently drops write errors onto the log, matching the
    /// engine's rule that the audio path never propagates control-thread errors.
    pub fn write_block(&self, interleaved: &[f32]) {
        let mut guard = self.active.lock().unwrap();
        if let Some(recording) = guard.as_mut() {
            for &sample in interleaved {
                if let Err(e) = recording.writer.write_sample(sample) {
                    rt_warn!("recorder write failed: {}", e);
                    break;
                }
            }
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_is_idempotent_across_cycles() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!(
            "sketchpad_recorder_test_{}.wav",
            std::process::id()
        ));
        let path_str = path.to_string_lossy().into_owned();

        let recorder = Recorder::new();
        assert!(!recorder.is_active());

        recorder.start(&path_str).unwrap();
        assert!(recorder.is_active());
        assert!(matches!(
            recorder.start(&path_str),
            Err(Error::AlreadyRecording)
        ));

        recorder.write_block(&[0.0, 0.0, 0.5, -0.5]);
        recorder.stop().unwrap();
        assert!(!recorder.is_active());
        assert!(matches!(recorder.stop(), Err(Error::NotRecording)));

        recorder.start(&path_str).unwrap();
        recorder.stop().unwrap();

        let _ = std::fs::remove_file(&path);
    }
}
