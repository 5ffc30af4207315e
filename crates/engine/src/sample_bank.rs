//! Sample Bank (C1): up to 26 slots, each a decoded audio file reference plus default gain/pitch.

use std::path::Path;
use std::sync::{Arc, Mutex};

use arrayvec::ArrayString;

use crate::config::{MAX_SAMPLES, SAMPLE_PITCH_MAX, SAMPLE_PITCH_MIN};
use crate::error::{Error, Result};
use crate::pitch_cache::PitchCache;
use sketchpad_sync::seqlock::Seqlock;

/// A slot's fully-decoded, unity-pitch PCM, kept in memory so triggering a voice at its default
/// pitch never has to touch the filesystem or a decoder.
pub struct DecodedAudio {
    pub data: Vec<f32>,
    pub channels: usize,
}

fn decode_whole_file(path: &str) -> Result<DecodedAudio> {
    let file = std::fs::File::open(path).map_err(|e| Error::DecodeError {
        message: format!("failed to open {path}: {e}"),
    })?;
    let media_source = symphonia::core::io::ReadOnlySource::new(file);
    let mut decoder = crate::sample_sources::symphonia_impl::build_symphonia(media_source)
        .map_err(|e| Error::DecodeError {
            message: format!("{path}: {e}"),
        })?;

    let channels = decoder.get_descriptor().get_channel_count();
    let mut data = Vec::new();
    let mut chunk = vec![0.0f32; 4096 * channels];
    loop {
        let read = decoder
            .read_samples(&mut chunk)
            .map_err(|e| Error::DecodeError {
                message: e.to_string(),
            })?;
        if read == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..read as usize * channels]);
    }

    Ok(DecodedAudio { data, channels })
}

/// Volume/pitch pair that every sample slot carries as its default.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SampleSettings {
    pub volume: f32,
    pub pitch: f64,
}

impl Default for SampleSettings {
    fn default() -> Self {
        SampleSettings {
            volume: 1.0,
            pitch: 1.0,
        }
    }
}

/// One bank slot.
///
/// `file_path`/`display_name`/`sample_id` are fixed-capacity strings so the whole state stays
/// `Copy` and can be published through a [Seqlock].
#[derive(Copy, Clone, Debug)]
pub struct Sample {
    pub loaded: bool,
    pub file_path: ArrayString<512>,
    pub display_name: ArrayString<128>,
    pub sample_id: ArrayString<128>,
    pub settings: SampleSettings,
    pub is_processing: bool,
}

impl Default for Sample {
    fn default() -> Self {
        Sample {
            loaded: false,
            file_path: ArrayString::new(),
            display_name: ArrayString::new(),
            sample_id: ArrayString::new(),
            settings: SampleSettings::default(),
            is_processing: false,
        }
    }
}

/// The published, readable state of the bank.
#[derive(Copy, Clone, Debug)]
pub struct BankState {
    pub samples: [Sample; MAX_SAMPLES],
}

impl Default for BankState {
    fn default() -> Self {
        BankState {
            samples: [Sample::default(); MAX_SAMPLES],
        }
    }
}

fn truncate_into<const N: usize>(s: &str) -> ArrayString<N> {
    let mut out = ArrayString::new();
    for c in s.chars() {
        if out.try_push(c).is_err() {
            break;
        }
    }
    out
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct SampleBank {
    state: Arc<Seqlock<BankState>>,
    /// Not part of the `Copy` published state (PCM data isn't `Copy`), kept alongside it instead.
    /// Locked only briefly, on load/unload/apply_state and once per voice trigger.
    decoded: Arc<Mutex<[Option<Arc<DecodedAudio>>; MAX_SAMPLES]>>,
}

impl SampleBank {
    pub fn new() -> Self {
        SampleBank {
            state: Arc::new(Seqlock::new(BankState::default())),
            decoded: Arc::new(Mutex::new(std::array::from_fn(|_| None))),
        }
    }

    /// Fetch the pre-decoded PCM for a slot, if it is loaded. Used by the voice pipeline's
    /// unity-pitch playback path so triggering never has to decode.
    pub fn read_decoded(&self, slot: usize) -> Option<Arc<DecodedAudio>> {
        if slot >= MAX_SAMPLES {
            return None;
        }
        self.decoded.lock().unwrap()[slot].clone()
    }

    /// Read a consistent snapshot of the whole bank.
    pub fn read_state(&self) -> BankState {
        self.state.read()
    }

    /// Read a single slot's settings without copying the whole bank.
    pub fn read_settings(&self, slot: usize) -> Option<SampleSettings> {
        if slot >= MAX_SAMPLES {
            return None;
        }
        Some(self.state.read_with(|s| s.samples[slot].settings))
    }

    /// Read a single slot without copying the whole bank.
    pub fn read_sample(&self, slot: usize) -> Option<Sample> {
        if slot >= MAX_SAMPLES {
            return None;
        }
        Some(self.state.read_with(|s| s.samples[slot]))
    }

    fn validate_slot(slot: usize) -> Result<()> {
        if slot >= MAX_SAMPLES {
            return Err(Error::InvalidArgument {
                message: format!("slot {slot} is out of range 0..{MAX_SAMPLES}"),
            });
        }
        Ok(())
    }

    /// Load a file into a slot, decoding just enough to validate it and resetting settings.
    pub fn load(&self, slot: usize, path: &str) -> Result<()> {
        self.load_with_id(slot, path, "")
    }

    pub fn load_with_id(&self, slot: usize, path: &str, id: &str) -> Result<()> {
        Self::validate_slot(slot)?;

        let decoded = decode_whole_file(path)?;

        self.decoded.lock().unwrap()[slot] = Some(Arc::new(decoded));
        self.state.update(|state| {
            state.samples[slot] = Sample {
                loaded: true,
                file_path: truncate_into(path),
                display_name: truncate_into(&basename(path)),
                sample_id: truncate_into(id),
                settings: SampleSettings::default(),
                is_processing: false,
            };
        });

        Ok(())
    }

    /// Unload a slot. Idempotent.
    pub fn unload(&self, slot: usize) -> Result<()> {
        Self::validate_slot(slot)?;
        self.decoded.lock().unwrap()[slot] = None;
        self.state.update(|state| {
            state.samples[slot] = Sample::default();
        });
        Ok(())
    }

    /// Clamp and apply new default settings, scheduling pitch-cache generation if pitch moved away
    /// from unity.
    pub fn set_sample_settings(
        &self,
        slot: usize,
        volume: f32,
        pitch: f64,
        pitch_cache: &Arc<PitchCache>,
    ) -> Result<()> {
        Self::validate_slot(slot)?;

        let volume = volume.clamp(0.0, 1.0);
        let pitch = pitch.clamp(SAMPLE_PITCH_MIN, SAMPLE_PITCH_MAX);

        let source_path = self
            .state
            .read_with(|s| s.samples[slot].file_path.to_string());

        self.state.update(|state| {
            let sample = &mut state.samples[slot];
            sample.settings = SampleSettings { volume, pitch };
            if (pitch - 1.0).abs() >= crate::config::RATIO_TOLERANCE {
                sample.is_processing = true;
            }
        });

        if (pitch - 1.0).abs() >= crate::config::RATIO_TOLERANCE && !source_path.is_empty() {
            let state = self.state.clone();
            pitch_cache.start_async(slot, pitch, source_path, move |completed_slot| {
                state.update(|state| {
                    state.samples[completed_slot].is_processing = false;
                });
            });
        }

        Ok(())
    }

    /// Reconcile this bank's contents with a snapshot, used by undo/redo's `apply_state`.
    ///
    /// Undo/redo snapshots only cover the `Copy` metadata, not decoded PCM, so this re-decodes
    /// any slot whose file changed. A slot that fails to decode is left unloaded rather than
    /// propagating an error, matching the rule that restoring history can't fail outright.
    pub fn apply_state(&self, desired: &BankState) {
        let previous_paths: [ArrayString<512>; MAX_SAMPLES] =
            self.state.read_with(|s| s.samples.map(|sample| sample.file_path));

        {
            let mut decoded = self.decoded.lock().unwrap();
            for slot in 0..MAX_SAMPLES {
                let sample = &desired.samples[slot];
                if !sample.loaded {
                    decoded[slot] = None;
                    continue;
                }
                if sample.file_path == previous_paths[slot] && decoded[slot].is_some() {
                    continue;
                }
                decoded[slot] = decode_whole_file(sample.file_path.as_str())
                    .map(Arc::new)
                    .ok();
            }
        }

        self.state.update(|state| {
            *state = *desired;
        });
    }
}

impl Default for SampleBank {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bank_has_no_loaded_slots() {
        let bank = SampleBank::new();
        let state = bank.read_state();
        assert!(state.samples.iter().all(|s| !s.loaded));
    }

    #[test]
    fn unload_is_idempotent() {
        let bank = SampleBank::new();
        assert!(bank.unload(0).is_ok());
        assert!(bank.unload(0).is_ok());
    }

    #[test]
    fn invalid_slot_is_rejected() {
        let bank = SampleBank::new();
        assert!(matches!(
            bank.unload(MAX_SAMPLES),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
