//! Pitch Cache (C2): offline generation and lookup of pitch-shifted renditions of bank samples,
//! as on-disk artifacts keyed by `(slot, ratio)`.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::{PITCH_MAX, PITCH_MIN, RATIO_TOLERANCE};
use crate::error::{Error, Result};
use crate::pitch_shift::{Quality, TimeDomainShifter};

/// Number of input frames fed through the shifter per chunk while generating an artifact.
const GENERATION_CHUNK_FRAMES: usize = 16_384;

fn round_to_key(ratio: f64) -> i64 {
    (ratio / RATIO_TOLERANCE).round() as i64
}

/// Deterministic on-disk path for a pitched rendition of `source_path` at `ratio`.
///
/// `<source-dir>/<source-stem>_p<ratio-%.3f>.wav`, e.g. `kick_p1.200.wav`.
pub fn get_file_path(source_path: &str, ratio: f64) -> PathBuf {
    let path = Path::new(source_path);
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!("{stem}_p{ratio:.3}.wav"))
}

/// Generate (or confirm) the pitched artifact for `source_path` at `ratio`.
///
/// Opens the source as 48 kHz stereo float32, feeds fixed-size chunks through a time-domain pitch
/// shifter at the process-global quality preset, and writes the result as a float32 WAV. A
/// zero-frame result is treated as failure and the partial file is removed.
pub fn generate_file(source_path: &str, ratio: f64, quality: Quality) -> Result<PathBuf> {
    let out_path = get_file_path(source_path, ratio);

    if out_path.exists() {
        return Ok(out_path);
    }

    let file = std::fs::File::open(source_path)?;
    let media_source = symphonia::core::io::ReadOnlySource::new(file);
    let mut source = crate::sample_sources::symphonia_impl::build_symphonia(media_source)
        .map_err(|e| Error::DecodeError {
            message: format!("{source_path}: {e}"),
        })?;

    let channels = source.get_descriptor().get_channel_count();

    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate: crate::config::SR,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(&out_path, spec)?;
    let mut shifter = TimeDomainShifter::new(channels, ratio, quality);

    let mut chunk = vec![0.0f32; GENERATION_CHUNK_FRAMES * channels];
    let mut out_chunk = vec![0.0f32; GENERATION_CHUNK_FRAMES * channels * 2];
    let mut total_frames_written = 0u64;

    loop {
        let frames_read = source.read_samples(&mut chunk).map_err(|e| Error::DecodeError {
            message: e.to_string(),
        })?;

        if frames_read == 0 {
            shifter.flush();
        } else {
            shifter.push(&chunk[..frames_read as usize * channels]);
        }

        loop {
            let written = shifter.pull(&mut out_chunk);
            if written == 0 {
                break;
            }
            for frame in out_chunk[..written * channels].chunks_exact(channels) {
                writer.write_samples_interleaved(frame)?;
            }
            total_frames_written += written as u64;
        }

        if frames_read == 0 {
            break;
        }
    }

    writer.finalize()?;

    if total_frames_written == 0 {
        let _ = std::fs::remove_file(&out_path);
        return Err(Error::IoError {
            message: format!("pitch generation for {source_path} produced zero frames"),
        });
    }

    Ok(out_path)
}

/// Small extension so `hound::WavWriter` accepts an interleaved frame at once.
trait WriteInterleaved {
    fn write_samples_interleaved(&mut self, frame: &[f32]) -> Result<()>;
}

impl<W: std::io::Write + std::io::Seek> WriteInterleaved for hound::WavWriter<W> {
    fn write_samples_interleaved(&mut self, frame: &[f32]) -> Result<()> {
        for &sample in frame {
            self.write_sample(sample)?;
        }
        Ok(())
    }
}

pub struct PitchCache {
    pool: rayon::ThreadPool,
    inflight: Mutex<HashSet<(usize, i64)>>,
    quality: Mutex<Quality>,
}

impl PitchCache {
    pub fn new(threads: NonZeroUsize) -> Self {
        PitchCache {
            pool: rayon::ThreadPoolBuilder::new()
                .num_threads(threads.get())
                .build()
                .expect("failed to build pitch cache worker pool"),
            inflight: Mutex::new(HashSet::new()),
            quality: Mutex::new(Quality::DEFAULT),
        }
    }

    pub fn set_quality(&self, q: u8) {
        *self.quality.lock().unwrap() = Quality::clamped(q);
    }

    pub fn quality(&self) -> Quality {
        *self.quality.lock().unwrap()
    }

    /// Enqueue a generation job for `(slot, ratio)` unless one within tolerance is already
    /// in-flight. `on_complete` runs on the worker thread after the job finishes, regardless of
    /// success, so the caller can clear its `is_processing` flag.
    pub fn start_async(
        self: &std::sync::Arc<Self>,
        slot: usize,
        ratio: f64,
        source_path: String,
        on_complete: impl FnOnce(usize) + Send + 'static,
    ) {
        let key = (slot, round_to_key(ratio));
        {
            let mut inflight = self.inflight.lock().unwrap();
            if !inflight.insert(key) {
                return;
            }
        }

        let this = self.clone();
        self.pool.spawn(move || {
            let quality = this.quality();
            let _ = generate_file(&source_path, ratio, quality);
            this.inflight.lock().unwrap().remove(&key);
            on_complete(slot);
        });
    }

    /// Resolve `cell_pitch` (`None` meaning "use the bank's default"), clamp to the engine's pitch
    /// bounds, and enqueue generation unless the resolved ratio is within tolerance of unity.
    pub fn run_preprocessing(
        self: &std::sync::Arc<Self>,
        slot: usize,
        cell_pitch: Option<f64>,
        bank_default_pitch: f64,
        source_path: String,
        on_complete: impl FnOnce(usize) + Send + 'static,
    ) {
        let ratio = cell_pitch.unwrap_or(bank_default_pitch).clamp(PITCH_MIN, PITCH_MAX);

        if (ratio - 1.0).abs() < RATIO_TOLERANCE {
            return;
        }

        self.start_async(slot, ratio, source_path, on_complete);
    }

    /// Delete every pitch artifact living alongside `source_path`, matching the naming scheme.
    pub fn clear_preprocessed_cache(&self, source_path: &str) -> Result<()> {
        let path = Path::new(source_path);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = format!("{stem}_p");

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".wav") {
                let _ = std::fs::remove_file(entry.path());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_matches_naming_scheme() {
        let path = get_file_path("/samples/kick.wav", 1.2);
        assert_eq!(path, Path::new("/samples/kick_p1.200.wav"));
    }

    #[test]
    fn ratios_within_tolerance_round_to_the_same_key() {
        assert_eq!(round_to_key(1.2001), round_to_key(1.2004));
        assert_ne!(round_to_key(1.2001), round_to_key(1.2011));
    }
}
