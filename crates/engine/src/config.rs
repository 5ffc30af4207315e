//! Fixed constants governing the engine's data model and realtime behavior.
//!
//! For efficiency and simplicity, the internals use this sample rate and only this sample rate,
//! converting as needed at the edges. If you need more flexibility, e.g. writing a DAW, consider
//! other crates; this library is intentionally opinionated and is designed for a mobile
//! music-sketchpad app in which higher sample rates or variable formats offer no gain at the cost
//! of increased CPU load and code complexity.

use std::num::NonZeroUsize;

/// The fixed sample rate of the library. All decoded and cached audio is stored at this rate;
/// device output is resampled to it at the edge via [crate::cpal_device].
pub const SR: u32 = 48000;

/// The fixed output channel count: stereo, interleaved.
pub const CHANNELS: usize = 2;

/// The size, in frames, of the blocks the internal renderer produces per call.
///
/// The audio device callback may request a different frame count; [crate::cpal_device]
/// accumulates/splits against this fixed block size.
pub const BLOCK_SIZE: usize = 256;

/// Maximum number of sample slots in a bank. Slots are addressed by a single letter (`'a'..='z'`).
pub const MAX_SAMPLES: usize = 26;

/// Maximum number of sections a table may hold.
pub const MAX_SECTIONS: usize = 64;

/// Maximum number of steps in a single section.
pub const MAX_STEPS: usize = 2048;

/// Maximum number of columns (voices per step) in a section.
pub const MAX_COLUMNS: usize = 16;

/// Maximum number of stacked layers per column per step.
pub const MAX_LAYERS: usize = 4;

/// Number of undo/redo snapshots retained in the history ring.
pub const HISTORY_CAPACITY: usize = 100;

/// Number of background worker threads used for pitch-cache generation.
pub fn worker_pool_threads() -> NonZeroUsize {
    NonZeroUsize::new(4).unwrap()
}

/// Smallest pitch ratio the engine will schedule (five octaves down).
pub const PITCH_MIN: f64 = 0.031_25;

/// Largest pitch ratio the engine will schedule (five octaves up).
pub const PITCH_MAX: f64 = 32.0;

/// Smallest per-sample pitch ratio exposed to a single voice.
pub const SAMPLE_PITCH_MIN: f64 = 0.25;

/// Largest per-sample pitch ratio exposed to a single voice.
pub const SAMPLE_PITCH_MAX: f64 = 4.0;

/// Two pitch ratios within this tolerance of each other are considered the same cache entry.
pub const RATIO_TOLERANCE: f64 = 0.001;

/// Below this linear amplitude a voice is considered silent and may be recycled.
pub const VOLUME_SILENCE_THRESHOLD: f32 = 1e-4;

/// Rise time, in milliseconds, of the click-free crossfade when a voice is triggered.
pub const RISE_TIME_MS: f32 = 6.0;

/// Fall time, in milliseconds, of the click-free crossfade when a voice is released or stolen.
pub const FALL_TIME_MS: f32 = 12.0;

/// Analysis/synthesis grain length, in milliseconds, for the streaming time-domain pitch shifter.
/// Grains are placed at a fixed hop on both the input and output timelines, which is what keeps
/// the shifter's output duration independent of the pitch ratio.
pub const PITCH_SHIFT_GRAIN_MS: f64 = 20.0;

/// Convert a duration in milliseconds to a sample count at the engine's fixed sample rate.
pub fn ms_to_samples(ms: f32) -> usize {
    ((ms / 1000.0) * SR as f32).round() as usize
}
