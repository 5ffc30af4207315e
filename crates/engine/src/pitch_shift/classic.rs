use super::Quality;
use crate::config::{PITCH_SHIFT_GRAIN_MS, SR};

/// A streaming, duration-preserving time-domain pitch shifter.
///
/// Samples are pushed in as they arrive (from a decoder or from a live voice's source), and
/// pitch-shifted output is pulled out as it becomes available. Unlike a resampler, output
/// duration tracks input duration regardless of `ratio`: analysis grains are read from the
/// buffered input at `ratio`-scaled speed (this is what changes pitch), but successive grains are
/// placed at a fixed hop on both the input and output timelines, so one grain's worth of duration
/// is produced per grain of duration consumed no matter how fast a grain's own content plays back.
///
/// This mirrors the grain-overlap-add shape of `hard_kick_sampler`'s `ClassicShifter`, generalized
/// from random access into a push/pull streaming pipeline so it can run both inside the offline
/// pitch-cache worker and inline on a voice's render path.
pub struct TimeDomainShifter {
    channels: usize,
    ratio: f64,
    quality: Quality,

    /// Output frames per grain.
    grain_len: usize,
    /// Frames between successive grain starts, on both the input and output timelines.
    hop: usize,
    /// Hann window of length `grain_len`, applied to every grain before overlap-add.
    window: Vec<f32>,

    /// Interleaved input samples not yet fully consumed by a grain.
    buffer: Vec<f32>,
    /// Frame index into `buffer` of the next grain's start. Always advances by `hop`, never by
    /// `hop * ratio` — this is what keeps output duration independent of pitch.
    analysis_pos: usize,

    /// Overlap-add accumulator and per-frame window-weight sum (weight is per-frame, shared
    /// across channels), both relative to frame 0 being the next unread output frame.
    out_accum: Vec<f32>,
    out_weight: Vec<f32>,
    /// Frame index, relative to `out_accum`, of the next grain's synthesis start.
    synth_pos: usize,
    /// Frames before this index in `out_accum` are final: no future grain can still touch them.
    ready_frames: usize,

    /// One-pole lowpass state per channel, used only when the quality preset enables
    /// anti-aliasing (relevant when `ratio > 1.0`, i.e. a grain is effectively decimating its
    /// content).
    lowpass_state: Vec<f32>,

    flushed: bool,
    /// Set once a grain has been synthesized past the end of all pushed input; no further grains
    /// will ever be produced.
    input_exhausted: bool,
}

impl TimeDomainShifter {
    pub fn new(channels: usize, ratio: f64, quality: Quality) -> Self {
        assert!(channels > 0);

        let grain_len = ((SR as f64 * PITCH_SHIFT_GRAIN_MS / 1000.0) as usize).max(4);
        let hop = (grain_len / 2).max(1);

        TimeDomainShifter {
            channels,
            ratio,
            quality,
            grain_len,
            hop,
            window: hann_window(grain_len),
            buffer: Vec::new(),
            analysis_pos: 0,
            out_accum: Vec::new(),
            out_weight: Vec::new(),
            synth_pos: 0,
            ready_frames: 0,
            lowpass_state: vec![0.0; channels],
            flushed: false,
            input_exhausted: false,
        }
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio;
    }

    /// Drop all buffered state and start over, as if newly constructed with the same channel
    /// count, ratio, and quality. Used to restart a voice in place without reallocating.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.analysis_pos = 0;
        self.out_accum.clear();
        self.out_weight.clear();
        self.synth_pos = 0;
        self.ready_frames = 0;
        for state in &mut self.lowpass_state {
            *state = 0.0;
        }
        self.flushed = false;
        self.input_exhausted = false;
    }

    /// Push a chunk of interleaved input samples (a whole number of frames).
    pub fn push(&mut self, interleaved: &[f32]) {
        debug_assert_eq!(interleaved.len() % self.channels, 0);

        if self.quality.anti_alias() {
            let cutoff = smoothing_coefficient(self.quality.window_len());
            let channels = self.channels;
            self.buffer.reserve(interleaved.len());
            for frame in interleaved.chunks_exact(channels) {
                for (ch, &sample) in frame.iter().enumerate() {
                    let state = &mut self.lowpass_state[ch];
                    *state += cutoff * (sample - *state);
                    self.buffer.push(*state);
                }
            }
        } else {
            self.buffer.extend_from_slice(interleaved);
        }
    }

    /// Signal that no more input will arrive; the final grain is synthesized with zero-padding
    /// past the end of whatever was pushed.
    pub fn flush(&mut self) {
        self.flushed = true;
    }

    fn buffered_frames(&self) -> usize {
        self.buffer.len() / self.channels
    }

    /// Synthesize every grain whose input is currently available (or, once flushed, whatever
    /// input remains), overlap-adding each into `out_accum` and advancing `ready_frames`.
    fn generate_available_grains(&mut self) {
        let channels = self.channels;

        loop {
            if self.input_exhausted {
                return;
            }

            let have_frames = self.buffered_frames();
            if self.analysis_pos >= have_frames {
                if self.flushed {
                    self.input_exhausted = true;
                }
                return;
            }

            let last_src = self.analysis_pos as f64 + (self.grain_len - 1) as f64 * self.ratio;
            let need_frames = last_src.ceil() as usize + 1;
            if need_frames > have_frames && !self.flushed {
                return;
            }

            let grain_start = self.synth_pos;
            let needed_len = (grain_start + self.grain_len) * channels;
            if self.out_accum.len() < needed_len {
                self.out_accum.resize(needed_len, 0.0);
                self.out_weight.resize(grain_start + self.grain_len, 0.0);
            }

            for i in 0..self.grain_len {
                let src_pos = self.analysis_pos as f64 + i as f64 * self.ratio;
                let base = src_pos.floor() as usize;
                let frac = (src_pos - base as f64) as f32;
                let w = self.window[i];

                for ch in 0..channels {
                    let a = sample_at(&self.buffer, base, ch, channels, have_frames);
                    let b = sample_at(&self.buffer, base + 1, ch, channels, have_frames);
                    let interpolated = a + (b - a) * frac;
                    self.out_accum[(grain_start + i) * channels + ch] += interpolated * w;
                }
                self.out_weight[grain_start + i] += w;
            }

            self.analysis_pos += self.hop;
            self.synth_pos += self.hop;
            self.ready_frames = self.synth_pos;

            if self.flushed && self.analysis_pos >= have_frames {
                self.input_exhausted = true;
                return;
            }
        }
    }

    /// Pull up to `out.len() / channels` frames of pitch-shifted, interleaved output.
    ///
    /// Returns the number of frames written. Drops fully-read frames from the overlap-add
    /// accumulator, and input frames no later grain can still reach, so memory use stays bounded.
    pub fn pull(&mut self, out: &mut [f32]) -> usize {
        self.generate_available_grains();

        let channels = self.channels;
        let wanted_frames = out.len() / channels;
        let available = self.ready_frames.min(wanted_frames);

        for i in 0..available {
            let weight = self.out_weight[i].max(1e-6);
            for ch in 0..channels {
                out[i * channels + ch] = self.out_accum[i * channels + ch] / weight;
            }
        }

        if available > 0 {
            self.out_accum.drain(0..available * channels);
            self.out_weight.drain(0..available);
            self.synth_pos -= available;
            self.ready_frames -= available;
        }

        let drop_input = self.analysis_pos.saturating_sub(self.grain_len);
        if drop_input > 0 {
            let drop = drop_input.min(self.buffered_frames());
            self.buffer.drain(0..drop * channels);
            self.analysis_pos -= drop;
        }

        available
    }

    pub fn is_exhausted(&self) -> bool {
        self.input_exhausted && self.ready_frames == 0
    }
}

fn sample_at(buffer: &[f32], frame: usize, channel: usize, channels: usize, total_frames: usize) -> f32 {
    if frame >= total_frames {
        0.0
    } else {
        buffer[frame * channels + channel]
    }
}

fn hann_window(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (len - 1) as f32).cos())
        .collect()
}

/// Map a FIR-style window length to a one-pole smoothing coefficient: longer windows smooth more
/// aggressively, shorter windows approach a passthrough.
fn smoothing_coefficient(window_len: usize) -> f32 {
    1.0 / (window_len as f32 / 4.0).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pull_all(shifter: &mut TimeDomainShifter, channels: usize) -> usize {
        let mut total = 0usize;
        let mut scratch = vec![0.0f32; 512 * channels];
        loop {
            let produced = shifter.pull(&mut scratch);
            total += produced;
            if produced == 0 && shifter.is_exhausted() {
                break;
            }
        }
        total
    }

    #[test]
    fn duration_is_preserved_regardless_of_ratio() {
        let channels = 1;
        let n = 4000usize;
        let input: Vec<f32> = (0..n).map(|i| (i as f32 * 0.05).sin()).collect();

        for &ratio in &[0.5, 1.0, 1.7] {
            let mut shifter = TimeDomainShifter::new(channels, ratio, Quality::clamped(4));
            shifter.push(&input);
            shifter.flush();

            let total = pull_all(&mut shifter, channels);
            let diff = (total as i64 - n as i64).unsigned_abs() as usize;
            assert!(
                diff <= 2000,
                "ratio {ratio}: produced {total} frames for {n} input frames"
            );
        }
    }

    #[test]
    fn eventually_reports_exhausted_after_flush() {
        let mut shifter = TimeDomainShifter::new(2, 1.0, Quality::DEFAULT);
        shifter.push(&[0.0, 0.0, 1.0, 1.0]);
        shifter.flush();

        let total = pull_all(&mut shifter, 2);
        assert!(total > 0);
        assert!(shifter.is_exhausted());
    }

    #[test]
    fn overlap_add_output_is_not_degenerate_silence() {
        let channels = 1;
        let n = 4000usize;
        let input: Vec<f32> = (0..n).map(|_| 1.0).collect();

        let mut shifter = TimeDomainShifter::new(channels, 1.0, Quality::clamped(4));
        shifter.push(&input);
        shifter.flush();

        let mut out = vec![0.0f32; n];
        let mut written = 0;
        while written < out.len() {
            let produced = shifter.pull(&mut out[written..]);
            if produced == 0 {
                break;
            }
            written += produced;
        }

        let mid = written / 2;
        assert!(
            out[mid.saturating_sub(50)..(mid + 50).min(written)]
                .iter()
                .any(|&s| s.abs() > 0.5),
            "expected the well-overlapped middle of a constant-amplitude input to stay near full scale"
        );
    }

    #[test]
    fn reset_allows_restarting_from_the_beginning() {
        let mut shifter = TimeDomainShifter::new(1, 1.0, Quality::DEFAULT);
        shifter.push(&[0.0; 8000]);
        shifter.flush();
        pull_all(&mut shifter, 1);
        assert!(shifter.is_exhausted());

        shifter.reset();
        assert!(!shifter.is_exhausted());
        shifter.push(&[0.0; 8000]);
        shifter.flush();
        assert!(pull_all(&mut shifter, 1) > 0);
    }
}
