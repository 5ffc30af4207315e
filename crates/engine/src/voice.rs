//! Voice Pipeline (C5): turns a triggered table cell into rendered audio.
//!
//! Every column owns two voice slots (`A`/`B`) so a retrigger can crossfade out the previous
//! playback instead of cutting it off. Each slot pulls samples through one of three uniform
//! [PitchSource] backends depending on whether a pre-generated pitch-cache rendition is ready:
//! a cached, fully-decoded unity-pitch buffer, or one of two realtime fallbacks (resampling via
//! rubato, or streaming through [crate::pitch_shift::TimeDomainShifter]) while the cache entry is
//! still being generated in the background.

use std::sync::Arc;

use crate::config::{
    ms_to_samples, BLOCK_SIZE, CHANNELS, FALL_TIME_MS, RISE_TIME_MS, VOLUME_SILENCE_THRESHOLD,
};
use crate::error::{Error, Result};
use crate::pitch_shift::{Quality, TimeDomainShifter};
use crate::resampling::{ConditionalResampler, ResamplerMode};
use crate::sample_bank::DecodedAudio;
use crate::sample_sources::symphonia_impl::{build_symphonia, SymphoniaWrapper};

/// Number of input frames read from the decoder per refill across all three backends.
const DECODE_CHUNK_FRAMES: usize = 4096;

/// The common surface every pitch-source backend exposes to a voice.
trait PitchSource: Send {
    /// Fill as much of `out` as possible with interleaved samples at this source's channel count.
    /// Returns the number of frames written; `0` means the source is exhausted.
    fn read(&mut self, out: &mut [f32]) -> usize;
    fn get_format(&self) -> usize;
    /// Restart playback from the given frame, relative to the start of the underlying audio.
    fn seek(&mut self, frame: u64) -> Result<()>;
    /// The next frame that would be produced by `read`, relative to the start of the audio.
    fn get_cursor(&self) -> u64;
    /// Total length in frames, if known.
    fn get_length(&self) -> Option<u64>;
}

fn open_decoder(path: &str) -> Result<SymphoniaWrapper> {
    let file = std::fs::File::open(path)?;
    let media_source = symphonia::core::io::ReadOnlySource::new(file);
    build_symphonia(media_source).map_err(|e| Error::DecodeError {
        message: format!("{path}: {e}"),
    })
}

/// Plays fully-decoded, already-correctly-pitched PCM back at unity speed. Used whenever a
/// pitch-cache rendition exists for the requested ratio, or the ratio is within tolerance of 1.0.
///
/// The common case (a cell playing at its sample's default pitch) arrives here via
/// [CachedSource::from_decoded] with PCM the sample bank decoded once at load time, so triggering
/// never touches the filesystem or a decoder. A pre-generated pitch-cache file is instead decoded
/// on demand via [CachedSource::load].
struct CachedSource {
    audio: Arc<DecodedAudio>,
    cursor: usize,
}

impl CachedSource {
    fn load(path: &str) -> Result<Self> {
        let mut source = open_decoder(path)?;
        let channels = source.get_descriptor().get_channel_count();

        let mut data = Vec::new();
        let mut chunk = vec![0.0f32; DECODE_CHUNK_FRAMES * channels];
        loop {
            let read = source
                .read_samples(&mut chunk)
                .map_err(|e| Error::DecodeError {
                    message: e.to_string(),
                })?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read as usize * channels]);
        }

        Ok(CachedSource {
            audio: Arc::new(DecodedAudio { data, channels }),
            cursor: 0,
        })
    }

    fn from_decoded(audio: Arc<DecodedAudio>) -> Self {
        CachedSource { audio, cursor: 0 }
    }
}

impl PitchSource for CachedSource {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let channels = self.audio.channels;
        let total_frames = self.audio.data.len() / channels;
        let available = total_frames - self.cursor;
        let want = out.len() / channels;
        let n = available.min(want);

        out[..n * channels].copy_from_slice(
            &self.audio.data[self.cursor * channels..(self.cursor + n) * channels],
        );
        self.cursor += n;
        n
    }

    fn get_format(&self) -> usize {
        self.audio.channels
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        let total_frames = self.audio.data.len() / self.audio.channels;
        self.cursor = (frame as usize).min(total_frames);
        Ok(())
    }

    fn get_cursor(&self) -> u64 {
        self.cursor as u64
    }

    fn get_length(&self) -> Option<u64> {
        Some((self.audio.data.len() / self.audio.channels) as u64)
    }
}

/// Realtime pitch shifting via resampling: reading the source at a rate scaled by `ratio`
/// stretches both pitch and duration together. Used as one of the two live fallbacks while a
/// pitch-cache artifact is still being generated.
struct ResamplerSource {
    decoder: SymphoniaWrapper,
    resampler: ConditionalResampler,
    channels: usize,
    source_rate: u32,
    target_rate: u32,
    scratch: Vec<f32>,
    eof: bool,
    frames_read: u64,
}

impl ResamplerSource {
    fn new(path: &str, ratio: f64) -> Result<Self> {
        let decoder = open_decoder(path)?;
        let channels = decoder.get_descriptor().get_channel_count();
        let source_rate = decoder.get_descriptor().sample_rate;
        let target_rate = ((source_rate as f64) * ratio).round().max(1.0) as u32;

        let resampler = ConditionalResampler::new(
            source_rate,
            target_rate,
            channels,
            ResamplerMode::FixedOutput {
                output_frames: BLOCK_SIZE,
            },
        )
        .map_err(|e| Error::AudioBackend {
            message: e.to_string(),
        })?;

        Ok(ResamplerSource {
            decoder,
            resampler,
            channels,
            source_rate,
            target_rate,
            scratch: Vec::new(),
            eof: false,
            frames_read: 0,
        })
    }
}

impl PitchSource for ResamplerSource {
    fn read(&mut self, out: &mut [f32]) -> usize {
        if self.eof {
            return 0;
        }

        let need_in_frames = self.resampler.input_frames_next();
        let needed_len = need_in_frames * self.channels;
        if self.scratch.len() < needed_len {
            self.scratch.resize(needed_len, 0.0);
        }

        let got = self
            .decoder
            .read_samples(&mut self.scratch[..needed_len])
            .unwrap_or(0) as usize;
        if got == 0 {
            self.eof = true;
            return 0;
        }
        self.frames_read += got as u64;

        match self
            .resampler
            .process(&self.scratch[..got * self.channels], out)
        {
            Ok((_, produced)) => produced,
            Err(_) => {
                self.eof = true;
                0
            }
        }
    }

    fn get_format(&self) -> usize {
        self.channels
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        self.decoder.seek(frame)?;
        self.resampler = ConditionalResampler::new(
            self.source_rate,
            self.target_rate,
            self.channels,
            ResamplerMode::FixedOutput {
                output_frames: BLOCK_SIZE,
            },
        )
        .map_err(|e| Error::AudioBackend {
            message: e.to_string(),
        })?;
        self.eof = false;
        self.frames_read = frame;
        Ok(())
    }

    fn get_cursor(&self) -> u64 {
        self.frames_read
    }

    fn get_length(&self) -> Option<u64> {
        let duration = self.decoder.get_descriptor().duration;
        if duration == 0 {
            None
        } else {
            Some(duration)
        }
    }
}

/// Realtime pitch shifting via the streaming time-domain shifter: preserves duration while
/// changing pitch. The other live fallback; selected by [PitchMethod].
struct TimeDomainSource {
    decoder: SymphoniaWrapper,
    shifter: TimeDomainShifter,
    channels: usize,
    scratch: Vec<f32>,
    decoder_eof: bool,
    frames_read: u64,
}

impl TimeDomainSource {
    fn new(path: &str, ratio: f64, quality: Quality) -> Result<Self> {
        let decoder = open_decoder(path)?;
        let channels = decoder.get_descriptor().get_channel_count();
        Ok(TimeDomainSource {
            decoder,
            shifter: TimeDomainShifter::new(channels, ratio, quality),
            channels,
            scratch: vec![0.0; DECODE_CHUNK_FRAMES * channels],
            decoder_eof: false,
            frames_read: 0,
        })
    }
}

impl PitchSource for TimeDomainSource {
    fn read(&mut self, out: &mut [f32]) -> usize {
        loop {
            let produced = self.shifter.pull(out);
            if produced > 0 {
                return produced;
            }
            if self.shifter.is_exhausted() {
                return 0;
            }
            if self.decoder_eof {
                self.shifter.flush();
                continue;
            }

            let got = self.decoder.read_samples(&mut self.scratch).unwrap_or(0) as usize;
            if got == 0 {
                self.decoder_eof = true;
                self.shifter.flush();
            } else {
                self.frames_read += got as u64;
                self.shifter.push(&self.scratch[..got * self.channels]);
            }
        }
    }

    fn get_format(&self) -> usize {
        self.channels
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        self.decoder.seek(frame)?;
        self.shifter.reset();
        self.decoder_eof = false;
        self.frames_read = frame;
        Ok(())
    }

    fn get_cursor(&self) -> u64 {
        self.frames_read
    }

    fn get_length(&self) -> Option<u64> {
        let duration = self.decoder.get_descriptor().duration;
        if duration == 0 {
            None
        } else {
            Some(duration)
        }
    }
}

/// Which realtime fallback to use when a voice is triggered before its pitch-cache rendition is
/// ready. Process-global, like [crate::pitch_shift::Quality].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PitchMethod {
    Resampler,
    TimeDomain,
}

impl Default for PitchMethod {
    fn default() -> Self {
        PitchMethod::TimeDomain
    }
}

/// Process-global, lock-free holder of the current [PitchMethod], shared between the control
/// thread (which sets it in response to a host call) and the scheduler (which reads it once per
/// voice trigger).
pub struct PitchMethodCell(std::sync::atomic::AtomicU8);

impl PitchMethodCell {
    pub fn new(initial: PitchMethod) -> Self {
        PitchMethodCell(std::sync::atomic::AtomicU8::new(initial as u8))
    }

    pub fn load(&self) -> PitchMethod {
        match self.0.load(std::sync::atomic::Ordering::Relaxed) {
            0 => PitchMethod::Resampler,
            _ => PitchMethod::TimeDomain,
        }
    }

    pub fn store(&self, method: PitchMethod) {
        self.0
            .store(method as u8, std::sync::atomic::Ordering::Relaxed);
    }
}

impl Default for PitchMethodCell {
    fn default() -> Self {
        PitchMethodCell::new(PitchMethod::default())
    }
}

/// Where a voice's audio comes from.
pub enum VoiceSource<'a> {
    /// Pre-decoded, unity-pitch PCM straight from the sample bank; the fast path for a cell
    /// playing at its sample's default pitch.
    Decoded(Arc<DecodedAudio>),
    /// A file on disk to decode: either a pre-generated pitch-cache rendition played at unity
    /// (`pitch_is_cached: true`) or the original file needing a realtime fallback shift.
    File { path: &'a str, pitch_is_cached: bool },
}

/// What to play and at what volume, resolved by the caller (cell settings merged with the bank's
/// defaults) before handing off to a voice slot.
pub struct TriggerParams<'a> {
    pub source: VoiceSource<'a>,
    /// The pitch ratio this playback should sound at.
    pub ratio: f64,
    pub volume: f32,
    pub quality: Quality,
    pub method: PitchMethod,
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum Ramp {
    Idle,
    Rising,
    Falling,
}

/// What a voice slot is currently playing, kept alongside the slot so a later trigger can tell
/// whether it targets "the same thing" as what's already sounding.
#[derive(Clone)]
enum SourceIdentity {
    Decoded(Arc<DecodedAudio>),
    File(String),
}

impl SourceIdentity {
    fn from(source: &VoiceSource) -> Self {
        match source {
            VoiceSource::Decoded(audio) => SourceIdentity::Decoded(audio.clone()),
            VoiceSource::File { path, .. } => SourceIdentity::File((*path).to_string()),
        }
    }

    fn matches(&self, source: &VoiceSource) -> bool {
        match (self, source) {
            (SourceIdentity::Decoded(a), VoiceSource::Decoded(b)) => Arc::ptr_eq(a, b),
            (SourceIdentity::File(a), VoiceSource::File { path, .. }) => a == path,
            _ => false,
        }
    }
}

struct VoiceSlot {
    source: Option<Box<dyn PitchSource>>,
    identity: Option<SourceIdentity>,
    ratio: f64,
    current_volume: f32,
    user_volume: f32,
    ramp: Ramp,
    rise_samples: f32,
    fall_samples: f32,
    mix_scratch: Vec<f32>,
}

impl VoiceSlot {
    fn new() -> Self {
        VoiceSlot {
            source: None,
            identity: None,
            ratio: 0.0,
            current_volume: 0.0,
            user_volume: 0.0,
            ramp: Ramp::Idle,
            rise_samples: ms_to_samples(RISE_TIME_MS).max(1) as f32,
            fall_samples: ms_to_samples(FALL_TIME_MS).max(1) as f32,
            mix_scratch: vec![0.0; BLOCK_SIZE * CHANNELS],
        }
    }

    fn is_active(&self) -> bool {
        self.source.is_some()
    }

    /// Whether this slot is already playing the same source as `params`, at a pitch within
    /// tolerance of it, and is therefore a candidate for an in-place retrigger rather than a
    /// crossfade.
    fn matches_and_in_tolerance(&self, params: &TriggerParams) -> bool {
        let Some(identity) = self.identity.as_ref() else {
            return false;
        };
        if (self.ratio - params.ratio).abs() >= crate::config::RATIO_TOLERANCE {
            return false;
        }
        identity.matches(&params.source)
    }

    /// Seek the already-playing source back to frame 0 and re-rise to `volume`, without rebuilding
    /// the underlying decoder/shifter.
    fn retrigger_in_place(&mut self, volume: f32) -> Result<()> {
        if let Some(source) = self.source.as_mut() {
            source.seek(0)?;
        }
        self.user_volume = volume.clamp(0.0, 1.0);
        self.ramp = Ramp::Rising;
        Ok(())
    }

    fn trigger(&mut self, params: TriggerParams) -> Result<()> {
        let unity = (params.ratio - 1.0).abs() < crate::config::RATIO_TOLERANCE;
        let identity = SourceIdentity::from(&params.source);

        let source: Box<dyn PitchSource> = match params.source {
            VoiceSource::Decoded(audio) => Box::new(CachedSource::from_decoded(audio)),
            VoiceSource::File { path, pitch_is_cached } if pitch_is_cached || unity => {
                Box::new(CachedSource::load(path)?)
            }
            VoiceSource::File { path, .. } => match params.method {
                PitchMethod::Resampler => Box::new(ResamplerSource::new(path, params.ratio)?),
                PitchMethod::TimeDomain => {
                    Box::new(TimeDomainSource::new(path, params.ratio, params.quality)?)
                }
            },
        };

        self.source = Some(source);
        self.identity = Some(identity);
        self.ratio = params.ratio;
        self.user_volume = params.volume.clamp(0.0, 1.0);
        // Current volume is left wherever it was (e.g. mid fall-out of a stolen slot) and rises
        // from there, rather than restarting from zero.
        self.ramp = Ramp::Rising;
        Ok(())
    }

    fn release(&mut self) {
        if self.is_active() {
            self.ramp = Ramp::Falling;
        }
    }

    /// Render one block, mixing into `out` (additively) and returning whether the slot is still
    /// active afterward.
    fn render_into(&mut self, out: &mut [f32]) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };

        let src_channels = source.get_format();
        let frames = out.len() / CHANNELS;
        let scratch = &mut self.mix_scratch[..frames * src_channels];
        scratch.fill(0.0);
        let produced = source.read(scratch);

        for frame in 0..produced {
            match self.ramp {
                Ramp::Rising => {
                    self.current_volume += (self.user_volume - self.current_volume)
                        / self.rise_samples.max(1.0);
                    if (self.current_volume - self.user_volume).abs() < 1e-4 {
                        self.current_volume = self.user_volume;
                        self.ramp = Ramp::Idle;
                    }
                }
                Ramp::Falling => {
                    self.current_volume -= self.current_volume / self.fall_samples.max(1.0);
                }
                Ramp::Idle => {}
            }
            self.current_volume = self.current_volume.clamp(0.0, self.user_volume.max(0.0));

            let left = scratch[frame * src_channels];
            let right = if src_channels > 1 {
                scratch[frame * src_channels + 1]
            } else {
                left
            };

            out[frame * CHANNELS] += left * self.current_volume;
            if CHANNELS > 1 {
                out[frame * CHANNELS + 1] += right * self.current_volume;
            }
        }

        let exhausted = produced < frames;
        let silent = self.ramp == Ramp::Falling && self.current_volume < VOLUME_SILENCE_THRESHOLD;

        if exhausted || silent {
            self.source = None;
            self.identity = None;
            self.ramp = Ramp::Idle;
            self.current_volume = 0.0;
            false
        } else {
            true
        }
    }
}

/// One table column: two voice slots that crossfade across retriggers.
struct Column {
    slots: [VoiceSlot; 2],
    active: usize,
}

impl Column {
    fn new() -> Self {
        Column {
            slots: [VoiceSlot::new(), VoiceSlot::new()],
            active: 0,
        }
    }

    fn trigger(&mut self, params: TriggerParams) -> Result<()> {
        let active = self.active;
        if self.slots[active].is_active() && self.slots[active].matches_and_in_tolerance(&params) {
            return self.slots[active].retrigger_in_place(params.volume);
        }

        self.slots[active].release();
        self.active = 1 - active;
        self.slots[self.active].trigger(params)
    }

    fn render_into(&mut self, out: &mut [f32]) {
        for slot in &mut self.slots {
            slot.render_into(out);
        }
    }

    fn stop_all(&mut self) {
        for slot in &mut self.slots {
            slot.source = None;
            slot.identity = None;
            slot.ramp = Ramp::Idle;
            slot.current_volume = 0.0;
        }
    }
}

pub struct VoicePipeline {
    columns: Vec<Column>,
}

impl VoicePipeline {
    pub fn new(num_columns: usize) -> Self {
        VoicePipeline {
            columns: (0..num_columns).map(|_| Column::new()).collect(),
        }
    }

    pub fn trigger(&mut self, column: usize, params: TriggerParams) -> Result<()> {
        let col = self
            .columns
            .get_mut(column)
            .ok_or_else(|| Error::InvalidArgument {
                message: format!("column {column} is out of range"),
            })?;
        col.trigger(params)
    }

    pub fn stop_all(&mut self) {
        for col in &mut self.columns {
            col.stop_all();
        }
    }

    /// Render one block of interleaved, stereo output, mixing every column's active voices.
    pub fn render_block(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        for col in &mut self.columns {
            col.render_into(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_column_renders_silence() {
        let mut pipeline = VoicePipeline::new(1);
        let mut out = vec![1.0f32; BLOCK_SIZE * CHANNELS];
        pipeline.render_block(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn trigger_on_invalid_column_is_rejected() {
        let mut pipeline = VoicePipeline::new(1);
        let params = TriggerParams {
            source: VoiceSource::File {
                path: "/nonexistent.wav",
                pitch_is_cached: false,
            },
            ratio: 1.0,
            volume: 1.0,
            quality: Quality::DEFAULT,
            method: PitchMethod::TimeDomain,
        };
        assert!(pipeline.trigger(5, params).is_err());
    }

    #[test]
    fn retriggering_the_same_playing_sample_reuses_the_active_slot() {
        let audio = Arc::new(DecodedAudio {
            data: vec![0.5; 4000 * 2],
            channels: 2,
        });

        let mut col = Column::new();
        col.trigger(TriggerParams {
            source: VoiceSource::Decoded(audio.clone()),
            ratio: 1.0,
            volume: 1.0,
            quality: Quality::DEFAULT,
            method: PitchMethod::TimeDomain,
        })
        .unwrap();
        let active_after_first = col.active;

        col.trigger(TriggerParams {
            source: VoiceSource::Decoded(audio.clone()),
            ratio: 1.0,
            volume: 0.5,
            quality: Quality::DEFAULT,
            method: PitchMethod::TimeDomain,
        })
        .unwrap();

        assert_eq!(col.active, active_after_first, "same sample should not crossfade to the other slot");
        assert!(col.slots[1 - col.active].source.is_none(), "the idle slot should stay idle");
    }

    #[test]
    fn retriggering_a_different_sample_crossfades_to_the_other_slot() {
        let a = Arc::new(DecodedAudio {
            data: vec![0.5; 4000 * 2],
            channels: 2,
        });
        let b = Arc::new(DecodedAudio {
            data: vec![0.25; 4000 * 2],
            channels: 2,
        });

        let mut col = Column::new();
        col.trigger(TriggerParams {
            source: VoiceSource::Decoded(a),
            ratio: 1.0,
            volume: 1.0,
            quality: Quality::DEFAULT,
            method: PitchMethod::TimeDomain,
        })
        .unwrap();
        let active_after_first = col.active;

        col.trigger(TriggerParams {
            source: VoiceSource::Decoded(b),
            ratio: 1.0,
            volume: 1.0,
            quality: Quality::DEFAULT,
            method: PitchMethod::TimeDomain,
        })
        .unwrap();

        assert_ne!(col.active, active_after_first, "a different sample should crossfade");
    }

    #[test]
    fn volume_bounds_invariant_holds_through_a_ramp() {
        let mut slot = VoiceSlot::new();
        slot.user_volume = 0.8;
        slot.ramp = Ramp::Rising;
        for _ in 0..10_000 {
            slot.current_volume +=
                (slot.user_volume - slot.current_volume) / slot.rise_samples.max(1.0);
            slot.current_volume = slot.current_volume.clamp(0.0, slot.user_volume);
            assert!(slot.current_volume >= 0.0 && slot.current_volume <= slot.user_volume);
        }
    }
}
