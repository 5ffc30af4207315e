use std::num::NonZeroUsize;

use symphonia::core::{
    audio::{AudioBuffer, Signal},
    codecs::CodecParameters,
    codecs::Decoder,
    errors::Result as SResult,
    formats::FormatReader,
    io::{MediaSource, MediaSourceStream},
};

use crate::error::Result;
use crate::sample_sources::Descriptor;

/// Channel masks wider than this are not representable by our fixed stereo/mono pipeline.
const MAX_CHANNELS: usize = 8;

/// Internal wrapper which uses Symphonia for media decoding.
pub(crate) struct SymphoniaWrapper {
    format: Box<dyn FormatReader + 'static>,
    decoder: Box<dyn Decoder>,

    descriptor: Descriptor,

    track_index: usize,

    /// This internal buffer of samples fills up and potentially grows as data is read from
    /// Symphonia, which cannot tell us the size of the next packet because media formats don't
    /// know that information.
    ///
    /// This is always some number of complete frames.
    buffer: AudioBuffer<f32>,

    /// In frames; we cannot use a splittable-buffer style wrapper because the size of the
    /// underlying buffer changes with every packet.
    buffer_read_frames: usize,

    is_at_eof: bool,
}

fn codec_params_to_channel_format(
    params: &CodecParameters,
) -> Option<crate::channel_format::ChannelFormat> {
    use crate::channel_format::ChannelFormat as CF;

    if let Some(f) = params.channel_layout {
        use symphonia::core::audio::Layout as L;

        let format = match f {
            L::Mono => CF::Mono,
            L::Stereo => CF::Stereo,
            L::FivePointOne => CF::Raw {
                channels: NonZeroUsize::new(6).unwrap(),
            },
            L::TwoPointOne => CF::Raw {
                channels: NonZeroUsize::new(3).unwrap(),
            },
        };
        Some(format)
    } else if let Some(mask) = params.channels {
        let channel_count = mask.bits().count_ones();

        match channel_count {
            0 => None,
            1 => Some(CF::Mono),
            2 => Some(CF::Stereo),
            x if (x as usize) < MAX_CHANNELS => Some(CF::Raw {
                channels: NonZeroUsize::new(x as usize).unwrap(),
            }),
            _ => None,
        }
    } else {
        None
    }
}

pub(crate) fn build_symphonia_maybe_nodur<S: MediaSource + 'static>(
    source: S,
) -> SResult<(SymphoniaWrapper, bool)> {
    let probe = symphonia::default::get_probe();
    let source_stream = MediaSourceStream::new(Box::new(source), Default::default());

    let format = probe.format(
        &Default::default(),
        source_stream,
        &Default::default(),
        &Default::default(),
    )?;
    let format = format.format;

    let track_index = format
        .tracks()
        .iter()
        .position(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| {
            std::io::Error::other(
                "This source's format was recognized, but has no decodable audio tracks",
            )
        })?;

    let channel_format = codec_params_to_channel_format(&format.tracks()[track_index].codec_params)
        .ok_or_else(|| {
            std::io::Error::other(
                "The first audio track does not contain a channel format we can play",
            )
        })?;

    let (sample_rate, needs_first_block) = format.tracks()[track_index]
        .codec_params
        .sample_rate
        .map(|x| (x, false))
        .unwrap_or((0, true));

    let codec_registry = symphonia::default::get_codecs();
    let decoder = codec_registry.make(
        &format.tracks()[track_index].codec_params,
        &Default::default(),
    )?;

    let duration_from_meta = format.tracks()[track_index].codec_params.n_frames;

    let descriptor = Descriptor {
        duration: duration_from_meta.unwrap_or(0),
        channel_format,
        sample_rate,
    };

    let mut ret = SymphoniaWrapper {
        decoder,
        format,
        descriptor,
        track_index,
        buffer: AudioBuffer::unused(),
        buffer_read_frames: 0,
        is_at_eof: false,
    };

    if needs_first_block {
        if !ret.refill_buffer()? {
            return Err(
                std::io::Error::other("This source returned EOF on the first packet").into(),
            );
        }

        let possible_sr = ret.buffer.spec().rate;
        if possible_sr == 0 {
            return Err(std::io::Error::other(
                "This source's first packet of data has a samplerate of 0",
            )
            .into());
        }

        ret.descriptor.sample_rate = possible_sr;
    }

    Ok((ret, duration_from_meta.is_some()))
}

pub(crate) fn build_symphonia<S: MediaSource + 'static>(source: S) -> Result<SymphoniaWrapper> {
    use std::io::Seek;

    let (mut ret, durgood) = build_symphonia_maybe_nodur(source)?;

    if !durgood {
        let mut frames_so_far = 0u64;
        loop {
            frames_so_far += ret.buffer.frames() as u64;
            ret.buffer.clear();
            if !ret.refill_buffer()? {
                break;
            }
        }

        let mut inner = ret.format.into_inner();
        inner.rewind()?;
        let mut good = build_symphonia_maybe_nodur(inner)?.0;
        good.descriptor.duration = frames_so_far;
        return Ok(good);
    }
    Ok(ret)
}

/// Check if this error is an end-of-stream.
fn err_is_eof(err: &symphonia::core::errors::Error) -> bool {
    use symphonia::core::errors::Error as E;

    matches!(err,
        E::IoError(i) if i.kind() == std::io::ErrorKind::UnexpectedEof)
}

impl SymphoniaWrapper {
    /// Fill the internal buffer, and reset the read counter to 0.
    ///
    /// Returns `Ok(false)` to indicate EOF, and sets `is_at_eof`.
    fn refill_buffer(&mut self) -> SResult<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(x) => x,
                Err(e) if err_is_eof(&e) => {
                    self.is_at_eof = true;
                    return Ok(false);
                }
                Err(e) => return Err(e),
            };

            let track_id = self.format.tracks()[self.track_index].id;
            if packet.track_id() != track_id {
                continue;
            }

            let abuf = self.decoder.decode(&packet)?;
            self.buffer = abuf.make_equivalent();
            abuf.convert(&mut self.buffer);
            self.buffer_read_frames = 0;
            return Ok(true);
        }
    }

    fn do_seeking(&mut self, sample: u64) -> SResult<()> {
        self.buffer = AudioBuffer::unused();
        self.buffer_read_frames = 0;

        let ts_float = sample as f64 / self.descriptor.sample_rate as f64;
        let ts = symphonia::core::units::Time {
            seconds: ts_float as u64,
            frac: ts_float - ts_float.floor(),
        };

        let seek_to = symphonia::core::formats::SeekTo::Time {
            time: ts,
            track_id: Some(self.format.tracks()[self.track_index].id),
        };

        let seek_res = self
            .format
            .seek(symphonia::core::formats::SeekMode::Accurate, seek_to)?;
        self.decoder.reset();
        self.is_at_eof = false;

        let Some(time_base) = self.format.tracks()[self.track_index].codec_params.time_base
        else {
            return Ok(());
        };

        let got_time = time_base.calc_time(seek_res.actual_ts);
        let got_time_f64 = got_time.seconds as f64 + got_time.frac;
        let delta = ts_float - got_time_f64;
        if delta <= 0.0 {
            return Ok(());
        }

        let mut samples_needed = (delta * self.descriptor.sample_rate as f64) as u64;
        while samples_needed > 0 {
            if !self.refill_buffer()? {
                return Ok(());
            }

            let frames_avail = self.buffer.frames() as u64;
            self.buffer_read_frames = frames_avail.saturating_sub(samples_needed) as usize;
            samples_needed = samples_needed.saturating_sub(frames_avail);
        }

        Ok(())
    }

    pub(crate) fn get_descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub(crate) fn read_samples(&mut self, destination: &mut [f32]) -> Result<u64> {
        let chan_count = self.descriptor.get_channel_count();
        assert_eq!(destination.len() % chan_count, 0);
        let total_frames = destination.len() / chan_count;
        let mut next_frame = 0;

        if self.is_at_eof {
            return Ok(0);
        }

        while next_frame < total_frames {
            let avail = self.buffer.frames() - self.buffer_read_frames;
            let can_do = avail.min(total_frames - next_frame);

            let dest_this_time = &mut destination[next_frame * chan_count..];

            for ch in 0..chan_count {
                for f in 0..can_do {
                    dest_this_time[f * chan_count + ch] =
                        self.buffer.chan(ch)[self.buffer_read_frames + f];
                }
            }

            self.buffer_read_frames += can_do;
            next_frame += can_do;

            if self.buffer_read_frames == self.buffer.frames() && !self.refill_buffer()? {
                break;
            }
        }

        Ok(next_frame as u64)
    }

    pub(crate) fn seek(&mut self, position_in_frames: u64) -> Result<()> {
        Ok(self.do_seeking(position_in_frames)?)
    }
}

impl From<symphonia::core::errors::Error> for crate::error::Error {
    fn from(value: symphonia::core::errors::Error) -> Self {
        crate::error::Error::DecodeError {
            message: value.to_string(),
        }
    }
}
