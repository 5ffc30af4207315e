//! Scheduler (C6): converts audio-callback frame counts into step advances and drives the table,
//! playback transport, and voice pipeline.

use std::sync::Arc;

use crate::config::{PITCH_MAX, PITCH_MIN, SR};
use crate::pitch_cache::PitchCache;
use crate::playback::PlaybackStore;
use crate::sample_bank::SampleBank;
use crate::table::{Cell, TableStore, INHERIT};
use crate::voice::{PitchMethodCell, TriggerParams, VoicePipeline, VoiceSource};

/// Resolve a cell's effective pitch ratio: the cell's own value unless it carries the [INHERIT]
/// sentinel, in which case the sample's bank default is used, clamped to the engine's range.
fn resolve_pitch(cell: &Cell, bank_default: f64) -> f64 {
    let raw = if cell.pitch == INHERIT {
        bank_default
    } else {
        cell.pitch
    };
    raw.clamp(PITCH_MIN, PITCH_MAX)
}

fn resolve_volume(cell: &Cell, bank_default: f32) -> f32 {
    let raw = if cell.volume == INHERIT {
        bank_default as f64
    } else {
        cell.volume
    };
    (raw as f32).clamp(0.0, 1.0)
}

/// Steps advance at sixteenth-note granularity: at `bpm` beats per minute, one step lasts
/// `(60 / bpm) / 4` seconds.
fn step_frames(bpm: u32) -> f64 {
    (60.0 / bpm.max(1) as f64) / 4.0 * SR as f64
}

pub struct Scheduler {
    table: Arc<TableStore>,
    playback: Arc<PlaybackStore>,
    bank: Arc<SampleBank>,
    pitch_cache: Arc<PitchCache>,
    voices: VoicePipeline,
    /// Frames elapsed into the current step.
    step_phase: f64,
    pitch_method: Arc<PitchMethodCell>,
    num_columns: usize,
}

impl Scheduler {
    pub fn new(
        table: Arc<TableStore>,
        playback: Arc<PlaybackStore>,
        bank: Arc<SampleBank>,
        pitch_cache: Arc<PitchCache>,
        pitch_method: Arc<PitchMethodCell>,
        num_columns: usize,
    ) -> Self {
        Scheduler {
            table,
            playback,
            bank,
            pitch_cache,
            voices: VoicePipeline::new(num_columns),
            step_phase: 0.0,
            pitch_method,
            num_columns,
        }
    }

    /// Advance playback state by `frames` worth of audio and render the result into `out`
    /// (interleaved stereo, exactly `frames` frames long).
    pub fn process_block(&mut self, frames: usize, out: &mut [f32]) {
        let state = self.playback.read_state();

        if state.is_playing {
            let mut remaining = frames as f64;
            let mut step = state.current_step.max(0) as u32;
            let step_len = step_frames(state.bpm);

            while remaining > 0.0 {
                let left_in_step = (step_len - self.step_phase).max(0.0);
                let consume = left_in_step.min(remaining);
                self.step_phase += consume;
                remaining -= consume;

                if self.step_phase >= step_len - 1e-6 {
                    self.step_phase = 0.0;
                    step = self.advance_step(step, &state);
                }
            }
        }

        self.voices.render_block(out);
    }

    /// Move from `step` to the next step per the transport's looping rules, firing any cells on
    /// the new step, and returns the new step index.
    fn advance_step(&mut self, step: u32, state: &crate::playback::PlaybackState) -> u32 {
        let next = if state.song_mode {
            self.advance_song_mode(step, state)
        } else {
            self.advance_region_loop(step, state)
        };

        self.trigger_step(next);
        next
    }

    fn advance_region_loop(&self, step: u32, state: &crate::playback::PlaybackState) -> u32 {
        let next = step + 1;
        if next >= state.region_end {
            state.region_start
        } else {
            next
        }
    }

    fn advance_song_mode(&mut self, step: u32, state: &crate::playback::PlaybackState) -> u32 {
        let Some(section_start) = self.table.get_section_start_step(state.current_section) else {
            return step;
        };
        let (sections, section_count) = self.table.read_sections();
        let section = sections[state.current_section];
        let section_end = section_start as u32 + section.num_steps;

        let next = step + 1;
        if next < section_end {
            return next;
        }

        // Finished a pass through the section; loop it or move on.
        let loops_wanted = state.sections_loops_num[state.current_section];
        if state.current_section_loop + 1 < loops_wanted {
            self.playback.apply_state(&crate::playback::PlaybackState {
                current_section_loop: state.current_section_loop + 1,
                ..*state
            });
            return section_start as u32;
        }

        let next_section = (state.current_section + 1) % section_count.max(1);
        let next_start = self
            .table
            .get_section_start_step(next_section)
            .unwrap_or(0) as u32;
        self.playback.apply_state(&crate::playback::PlaybackState {
            current_section: next_section,
            current_section_loop: 0,
            ..*state
        });
        next_start
    }

    /// Fire every non-empty cell on `step`.
    fn trigger_step(&mut self, step: u32) {
        let quality = self.pitch_cache.quality();

        for column in 0..self.voices_len() {
            let cell = self.table.read_cell(step as usize, column);
            if cell.is_empty() {
                continue;
            }

            let Some(sample) = self.bank.read_sample(cell.sample_slot as usize) else {
                continue;
            };
            if !sample.loaded {
                continue;
            }

            let ratio = resolve_pitch(&cell, sample.settings.pitch);
            let volume = resolve_volume(&cell, sample.settings.volume);
            let unity = (ratio - 1.0).abs() < crate::config::RATIO_TOLERANCE;
            let path_str = sample.file_path.to_string();

            // Unity pitch is the common case: reuse the pre-decoded PCM the bank already holds
            // rather than touching a decoder on the hot path.
            let decoded = if unity {
                self.bank.read_decoded(cell.sample_slot as usize)
            } else {
                None
            };

            let (play_path, pitch_is_cached) = if unity {
                (path_str.clone(), true)
            } else {
                let cached_path = crate::pitch_cache::get_file_path(&path_str, ratio);
                if cached_path.exists() {
                    (cached_path.to_string_lossy().into_owned(), true)
                } else {
                    (path_str.clone(), false)
                }
            };

            let source = match decoded {
                Some(audio) => VoiceSource::Decoded(audio),
                None => VoiceSource::File {
                    path: &play_path,
                    pitch_is_cached,
                },
            };

            let params = TriggerParams {
                source,
                ratio,
                volume,
                quality,
                method: self.pitch_method.load(),
            };

            if let Err(e) = self.voices.trigger(column, params) {
                rt_warn!("failed to trigger column {}: {}", column, e);
            }
        }
    }

    fn voices_len(&self) -> usize {
        self.num_columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    #[test]
    fn inherited_pitch_falls_back_to_bank_default() {
        let cell = Cell {
            sample_slot: 0,
            volume: INHERIT,
            pitch: INHERIT,
        };
        assert_eq!(resolve_pitch(&cell, 1.5), 1.5);
        assert_eq!(resolve_volume(&cell, 0.75), 0.75);
    }

    #[test]
    fn explicit_cell_values_override_bank_default() {
        let cell = Cell {
            sample_slot: 0,
            volume: 0.25,
            pitch: 2.0,
        };
        assert_eq!(resolve_pitch(&cell, 1.0), 2.0);
        assert_eq!(resolve_volume(&cell, 1.0), 0.25);
    }

    #[test]
    fn step_frames_matches_the_sixteenth_note_convention() {
        assert!((step_frames(60) - 12_000.0).abs() < 1e-6);
    }

    #[test]
    fn region_loop_wraps_at_region_end() {
        let table = Arc::new(TableStore::new());
        let playback = Arc::new(PlaybackStore::new());
        let bank = Arc::new(SampleBank::new());
        let pitch_cache = Arc::new(PitchCache::new(crate::config::worker_pool_threads()));
        let pitch_method = Arc::new(PitchMethodCell::default());
        let scheduler = Scheduler::new(table, playback, bank, pitch_cache, pitch_method, 4);

        let mut state = crate::playback::PlaybackState::default();
        state.region_start = 0;
        state.region_end = 4;
        assert_eq!(scheduler.advance_region_loop(3, &state), 0);
        assert_eq!(scheduler.advance_region_loop(1, &state), 2);
    }
}
