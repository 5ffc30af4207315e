//! Playback State (C4): transport position, tempo, and song-mode looping.

use crate::config::MAX_SECTIONS;
use crate::error::{Error, Result};
use sketchpad_sync::seqlock::Seqlock;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlaybackState {
    /// Beats per minute, `[1, 300]`.
    pub bpm: u32,
    pub is_playing: bool,
    /// Global step index, or `-1` when stopped.
    pub current_step: i32,
    /// Step-loop region, inclusive of `region_start`, exclusive of `region_end`.
    pub region_start: u32,
    pub region_end: u32,
    /// When `true`, playback advances through sections in order, looping each section
    /// `sections_loops_num[current_section]` times before moving to the next; when `false`,
    /// playback loops `region_start..region_end` indefinitely.
    pub song_mode: bool,
    pub current_section: usize,
    /// How many times the current section has looped so far, in song mode.
    pub current_section_loop: u32,
    pub sections_loops_num: [u32; MAX_SECTIONS],
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState {
            bpm: 120,
            is_playing: false,
            current_step: -1,
            region_start: 0,
            region_end: 16,
            song_mode: false,
            current_section: 0,
            current_section_loop: 0,
            sections_loops_num: [1; MAX_SECTIONS],
        }
    }
}

pub struct PlaybackStore {
    state: Seqlock<PlaybackState>,
}

impl PlaybackStore {
    pub fn new() -> Self {
        PlaybackStore {
            state: Seqlock::new(PlaybackState::default()),
        }
    }

    pub fn read_state(&self) -> PlaybackState {
        self.state.read()
    }

    pub fn set_bpm(&self, bpm: u32) -> Result<()> {
        if !(1..=300).contains(&bpm) {
            return Err(Error::InvalidArgument {
                message: format!("bpm {bpm} is out of range [1, 300]"),
            });
        }
        self.state.update(|s| s.bpm = bpm);
        Ok(())
    }

    pub fn set_region(&self, start: u32, end: u32) -> Result<()> {
        if end <= start {
            return Err(Error::InvalidArgument {
                message: format!("region end {end} must be greater than start {start}"),
            });
        }
        self.state.update(|s| {
            s.region_start = start;
            s.region_end = end;
            // Clamp a stopped-or-running cursor back inside the new region immediately; an
            // in-progress step is allowed to finish before this takes effect at the next boundary.
            if s.current_step >= 0
                && (s.current_step as u32 >= end || (s.current_step as u32) < start)
            {
                s.current_step = start as i32;
            }
        });
        Ok(())
    }

    pub fn set_mode(&self, song_mode: bool) {
        self.state.update(|s| s.song_mode = song_mode);
    }

    pub fn set_section_loops_num(&self, section: usize, loops: u32) -> Result<()> {
        if section >= MAX_SECTIONS {
            return Err(Error::InvalidArgument {
                message: format!("section {section} is out of range"),
            });
        }
        if loops == 0 {
            return Err(Error::InvalidArgument {
                message: "loops must be at least 1".into(),
            });
        }
        self.state.update(|s| s.sections_loops_num[section] = loops);
        Ok(())
    }

    /// Switch the transport to `section`, whose step range is `[region_start, region_end)` as
    /// resolved by the caller from the table store.
    ///
    /// If stopped, only `current_section` and the region are updated; `current_step` stays at
    /// `-1`. If playing, this behaves as a stop followed by a start at the new section's first
    /// step: playback keeps running, but the cursor jumps to `region_start`.
    pub fn switch_to_section(&self, section: usize, region_start: u32, region_end: u32) -> Result<()> {
        if section >= MAX_SECTIONS {
            return Err(Error::InvalidArgument {
                message: format!("section {section} is out of range"),
            });
        }
        if region_end <= region_start {
            return Err(Error::InvalidArgument {
                message: format!("region end {region_end} must be greater than start {region_start}"),
            });
        }
        self.state.update(|s| {
            s.current_section = section;
            s.current_section_loop = 0;
            s.region_start = region_start;
            s.region_end = region_end;
            if s.is_playing {
                s.current_step = region_start as i32;
            }
        });
        Ok(())
    }

    pub fn start(&self) {
        self.state.update(|s| {
            if s.current_step < 0 {
                s.current_step = s.region_start as i32;
            }
            s.is_playing = true;
        });
    }

    pub fn stop(&self) {
        self.state.update(|s| {
            s.is_playing = false;
            s.current_step = -1;
        });
    }

    pub fn apply_state(&self, desired: &PlaybackState) {
        self.state.update(|s| *s = *desired);
    }
}

impl Default for PlaybackStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bpm_out_of_range_is_rejected() {
        let store = PlaybackStore::new();
        assert!(store.set_bpm(0).is_err());
        assert!(store.set_bpm(301).is_err());
        assert!(store.set_bpm(1).is_ok());
        assert!(store.set_bpm(300).is_ok());
    }

    #[test]
    fn start_resumes_from_region_start_when_stopped() {
        let store = PlaybackStore::new();
        store.set_region(4, 8).unwrap();
        store.start();
        assert_eq!(store.read_state().current_step, 4);
        assert!(store.read_state().is_playing);
    }

    #[test]
    fn stop_resets_current_step() {
        let store = PlaybackStore::new();
        store.start();
        store.stop();
        let state = store.read_state();
        assert!(!state.is_playing);
        assert_eq!(state.current_step, -1);
    }

    #[test]
    fn region_change_clamps_cursor_outside_new_bounds() {
        let store = PlaybackStore::new();
        store.start();
        store.set_region(20, 24).unwrap();
        assert_eq!(store.read_state().current_step, 20);
    }

    #[test]
    fn switch_to_section_while_stopped_updates_region_but_not_cursor() {
        let store = PlaybackStore::new();
        store.switch_to_section(2, 32, 48).unwrap();
        let state = store.read_state();
        assert_eq!(state.current_section, 2);
        assert_eq!(state.region_start, 32);
        assert_eq!(state.region_end, 48);
        assert_eq!(state.current_step, -1);
    }

    #[test]
    fn switch_to_section_while_playing_jumps_cursor_to_new_region_start() {
        let store = PlaybackStore::new();
        store.start();
        store.switch_to_section(1, 16, 24).unwrap();
        let state = store.read_state();
        assert!(state.is_playing);
        assert_eq!(state.current_step, 16);
        assert_eq!(state.region_start, 16);
        assert_eq!(state.region_end, 24);
    }
}
