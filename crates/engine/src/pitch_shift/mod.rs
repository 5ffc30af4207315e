//! Time-domain pitch shifting shared by the offline pitch cache generator (C2) and the
//! real-time fallback path in the voice pipeline (C5).

mod classic;

pub use classic::TimeDomainShifter;

/// Quality preset for the time-domain shifter.
///
/// Lower is higher quality: `q = 0` is the longest analysis window with an anti-alias filter
/// enabled, `q = 4` is the shortest window with no anti-aliasing. This preset is process-global
/// (see [crate::pitch_cache::PitchCache::set_quality]) and cannot vary per voice.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Quality(u8);

impl Quality {
    pub const DEFAULT: Quality = Quality(2);

    pub fn clamped(q: u8) -> Quality {
        Quality(q.min(4))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    fn window_len(self) -> usize {
        match self.0 {
            0 => 64,
            1 => 48,
            2 => 32,
            3 => 16,
            _ => 8,
        }
    }

    fn anti_alias(self) -> bool {
        self.0 == 0 || self.0 == 1
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::DEFAULT
    }
}
