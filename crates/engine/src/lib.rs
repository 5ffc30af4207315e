#![allow(dead_code)]

#[macro_use]
mod logging;

mod channel_format;
mod config;
mod cpal_device;
mod data_structures;
mod engine;
pub mod error;
pub mod ffi;
mod is_audio_thread;
mod pitch_cache;
mod pitch_shift;
mod playback;
mod recorder;
mod resampling;
mod sample_bank;
pub mod sample_sources;
mod scheduler;
mod table;
mod undo;
mod voice;

pub use channel_format::ChannelFormat;
pub use config::SR;
pub use engine::Engine;
pub use error::{Error, Result};
pub use playback::PlaybackState;
pub use sample_bank::SampleBank;
pub use table::TableStore;
pub use undo::{Snapshot, UndoRedo};
