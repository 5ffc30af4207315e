//! Engine: the top-level owner that wires the bank, table, transport, scheduler, recorder, and
//! undo/redo into a running audio device.

use std::sync::Arc;

use crate::config::{worker_pool_threads, MAX_COLUMNS};
use crate::cpal_device::{AudioDevice, DeviceOptions};
use crate::error::{Error, Result};
use crate::is_audio_thread::mark_audio_thread;
use crate::pitch_cache::PitchCache;
use crate::playback::PlaybackStore;
use crate::recorder::Recorder;
use crate::sample_bank::SampleBank;
use crate::scheduler::Scheduler;
use crate::table::TableStore;
use crate::undo::UndoRedo;
use crate::voice::PitchMethodCell;

/// Owns every control-thread store plus the running audio device that drives the [Scheduler]
/// each callback.
pub struct Engine {
    bank: Arc<SampleBank>,
    table: Arc<TableStore>,
    playback: Arc<PlaybackStore>,
    pitch_cache: Arc<PitchCache>,
    recorder: Arc<Recorder>,
    undoredo: Arc<UndoRedo>,
    pitch_method: Arc<PitchMethodCell>,
    device: Option<AudioDevice>,
}

impl Engine {
    /// Build every store, open the default output device, and start the stream.
    pub fn new() -> Result<Self> {
        let bank = Arc::new(SampleBank::new());
        let table = Arc::new(TableStore::new());
        let playback = Arc::new(PlaybackStore::new());
        let pitch_cache = Arc::new(PitchCache::new(worker_pool_threads()));
        let recorder = Arc::new(Recorder::new());
        let undoredo = Arc::new(UndoRedo::new(bank.clone(), table.clone(), playback.clone()));
        let pitch_method = Arc::new(PitchMethodCell::default());

        let mut scheduler = Scheduler::new(
            table.clone(),
            playback.clone(),
            bank.clone(),
            pitch_cache.clone(),
            pitch_method.clone(),
            MAX_COLUMNS,
        );
        let recorder_for_callback = recorder.clone();

        let options = DeviceOptions {
            sample_rate: None,
            channels: Some(crate::config::CHANNELS),
        };

        let device = AudioDevice::open_default(options, move |buf: &mut [f32]| {
            mark_audio_thread();
            scheduler.process_block(buf.len() / crate::config::CHANNELS, buf);
            recorder_for_callback.write_block(buf);
        })
        .map_err(|e| Error::AudioBackend {
            message: e.to_string(),
        })?;

        device.start().map_err(|e| Error::AudioBackend {
            message: e.to_string(),
        })?;

        Ok(Engine {
            bank,
            table,
            playback,
            pitch_cache,
            recorder,
            undoredo,
            pitch_method,
            device: Some(device),
        })
    }

    pub fn bank(&self) -> &Arc<SampleBank> {
        &self.bank
    }

    pub fn table(&self) -> &Arc<TableStore> {
        &self.table
    }

    pub fn playback(&self) -> &Arc<PlaybackStore> {
        &self.playback
    }

    pub fn pitch_cache(&self) -> &Arc<PitchCache> {
        &self.pitch_cache
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub fn undoredo(&self) -> &Arc<UndoRedo> {
        &self.undoredo
    }

    pub fn pitch_method(&self) -> &Arc<PitchMethodCell> {
        &self.pitch_method
    }

    /// Pause the stream and drop the device. The stores are left intact so a fresh [Engine] could
    /// in principle resume from them; this crate always drops them together, via [Drop].
    pub fn cleanup(&mut self) {
        self.device = None;
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cleanup();
    }
}
