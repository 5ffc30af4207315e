//! External Interfaces (§6): a flat C-style surface over the engine.
//!
//! Every function returns an `i32` status: `0` is success, negative values identify an
//! [crate::error::Error] variant (see [status_of]). State that a host needs to poll every frame
//! (table, playback, bank) is published as a boxed, process-owned snapshot; `*_get_state_ptr`
//! returns a pointer into it that stays valid until the next call that mutates that store, so a
//! host can treat it as a stable read location rather than re-marshaling on every poll.

use std::ffi::{c_char, CStr};
use std::sync::Mutex;

use crate::config::{MAX_COLUMNS, MAX_LAYERS, MAX_SAMPLES, MAX_SECTIONS, MAX_STEPS};
use crate::engine::Engine;
use crate::error::Error;
use crate::playback::PlaybackState;
use crate::sample_bank::BankState;
use crate::table::TableState;

const STATUS_OK: i32 = 0;

fn status_of(err: &Error) -> i32 {
    match err {
        Error::InvalidArgument { .. } => -1,
        Error::NotInitialized => -2,
        Error::AlreadyRecording => -3,
        Error::NotRecording => -4,
        Error::DecodeError { .. } => -5,
        Error::IoError { .. } => -6,
        Error::CapacityExhausted { .. } => -7,
        Error::RaceRetry => -8,
        Error::AudioBackend { .. } => -9,
    }
}

fn status_of_result(result: crate::error::Result<()>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => status_of(&e),
    }
}

/// Stable-prefix mirror of [crate::table::Cell] for FFI consumers.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct CellFfi {
    pub sample_slot: i8,
    pub volume: f64,
    pub pitch: f64,
}

/// Stable-prefix mirror of [crate::table::Section].
#[repr(C)]
#[derive(Copy, Clone)]
pub struct SectionFfi {
    pub start_step: u32,
    pub num_steps: u32,
}

/// Stable-prefix mirror of [TableState], published by `table_get_state_ptr`.
#[repr(C)]
pub struct TableStateFfi {
    pub cells: [[CellFfi; MAX_COLUMNS]; MAX_STEPS],
    pub sections: [SectionFfi; MAX_SECTIONS],
    pub section_count: u32,
    pub layer_lens: [[u8; MAX_LAYERS]; MAX_SECTIONS],
}

impl From<TableState> for TableStateFfi {
    fn from(s: TableState) -> Self {
        let mut cells = [[CellFfi {
            sample_slot: -1,
            volume: 0.0,
            pitch: 0.0,
        }; MAX_COLUMNS]; MAX_STEPS];
        for (step, row) in s.cells.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                cells[step][col] = CellFfi {
                    sample_slot: cell.sample_slot,
                    volume: cell.volume,
                    pitch: cell.pitch,
                };
            }
        }
        let mut sections = [SectionFfi {
            start_step: 0,
            num_steps: 0,
        }; MAX_SECTIONS];
        let mut layer_lens = [[0u8; MAX_LAYERS]; MAX_SECTIONS];
        for i in 0..s.section_count {
            sections[i] = SectionFfi {
                start_step: s.sections[i].start_step,
                num_steps: s.sections[i].num_steps,
            };
            for (layer, slot) in s.layers[i].iter().zip(layer_lens[i].iter_mut()) {
                *slot = layer.len;
            }
        }
        TableStateFfi {
            cells,
            sections,
            section_count: s.section_count as u32,
            layer_lens,
        }
    }
}

/// Stable-prefix mirror of [PlaybackState], published by `playback_get_state_ptr`.
#[repr(C)]
pub struct PlaybackStateFfi {
    pub bpm: u32,
    pub is_playing: u8,
    pub current_step: i32,
    pub region_start: u32,
    pub region_end: u32,
    pub song_mode: u8,
    pub current_section: u32,
    pub current_section_loop: u32,
    pub sections_loops_num: [u32; MAX_SECTIONS],
}

impl From<PlaybackState> for PlaybackStateFfi {
    fn from(s: PlaybackState) -> Self {
        PlaybackStateFfi {
            bpm: s.bpm,
            is_playing: s.is_playing as u8,
            current_step: s.current_step,
            region_start: s.region_start,
            region_end: s.region_end,
            song_mode: s.song_mode as u8,
            current_section: s.current_section as u32,
            current_section_loop: s.current_section_loop,
            sections_loops_num: s.sections_loops_num,
        }
    }
}

/// Stable-prefix mirror of one [crate::sample_bank::Sample] slot.
#[repr(C)]
pub struct SampleFfi {
    pub loaded: u8,
    pub file_path: [u8; 512],
    pub file_path_len: u32,
    pub display_name: [u8; 128],
    pub display_name_len: u32,
    pub volume: f32,
    pub pitch: f64,
    pub is_processing: u8,
}

fn copy_into(dst: &mut [u8], src: &str) -> u32 {
    let bytes = src.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
    n as u32
}

/// Stable-prefix mirror of [BankState], published by `sample_bank_get_state_ptr`.
#[repr(C)]
pub struct BankStateFfi {
    pub samples: [SampleFfi; MAX_SAMPLES],
}

impl From<BankState> for BankStateFfi {
    fn from(s: BankState) -> Self {
        let samples = std::array::from_fn(|i| {
            let sample = &s.samples[i];
            let mut ffi = SampleFfi {
                loaded: sample.loaded as u8,
                file_path: [0; 512],
                file_path_len: 0,
                display_name: [0; 128],
                display_name_len: 0,
                volume: sample.settings.volume,
                pitch: sample.settings.pitch,
                is_processing: sample.is_processing as u8,
            };
            ffi.file_path_len = copy_into(&mut ffi.file_path, sample.file_path.as_str());
            ffi.display_name_len = copy_into(&mut ffi.display_name, sample.display_name.as_str());
            ffi
        });
        BankStateFfi { samples }
    }
}

/// Everything the FFI layer needs alongside the running [Engine]: boxed snapshots kept in sync
/// with the live seqlocks after every mutating call, so `*_get_state_ptr` has somewhere stable to
/// point at.
struct EngineHandle {
    engine: Engine,
    table_snapshot: Box<TableStateFfi>,
    playback_snapshot: Box<PlaybackStateFfi>,
    bank_snapshot: Box<BankStateFfi>,
}

impl EngineHandle {
    fn new(engine: Engine) -> Self {
        let table_snapshot = Box::new(engine.table().read_state().into());
        let playback_snapshot = Box::new(engine.playback().read_state().into());
        let bank_snapshot = Box::new(engine.bank().read_state().into());
        EngineHandle {
            engine,
            table_snapshot,
            playback_snapshot,
            bank_snapshot,
        }
    }

    fn refresh_table(&mut self) {
        *self.table_snapshot = self.engine.table().read_state().into();
    }

    fn refresh_playback(&mut self) {
        *self.playback_snapshot = self.engine.playback().read_state().into();
    }

    fn refresh_bank(&mut self) {
        *self.bank_snapshot = self.engine.bank().read_state().into();
    }
}

lazy_static::lazy_static! {
    static ref ENGINE: Mutex<Option<EngineHandle>> = Mutex::new(None);
}

fn with_engine<R>(default: R, f: impl FnOnce(&mut EngineHandle) -> R) -> R {
    match ENGINE.lock().unwrap().as_mut() {
        Some(handle) => f(handle),
        None => default,
    }
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

// ── Playback ────────────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn playback_init() -> i32 {
    let mut guard = ENGINE.lock().unwrap();
    if guard.is_some() {
        return STATUS_OK;
    }
    match Engine::new() {
        Ok(engine) => {
            *guard = Some(EngineHandle::new(engine));
            STATUS_OK
        }
        Err(e) => status_of(&e),
    }
}

#[no_mangle]
pub extern "C" fn playback_cleanup() -> i32 {
    let mut guard = ENGINE.lock().unwrap();
    *guard = None;
    STATUS_OK
}

#[no_mangle]
pub extern "C" fn playback_start() -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        handle.engine.playback().start();
        handle.engine.undoredo().record();
        handle.refresh_playback();
        STATUS_OK
    })
}

#[no_mangle]
pub extern "C" fn playback_stop() -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        handle.engine.playback().stop();
        handle.engine.undoredo().record();
        handle.refresh_playback();
        STATUS_OK
    })
}

#[no_mangle]
pub extern "C" fn playback_set_bpm(bpm: u32) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.playback().set_bpm(bpm);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_playback();
        status
    })
}

#[no_mangle]
pub extern "C" fn playback_set_region(start: u32, end: u32) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.playback().set_region(start, end);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_playback();
        status
    })
}

#[no_mangle]
pub extern "C" fn playback_set_mode(song_mode: u8) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        handle.engine.playback().set_mode(song_mode != 0);
        handle.engine.undoredo().record();
        handle.refresh_playback();
        STATUS_OK
    })
}

#[no_mangle]
pub extern "C" fn playback_set_section_loops_num(section: usize, loops: u32) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle
            .engine
            .playback()
            .set_section_loops_num(section, loops);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_playback();
        status
    })
}

#[no_mangle]
pub extern "C" fn switch_to_section(section: usize) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let (sections, section_count) = handle.engine.table().read_sections();
        if section >= section_count {
            return status_of(&Error::InvalidArgument {
                message: format!("section {section} is out of range"),
            });
        }
        let region_start = sections[section].start_step;
        let region_end = region_start + sections[section].num_steps;

        let result = handle
            .engine
            .playback()
            .switch_to_section(section, region_start, region_end);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_playback();
        status
    })
}

/// Returns a pointer to the engine's published [PlaybackStateFfi], valid until the next playback
/// mutator call. Null if the engine is not initialized.
#[no_mangle]
pub extern "C" fn playback_get_state_ptr() -> *const PlaybackStateFfi {
    with_engine(std::ptr::null(), |handle| {
        handle.playback_snapshot.as_ref() as *const _
    })
}

#[no_mangle]
pub extern "C" fn playback_apply_state(snapshot: *const PlaybackStateFfi) -> i32 {
    if snapshot.is_null() {
        return status_of(&Error::InvalidArgument {
            message: "null snapshot".into(),
        });
    }
    let snapshot = unsafe { &*snapshot };
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let desired = PlaybackState {
            bpm: snapshot.bpm,
            is_playing: snapshot.is_playing != 0,
            current_step: snapshot.current_step,
            region_start: snapshot.region_start,
            region_end: snapshot.region_end,
            song_mode: snapshot.song_mode != 0,
            current_section: snapshot.current_section as usize,
            current_section_loop: snapshot.current_section_loop,
            sections_loops_num: snapshot.sections_loops_num,
        };
        handle.engine.playback().apply_state(&desired);
        handle.refresh_playback();
        STATUS_OK
    })
}

// ── Table ───────────────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn table_init() -> i32 {
    // The table store is created alongside the engine in `playback_init`; this entry point exists
    // for hosts that initialize subsystems independently, and is a no-op once the engine exists.
    with_engine(status_of(&Error::NotInitialized), |_| STATUS_OK)
}

#[no_mangle]
pub extern "C" fn table_set_cell(
    step: usize,
    col: usize,
    slot: i8,
    volume: f64,
    pitch: f64,
) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.table().set_cell(step, col, slot, volume, pitch);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_table();
        status
    })
}

#[no_mangle]
pub extern "C" fn table_set_cell_settings(step: usize, col: usize, volume: f64, pitch: f64) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle
            .engine
            .table()
            .set_cell_settings(step, col, volume, pitch);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_table();
        status
    })
}

#[no_mangle]
pub extern "C" fn table_set_cell_sample_slot(step: usize, col: usize, slot: i8) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.table().set_cell_sample_slot(step, col, slot);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_table();
        status
    })
}

#[no_mangle]
pub extern "C" fn table_clear_cell(step: usize, col: usize) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.table().clear_cell(step, col);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_table();
        status
    })
}

#[no_mangle]
pub extern "C" fn table_insert_step(section: usize, at_step: usize) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.table().insert_step(section, at_step);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_table();
        status
    })
}

#[no_mangle]
pub extern "C" fn table_delete_step(section: usize, at_step: usize) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.table().delete_step(section, at_step);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_table();
        status
    })
}

#[no_mangle]
pub extern "C" fn table_append_section(steps: u32, copy_from: i64) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let copy_from = if copy_from < 0 {
            None
        } else {
            Some(copy_from as usize)
        };
        let result = handle.engine.table().append_section(steps, copy_from);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_table();
        status
    })
}

#[no_mangle]
pub extern "C" fn table_delete_section(index: usize) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.table().delete_section(index);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_table();
        status
    })
}

#[no_mangle]
pub extern "C" fn table_set_layer_len(section: usize, layer: usize, len: u8) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.table().set_layer_len(section, layer, len);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_table();
        status
    })
}

#[no_mangle]
pub extern "C" fn table_get_state_ptr() -> *const TableStateFfi {
    with_engine(std::ptr::null(), |handle| {
        handle.table_snapshot.as_ref() as *const _
    })
}

#[no_mangle]
pub extern "C" fn table_apply_state(snapshot: *const TableStateFfi) -> i32 {
    if snapshot.is_null() {
        return status_of(&Error::InvalidArgument {
            message: "null snapshot".into(),
        });
    }
    let snapshot = unsafe { &*snapshot };
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let mut desired = TableState::default();
        desired.section_count = snapshot.section_count as usize;
        for i in 0..desired.section_count {
            desired.sections[i] = crate::table::Section {
                start_step: snapshot.sections[i].start_step,
                num_steps: snapshot.sections[i].num_steps,
            };
            for (layer, &len) in desired.layers[i].iter_mut().zip(snapshot.layer_lens[i].iter()) {
                layer.len = len;
            }
        }
        for (step, row) in desired.cells.iter_mut().enumerate() {
            for (col, cell) in row.iter_mut().enumerate() {
                let src = snapshot.cells[step][col];
                *cell = crate::table::Cell {
                    sample_slot: src.sample_slot,
                    volume: src.volume,
                    pitch: src.pitch,
                };
            }
        }
        handle.engine.table().apply_state(&desired);
        handle.refresh_table();
        STATUS_OK
    })
}

// ── Sample bank ─────────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn sample_bank_load(slot: usize, path: *const c_char) -> i32 {
    let path = match unsafe { cstr_to_string(path) } {
        Some(p) => p,
        None => {
            return status_of(&Error::InvalidArgument {
                message: "null path".into(),
            })
        }
    };
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.bank().load(slot, &path);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_bank();
        status
    })
}

#[no_mangle]
pub extern "C" fn sample_bank_load_with_id(
    slot: usize,
    path: *const c_char,
    id: *const c_char,
) -> i32 {
    let path = match unsafe { cstr_to_string(path) } {
        Some(p) => p,
        None => {
            return status_of(&Error::InvalidArgument {
                message: "null path".into(),
            })
        }
    };
    let id = unsafe { cstr_to_string(id) }.unwrap_or_default();
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.bank().load_with_id(slot, &path, &id);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_bank();
        status
    })
}

#[no_mangle]
pub extern "C" fn sample_bank_unload(slot: usize) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let result = handle.engine.bank().unload(slot);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_bank();
        status
    })
}

#[no_mangle]
pub extern "C" fn sample_bank_set_sample_settings(slot: usize, volume: f32, pitch: f64) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let pitch_cache = handle.engine.pitch_cache().clone();
        let result = handle
            .engine
            .bank()
            .set_sample_settings(slot, volume, pitch, &pitch_cache);
        let status = status_of_result(result);
        if status == STATUS_OK {
            handle.engine.undoredo().record();
        }
        handle.refresh_bank();
        status
    })
}

#[no_mangle]
pub extern "C" fn sample_bank_get_state_ptr() -> *const BankStateFfi {
    with_engine(std::ptr::null(), |handle| {
        handle.bank_snapshot.as_ref() as *const _
    })
}

#[no_mangle]
pub extern "C" fn sample_bank_apply_state(snapshot: *const BankStateFfi) -> i32 {
    if snapshot.is_null() {
        return status_of(&Error::InvalidArgument {
            message: "null snapshot".into(),
        });
    }
    let snapshot = unsafe { &*snapshot };
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let mut desired = BankState::default();
        for i in 0..MAX_SAMPLES {
            let src = &snapshot.samples[i];
            let path_bytes = &src.file_path[..(src.file_path_len as usize).min(512)];
            let name_bytes = &src.display_name[..(src.display_name_len as usize).min(128)];
            desired.samples[i] = crate::sample_bank::Sample {
                loaded: src.loaded != 0,
                file_path: arrayvec::ArrayString::from(String::from_utf8_lossy(path_bytes).as_ref())
                    .unwrap_or_default(),
                display_name: arrayvec::ArrayString::from(
                    String::from_utf8_lossy(name_bytes).as_ref(),
                )
                .unwrap_or_default(),
                sample_id: arrayvec::ArrayString::new(),
                settings: crate::sample_bank::SampleSettings {
                    volume: src.volume,
                    pitch: src.pitch,
                },
                is_processing: src.is_processing != 0,
            };
        }
        handle.engine.bank().apply_state(&desired);
        handle.refresh_bank();
        STATUS_OK
    })
}

// ── Pitch cache ─────────────────────────────────────────────────────────────

/// `0` selects the resampler-based fallback, anything else the time-domain shifter.
#[no_mangle]
pub extern "C" fn pitch_set_method(method: u8) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let method = if method == 0 {
            crate::voice::PitchMethod::Resampler
        } else {
            crate::voice::PitchMethod::TimeDomain
        };
        handle.engine.pitch_method().store(method);
        STATUS_OK
    })
}

#[no_mangle]
pub extern "C" fn pitch_set_quality(quality: u8) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        handle.engine.pitch_cache().set_quality(quality);
        STATUS_OK
    })
}

#[no_mangle]
pub extern "C" fn pitch_run_preprocessing(slot: usize, has_cell_pitch: u8, cell_pitch: f64) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let Some(sample) = handle.engine.bank().read_sample(slot) else {
            return status_of(&Error::InvalidArgument {
                message: format!("slot {slot} is out of range"),
            });
        };
        if !sample.loaded {
            return status_of(&Error::InvalidArgument {
                message: "slot is not loaded".into(),
            });
        }
        let pitch_cache = handle.engine.pitch_cache().clone();
        let bank = handle.engine.bank().clone();
        let cell_pitch = (has_cell_pitch != 0).then_some(cell_pitch);
        pitch_cache.run_preprocessing(
            slot,
            cell_pitch,
            sample.settings.pitch,
            sample.file_path.to_string(),
            move |completed_slot| {
                let _ = bank.read_sample(completed_slot);
            },
        );
        STATUS_OK
    })
}

#[no_mangle]
pub extern "C" fn pitch_clear_preprocessed_cache(slot: usize) -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let Some(sample) = handle.engine.bank().read_sample(slot) else {
            return status_of(&Error::InvalidArgument {
                message: format!("slot {slot} is out of range"),
            });
        };
        let result = handle
            .engine
            .pitch_cache()
            .clear_preprocessed_cache(sample.file_path.as_str());
        status_of_result(result)
    })
}

// ── Recorder ────────────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn recording_start(path: *const c_char) -> i32 {
    let path = match unsafe { cstr_to_string(path) } {
        Some(p) => p,
        None => {
            return status_of(&Error::InvalidArgument {
                message: "null path".into(),
            })
        }
    };
    with_engine(status_of(&Error::NotInitialized), |handle| {
        status_of_result(handle.engine.recorder().start(&path))
    })
}

#[no_mangle]
pub extern "C" fn recording_stop() -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        status_of_result(handle.engine.recorder().stop())
    })
}

#[no_mangle]
pub extern "C" fn recording_is_active() -> i32 {
    with_engine(0, |handle| handle.engine.recorder().is_active() as i32)
}

// ── Undo/Redo ───────────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn undoredo_init() -> i32 {
    // `UndoRedo` is created alongside the engine; present for symmetry with the other subsystems.
    with_engine(status_of(&Error::NotInitialized), |_| STATUS_OK)
}

#[no_mangle]
pub extern "C" fn undoredo_record() -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        handle.engine.undoredo().record();
        STATUS_OK
    })
}

#[no_mangle]
pub extern "C" fn undoredo_undo() -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let moved = handle.engine.undoredo().undo();
        handle.refresh_table();
        handle.refresh_playback();
        handle.refresh_bank();
        if moved {
            STATUS_OK
        } else {
            status_of(&Error::InvalidArgument {
                message: "nothing to undo".into(),
            })
        }
    })
}

#[no_mangle]
pub extern "C" fn undoredo_redo() -> i32 {
    with_engine(status_of(&Error::NotInitialized), |handle| {
        let moved = handle.engine.undoredo().redo();
        handle.refresh_table();
        handle.refresh_playback();
        handle.refresh_bank();
        if moved {
            STATUS_OK
        } else {
            status_of(&Error::InvalidArgument {
                message: "nothing to redo".into(),
            })
        }
    })
}

#[no_mangle]
pub extern "C" fn undoredo_can_undo() -> i32 {
    with_engine(0, |handle| handle.engine.undoredo().can_undo() as i32)
}

#[no_mangle]
pub extern "C" fn undoredo_can_redo() -> i32 {
    with_engine(0, |handle| handle.engine.undoredo().can_redo() as i32)
}
