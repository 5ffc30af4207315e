//! Undo/Redo (C8): a bounded ring of deep-copy snapshots across the bank, table, and playback
//! transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use crate::config::HISTORY_CAPACITY;
use crate::playback::{PlaybackState, PlaybackStore};
use crate::sample_bank::{BankState, SampleBank};
use crate::table::{TableState, TableStore};

/// One point-in-time snapshot of everything undo/redo tracks.
#[derive(Copy, Clone)]
pub struct Snapshot {
    pub bank: BankState,
    pub table: TableState,
    pub playback: PlaybackState,
}

struct Inner {
    /// The history ring. The entry at `cursor` is the currently-applied state; entries after it
    /// are redo targets, kept around until the next [UndoRedo::record] discards them.
    history: VecDeque<Snapshot>,
    cursor: usize,
}

pub struct UndoRedo {
    bank: Arc<SampleBank>,
    table: Arc<TableStore>,
    playback: Arc<PlaybackStore>,
    inner: Mutex<Inner>,
}

impl UndoRedo {
    pub fn new(bank: Arc<SampleBank>, table: Arc<TableStore>, playback: Arc<PlaybackStore>) -> Self {
        let initial = Snapshot {
            bank: bank.read_state(),
            table: table.read_state(),
            playback: playback.read_state(),
        };
        let mut history = VecDeque::with_capacity(HISTORY_CAPACITY);
        history.push_back(initial);

        UndoRedo {
            bank,
            table,
            playback,
            inner: Mutex::new(Inner { history, cursor: 0 }),
        }
    }

    fn current_snapshot(&self) -> Snapshot {
        Snapshot {
            bank: self.bank.read_state(),
            table: self.table.read_state(),
            playback: self.playback.read_state(),
        }
    }

    /// Record the current live state as a new undo point, discarding any redo history beyond the
    /// cursor. A no-op if nothing changed since the last recorded snapshot.
    pub fn record(&self) {
        let snapshot = self.current_snapshot();
        let mut inner = self.inner.lock().unwrap();

        if inner.history[inner.cursor].bank == snapshot.bank
            && inner.history[inner.cursor].table == snapshot.table
            && inner.history[inner.cursor].playback == snapshot.playback
        {
            return;
        }

        inner.history.truncate(inner.cursor + 1);
        inner.history.push_back(snapshot);

        if inner.history.len() > HISTORY_CAPACITY {
            inner.history.pop_front();
        } else {
            inner.cursor += 1;
        }
    }

    pub fn can_undo(&self) -> bool {
        self.inner.lock().unwrap().cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.cursor + 1 < inner.history.len()
    }

    pub fn undo(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.cursor == 0 {
            return false;
        }
        inner.cursor -= 1;
        let snapshot = inner.history[inner.cursor];
        drop(inner);
        self.apply(&snapshot);
        true
    }

    pub fn redo(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.cursor + 1 >= inner.history.len() {
            return false;
        }
        inner.cursor += 1;
        let snapshot = inner.history[inner.cursor];
        drop(inner);
        self.apply(&snapshot);
        true
    }

    fn apply(&self, snapshot: &Snapshot) {
        self.bank.apply_state(&snapshot.bank);
        self.table.apply_state(&snapshot.table);
        self.playback.apply_state(&snapshot.playback);
    }
}

impl PartialEq for BankState {
    fn eq(&self, other: &Self) -> bool {
        self.samples.iter().zip(other.samples.iter()).all(|(a, b)| {
            a.loaded == b.loaded
                && a.file_path == b.file_path
                && a.sample_id == b.sample_id
                && a.settings == b.settings
                && a.is_processing == b.is_processing
        })
    }
}

impl PartialEq for TableState {
    fn eq(&self, other: &Self) -> bool {
        let total = self.total_steps() as usize;
        self.section_count == other.section_count
            && self.sections[..self.section_count] == other.sections[..other.section_count]
            && self.layers[..self.section_count] == other.layers[..other.section_count]
            && total == other.total_steps() as usize
            && self.cells[..total] == other.cells[..total]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_history_cannot_undo_or_redo() {
        let bank = Arc::new(SampleBank::new());
        let table = Arc::new(TableStore::new());
        let playback = Arc::new(PlaybackStore::new());
        let undoredo = UndoRedo::new(bank, table, playback);

        assert!(!undoredo.can_undo());
        assert!(!undoredo.can_redo());
    }

    #[test]
    fn undo_then_redo_restores_the_in_between_state() {
        let bank = Arc::new(SampleBank::new());
        let table = Arc::new(TableStore::new());
        let playback = Arc::new(PlaybackStore::new());
        let undoredo = UndoRedo::new(bank.clone(), table.clone(), playback.clone());

        playback.set_bpm(90).unwrap();
        undoredo.record();
        playback.set_bpm(150).unwrap();
        undoredo.record();

        assert!(undoredo.undo());
        assert_eq!(playback.read_state().bpm, 90);

        assert!(undoredo.undo());
        assert_eq!(playback.read_state().bpm, 120);
        assert!(!undoredo.can_undo());

        assert!(undoredo.redo());
        assert_eq!(playback.read_state().bpm, 90);
        assert!(undoredo.redo());
        assert_eq!(playback.read_state().bpm, 150);
        assert!(!undoredo.can_redo());
    }

    #[test]
    fn recording_after_undo_discards_redo_history() {
        let bank = Arc::new(SampleBank::new());
        let table = Arc::new(TableStore::new());
        let playback = Arc::new(PlaybackStore::new());
        let undoredo = UndoRedo::new(bank, table, playback.clone());

        playback.set_bpm(90).unwrap();
        undoredo.record();
        undoredo.undo();

        playback.set_bpm(200).unwrap();
        undoredo.record();

        assert!(!undoredo.can_redo());
    }
}
