//! Table Store (C3): the grid of `(step × column)` cells grouped into sections.

use crate::config::{MAX_COLUMNS, MAX_LAYERS, MAX_SECTIONS, MAX_STEPS};
use crate::error::{Error, Result};
use sketchpad_sync::seqlock::Seqlock;

/// Sentinel meaning "inherit from the sample bank" for a cell's volume or pitch.
pub const INHERIT: f64 = -1.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Cell {
    /// `-1` means empty.
    pub sample_slot: i8,
    /// `[0, 1]`, or [INHERIT] to use the sample's default.
    pub volume: f64,
    /// `[0.25, 4.0]`, or [INHERIT] to use the sample's default.
    pub pitch: f64,
}

impl Cell {
    pub const EMPTY: Cell = Cell {
        sample_slot: -1,
        volume: INHERIT,
        pitch: INHERIT,
    };

    pub fn is_empty(&self) -> bool {
        self.sample_slot < 0
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::EMPTY
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Section {
    pub start_step: u32,
    pub num_steps: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Layer {
    pub len: u8,
}

/// The published, readable state of the table.
///
/// `cells` is indexed `[step][column]`; only `cells[..total_steps()][..]` is meaningful. This is
/// sized for the worst case (`MAX_STEPS` × `MAX_COLUMNS`) so the whole thing stays `Copy` and can
/// be published through a [Seqlock]; most reads go through [TableStore::read_cell] rather than
/// cloning the entire grid.
#[derive(Copy, Clone)]
pub struct TableState {
    pub cells: [[Cell; MAX_COLUMNS]; MAX_STEPS],
    pub sections: [Section; MAX_SECTIONS],
    pub section_count: usize,
    pub layers: [[Layer; MAX_LAYERS]; MAX_SECTIONS],
}

impl TableState {
    pub(crate) fn total_steps(&self) -> u32 {
        self.sections[..self.section_count]
            .iter()
            .map(|s| s.num_steps)
            .sum()
    }
}

impl Default for TableState {
    fn default() -> Self {
        let mut sections = [Section {
            start_step: 0,
            num_steps: 0,
        }; MAX_SECTIONS];
        sections[0] = Section {
            start_step: 0,
            num_steps: 16,
        };

        TableState {
            cells: [[Cell::EMPTY; MAX_COLUMNS]; MAX_STEPS],
            sections,
            section_count: 1,
            layers: [[Layer::default(); MAX_LAYERS]; MAX_SECTIONS],
        }
    }
}

pub struct TableStore {
    state: Seqlock<TableState>,
}

impl TableStore {
    pub fn new() -> Self {
        TableStore {
            state: Seqlock::new(TableState::default()),
        }
    }

    pub fn read_state(&self) -> TableState {
        self.state.read()
    }

    /// Read a single cell without copying the whole grid. This is the hot path used by the
    /// scheduler at every step boundary.
    pub fn read_cell(&self, step: usize, column: usize) -> Cell {
        self.state.read_with(|s| s.cells[step][column])
    }

    pub fn read_sections(&self) -> ([Section; MAX_SECTIONS], usize) {
        self.state.read_with(|s| (s.sections, s.section_count))
    }

    fn validate_step_col(state: &TableState, step: usize, col: usize) -> Result<()> {
        if col >= MAX_COLUMNS {
            return Err(Error::InvalidArgument {
                message: format!("column {col} is out of range"),
            });
        }
        if step as u32 >= state.total_steps() {
            return Err(Error::InvalidArgument {
                message: format!("step {step} is out of range"),
            });
        }
        Ok(())
    }

    pub fn set_cell(
        &self,
        step: usize,
        col: usize,
        slot: i8,
        volume: f64,
        pitch: f64,
    ) -> Result<()> {
        let mut err = None;
        self.state.update(|state| {
            if let Err(e) = Self::validate_step_col(state, step, col) {
                err = Some(e);
                return;
            }
            state.cells[step][col] = Cell {
                sample_slot: slot,
                volume,
                pitch,
            };
        });
        err.map_or(Ok(()), Err)
    }

    pub fn set_cell_settings(&self, step: usize, col: usize, volume: f64, pitch: f64) -> Result<()> {
        let mut err = None;
        self.state.update(|state| {
            if let Err(e) = Self::validate_step_col(state, step, col) {
                err = Some(e);
                return;
            }
            state.cells[step][col].volume = volume;
            state.cells[step][col].pitch = pitch;
        });
        err.map_or(Ok(()), Err)
    }

    pub fn set_cell_sample_slot(&self, step: usize, col: usize, slot: i8) -> Result<()> {
        let mut err = None;
        self.state.update(|state| {
            if let Err(e) = Self::validate_step_col(state, step, col) {
                err = Some(e);
                return;
            }
            state.cells[step][col].sample_slot = slot;
        });
        err.map_or(Ok(()), Err)
    }

    pub fn clear_cell(&self, step: usize, col: usize) -> Result<()> {
        let mut err = None;
        self.state.update(|state| {
            if let Err(e) = Self::validate_step_col(state, step, col) {
                err = Some(e);
                return;
            }
            state.cells[step][col] = Cell::EMPTY;
        });
        err.map_or(Ok(()), Err)
    }

    /// Find which section a global step index falls in.
    pub fn get_section_at_step(&self, step: usize) -> Option<usize> {
        self.state.read_with(|s| {
            s.sections[..s.section_count]
                .iter()
                .position(|sec| {
                    step as u32 >= sec.start_step && (step as u32) < sec.start_step + sec.num_steps
                })
        })
    }

    pub fn get_section_start_step(&self, section: usize) -> Option<usize> {
        self.state
            .read_with(|s| (section < s.section_count).then(|| s.sections[section].start_step as usize))
    }

    pub fn get_cell(&self, step: usize, col: usize) -> Cell {
        self.read_cell(step, col)
    }

    /// Insert an empty row at `at_step` within `section`, growing it by one and re-basing every
    /// following section's `start_step`.
    pub fn insert_step(&self, section: usize, at_step: usize) -> Result<()> {
        let mut err = None;
        self.state.update(|state| {
            if section >= state.section_count {
                err = Some(Error::InvalidArgument {
                    message: format!("section {section} does not exist"),
                });
                return;
            }
            let sec = state.sections[section];
            let lo = sec.start_step as usize;
            let hi = lo + sec.num_steps as usize;
            if at_step < lo || at_step > hi {
                err = Some(Error::InvalidArgument {
                    message: format!("at_step {at_step} is outside section {section}"),
                });
                return;
            }
            if state.total_steps() as usize >= MAX_STEPS {
                err = Some(Error::CapacityExhausted {
                    message: "table is at its maximum step count".into(),
                });
                return;
            }

            let total = state.total_steps() as usize;
            for step in (at_step..total).rev() {
                state.cells[step + 1] = state.cells[step];
            }
            state.cells[at_step] = [Cell::EMPTY; MAX_COLUMNS];

            state.sections[section].num_steps += 1;
            for later in (section + 1)..state.section_count {
                state.sections[later].start_step += 1;
            }
        });
        err.map_or(Ok(()), Err)
    }

    /// Remove the row at `at_step` within `section`. Refuses to shrink a one-step section.
    pub fn delete_step(&self, section: usize, at_step: usize) -> Result<()> {
        let mut err = None;
        self.state.update(|state| {
            if section >= state.section_count {
                err = Some(Error::InvalidArgument {
                    message: format!("section {section} does not exist"),
                });
                return;
            }
            let sec = state.sections[section];
            if sec.num_steps <= 1 {
                err = Some(Error::InvalidArgument {
                    message: "cannot delete the only step in a section".into(),
                });
                return;
            }
            let lo = sec.start_step as usize;
            let hi = lo + sec.num_steps as usize;
            if at_step < lo || at_step >= hi {
                err = Some(Error::InvalidArgument {
                    message: format!("at_step {at_step} is outside section {section}"),
                });
                return;
            }

            let total = state.total_steps() as usize;
            for step in at_step..(total - 1) {
                state.cells[step] = state.cells[step + 1];
            }
            state.cells[total - 1] = [Cell::EMPTY; MAX_COLUMNS];

            state.sections[section].num_steps -= 1;
            for later in (section + 1)..state.section_count {
                state.sections[later].start_step -= 1;
            }
        });
        err.map_or(Ok(()), Err)
    }

    /// Append a trailing section, optionally copying cells and step count from `copy_from`.
    pub fn append_section(&self, steps: u32, copy_from: Option<usize>) -> Result<()> {
        let mut err = None;
        self.state.update(|state| {
            if state.section_count >= MAX_SECTIONS {
                err = Some(Error::CapacityExhausted {
                    message: "no more section slots".into(),
                });
                return;
            }

            let (new_steps, source_rows) = if let Some(from) = copy_from {
                if from >= state.section_count {
                    err = Some(Error::InvalidArgument {
                        message: format!("section {from} does not exist"),
                    });
                    return;
                }
                let sec = state.sections[from];
                (sec.num_steps, Some(sec.start_step as usize))
            } else {
                (steps, None)
            };

            if state.total_steps() + new_steps > MAX_STEPS as u32 {
                err = Some(Error::CapacityExhausted {
                    message: "table is at its maximum step count".into(),
                });
                return;
            }

            let new_index = state.section_count;
            let new_start = state.total_steps();

            if let Some(src_start) = source_rows {
                for i in 0..new_steps as usize {
                    state.cells[new_start as usize + i] = state.cells[src_start + i];
                }
            } else {
                for i in 0..new_steps as usize {
                    state.cells[new_start as usize + i] = [Cell::EMPTY; MAX_COLUMNS];
                }
            }

            state.sections[new_index] = Section {
                start_step: new_start,
                num_steps: new_steps,
            };
            state.section_count += 1;
        });
        err.map_or(Ok(()), Err)
    }

    /// Remove a section, compacting cell rows and re-basing the following sections.
    pub fn delete_section(&self, index: usize) -> Result<()> {
        let mut err = None;
        self.state.update(|state| {
            if state.section_count <= 1 {
                err = Some(Error::InvalidArgument {
                    message: "cannot delete the only remaining section".into(),
                });
                return;
            }
            if index >= state.section_count {
                err = Some(Error::InvalidArgument {
                    message: format!("section {index} does not exist"),
                });
                return;
            }

            let removed = state.sections[index];
            let total = state.total_steps() as usize;
            let removed_lo = removed.start_step as usize;
            let removed_len = removed.num_steps as usize;

            for step in removed_lo..(total - removed_len) {
                state.cells[step] = state.cells[step + removed_len];
            }
            for step in (total - removed_len)..total {
                state.cells[step] = [Cell::EMPTY; MAX_COLUMNS];
            }

            for i in index..(state.section_count - 1) {
                state.sections[i] = state.sections[i + 1];
                state.layers[i] = state.layers[i + 1];
            }
            state.section_count -= 1;

            let mut running = 0u32;
            for i in 0..state.section_count {
                state.sections[i].start_step = running;
                running += state.sections[i].num_steps;
            }
        });
        err.map_or(Ok(()), Err)
    }

    pub fn set_layer_len(&self, section: usize, layer: usize, len: u8) -> Result<()> {
        let mut err = None;
        self.state.update(|state| {
            if section >= state.section_count || layer >= MAX_LAYERS {
                err = Some(Error::InvalidArgument {
                    message: format!("section {section} / layer {layer} out of range"),
                });
                return;
            }
            state.layers[section][layer].len = len;
        });
        err.map_or(Ok(()), Err)
    }

    pub fn apply_state(&self, desired: &TableState) {
        self.state.update(|state| {
            *state = *desired;
        });
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_chain_invariant_holds_after_insert() {
        let table = TableStore::new();
        table.append_section(4, None).unwrap();
        table.insert_step(0, 8).unwrap();

        let (sections, count) = table.read_sections();
        for i in 0..count - 1 {
            assert_eq!(
                sections[i + 1].start_step,
                sections[i].start_step + sections[i].num_steps
            );
        }
    }

    #[test]
    fn delete_step_refuses_to_empty_a_section() {
        let table = TableStore::new();
        table.append_section(1, None).unwrap();
        assert!(table.delete_step(1, 16).is_err());
    }

    #[test]
    fn delete_section_refuses_when_only_one_remains() {
        let table = TableStore::new();
        assert!(table.delete_section(0).is_err());
    }

    #[test]
    fn insert_step_shifts_cells_down_and_clears_new_row() {
        let table = TableStore::new();
        table.set_cell(2, 0, 5, 1.0, 1.0).unwrap();
        table.insert_step(0, 2).unwrap();

        assert!(table.read_cell(2, 0).is_empty());
        assert_eq!(table.read_cell(3, 0).sample_slot, 5);
    }
}
