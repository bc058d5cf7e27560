//! Versioned row storage.
//!
//! A [`Row`] holds one [`Cell`] per column. Each cell keeps up to three
//! versions of its value (Original, Current and Proposed) and the row's
//! [`RowState`] decides which of them exist. State changes go through
//! [`RowState::next`], which rejects transitions the lifecycle does not allow.

use crate::error::{Error, Result};
use crate::value::Value;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a row.
pub type RowId = u64;

/// Global row ID counter for generating unique row IDs.
static NEXT_ROW_ID: AtomicU64 = AtomicU64::new(1);

/// Gets the next unique row ID.
pub fn next_row_id() -> RowId {
    NEXT_ROW_ID.fetch_add(1, Ordering::SeqCst)
}

/// Lifecycle state of a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowState {
    /// Created but not part of a table.
    Detached,
    /// Inserted since the last accept.
    Added,
    /// Unmodified since the last accept.
    Unchanged,
    /// Edited since the last accept.
    Modified,
    /// Deleted since the last accept; only the Original version remains.
    Deleted,
}

/// Events that drive [`RowState`] transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowEvent {
    Insert,
    Edit,
    Delete,
    Accept,
    Reject,
    SetAdded,
    SetModified,
}

impl RowState {
    /// Returns the state reached from `self` on `event`.
    ///
    /// `Detached` as a result of `Accept` (on a deleted row) or `Reject`
    /// (on an added row) means the row leaves its table.
    pub fn next(self, event: RowEvent, row: RowId) -> Result<RowState> {
        use RowEvent::*;
        use RowState::*;
        match (self, event) {
            (Detached, Insert) => Ok(Added),
            (Detached, Edit) => Ok(Detached),
            (Added, Edit) => Ok(Added),
            (Unchanged | Modified, Edit) => Ok(Modified),
            (Added | Unchanged | Modified, Delete) => Ok(Deleted),
            (Deleted, Edit | Delete) => Err(Error::DeletedRowInaccessible { row }),
            (Added | Unchanged | Modified, Accept) => Ok(Unchanged),
            (Deleted, Accept) => Ok(Detached),
            (Added, Reject) => Ok(Detached),
            (Unchanged | Modified | Deleted, Reject) => Ok(Unchanged),
            (Detached, Accept | Reject) => Ok(Detached),
            (Unchanged, SetAdded) => Ok(Added),
            (Unchanged, SetModified) => Ok(Modified),
            (state, event) => Err(Error::invalid_state(format!(
                "row {} cannot handle {:?} while {:?}",
                row, event, state
            ))),
        }
    }

    /// Returns true for Added, Modified and Deleted.
    #[inline]
    pub fn is_changed(self) -> bool {
        matches!(self, RowState::Added | RowState::Modified | RowState::Deleted)
    }
}

/// Selects which version of a row's values to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowVersion {
    /// Value as of the last accept.
    Original,
    /// Latest committed value.
    Current,
    /// In-flight edit value.
    Proposed,
    /// Proposed while editing (or detached), otherwise Current.
    Default,
}

impl RowVersion {
    #[inline]
    fn slot(self) -> usize {
        match self {
            RowVersion::Original => 0,
            RowVersion::Current => 1,
            RowVersion::Proposed | RowVersion::Default => 2,
        }
    }
}

/// A single versioned storage slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cell {
    versions: [Option<Value>; 3],
}

impl Cell {
    /// Returns the value stored for `version`, if any.
    #[inline]
    pub fn get(&self, version: RowVersion) -> Option<&Value> {
        self.versions[version.slot()].as_ref()
    }

    #[inline]
    fn set(&mut self, version: RowVersion, value: Option<Value>) {
        self.versions[version.slot()] = value;
    }

    fn copy(&mut self, from: RowVersion, to: RowVersion) {
        let value = self.versions[from.slot()].clone();
        self.versions[to.slot()] = value;
    }

    fn take(&mut self, version: RowVersion) -> Option<Value> {
        self.versions[version.slot()].take()
    }
}

/// A row of versioned cells with a lifecycle state.
#[derive(Clone, Debug)]
pub struct Row {
    id: RowId,
    /// Position key in the owning table's insertion order.
    order: u64,
    state: RowState,
    editing: bool,
    /// Set by any write inside the open edit scope.
    touched: bool,
    cells: Vec<Cell>,
    error: Option<String>,
    column_errors: BTreeMap<usize, String>,
}

impl Row {
    /// Creates a detached row whose values are held as Proposed.
    pub fn detached(id: RowId, values: Vec<Value>) -> Self {
        let cells = values
            .into_iter()
            .map(|v| {
                let mut cell = Cell::default();
                cell.set(RowVersion::Proposed, Some(v));
                cell
            })
            .collect();
        Self {
            id,
            order: 0,
            state: RowState::Detached,
            editing: false,
            touched: false,
            cells,
            error: None,
            column_errors: BTreeMap::new(),
        }
    }

    /// Rebuilds a row from explicit version images.
    ///
    /// Used when rows are copied between tables with their change state.
    pub fn from_versions(
        id: RowId,
        state: RowState,
        original: Option<Vec<Value>>,
        current: Option<Vec<Value>>,
    ) -> Self {
        let width = original
            .as_ref()
            .map(Vec::len)
            .or_else(|| current.as_ref().map(Vec::len))
            .unwrap_or(0);
        let mut cells: Vec<Cell> = (0..width).map(|_| Cell::default()).collect();
        if let Some(values) = original {
            for (cell, v) in cells.iter_mut().zip(values) {
                cell.set(RowVersion::Original, Some(v));
            }
        }
        if let Some(values) = current {
            for (cell, v) in cells.iter_mut().zip(values) {
                cell.set(RowVersion::Current, Some(v));
            }
        }
        Self {
            id,
            order: 0,
            state,
            editing: false,
            touched: false,
            cells,
            error: None,
            column_errors: BTreeMap::new(),
        }
    }

    /// Returns the row ID.
    #[inline]
    pub fn id(&self) -> RowId {
        self.id
    }

    /// Returns the insertion order key.
    #[inline]
    pub fn order(&self) -> u64 {
        self.order
    }

    /// Sets the insertion order key.
    #[inline]
    pub fn set_order(&mut self, order: u64) {
        self.order = order;
    }

    /// Returns the lifecycle state.
    #[inline]
    pub fn state(&self) -> RowState {
        self.state
    }

    /// Returns true while an edit scope is open.
    #[inline]
    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Returns true if the open edit scope has written a value.
    #[inline]
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Returns the number of cells.
    #[inline]
    pub fn width(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if `version` can be read in the row's current state.
    pub fn has_version(&self, version: RowVersion) -> bool {
        match version {
            RowVersion::Original => matches!(
                self.state,
                RowState::Unchanged | RowState::Modified | RowState::Deleted
            ),
            RowVersion::Current => matches!(
                self.state,
                RowState::Added | RowState::Unchanged | RowState::Modified
            ),
            RowVersion::Proposed => self.editing || self.state == RowState::Detached,
            RowVersion::Default => self.state != RowState::Deleted,
        }
    }

    /// Maps `version` to the concrete version stored for this row.
    pub fn resolve(&self, version: RowVersion) -> Result<RowVersion> {
        match version {
            RowVersion::Default => {
                if self.editing || self.state == RowState::Detached {
                    Ok(RowVersion::Proposed)
                } else if self.state == RowState::Deleted {
                    Err(Error::DeletedRowInaccessible { row: self.id })
                } else {
                    Ok(RowVersion::Current)
                }
            }
            v if self.has_version(v) => Ok(v),
            v => Err(Error::VersionNotFound {
                row: self.id,
                version: v,
            }),
        }
    }

    /// Reads one cell.
    pub fn value(&self, column: usize, version: RowVersion) -> Result<&Value> {
        let version = self.resolve(version)?;
        let cell = self.cells.get(column).ok_or_else(|| {
            Error::invalid_argument(format!("column ordinal {} out of range", column))
        })?;
        cell.get(version).ok_or(Error::VersionNotFound {
            row: self.id,
            version,
        })
    }

    /// Reads every cell of one version.
    pub fn values(&self, version: RowVersion) -> Result<Vec<Value>> {
        let version = self.resolve(version)?;
        self.cells
            .iter()
            .map(|c| {
                c.get(version).cloned().ok_or(Error::VersionNotFound {
                    row: self.id,
                    version,
                })
            })
            .collect()
    }

    /// Reads the version a default read of a live row would see, or the
    /// Original version of a deleted row.
    pub fn visible_values(&self) -> Result<Vec<Value>> {
        if self.state == RowState::Deleted {
            self.values(RowVersion::Original)
        } else {
            self.values(RowVersion::Default)
        }
    }

    /// Opens an edit scope, copying Current into Proposed.
    pub fn begin_edit(&mut self) {
        if self.editing {
            return;
        }
        if self.state != RowState::Detached {
            for cell in &mut self.cells {
                cell.copy(RowVersion::Current, RowVersion::Proposed);
            }
        }
        self.editing = true;
        self.touched = false;
    }

    /// Writes a Proposed value without any validation.
    pub fn set_proposed(&mut self, column: usize, value: Value) {
        if let Some(cell) = self.cells.get_mut(column) {
            cell.set(RowVersion::Proposed, Some(value));
            self.touched = true;
        }
    }

    /// Discards the edit scope.
    pub fn cancel_edit(&mut self) {
        if !self.editing {
            return;
        }
        if self.state != RowState::Detached {
            for cell in &mut self.cells {
                cell.set(RowVersion::Proposed, None);
            }
        }
        self.editing = false;
        self.touched = false;
    }

    /// Returns true if any Proposed value differs from Current in `columns`.
    pub fn proposed_differs(&self, columns: &[usize]) -> bool {
        columns.iter().any(|&c| {
            self.cells.get(c).map_or(false, |cell| {
                cell.get(RowVersion::Proposed) != cell.get(RowVersion::Current)
            })
        })
    }

    /// Moves Proposed into Current and closes the edit scope.
    ///
    /// The caller is responsible for the matching state transition.
    pub fn commit_proposed(&mut self) {
        if self.state != RowState::Detached {
            for cell in &mut self.cells {
                if let Some(v) = cell.take(RowVersion::Proposed) {
                    cell.set(RowVersion::Current, Some(v));
                }
            }
        }
        self.editing = false;
        self.touched = false;
    }

    /// Applies a lifecycle event and the version bookkeeping that goes with it.
    pub fn apply(&mut self, event: RowEvent) -> Result<RowState> {
        let next = self.state.next(event, self.id)?;
        match event {
            RowEvent::Insert => {
                for cell in &mut self.cells {
                    let v = cell.take(RowVersion::Proposed).unwrap_or(Value::Null);
                    cell.set(RowVersion::Current, Some(v));
                    cell.set(RowVersion::Original, None);
                }
                self.editing = false;
            }
            RowEvent::Accept if next == RowState::Unchanged => {
                self.commit_proposed();
                for cell in &mut self.cells {
                    cell.copy(RowVersion::Current, RowVersion::Original);
                }
            }
            RowEvent::Reject if next == RowState::Unchanged => {
                for cell in &mut self.cells {
                    cell.copy(RowVersion::Original, RowVersion::Current);
                    cell.set(RowVersion::Proposed, None);
                }
                self.editing = false;
                self.clear_errors();
            }
            RowEvent::Delete => {
                for cell in &mut self.cells {
                    cell.set(RowVersion::Current, None);
                    cell.set(RowVersion::Proposed, None);
                }
                self.editing = false;
            }
            RowEvent::SetAdded => {
                for cell in &mut self.cells {
                    cell.set(RowVersion::Original, None);
                }
            }
            _ => {}
        }
        self.state = next;
        Ok(next)
    }

    /// Overwrites the state and version images wholesale.
    pub fn restore(
        &mut self,
        state: RowState,
        original: Option<Vec<Value>>,
        current: Option<Vec<Value>>,
    ) {
        let id = self.id;
        let order = self.order;
        let error = self.error.take();
        let column_errors = core::mem::take(&mut self.column_errors);
        *self = Row::from_versions(id, state, original, current);
        self.order = order;
        self.error = error;
        self.column_errors = column_errors;
    }

    /// Appends a cell holding `value` in every version the row has.
    pub fn push_cell(&mut self, value: Value) {
        let mut cell = Cell::default();
        for version in [RowVersion::Original, RowVersion::Current, RowVersion::Proposed] {
            let present = match version {
                RowVersion::Proposed => self.editing || self.state == RowState::Detached,
                v => self.has_version(v),
            };
            if present {
                cell.set(version, Some(value.clone()));
            }
        }
        self.cells.push(cell);
    }

    /// Removes the cell at `column`.
    pub fn remove_cell(&mut self, column: usize) {
        if column < self.cells.len() {
            self.cells.remove(column);
        }
        self.column_errors = core::mem::take(&mut self.column_errors)
            .into_iter()
            .filter(|(c, _)| *c != column)
            .map(|(c, e)| if c > column { (c - 1, e) } else { (c, e) })
            .collect();
    }

    /// Rewrites every stored version of one cell.
    pub fn map_cell<F>(&mut self, column: usize, mut f: F) -> Result<()>
    where
        F: FnMut(&Value) -> Result<Value>,
    {
        if let Some(cell) = self.cells.get_mut(column) {
            for slot in cell.versions.iter_mut() {
                if let Some(v) = slot.as_ref() {
                    *slot = Some(f(v)?);
                }
            }
        }
        Ok(())
    }

    /// Returns the row error text.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Sets or clears the row error text.
    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error.filter(|e| !e.is_empty());
    }

    /// Returns the error text attached to one column.
    pub fn column_error(&self, column: usize) -> Option<&str> {
        self.column_errors.get(&column).map(String::as_str)
    }

    /// Sets or clears the error text attached to one column.
    pub fn set_column_error(&mut self, column: usize, error: Option<String>) {
        match error.filter(|e| !e.is_empty()) {
            Some(e) => {
                self.column_errors.insert(column, e);
            }
            None => {
                self.column_errors.remove(&column);
            }
        }
    }

    /// Returns true if the row or any of its columns carries an error.
    pub fn has_errors(&self) -> bool {
        self.error.is_some() || !self.column_errors.is_empty()
    }

    /// Clears row and column errors.
    pub fn clear_errors(&mut self) {
        self.error = None;
        self.column_errors.clear();
    }
}
