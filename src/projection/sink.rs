use crate::domain::{RoleSet, Track, TrackId};

/// Receives the structural changes of a list, in bracketed form.
///
/// Every `begin_*` is followed by the matching `end_*` before any other call.
/// Row indices of `begin_*` refer to the list before the change, those of
/// `end_*` to the list after it.
pub trait RowSink {
    fn begin_insert_rows(&mut self, first: usize, last: usize);
    /// `rows` are the inserted rows, now at `first..first + rows.len()`
    fn end_insert_rows(&mut self, first: usize, rows: &[Track]);
    fn begin_remove_rows(&mut self, first: usize, last: usize);
    fn end_remove_rows(&mut self, first: usize, last: usize);
    fn rows_changed(&mut self, row: usize, track: &Track, roles: &RoleSet);
}

impl RowSink for () {
    fn begin_insert_rows(&mut self, _first: usize, _last: usize) {}
    fn end_insert_rows(&mut self, _first: usize, _rows: &[Track]) {}
    fn begin_remove_rows(&mut self, _first: usize, _last: usize) {}
    fn end_remove_rows(&mut self, _first: usize, _last: usize) {}
    fn rows_changed(&mut self, _row: usize, _track: &Track, _roles: &RoleSet) {}
}

impl<S: RowSink + ?Sized> RowSink for Box<S> {
    fn begin_insert_rows(&mut self, first: usize, last: usize) {
        (**self).begin_insert_rows(first, last)
    }

    fn end_insert_rows(&mut self, first: usize, rows: &[Track]) {
        (**self).end_insert_rows(first, rows)
    }

    fn begin_remove_rows(&mut self, first: usize, last: usize) {
        (**self).begin_remove_rows(first, last)
    }

    fn end_remove_rows(&mut self, first: usize, last: usize) {
        (**self).end_remove_rows(first, last)
    }

    fn rows_changed(&mut self, row: usize, track: &Track, roles: &RoleSet) {
        (**self).rows_changed(row, track, roles)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowEvent {
    BeginInsert { first: usize, last: usize },
    EndInsert { first: usize, ids: Vec<TrackId> },
    BeginRemove { first: usize, last: usize },
    EndRemove { first: usize, last: usize },
    Changed { row: usize, id: TrackId, roles: RoleSet },
}

/// Records every call, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct EventLog {
    pub events: Vec<RowEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_brackets(&self) -> usize {
        self.count(|e| matches!(e, RowEvent::BeginInsert { .. }))
    }

    pub fn remove_brackets(&self) -> usize {
        self.count(|e| matches!(e, RowEvent::BeginRemove { .. }))
    }

    pub fn data_changes(&self) -> usize {
        self.count(|e| matches!(e, RowEvent::Changed { .. }))
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn count(&self, pred: impl Fn(&RowEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl RowSink for EventLog {
    fn begin_insert_rows(&mut self, first: usize, last: usize) {
        self.events.push(RowEvent::BeginInsert { first, last });
    }

    fn end_insert_rows(&mut self, first: usize, rows: &[Track]) {
        let ids = rows.iter().map(|t| t.id).collect();
        self.events.push(RowEvent::EndInsert { first, ids });
    }

    fn begin_remove_rows(&mut self, first: usize, last: usize) {
        self.events.push(RowEvent::BeginRemove { first, last });
    }

    fn end_remove_rows(&mut self, first: usize, last: usize) {
        self.events.push(RowEvent::EndRemove { first, last });
    }

    fn rows_changed(&mut self, row: usize, track: &Track, roles: &RoleSet) {
        self.events.push(RowEvent::Changed {
            row,
            id: track.id,
            roles: roles.clone(),
        });
    }
}
