use crate::{
    domain::{RoleSet, Track},
    projection::sink::RowSink,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    Insert { first: usize, last: usize },
    Remove { first: usize, last: usize },
}

/// Verifies the bracket contract independently of the list that emits it.
///
/// Keeps its own row count and records every violation instead of panicking,
/// then forwards the call to the wrapped sink.
#[derive(Debug, Default)]
pub struct BracketChecker<S> {
    inner: S,
    rows: usize,
    open: Option<Open>,
    violations: Vec<String>,
}

impl<S: RowSink> BracketChecker<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            rows: 0,
            open: None,
            violations: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.open.is_none()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn violation(&mut self, message: String) {
        log::error!("row bracket violation: {message}");
        self.violations.push(message);
    }

    fn expect_closed(&mut self, call: &str) {
        if let Some(open) = self.open {
            self.violation(format!("{call} while {open:?} is still open"));
        }
    }
}

impl<S: RowSink> RowSink for BracketChecker<S> {
    fn begin_insert_rows(&mut self, first: usize, last: usize) {
        self.expect_closed("begin_insert_rows");
        if last < first || first > self.rows {
            self.violation(format!(
                "insert of rows {first}..={last} into {} rows",
                self.rows
            ));
        }
        self.open = Some(Open::Insert { first, last });
        self.inner.begin_insert_rows(first, last);
    }

    fn end_insert_rows(&mut self, first: usize, rows: &[Track]) {
        match self.open.take() {
            Some(Open::Insert { first: f, last: l })
                if f == first && l >= f && l - f + 1 == rows.len() => {}
            other => self.violation(format!(
                "end_insert_rows({first}, {} rows) does not close {other:?}",
                rows.len()
            )),
        }
        self.rows += rows.len();
        self.inner.end_insert_rows(first, rows);
    }

    fn begin_remove_rows(&mut self, first: usize, last: usize) {
        self.expect_closed("begin_remove_rows");
        if last < first || last >= self.rows {
            self.violation(format!(
                "removal of rows {first}..={last} from {} rows",
                self.rows
            ));
        }
        self.open = Some(Open::Remove { first, last });
        self.inner.begin_remove_rows(first, last);
    }

    fn end_remove_rows(&mut self, first: usize, last: usize) {
        match self.open.take() {
            Some(Open::Remove { first: f, last: l }) if f == first && l == last => {}
            other => self.violation(format!(
                "end_remove_rows({first}, {last}) does not close {other:?}"
            )),
        }
        if last >= first {
            self.rows = self.rows.saturating_sub(last - first + 1);
        }
        self.inner.end_remove_rows(first, last);
    }

    fn rows_changed(&mut self, row: usize, track: &Track, roles: &RoleSet) {
        self.expect_closed("rows_changed");
        if row >= self.rows {
            self.violation(format!("change of row {row} in {} rows", self.rows));
        }
        if roles.is_empty() {
            self.violation(format!("change of row {row} without roles"));
        }
        self.inner.rows_changed(row, track, roles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResourceLocator, TrackId, TrackRole};

    fn track(id: i64) -> Track {
        Track::placeholder(TrackId(id), "t", ResourceLocator::new(format!("/{id}")))
    }

    #[test]
    fn well_formed_brackets_pass() {
        let mut checker = BracketChecker::new(());
        checker.begin_insert_rows(0, 1);
        checker.end_insert_rows(0, &[track(1), track(2)]);
        checker.rows_changed(1, &track(2), &RoleSet::from([TrackRole::Rating]));
        checker.begin_remove_rows(0, 0);
        checker.end_remove_rows(0, 0);

        assert!(checker.is_clean(), "{:?}", checker.violations());
        assert_eq!(checker.row_count(), 1);
    }

    #[test]
    fn out_of_range_and_unpaired_calls_are_reported() {
        let mut checker = BracketChecker::new(());
        checker.begin_remove_rows(0, 0);
        checker.end_remove_rows(0, 0);
        checker.begin_insert_rows(3, 3);
        checker.rows_changed(0, &track(1), &RoleSet::new());

        assert!(!checker.is_clean());
        assert_eq!(checker.violations().len(), 5);
    }
}
