use crate::{
    domain::{RoleSet, Track},
    projection::sink::RowSink,
};

type Predicate = Box<dyn Fn(&Track) -> bool + Send>;

/// A downstream view showing the subset of its source rows accepted by a
/// predicate, in source order.
///
/// It is itself the [`RowSink`] of its source and re-emits the changes that
/// concern visible rows, translated to its own indices. With a predicate that
/// accepts everything it is a structural pass-through.
pub struct FilteredView<S> {
    accept: Predicate,
    /// source index of each visible row, ascending
    mapping: Vec<usize>,
    rows: Vec<Track>,
    /// view range of a removal announced by the source and not yet finished
    removing: Option<(usize, usize)>,
    sink: S,
}

impl<S: RowSink> FilteredView<S> {
    pub fn new(accept: impl Fn(&Track) -> bool + Send + 'static, sink: S) -> Self {
        Self {
            accept: Box::new(accept),
            mapping: Vec::new(),
            rows: Vec::new(),
            removing: None,
            sink,
        }
    }

    pub fn pass_through(sink: S) -> Self {
        Self::new(|_| true, sink)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Track] {
        &self.rows
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn view_position(&self, source_row: usize) -> usize {
        self.mapping.partition_point(|&r| r < source_row)
    }
}

impl<S: RowSink> RowSink for FilteredView<S> {
    fn begin_insert_rows(&mut self, _first: usize, _last: usize) {}

    fn end_insert_rows(&mut self, first: usize, rows: &[Track]) {
        let at = self.view_position(first);
        for source_row in &mut self.mapping[at..] {
            *source_row += rows.len();
        }

        let (indices, visible): (Vec<usize>, Vec<Track>) = rows
            .iter()
            .enumerate()
            .filter(|&(_, track)| (self.accept)(track))
            .map(|(offset, track)| (first + offset, track.clone()))
            .unzip();
        if visible.is_empty() {
            return;
        }

        let last = at + visible.len() - 1;
        self.sink.begin_insert_rows(at, last);
        self.mapping.splice(at..at, indices);
        self.rows.splice(at..at, visible);
        self.sink.end_insert_rows(at, &self.rows[at..=last]);
    }

    fn begin_remove_rows(&mut self, first: usize, last: usize) {
        let lo = self.view_position(first);
        let hi = self.mapping.partition_point(|&r| r <= last);
        if lo < hi {
            self.sink.begin_remove_rows(lo, hi - 1);
            self.removing = Some((lo, hi));
        }
    }

    fn end_remove_rows(&mut self, first: usize, last: usize) {
        if let Some((lo, hi)) = self.removing.take() {
            self.mapping.drain(lo..hi);
            self.rows.drain(lo..hi);
            self.sink.end_remove_rows(lo, hi - 1);
        }
        let removed = last + 1 - first;
        let at = self.view_position(first);
        for source_row in &mut self.mapping[at..] {
            *source_row -= removed;
        }
    }

    fn rows_changed(&mut self, row: usize, track: &Track, roles: &RoleSet) {
        let accepted = (self.accept)(track);
        match (self.mapping.binary_search(&row), accepted) {
            (Ok(at), true) => {
                self.rows[at] = track.clone();
                self.sink.rows_changed(at, track, roles);
            }
            (Ok(at), false) => {
                self.sink.begin_remove_rows(at, at);
                self.mapping.remove(at);
                self.rows.remove(at);
                self.sink.end_remove_rows(at, at);
            }
            (Err(at), true) => {
                self.sink.begin_insert_rows(at, at);
                self.mapping.insert(at, row);
                self.rows.insert(at, track.clone());
                self.sink.end_insert_rows(at, &self.rows[at..=at]);
            }
            (Err(_), false) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ResourceLocator, TrackId, TrackRole},
        projection::{checker::BracketChecker, sink::EventLog},
    };

    fn track(id: i64, rating: u8) -> Track {
        let locator = ResourceLocator::new(format!("/{id}"));
        let mut track = Track::placeholder(TrackId(id), "t", locator);
        track.rating = rating;
        track
    }

    fn insert(view: &mut impl RowSink, first: usize, rows: &[Track]) {
        view.begin_insert_rows(first, first + rows.len() - 1);
        view.end_insert_rows(first, rows);
    }

    fn remove(view: &mut impl RowSink, first: usize, last: usize) {
        view.begin_remove_rows(first, last);
        view.end_remove_rows(first, last);
    }

    #[test]
    fn only_accepted_rows_are_forwarded() {
        let mut view =
            FilteredView::new(|t: &Track| t.rating >= 5, BracketChecker::new(EventLog::new()));

        insert(&mut view, 0, &[track(1, 9), track(2, 1), track(3, 7)]);
        assert_eq!(view.rows().iter().map(|t| t.id.0).collect::<Vec<_>>(), [1, 3]);

        // source row 1 is hidden, its removal is invisible downstream
        remove(&mut view, 1, 1);
        assert_eq!(view.sink().inner().remove_brackets(), 0);

        remove(&mut view, 1, 1);
        assert_eq!(view.len(), 1);
        assert_eq!(view.sink().inner().remove_brackets(), 1);
        assert!(view.sink().is_clean(), "{:?}", view.sink().violations());
    }

    #[test]
    fn changes_move_rows_in_and_out() {
        let mut view =
            FilteredView::new(|t: &Track| t.rating >= 5, BracketChecker::new(EventLog::new()));
        insert(&mut view, 0, &[track(1, 9), track(2, 1), track(3, 7)]);
        let roles = RoleSet::from([TrackRole::Rating]);

        view.rows_changed(1, &track(2, 6), &roles);
        assert_eq!(view.rows().iter().map(|t| t.id.0).collect::<Vec<_>>(), [1, 2, 3]);

        view.rows_changed(0, &track(1, 2), &roles);
        assert_eq!(view.rows().iter().map(|t| t.id.0).collect::<Vec<_>>(), [2, 3]);

        view.rows_changed(2, &track(3, 8), &roles);
        let log = view.sink().inner();
        assert_eq!(log.insert_brackets(), 2);
        assert_eq!(log.remove_brackets(), 1);
        assert_eq!(log.data_changes(), 1);
        assert!(view.sink().is_clean(), "{:?}", view.sink().violations());
    }

    #[test]
    fn pass_through_mirrors_source_indices() {
        let mut view = FilteredView::pass_through(EventLog::new());
        insert(&mut view, 0, &[track(1, 0), track(2, 0)]);
        insert(&mut view, 1, &[track(3, 0)]);
        remove(&mut view, 0, 0);

        assert_eq!(view.rows().iter().map(|t| t.id.0).collect::<Vec<_>>(), [3, 2]);
        assert_eq!(view.mapping, [0, 1]);
    }
}
