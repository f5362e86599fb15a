//! Ordered in-memory mirrors of a track listing, kept in sync from
//! [`Notification`]s with the fewest structural changes.
//!
//! New tracks of one ingest call arrive as one [`CatalogEvent::TracksAdded`]
//! and become one insert bracket per contiguous run. Removals arrive one track
//! at a time and each becomes its own remove bracket.

use std::cmp::Ordering;

use crossbeam_channel::Receiver;
use log::{debug, error};
use thiserror::Error;

use crate::{
    domain::{Revision, RoleSet, Track, TrackFilter, TrackId},
    notify::{CatalogEvent, Notification},
    storage::{Catalog, StorageError},
};

pub mod checker;
pub mod filtered;
pub mod sink;

pub use checker::BracketChecker;
pub use filtered::FilteredView;
pub use sink::{EventLog, RowEvent, RowSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackOrder {
    /// album title, then disc and track number
    #[default]
    AlbumPosition,
    Title,
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

impl TrackOrder {
    /// Total order; ties fall back to the track id.
    pub fn compare(&self, a: &Track, b: &Track) -> Ordering {
        match self {
            TrackOrder::AlbumPosition => text(&a.album)
                .cmp(text(&b.album))
                .then(a.disc_number.cmp(&b.disc_number))
                .then(a.track_number.cmp(&b.track_number))
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| text(&a.artist).cmp(text(&b.artist))),
            TrackOrder::Title => a
                .title
                .cmp(&b.title)
                .then_with(|| text(&a.artist).cmp(text(&b.artist)))
                .then_with(|| text(&a.album).cmp(text(&b.album))),
        }
        .then(a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionState {
    Empty,
    Populated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Desync {
    #[error("track {0} is already listed")]
    DuplicateTrack(TrackId),
    #[error("track {0} matches the filter but is not listed")]
    MissingTrack(TrackId),
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("projection lost sync at {revision}: {reason}")]
    Desynchronized { revision: Revision, reason: Desync },

    #[error("projection refuses events after losing sync")]
    Poisoned,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Mirror of one filtered, ordered track listing.
///
/// Seed it with [`ListProjection::load`] or [`ListProjection::initialize`],
/// then feed it notifications in publish order.
pub struct ListProjection<S> {
    filter: TrackFilter,
    order: TrackOrder,
    rows: Vec<Track>,
    seeded_at: Revision,
    poisoned: bool,
    sink: S,
}

impl<S: RowSink> ListProjection<S> {
    pub fn new(filter: TrackFilter, order: TrackOrder, sink: S) -> Self {
        Self {
            filter,
            order,
            rows: Vec::new(),
            seeded_at: Revision::default(),
            poisoned: false,
            sink,
        }
    }

    pub fn filter(&self) -> TrackFilter {
        self.filter
    }

    pub fn state(&self) -> ProjectionState {
        if self.rows.is_empty() {
            ProjectionState::Empty
        } else {
            ProjectionState::Populated
        }
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

    pub fn row(&self, index: usize) -> Option<&Track> {
        self.rows.get(index)
    }

    pub fn index_of(&self, id: TrackId) -> Option<usize> {
        self.rows.iter().position(|t| t.id == id)
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Reseeds from a consistent catalog snapshot.
    pub fn load(&mut self, catalog: &Catalog) -> Result<(), ProjectionError> {
        let (revision, tracks) = catalog.snapshot_tracks(&self.filter)?;
        self.initialize(tracks, revision);
        Ok(())
    }

    /// Replaces every row with `tracks` as of `revision` and clears a previous
    /// desynchronization.
    ///
    /// Notifications up to and including `revision` are skipped afterwards.
    pub fn initialize(&mut self, tracks: Vec<Track>, revision: Revision) {
        if !self.rows.is_empty() {
            let last = self.rows.len() - 1;
            self.sink.begin_remove_rows(0, last);
            self.rows.clear();
            self.sink.end_remove_rows(0, last);
        }

        let mut tracks = tracks
            .into_iter()
            .filter(|t| self.filter.matches(t))
            .collect::<Vec<_>>();
        tracks.sort_by(|a, b| self.order.compare(a, b));
        if !tracks.is_empty() {
            self.sink.begin_insert_rows(0, tracks.len() - 1);
            self.rows = tracks;
            self.sink.end_insert_rows(0, &self.rows);
        }

        self.seeded_at = revision;
        self.poisoned = false;
        debug!("projection seeded with {} rows at {revision}", self.rows.len());
    }

    pub fn apply(&mut self, notification: &Notification) -> Result<(), ProjectionError> {
        if self.poisoned {
            return Err(ProjectionError::Poisoned);
        }
        if notification.revision <= self.seeded_at {
            return Ok(());
        }

        let result = match &notification.event {
            CatalogEvent::TracksAdded(tracks) => self.add(tracks),
            CatalogEvent::TrackModified { track, roles } => self.modify(track, roles),
            CatalogEvent::TrackRemoved(track) => self.remove(track),
            _ => Ok(()),
        };

        result.map_err(|reason| {
            error!(
                "projection desynchronized at {}: {reason}",
                notification.revision
            );
            self.poisoned = true;
            ProjectionError::Desynchronized {
                revision: notification.revision,
                reason,
            }
        })
    }

    /// Applies every notification already queued on `events`, in order.
    pub fn drain(&mut self, events: &Receiver<Notification>) -> Result<usize, ProjectionError> {
        let mut applied = 0;
        for notification in events.try_iter() {
            self.apply(&notification)?;
            applied += 1;
        }
        Ok(applied)
    }

    fn position_for(&self, track: &Track) -> usize {
        self.rows
            .partition_point(|r| self.order.compare(r, track) == Ordering::Less)
    }

    fn add(&mut self, tracks: &[Track]) -> Result<(), Desync> {
        let mut incoming = tracks
            .iter()
            .filter(|t| self.filter.matches(t))
            .cloned()
            .collect::<Vec<_>>();
        if let Some(dup) = incoming.iter().find(|t| self.index_of(t.id).is_some()) {
            return Err(Desync::DuplicateTrack(dup.id));
        }
        incoming.sort_by(|a, b| self.order.compare(a, b));

        // group by insertion point in the rows as they are before this event
        let mut runs: Vec<(usize, Vec<Track>)> = Vec::new();
        for track in incoming {
            let at = self.position_for(&track);
            match runs.last_mut() {
                Some((run_at, run)) if *run_at == at => run.push(track),
                _ => runs.push((at, vec![track])),
            }
        }

        let mut shift = 0;
        for (at, run) in runs {
            let first = at + shift;
            let last = first + run.len() - 1;
            shift += run.len();
            self.sink.begin_insert_rows(first, last);
            self.rows.splice(first..first, run);
            self.sink.end_insert_rows(first, &self.rows[first..=last]);
        }
        debug!("projection holds {} rows after insert", self.rows.len());
        Ok(())
    }

    fn modify(&mut self, track: &Track, roles: &RoleSet) -> Result<(), Desync> {
        let matches = self.filter.matches(track);
        match (self.index_of(track.id), matches) {
            (Some(row), true) => {
                let before_ok = row == 0
                    || self.order.compare(&self.rows[row - 1], track) == Ordering::Less;
                let after_ok = row + 1 == self.rows.len()
                    || self.order.compare(track, &self.rows[row + 1]) == Ordering::Less;
                if before_ok && after_ok {
                    self.rows[row] = track.clone();
                    self.sink.rows_changed(row, track, roles);
                } else {
                    self.remove_row(row);
                    self.insert_row(track.clone());
                }
            }
            (Some(row), false) => self.remove_row(row),
            (None, true) if roles.intersects(&self.filter.membership_roles()) => {
                self.insert_row(track.clone())
            }
            (None, true) => return Err(Desync::MissingTrack(track.id)),
            (None, false) => {}
        }
        Ok(())
    }

    fn remove(&mut self, track: &Track) -> Result<(), Desync> {
        match self.index_of(track.id) {
            Some(row) => self.remove_row(row),
            None if self.filter.matches(track) => return Err(Desync::MissingTrack(track.id)),
            None => {}
        }
        Ok(())
    }

    fn remove_row(&mut self, row: usize) {
        self.sink.begin_remove_rows(row, row);
        self.rows.remove(row);
        self.sink.end_remove_rows(row, row);
    }

    fn insert_row(&mut self, track: Track) {
        let at = self.position_for(&track);
        self.sink.begin_insert_rows(at, at);
        self.rows.insert(at, track);
        self.sink.end_insert_rows(at, &self.rows[at..=at]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{AlbumFilter, CoverMap, ResourceLocator, TrackRole},
        storage::Catalog,
        testing::{fixture_covers, fixture_tracks, init_logging, unique_store},
    };

    type Checked = BracketChecker<EventLog>;

    fn checked() -> Checked {
        BracketChecker::new(EventLog::new())
    }

    fn catalog() -> anyhow::Result<Catalog> {
        init_logging();
        Ok(Catalog::open(unique_store("projection"))?)
    }

    fn placeholder(id: i64, album: &str, number: u32) -> Track {
        let mut track = Track::placeholder(
            TrackId(id),
            &format!("track{number}"),
            ResourceLocator::new(format!("/{id}")),
        );
        track.album = Some(album.to_string());
        track.track_number = Some(number);
        track.disc_number = Some(1);
        track
    }

    fn notification(revision: i64, event: CatalogEvent) -> Notification {
        Notification {
            revision: Revision(revision),
            event,
        }
    }

    #[test]
    fn full_catalog_lifecycle_keeps_brackets_minimal() -> anyhow::Result<()> {
        let mut catalog = catalog()?;
        let events = catalog.subscribe();
        let mut projection =
            ListProjection::new(TrackFilter::All, TrackOrder::AlbumPosition, checked());
        projection.load(&catalog)?;
        assert_eq!(projection.state(), ProjectionState::Empty);

        catalog.ingest_tracks(fixture_tracks(), &fixture_covers())?;
        projection.drain(&events)?;
        assert_eq!(projection.len(), 23);
        assert_eq!(projection.sink().inner().insert_brackets(), 1);
        assert_eq!(projection.state(), ProjectionState::Populated);

        projection.sink_mut().inner_mut().clear();
        catalog.remove_tracks(&[ResourceLocator::new("/$1")])?;
        projection.drain(&events)?;
        assert_eq!(projection.len(), 22);
        assert_eq!(projection.sink().inner().remove_brackets(), 1);
        assert_eq!(projection.sink().inner().data_changes(), 0);

        projection.sink_mut().inner_mut().clear();
        let album3 = catalog
            .album_by_title_and_artist("album3", Some("artist2"))?
            .expect("album3");
        let locators = catalog
            .all_tracks(&TrackFilter::Album(album3.id))?
            .into_iter()
            .map(|t| t.resource)
            .collect::<Vec<_>>();
        catalog.remove_tracks(&locators)?;
        projection.drain(&events)?;
        assert_eq!(projection.len(), 19);
        assert_eq!(projection.sink().inner().remove_brackets(), 3);
        assert_eq!(projection.sink().inner().insert_brackets(), 0);

        assert!(projection.sink().is_clean(), "{:?}", projection.sink().violations());
        assert_eq!(projection.sink().row_count(), 19);
        assert_eq!(projection.rows(), catalog.all_tracks(&TrackFilter::All)?.as_slice());
        Ok(())
    }

    #[test]
    fn same_batch_twice_emits_nothing_structural() -> anyhow::Result<()> {
        let mut catalog = catalog()?;
        catalog.ingest_tracks(fixture_tracks(), &fixture_covers())?;
        let events = catalog.subscribe();
        let mut projection =
            ListProjection::new(TrackFilter::All, TrackOrder::AlbumPosition, EventLog::new());
        projection.load(&catalog)?;
        projection.sink_mut().clear();

        catalog.ingest_tracks(fixture_tracks(), &fixture_covers())?;

        assert_eq!(projection.drain(&events)?, 1);
        assert!(projection.sink().events.is_empty());
        Ok(())
    }

    #[test]
    fn rating_change_is_one_data_change() -> anyhow::Result<()> {
        let mut catalog = catalog()?;
        catalog.ingest_tracks(fixture_tracks(), &fixture_covers())?;
        let events = catalog.subscribe();
        let mut projection =
            ListProjection::new(TrackFilter::All, TrackOrder::AlbumPosition, EventLog::new());
        projection.load(&catalog)?;
        projection.sink_mut().clear();

        let mut record = fixture_tracks().remove(2);
        record.rating = 10;
        catalog.ingest_tracks(vec![record], &CoverMap::new())?;
        projection.drain(&events)?;

        let log = projection.sink();
        assert_eq!(log.events.len(), 1);
        let RowEvent::Changed { row, id, roles } = &log.events[0] else {
            panic!("expected a data change, got {:?}", log.events);
        };
        assert_eq!(*roles, RoleSet::from([TrackRole::Rating]));
        assert_eq!(projection.index_of(*id), Some(*row));
        assert_eq!(projection.rows()[*row].rating, 10);
        Ok(())
    }

    #[test]
    fn one_ingest_inserts_one_bracket_per_contiguous_run() -> anyhow::Result<()> {
        let mut catalog = catalog()?;
        let tracks = fixture_tracks();
        let (odd, even): (Vec<_>, Vec<_>) = tracks
            .into_iter()
            .partition(|t| matches!(t.album.as_deref(), Some("album1" | "album3")));
        catalog.ingest_tracks(odd, &CoverMap::new())?;

        let events = catalog.subscribe();
        let mut projection =
            ListProjection::new(TrackFilter::All, TrackOrder::AlbumPosition, checked());
        projection.load(&catalog)?;
        projection.sink_mut().inner_mut().clear();

        // album2 lands between album1 and album3, album4 and album5 after album3
        catalog.ingest_tracks(even, &CoverMap::new())?;
        projection.drain(&events)?;

        assert_eq!(projection.len(), 23);
        assert_eq!(projection.sink().inner().insert_brackets(), 2);
        assert!(projection.sink().is_clean(), "{:?}", projection.sink().violations());
        Ok(())
    }

    #[test]
    fn album_projection_follows_validity() -> anyhow::Result<()> {
        let mut catalog = catalog()?;
        catalog.ingest_tracks(fixture_tracks(), &fixture_covers())?;
        let album1 = catalog
            .album_by_title_and_artist("album1", Some("artist1"))?
            .expect("album1");
        let events = catalog.subscribe();
        let mut projection =
            ListProjection::new(
                TrackFilter::Album(album1.id),
                TrackOrder::AlbumPosition,
                checked(),
            );
        projection.load(&catalog)?;
        assert_eq!(projection.len(), 4);

        let mut record = fixture_tracks().remove(1);
        record.is_valid = false;
        catalog.ingest_tracks(vec![record.clone()], &CoverMap::new())?;
        projection.drain(&events)?;
        assert_eq!(projection.len(), 3);

        record.is_valid = true;
        catalog.ingest_tracks(vec![record], &CoverMap::new())?;
        projection.drain(&events)?;
        assert_eq!(projection.len(), 4);

        // tracks of other albums never show up
        let other = crate::domain::TrackRecord::new("bonus", "/bonus")
            .with_album("album2")
            .with_artist("artist1")
            .with_position(7, 1);
        catalog.ingest_tracks(vec![other], &CoverMap::new())?;
        projection.drain(&events)?;
        assert_eq!(projection.len(), 4);

        let log = projection.sink().inner();
        assert_eq!(log.remove_brackets(), 1);
        assert_eq!(log.insert_brackets(), 2);
        assert!(projection.sink().is_clean(), "{:?}", projection.sink().violations());
        assert_eq!(catalog.all_albums(&AlbumFilter::All)?.len(), 5);
        Ok(())
    }

    #[test]
    fn reorder_by_modification_is_remove_then_insert() -> anyhow::Result<()> {
        let mut projection =
            ListProjection::new(TrackFilter::All, TrackOrder::AlbumPosition, checked());
        projection.initialize(
            vec![placeholder(1, "a", 1), placeholder(2, "a", 2), placeholder(3, "a", 3)],
            Revision(1),
        );

        let moved = placeholder(1, "a", 9);
        projection.apply(&notification(
            2,
            CatalogEvent::TrackModified {
                track: moved,
                roles: RoleSet::from([TrackRole::TrackNumber]),
            },
        ))?;

        let ids = projection.rows().iter().map(|t| t.id.0).collect::<Vec<_>>();
        assert_eq!(ids, [2, 3, 1]);
        let log = projection.sink().inner();
        assert_eq!(log.remove_brackets(), 1);
        assert_eq!(log.insert_brackets(), 2);
        assert_eq!(log.data_changes(), 0);
        assert!(projection.sink().is_clean());
        Ok(())
    }

    #[test]
    fn stale_notifications_are_skipped() {
        let mut projection =
            ListProjection::new(TrackFilter::All, TrackOrder::AlbumPosition, EventLog::new());
        projection.initialize(vec![placeholder(1, "a", 1)], Revision(5));
        projection.sink_mut().clear();

        let stale = notification(5, CatalogEvent::TracksAdded(vec![placeholder(2, "a", 2)]));
        assert!(projection.apply(&stale).is_ok());
        assert_eq!(projection.len(), 1);
        assert!(projection.sink().events.is_empty());
    }

    #[test]
    fn unreconcilable_events_poison_until_reseeded() {
        let mut projection =
            ListProjection::new(TrackFilter::All, TrackOrder::AlbumPosition, EventLog::new());
        projection.initialize(vec![placeholder(1, "a", 1)], Revision(1));

        let err = projection
            .apply(&notification(2, CatalogEvent::TrackRemoved(placeholder(7, "a", 7))))
            .unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::Desynchronized {
                reason: Desync::MissingTrack(TrackId(7)),
                ..
            }
        ));
        assert!(projection.is_poisoned());

        let err = projection
            .apply(&notification(3, CatalogEvent::StoreChanged))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::Poisoned));

        projection.initialize(vec![placeholder(1, "a", 1)], Revision(3));
        assert!(!projection.is_poisoned());
        let duplicate = notification(4, CatalogEvent::TracksAdded(vec![placeholder(1, "a", 1)]));
        assert!(matches!(
            projection.apply(&duplicate),
            Err(ProjectionError::Desynchronized {
                reason: Desync::DuplicateTrack(TrackId(1)),
                ..
            })
        ));
    }

    #[test]
    fn filtered_view_over_projection_stays_consistent() -> anyhow::Result<()> {
        let mut catalog = catalog()?;
        let events = catalog.subscribe();
        let view = FilteredView::new(
            |t: &Track| t.artist.as_deref() == Some("artist2"),
            checked(),
        );
        let mut projection = ListProjection::new(TrackFilter::All, TrackOrder::Title, view);
        projection.load(&catalog)?;

        catalog.ingest_tracks(fixture_tracks(), &fixture_covers())?;
        catalog.remove_tracks(&[ResourceLocator::new("/$11"), ResourceLocator::new("/$1")])?;
        projection.drain(&events)?;

        let view = projection.sink();
        let expected = projection
            .rows()
            .iter()
            .filter(|t| t.artist.as_deref() == Some("artist2"))
            .map(|t| t.id)
            .collect::<Vec<_>>();
        assert_eq!(view.rows().iter().map(|t| t.id).collect::<Vec<_>>(), expected);
        assert_eq!(view.sink().row_count(), expected.len());
        assert!(view.sink().is_clean(), "{:?}", view.sink().violations());
        Ok(())
    }
}
