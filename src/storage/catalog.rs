use std::cell::{Cell, RefCell};

use crossbeam_channel::Receiver;
use log::{debug, info};
use rusqlite::TransactionBehavior;

use crate::{
    config::StoreConfig,
    domain::{
        Album, AlbumFilter, AlbumId, Artist, CoverMap, Genre, ResourceLocator, Revision, Track,
        TrackFilter, TrackId, TrackIdentity, TrackRecord,
    },
    notify::{CatalogEvent, Notification, NotificationBus},
    storage::{
        db,
        error::StorageError,
        queries,
        report::{IngestReport, RemoveReport},
        upsert,
    },
};

/// How a store revision relates to the last one this instance knew about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionCheck {
    UpToDate,
    /// exactly one write happened since
    Advanced(Revision),
    /// several writes happened since, listings need a full reload
    Gap { seen: Revision, current: Revision },
}

#[derive(Debug, Default)]
struct ListingCache {
    albums: Option<Vec<Album>>,
    artists: Option<Vec<Artist>>,
    genres: Option<Vec<Genre>>,
}

/// Main structure that implements the catalog: queries, ingestion and removal.
///
/// Several instances may be opened on the same store. Only the instance that
/// performed a write publishes fine-grained events; the others learn about it
/// through [`Catalog::on_store_changed`] or [`Catalog::refresh_revision`].
pub struct Catalog {
    pub(crate) db: rusqlite::Connection,
    config: StoreConfig,
    bus: NotificationBus,
    seen: Cell<Revision>,
    cache: RefCell<ListingCache>,
}

impl Catalog {
    /// when called, opens a data base connection
    pub fn open(config: StoreConfig) -> Result<Self, StorageError> {
        let db = db::open(&config)?;
        let catalog = Self::attach(db, config)?;
        info!(
            "opened catalog '{}' at {}",
            catalog.config.name,
            catalog.revision()
        );
        Ok(catalog)
    }

    pub fn from_existing_conn(
        db: rusqlite::Connection,
        config: StoreConfig,
    ) -> Result<Self, StorageError> {
        db::prepare(&db, &config)?;
        Self::attach(db, config)
    }

    fn attach(db: rusqlite::Connection, config: StoreConfig) -> Result<Self, StorageError> {
        let seen = queries::current_revision(&db)?;
        Ok(Self {
            db,
            config,
            bus: NotificationBus::new(),
            seen: Cell::new(seen),
            cache: RefCell::default(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        self.bus.subscribe()
    }

    /// last revision this instance wrote or was told about
    pub fn revision(&self) -> Revision {
        self.seen.get()
    }

    // ---- queries

    pub fn track_by_id(&self, id: TrackId) -> Result<Option<Track>, StorageError> {
        Ok(queries::track_by_id(&self.db, id)?)
    }

    pub fn track_by_identity(
        &self,
        identity: &TrackIdentity,
    ) -> Result<Option<Track>, StorageError> {
        match queries::track_id_by_identity(&self.db, identity)? {
            Some(id) => self.track_by_id(id),
            None => Ok(None),
        }
    }

    pub fn track_id_by_identity(
        &self,
        identity: &TrackIdentity,
    ) -> Result<Option<TrackId>, StorageError> {
        Ok(queries::track_id_by_identity(&self.db, identity)?)
    }

    pub fn track_by_resource(
        &self,
        resource: &ResourceLocator,
    ) -> Result<Option<Track>, StorageError> {
        Ok(queries::track_by_resource(&self.db, resource)?)
    }

    pub fn album_by_title_and_artist(
        &self,
        title: &str,
        artist: Option<&str>,
    ) -> Result<Option<Album>, StorageError> {
        Ok(queries::album_by_title_and_artist(&self.db, title, artist)?)
    }

    pub fn album_by_id(&self, id: AlbumId) -> Result<Option<Album>, StorageError> {
        Ok(queries::album_by_id(&self.db, id)?)
    }

    pub fn all_tracks(&self, filter: &TrackFilter) -> Result<Vec<Track>, StorageError> {
        Ok(queries::tracks(&self.db, filter)?)
    }

    /// Reads the current revision and the matching tracks as one consistent view.
    pub fn snapshot_tracks(
        &self,
        filter: &TrackFilter,
    ) -> Result<(Revision, Vec<Track>), StorageError> {
        let tx = self.db.unchecked_transaction()?;
        let revision = queries::current_revision(&tx)?;
        let tracks = queries::tracks(&tx, filter)?;
        tx.commit()?;
        Ok((revision, tracks))
    }

    pub fn all_albums(&self, filter: &AlbumFilter) -> Result<Vec<Album>, StorageError> {
        if *filter != AlbumFilter::All {
            return Ok(queries::albums(&self.db, filter)?);
        }
        if let Some(albums) = &self.cache.borrow().albums {
            return Ok(albums.clone());
        }
        let albums = queries::albums(&self.db, filter)?;
        self.cache.borrow_mut().albums = Some(albums.clone());
        Ok(albums)
    }

    pub fn all_artists(&self) -> Result<Vec<Artist>, StorageError> {
        if let Some(artists) = &self.cache.borrow().artists {
            return Ok(artists.clone());
        }
        let artists = queries::artists(&self.db)?;
        self.cache.borrow_mut().artists = Some(artists.clone());
        Ok(artists)
    }

    pub fn all_genres(&self) -> Result<Vec<Genre>, StorageError> {
        if let Some(genres) = &self.cache.borrow().genres {
            return Ok(genres.clone());
        }
        let genres = queries::genres(&self.db)?;
        self.cache.borrow_mut().genres = Some(genres.clone());
        Ok(genres)
    }

    // ---- writes

    /// Upserts `records` in one transaction and publishes the resulting events
    /// after commit.
    ///
    /// Invalid records are skipped and reported; they do not abort the batch.
    pub fn ingest_tracks(
        &mut self,
        records: Vec<TrackRecord>,
        covers: &CoverMap,
    ) -> Result<IngestReport, StorageError> {
        if records.is_empty() {
            debug!("ignoring empty ingest batch");
            return Ok(IngestReport {
                revision: self.revision(),
                outcomes: Vec::new(),
            });
        }

        let total = records.len();
        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let batch = upsert::ingest(&tx, records, covers)?;
        let revision = if batch.events.is_empty() {
            queries::current_revision(&tx)?
        } else {
            upsert::record_update(&tx)?
        };
        tx.commit()?;

        let report = IngestReport {
            revision,
            outcomes: batch.outcomes,
        };
        info!(
            "ingested {total} tracks at {revision}: {} added, {} modified, {} unchanged, {} rejected",
            report.added(),
            report.modified(),
            report.unchanged(),
            report.rejected()
        );
        self.after_write(revision, batch.events);
        Ok(report)
    }

    /// Removes the tracks at `locators`; unknown locators are ignored.
    pub fn remove_tracks(
        &mut self,
        locators: &[ResourceLocator],
    ) -> Result<RemoveReport, StorageError> {
        if locators.is_empty() {
            return Ok(RemoveReport {
                revision: self.revision(),
                removed: Vec::new(),
                ignored: Vec::new(),
            });
        }

        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let batch = upsert::remove(&tx, locators)?;
        let revision = if batch.events.is_empty() {
            queries::current_revision(&tx)?
        } else {
            upsert::record_update(&tx)?
        };
        tx.commit()?;

        info!(
            "removed {} tracks at {revision}, {} locators unknown",
            batch.removed.len(),
            batch.ignored.len()
        );
        self.after_write(revision, batch.events);
        Ok(RemoveReport {
            revision,
            removed: batch.removed,
            ignored: batch.ignored,
        })
    }

    fn after_write(&self, revision: Revision, mut events: Vec<CatalogEvent>) {
        if revision > self.seen.get() {
            self.invalidate_cache();
            self.seen.set(revision);
        }
        events.push(CatalogEvent::StoreChanged);
        self.bus.publish(revision, events);
    }

    // ---- foreign writes

    /// Handles the coarse change signal of another instance on the same store.
    pub fn on_store_changed(&self, revision: Revision) -> RevisionCheck {
        let seen = self.seen.get();
        if revision <= seen {
            return RevisionCheck::UpToDate;
        }
        self.invalidate_cache();
        self.seen.set(revision);
        debug!("catalog '{}' moved from {seen} to {revision}", self.config.name);
        if revision == seen.next() {
            RevisionCheck::Advanced(revision)
        } else {
            RevisionCheck::Gap {
                seen,
                current: revision,
            }
        }
    }

    /// Polls the persisted revision, for instances without a change signal.
    pub fn refresh_revision(&self) -> Result<RevisionCheck, StorageError> {
        let current = queries::current_revision(&self.db)?;
        Ok(self.on_store_changed(current))
    }

    fn invalidate_cache(&self) {
        *self.cache.borrow_mut() = ListingCache::default();
    }
}
