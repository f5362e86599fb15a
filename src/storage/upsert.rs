//! Decides per incoming record whether it is new, unchanged or modified, and
//! keeps the derived album, artist and genre rows consistent.
//!
//! Every function here runs inside the caller's write transaction. Nothing is
//! published from this module; the collected events are handed back so they
//! can be sent once the transaction has committed.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    domain::{
        Album, AlbumId, Artist, ArtistId, ArtworkRef, CoverMap, Genre, GenreId,
        ResourceLocator, Revision, RoleSet, Track, TrackFilter, TrackId, TrackRecord,
        VARIOUS_ARTISTS,
    },
    notify::CatalogEvent,
    storage::{
        db::{datetime_to_nanos, duration_to_nanos, now_millis},
        error::StorageError,
        queries,
        report::{ItemOutcome, Rejection},
        schema::tables::*,
    },
};

pub(crate) struct IngestBatch {
    pub events: Vec<CatalogEvent>,
    pub outcomes: Vec<ItemOutcome>,
}

pub(crate) struct RemoveBatch {
    pub events: Vec<CatalogEvent>,
    pub removed: Vec<TrackId>,
    pub ignored: Vec<ResourceLocator>,
}

/// What a write call did so far, used to derive its events once all records
/// are processed.
#[derive(Default)]
struct Journal {
    added: Vec<TrackId>,
    /// tracks changed by a record, in batch order
    modified: Vec<TrackId>,
    removed: Vec<Track>,
    /// snapshots of pre-existing tracks taken before the first change to them
    before: BTreeMap<TrackId, Track>,
    albums: BTreeSet<String>,
    created_artists: Vec<ArtistId>,
    created_genres: Vec<GenreId>,
}

impl Journal {
    fn touch_album(&mut self, title: Option<&str>) {
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            self.albums.insert(title.to_string());
        }
    }
}

enum Pending {
    Added(TrackId),
    Modified(TrackId),
    Unchanged(TrackId),
    Rejected(ResourceLocator, Rejection),
}

fn validate(record: &TrackRecord) -> Result<(), Rejection> {
    if record.title.trim().is_empty() {
        return Err(Rejection::MissingTitle);
    }
    if record.resource.is_empty() {
        return Err(Rejection::MissingResource);
    }
    if record.rating > 10 {
        return Err(Rejection::RatingOutOfRange(record.rating));
    }
    if duration_to_nanos(record.duration).is_err() {
        return Err(Rejection::DurationOutOfRange);
    }
    if datetime_to_nanos(&record.modified_at).is_err() {
        return Err(Rejection::TimestampOutOfRange);
    }
    Ok(())
}

pub(crate) fn ingest(
    conn: &Connection,
    records: Vec<TrackRecord>,
    covers: &CoverMap,
) -> Result<IngestBatch, StorageError> {
    let mut journal = Journal::default();
    let mut pending = Vec::with_capacity(records.len());
    let mut seen_identities = HashSet::new();
    let mut seen_resources = HashSet::new();

    for record in records {
        let record = record.normalized();
        if let Err(reason) = validate(&record) {
            warn!("rejected track {}: {reason}", record.resource);
            pending.push(Pending::Rejected(record.resource, reason));
            continue;
        }

        let identity = record.identity();
        let fresh_identity = seen_identities.insert(identity.clone());
        let fresh_resource = seen_resources.insert(record.resource.clone());
        if !fresh_identity || !fresh_resource {
            warn!("rejected track {}: {}", record.resource, Rejection::DuplicateInBatch);
            pending.push(Pending::Rejected(record.resource, Rejection::DuplicateInBatch));
            continue;
        }

        let existing = queries::track_id_by_identity(conn, &identity)?;
        let owner = queries::track_id_by_resource(conn, &record.resource)?;
        if let Some(owner) = owner.filter(|owner| Some(*owner) != existing) {
            let reason = Rejection::LocatorInUse(owner);
            warn!("rejected track {}: {reason}", record.resource);
            pending.push(Pending::Rejected(record.resource, reason));
            continue;
        }

        journal.touch_album(record.album.as_deref());

        let outcome = match existing.map(|id| queries::track_by_id(conn, id)).transpose()? {
            Some(Some(track)) if track.same_content(&record) => Pending::Unchanged(track.id),
            Some(Some(track)) => {
                let id = track.id;
                update_track(conn, id, &record, &mut journal)?;
                journal.before.entry(id).or_insert(track);
                journal.modified.push(id);
                Pending::Modified(id)
            }
            _ => {
                let id = insert_track(conn, &record, &mut journal)?;
                journal.added.push(id);
                Pending::Added(id)
            }
        };
        pending.push(outcome);
    }

    let (events, roles) = settle(conn, journal, covers)?;

    let outcomes = pending
        .into_iter()
        .map(|p| match p {
            Pending::Added(id) => ItemOutcome::Added(id),
            Pending::Unchanged(id) => ItemOutcome::Unchanged(id),
            Pending::Modified(id) => ItemOutcome::Modified {
                id,
                roles: roles.get(&id).cloned().unwrap_or_default(),
            },
            Pending::Rejected(resource, reason) => ItemOutcome::Rejected { resource, reason },
        })
        .collect();

    Ok(IngestBatch { events, outcomes })
}

pub(crate) fn remove(
    conn: &Connection,
    locators: &[ResourceLocator],
) -> Result<RemoveBatch, StorageError> {
    let mut journal = Journal::default();
    let mut ignored = Vec::new();

    for locator in locators {
        let Some(track) = queries::track_by_resource(conn, locator)? else {
            debug!("ignoring removal of unknown resource {locator}");
            ignored.push(locator.clone());
            continue;
        };
        conn.execute(&format!("DELETE FROM {TRACKS} WHERE id = ?1"), [track.id])?;
        journal.touch_album(track.album.as_deref());
        journal.removed.push(track);
    }

    let removed = journal.removed.iter().map(|t| t.id).collect();
    let (events, _) = settle(conn, journal, &CoverMap::new())?;
    Ok(RemoveBatch {
        events,
        removed,
        ignored,
    })
}

/// Appends a row to the update log and returns the new revision.
pub(crate) fn record_update(conn: &Connection) -> Result<Revision, StorageError> {
    conn.execute(
        &format!("INSERT INTO {UPDATES} (updated_at) VALUES (?1)"),
        [now_millis()],
    )?;
    Ok(Revision(conn.last_insert_rowid()))
}

fn resolve_artist(
    conn: &Connection,
    name: &str,
    journal: &mut Journal,
) -> Result<ArtistId, StorageError> {
    if let Some(id) = queries::artist_id_by_name(conn, name)? {
        return Ok(id);
    }
    conn.execute(&format!("INSERT INTO {ARTISTS} (name) VALUES (?1)"), [name])?;
    let id = ArtistId(conn.last_insert_rowid());
    journal.created_artists.push(id);
    Ok(id)
}

fn resolve_genre(
    conn: &Connection,
    name: &str,
    journal: &mut Journal,
) -> Result<GenreId, StorageError> {
    if let Some(id) = queries::genre_id_by_name(conn, name)? {
        return Ok(id);
    }
    conn.execute(&format!("INSERT INTO {GENRES} (name) VALUES (?1)"), [name])?;
    let id = GenreId(conn.last_insert_rowid());
    journal.created_genres.push(id);
    Ok(id)
}

fn insert_track(
    conn: &Connection,
    record: &TrackRecord,
    journal: &mut Journal,
) -> Result<TrackId, StorageError> {
    let artist_id = record
        .artist
        .as_deref()
        .map(|name| resolve_artist(conn, name, journal))
        .transpose()?;
    let genre_id = record
        .genre
        .as_deref()
        .map(|name| resolve_genre(conn, name, journal))
        .transpose()?;

    conn.prepare_cached(&format!(
        "INSERT INTO {TRACKS} (title, album_title, artist_name, track_number, disc_number, \
         artist_id, genre_id, duration_ns, resource, modified_at_ns, rating, composer, lyricist, \
         is_valid, cover) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
    ))?
    .execute(params![
        record.title,
        record.album.as_deref().unwrap_or_default(),
        record.artist.as_deref().unwrap_or_default(),
        record.track_number,
        record.disc_number,
        artist_id,
        genre_id,
        duration_to_nanos(record.duration)?,
        record.resource.0,
        datetime_to_nanos(&record.modified_at)?,
        record.rating,
        record.composer,
        record.lyricist,
        record.is_valid,
        record.cover.as_ref().map(|c| c.0.as_str()),
    ])?;

    let id = TrackId(conn.last_insert_rowid());
    debug!("inserted track {id} from {}", record.resource);
    Ok(id)
}

fn update_track(
    conn: &Connection,
    id: TrackId,
    record: &TrackRecord,
    journal: &mut Journal,
) -> Result<(), StorageError> {
    let genre_id = record
        .genre
        .as_deref()
        .map(|name| resolve_genre(conn, name, journal))
        .transpose()?;

    conn.prepare_cached(&format!(
        "UPDATE {TRACKS} SET duration_ns = ?1, resource = ?2, modified_at_ns = ?3, rating = ?4, \
         genre_id = ?5, composer = ?6, lyricist = ?7, is_valid = ?8, cover = ?9 WHERE id = ?10"
    ))?
    .execute(params![
        duration_to_nanos(record.duration)?,
        record.resource.0,
        datetime_to_nanos(&record.modified_at)?,
        record.rating,
        genre_id,
        record.composer,
        record.lyricist,
        record.is_valid,
        record.cover.as_ref().map(|c| c.0.as_str()),
        id,
    ])?;

    debug!("updated track {id} from {}", record.resource);
    Ok(())
}

fn first_track_cover(conn: &Connection, title: &str) -> Result<Option<String>, StorageError> {
    let cover = conn
        .prepare_cached(&format!(
            "SELECT cover FROM {TRACKS} WHERE album_title = ?1 AND is_valid = 1 AND cover IS NOT NULL \
             ORDER BY IFNULL(disc_number, -1), IFNULL(track_number, -1), id LIMIT 1"
        ))?
        .query_row([title], |row| row.get(0))
        .optional()?;
    Ok(cover)
}

/// Brings the album titled `title` in line with its valid tracks.
///
/// An explicit cover from the current batch wins, an earlier explicit cover is
/// kept, otherwise the first track cover in disc and track order is used.
fn recompute_album(
    conn: &Connection,
    title: &str,
    explicit_cover: Option<&ArtworkRef>,
    journal: &mut Journal,
) -> Result<(), StorageError> {
    conn.execute(
        &format!(
            "UPDATE {TRACKS} SET album_id = NULL \
             WHERE album_title = ?1 AND is_valid = 0 AND album_id IS NOT NULL"
        ),
        [title],
    )?;

    let (count, distinct_artists, some_artist): (u32, u32, Option<String>) = conn.query_row(
        &format!(
            "SELECT COUNT(*), COUNT(DISTINCT artist_name), MIN(artist_name) \
             FROM {TRACKS} WHERE album_title = ?1 AND is_valid = 1"
        ),
        [title],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let existing: Option<(AlbumId, Option<String>, bool)> = conn
        .query_row(
            &format!("SELECT id, cover, cover_explicit FROM {ALBUMS} WHERE title = ?1"),
            [title],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    if count == 0 {
        if let Some((id, _, _)) = existing {
            conn.execute(&format!("DELETE FROM {ALBUMS} WHERE id = ?1"), [id])?;
            debug!("album '{title}' lost its last valid track");
        }
        return Ok(());
    }

    let id = match &existing {
        Some((id, _, _)) => *id,
        None => {
            conn.execute(&format!("INSERT INTO {ALBUMS} (title) VALUES (?1)"), [title])?;
            AlbumId(conn.last_insert_rowid())
        }
    };
    conn.execute(
        &format!("UPDATE {TRACKS} SET album_id = ?1 WHERE album_title = ?2 AND is_valid = 1"),
        params![id, title],
    )?;

    let artist = match (distinct_artists, some_artist) {
        (1, Some(name)) if !name.is_empty() => Some(name),
        (1, _) => None,
        _ => Some(VARIOUS_ARTISTS.to_string()),
    };
    let artist_id = artist
        .as_deref()
        .map(|name| resolve_artist(conn, name, journal))
        .transpose()?;

    let (cover, cover_explicit) = match (explicit_cover, existing) {
        (Some(cover), _) => (Some(cover.0.clone()), true),
        (None, Some((_, cover, true))) => (cover, true),
        _ => (first_track_cover(conn, title)?, false),
    };

    conn.execute(
        &format!(
            "UPDATE {ALBUMS} SET artist_id = ?1, track_count = ?2, cover = ?3, cover_explicit = ?4 \
             WHERE id = ?5"
        ),
        params![artist_id, count, cover, cover_explicit, id],
    )?;
    Ok(())
}

fn sweep_artists(conn: &Connection) -> Result<Vec<Artist>, StorageError> {
    let orphans = {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT id, name FROM {ARTISTS} a \
             WHERE NOT EXISTS (SELECT 1 FROM {TRACKS} t WHERE t.artist_id = a.id) \
             AND NOT EXISTS (SELECT 1 FROM {ALBUMS} al WHERE al.artist_id = a.id)"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Artist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    for artist in &orphans {
        conn.execute(&format!("DELETE FROM {ARTISTS} WHERE id = ?1"), [artist.id])?;
    }
    Ok(orphans)
}

fn sweep_genres(conn: &Connection) -> Result<Vec<Genre>, StorageError> {
    let orphans = {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT id, name FROM {GENRES} g \
             WHERE NOT EXISTS (SELECT 1 FROM {TRACKS} t WHERE t.genre_id = g.id)"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Genre {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    for genre in &orphans {
        conn.execute(&format!("DELETE FROM {GENRES} WHERE id = ?1"), [genre.id])?;
    }
    Ok(orphans)
}

/// Recomputes touched albums, collects orphaned rows and turns the journal
/// into events. Also returns the final role set of every modified track.
fn settle(
    conn: &Connection,
    mut journal: Journal,
    covers: &CoverMap,
) -> Result<(Vec<CatalogEvent>, HashMap<TrackId, RoleSet>), StorageError> {
    let added: HashSet<TrackId> = journal.added.iter().copied().collect();

    // album rows are untouched until recompute, so these are pre-batch states
    let mut albums_before: BTreeMap<String, Option<Album>> = BTreeMap::new();
    for title in &journal.albums {
        let album = queries::album_by_title(conn, title)?;
        if let Some(album) = &album {
            for track in queries::tracks(conn, &TrackFilter::Album(album.id))? {
                if !added.contains(&track.id) {
                    journal.before.entry(track.id).or_insert(track);
                }
            }
        }
        albums_before.insert(title.clone(), album);
    }

    let titles = std::mem::take(&mut journal.albums);
    for title in &titles {
        recompute_album(conn, title, covers.get(title), &mut journal)?;
    }

    let removed_artists = sweep_artists(conn)?;
    let removed_genres = sweep_genres(conn)?;

    let mut events = Vec::new();

    if !journal.added.is_empty() {
        let mut tracks = Vec::with_capacity(journal.added.len());
        for id in &journal.added {
            if let Some(track) = queries::track_by_id(conn, *id)? {
                tracks.push(track);
            }
        }
        events.push(CatalogEvent::TracksAdded(tracks));
    }

    for track in journal.removed.drain(..) {
        events.push(CatalogEvent::TrackRemoved(track));
    }

    let mut order = journal.modified.clone();
    order.extend(
        journal
            .before
            .keys()
            .filter(|id| !journal.modified.contains(id)),
    );
    let mut roles_by_track = HashMap::new();
    for id in order {
        let Some(before) = journal.before.get(&id) else {
            continue;
        };
        let Some(after) = queries::track_by_id(conn, id)? else {
            continue;
        };
        let roles = before.changed_roles(&after);
        if roles.is_empty() {
            continue;
        }
        roles_by_track.insert(id, roles.clone());
        events.push(CatalogEvent::TrackModified {
            track: after,
            roles,
        });
    }

    let (mut album_added, mut album_modified, mut album_removed) = (vec![], vec![], vec![]);
    for (title, before) in albums_before {
        match (before, queries::album_by_title(conn, &title)?) {
            (None, Some(after)) => album_added.push(CatalogEvent::AlbumAdded(after)),
            (Some(before), Some(after)) if before != after => {
                album_modified.push(CatalogEvent::AlbumModified(after))
            }
            (Some(before), None) => album_removed.push(CatalogEvent::AlbumRemoved(before)),
            _ => {}
        }
    }
    events.extend(album_added);
    events.extend(album_modified);
    events.extend(album_removed);

    let swept: HashSet<ArtistId> = removed_artists.iter().map(|a| a.id).collect();
    for id in &journal.created_artists {
        if !swept.contains(id) {
            if let Some(artist) = queries::artist_by_id(conn, *id)? {
                events.push(CatalogEvent::ArtistAdded(artist));
            }
        }
    }
    for artist in removed_artists {
        if !journal.created_artists.contains(&artist.id) {
            events.push(CatalogEvent::ArtistRemoved(artist));
        }
    }

    let swept: HashSet<GenreId> = removed_genres.iter().map(|g| g.id).collect();
    for id in &journal.created_genres {
        if !swept.contains(id) {
            if let Some(genre) = queries::genre_by_id(conn, *id)? {
                events.push(CatalogEvent::GenreAdded(genre));
            }
        }
    }
    for genre in removed_genres {
        if !journal.created_genres.contains(&genre.id) {
            events.push(CatalogEvent::GenreRemoved(genre));
        }
    }

    Ok((events, roles_by_track))
}
