//! Read-only statements shared by the catalog and the upsert engine.
//!
//! Everything here takes a plain connection so it runs equally inside a write
//! transaction or against an idle connection.

use rusqlite::{Connection, OptionalExtension, Row, ToSql, params, types::Type};

use crate::{
    domain::{
        Album, AlbumFilter, AlbumId, Artist, ArtistId, ArtworkRef, Genre, GenreId,
        ResourceLocator, Revision, Track, TrackFilter, TrackId, TrackIdentity,
    },
    storage::{
        db::{nanos_to_datetime, nanos_to_duration},
        schema::tables::*,
    },
};

const TRACK_SELECT: &str = r#"
SELECT t.id, t.title, t.album_title, t.artist_name, t.track_number, t.disc_number,
       t.album_id, t.artist_id, t.genre_id, g.name, aa.name,
       t.duration_ns, t.resource, t.modified_at_ns, t.rating, t.composer, t.lyricist,
       t.is_valid, t.cover, al.cover
FROM tracks t
LEFT JOIN albums al ON al.id = t.album_id
LEFT JOIN artists aa ON aa.id = al.artist_id
LEFT JOIN genres g ON g.id = t.genre_id
"#;

const TRACK_ORDER: &str = "ORDER BY t.album_title, IFNULL(t.disc_number, -1), \
     IFNULL(t.track_number, -1), t.title, t.artist_name, t.id";

const ALBUM_SELECT: &str = r#"
SELECT al.id, al.title, ar.name, al.artist_id, al.track_count, al.cover, al.cover_explicit
FROM albums al
LEFT JOIN artists ar ON ar.id = al.artist_id
"#;

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn conversion_failure(idx: usize, err: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, err.into())
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    let duration = nanos_to_duration(row.get(11)?).map_err(|e| conversion_failure(11, e))?;
    let modified_at = nanos_to_datetime(row.get(13)?);
    Ok(Track {
        id: row.get(0)?,
        title: row.get(1)?,
        album: non_empty(row.get(2)?),
        artist: non_empty(row.get(3)?),
        track_number: row.get(4)?,
        disc_number: row.get(5)?,
        album_id: row.get(6)?,
        artist_id: row.get(7)?,
        genre_id: row.get(8)?,
        genre: row.get(9)?,
        album_artist: row.get(10)?,
        duration,
        resource: ResourceLocator(row.get(12)?),
        modified_at,
        rating: row.get(14)?,
        composer: row.get(15)?,
        lyricist: row.get(16)?,
        is_valid: row.get(17)?,
        cover: row.get::<_, Option<String>>(18)?.map(ArtworkRef),
        album_cover: row.get::<_, Option<String>>(19)?.map(ArtworkRef),
    })
}

fn album_from_row(row: &Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        artist_id: row.get(3)?,
        track_count: row.get(4)?,
        cover: row.get::<_, Option<String>>(5)?.map(ArtworkRef),
        cover_explicit: row.get(6)?,
    })
}

fn query_tracks(
    conn: &Connection,
    condition: &str,
    params: &[&dyn ToSql],
) -> rusqlite::Result<Vec<Track>> {
    let mut stmt = conn.prepare_cached(&format!("{TRACK_SELECT} {condition} {TRACK_ORDER}"))?;
    let tracks = stmt
        .query_map(params, track_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tracks)
}

fn query_one_track(
    conn: &Connection,
    condition: &str,
    params: &[&dyn ToSql],
) -> rusqlite::Result<Option<Track>> {
    conn.prepare_cached(&format!("{TRACK_SELECT} {condition}"))?
        .query_row(params, track_from_row)
        .optional()
}

pub fn track_by_id(conn: &Connection, id: TrackId) -> rusqlite::Result<Option<Track>> {
    query_one_track(conn, "WHERE t.id = ?1", &[&id])
}

pub fn track_by_resource(
    conn: &Connection,
    resource: &ResourceLocator,
) -> rusqlite::Result<Option<Track>> {
    query_one_track(conn, "WHERE t.resource = ?1", &[&resource.0])
}

pub fn track_id_by_resource(
    conn: &Connection,
    resource: &ResourceLocator,
) -> rusqlite::Result<Option<TrackId>> {
    conn.prepare_cached(&format!("SELECT id FROM {TRACKS} WHERE resource = ?1"))?
        .query_row([&resource.0], |row| row.get(0))
        .optional()
}

pub fn track_id_by_identity(
    conn: &Connection,
    identity: &TrackIdentity,
) -> rusqlite::Result<Option<TrackId>> {
    conn.prepare_cached(&format!(
        "SELECT id FROM {TRACKS} WHERE title = ?1 AND album_title = ?2 AND artist_name = ?3 \
         AND IFNULL(track_number, -1) = IFNULL(?4, -1) AND IFNULL(disc_number, -1) = IFNULL(?5, -1)"
    ))?
    .query_row(
        params![
            identity.title,
            identity.album,
            identity.artist,
            identity.track_number,
            identity.disc_number
        ],
        |row| row.get(0),
    )
    .optional()
}

pub fn tracks(conn: &Connection, filter: &TrackFilter) -> rusqlite::Result<Vec<Track>> {
    match filter {
        TrackFilter::All => query_tracks(conn, "", &[]),
        TrackFilter::Valid => query_tracks(conn, "WHERE t.is_valid = 1", &[]),
        TrackFilter::Album(id) => query_tracks(conn, "WHERE t.album_id = ?1", &[id]),
        TrackFilter::Artist(id) => query_tracks(conn, "WHERE t.artist_id = ?1", &[id]),
        TrackFilter::Genre(id) => query_tracks(conn, "WHERE t.genre_id = ?1", &[id]),
    }
}

pub fn album_by_id(conn: &Connection, id: AlbumId) -> rusqlite::Result<Option<Album>> {
    conn.prepare_cached(&format!("{ALBUM_SELECT} WHERE al.id = ?1"))?
        .query_row([id], album_from_row)
        .optional()
}

pub fn album_by_title(conn: &Connection, title: &str) -> rusqlite::Result<Option<Album>> {
    conn.prepare_cached(&format!("{ALBUM_SELECT} WHERE al.title = ?1"))?
        .query_row([title], album_from_row)
        .optional()
}

/// `artist` is compared with the album's displayed artist, `None` matching an
/// album without one.
pub fn album_by_title_and_artist(
    conn: &Connection,
    title: &str,
    artist: Option<&str>,
) -> rusqlite::Result<Option<Album>> {
    Ok(album_by_title(conn, title)?.filter(|album| album.artist.as_deref() == artist))
}

pub fn albums(conn: &Connection, filter: &AlbumFilter) -> rusqlite::Result<Vec<Album>> {
    let (condition, id): (&str, Option<i64>) = match filter {
        AlbumFilter::All => ("", None),
        AlbumFilter::Artist(id) => (
            "WHERE al.artist_id = ?1 OR EXISTS \
             (SELECT 1 FROM tracks t WHERE t.album_id = al.id AND t.artist_id = ?1)",
            Some(id.0),
        ),
        AlbumFilter::Genre(id) => (
            "WHERE EXISTS (SELECT 1 FROM tracks t WHERE t.album_id = al.id AND t.genre_id = ?1)",
            Some(id.0),
        ),
    };
    let mut stmt =
        conn.prepare_cached(&format!("{ALBUM_SELECT} {condition} ORDER BY al.title, al.id"))?;
    let rows = match id {
        Some(id) => stmt.query_map([id], album_from_row)?,
        None => stmt.query_map([], album_from_row)?,
    };
    let albums = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(albums)
}

pub fn artist_by_id(conn: &Connection, id: ArtistId) -> rusqlite::Result<Option<Artist>> {
    conn.prepare_cached(&format!("SELECT id, name FROM {ARTISTS} WHERE id = ?1"))?
        .query_row([id], |row| {
            Ok(Artist {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .optional()
}

pub fn artist_id_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<ArtistId>> {
    conn.prepare_cached(&format!("SELECT id FROM {ARTISTS} WHERE name = ?1"))?
        .query_row([name], |row| row.get(0))
        .optional()
}

pub fn artists(conn: &Connection) -> rusqlite::Result<Vec<Artist>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT id, name FROM {ARTISTS} ORDER BY name, id"))?;
    let artists = stmt
        .query_map([], |row| {
            Ok(Artist {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(artists)
}

pub fn genre_by_id(conn: &Connection, id: GenreId) -> rusqlite::Result<Option<Genre>> {
    conn.prepare_cached(&format!("SELECT id, name FROM {GENRES} WHERE id = ?1"))?
        .query_row([id], |row| {
            Ok(Genre {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .optional()
}

pub fn genre_id_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<GenreId>> {
    conn.prepare_cached(&format!("SELECT id FROM {GENRES} WHERE name = ?1"))?
        .query_row([name], |row| row.get(0))
        .optional()
}

pub fn genres(conn: &Connection) -> rusqlite::Result<Vec<Genre>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT id, name FROM {GENRES} ORDER BY name, id"))?;
    let genres = stmt
        .query_map([], |row| {
            Ok(Genre {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(genres)
}

pub fn current_revision(conn: &Connection) -> rusqlite::Result<Revision> {
    conn.query_row(
        &format!("SELECT IFNULL(MAX(revision), 0) FROM {UPDATES}"),
        [],
        |row| row.get(0).map(Revision),
    )
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;
    use crate::storage::schema;

    fn db() -> anyhow::Result<Connection> {
        let db = Connection::open_in_memory()?;
        schema::init(&db)?;
        db.execute_batch(
            r#"
INSERT INTO artists (id, name) VALUES (1, 'artist1');
INSERT INTO albums (id, title, artist_id, track_count, cover) VALUES (1, 'album1', 1, 2, 'album1');
INSERT INTO tracks (id, title, album_title, artist_name, track_number, disc_number, album_id,
                    artist_id, duration_ns, resource, modified_at_ns, rating, is_valid, cover)
VALUES (1, 'track2', 'album1', 'artist1', 2, 1, 1, 1, 2000, '/2', 2, 3, 1, 'image2'),
       (2, 'track1', 'album1', 'artist1', 1, 1, 1, 1, 1000, '/1', 1, 4, 1, 'image1'),
       (3, 'loose', '', '', NULL, NULL, NULL, NULL, 10, '/3', 3, 0, 0, NULL);
"#,
        )?;
        Ok(db)
    }

    #[test]
    fn tracks_are_listed_in_album_order() -> anyhow::Result<()> {
        let db = db()?;

        let titles = tracks(&db, &TrackFilter::All)?
            .into_iter()
            .map(|t| t.title)
            .collect::<Vec<_>>();
        assert_eq!(titles, ["loose", "track1", "track2"]);

        let album = tracks(&db, &TrackFilter::Album(AlbumId(1)))?;
        assert_eq!(album.len(), 2);
        assert_eq!(tracks(&db, &TrackFilter::Valid)?.len(), 2);

        Ok(())
    }

    #[test]
    fn track_snapshot_carries_album_fields() -> anyhow::Result<()> {
        let db = db()?;

        let track = track_by_id(&db, TrackId(2))?.expect("track 2");
        assert_eq!(track.album.as_deref(), Some("album1"));
        assert_eq!(track.album_artist.as_deref(), Some("artist1"));
        assert_eq!(track.album_cover, Some(ArtworkRef::new("album1")));
        assert_eq!(track.cover, Some(ArtworkRef::new("image1")));
        assert_eq!(track.rating, 4);

        let loose = track_by_resource(&db, &ResourceLocator::new("/3"))?.expect("loose track");
        assert_eq!(loose.album, None);
        assert_eq!(loose.artist, None);
        assert!(!loose.is_valid);

        Ok(())
    }

    #[test]
    fn identity_lookup_treats_missing_numbers_as_equal() -> anyhow::Result<()> {
        let db = db()?;

        let loose = TrackIdentity::new("loose", None, None, None, None);
        assert_eq!(track_id_by_identity(&db, &loose)?, Some(TrackId(3)));

        let numbered =
            TrackIdentity::new("track1", Some("artist1"), Some("album1"), Some(1), Some(1));
        assert_eq!(track_id_by_identity(&db, &numbered)?, Some(TrackId(2)));

        let other_disc =
            TrackIdentity::new("track1", Some("artist1"), Some("album1"), Some(1), None);
        assert_eq!(track_id_by_identity(&db, &other_disc)?, None);

        Ok(())
    }

    #[test]
    fn album_lookup_matches_displayed_artist() -> anyhow::Result<()> {
        let db = db()?;

        assert!(album_by_title_and_artist(&db, "album1", Some("artist1"))?.is_some());
        assert!(album_by_title_and_artist(&db, "album1", Some("artist2"))?.is_none());
        assert!(album_by_title_and_artist(&db, "album9", Some("artist1"))?.is_none());
        assert_eq!(albums(&db, &AlbumFilter::Artist(ArtistId(1)))?.len(), 1);
        assert_eq!(current_revision(&db)?, Revision(0));

        Ok(())
    }
}
