use rusqlite::Connection;

pub mod tables {
    pub const ARTISTS: &str = "artists";
    pub const GENRES: &str = "genres";
    pub const ALBUMS: &str = "albums";
    pub const TRACKS: &str = "tracks";
    pub const UPDATES: &str = "updates";

    #[cfg(test)]
    pub const ALL_TABLES: &[&str] = &[ARTISTS, GENRES, ALBUMS, TRACKS, UPDATES];
}

// Tracks keep the album title and artist name they were ingested with: they are
// part of the upsert identity. `album_id` is only set while the track is valid.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS artists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS genres (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE,
    artist_id INTEGER REFERENCES artists(id),
    track_count INTEGER NOT NULL DEFAULT 0,
    cover TEXT,
    cover_explicit INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    album_title TEXT NOT NULL DEFAULT '',
    artist_name TEXT NOT NULL DEFAULT '',
    track_number INTEGER,
    disc_number INTEGER,
    album_id INTEGER REFERENCES albums(id),
    artist_id INTEGER REFERENCES artists(id),
    genre_id INTEGER REFERENCES genres(id),
    duration_ns INTEGER NOT NULL,
    resource TEXT NOT NULL UNIQUE,
    modified_at_ns INTEGER NOT NULL,
    rating INTEGER NOT NULL DEFAULT 0,
    composer TEXT,
    lyricist TEXT,
    is_valid INTEGER NOT NULL DEFAULT 1,
    cover TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS tracks_identity ON tracks (
    title, album_title, artist_name, IFNULL(track_number, -1), IFNULL(disc_number, -1)
);
CREATE INDEX IF NOT EXISTS tracks_album_title ON tracks (album_title);
CREATE INDEX IF NOT EXISTS tracks_album ON tracks (album_id);
CREATE INDEX IF NOT EXISTS tracks_artist ON tracks (artist_id);
CREATE INDEX IF NOT EXISTS tracks_genre ON tracks (genre_id);
CREATE INDEX IF NOT EXISTS albums_artist ON albums (artist_id);

CREATE TABLE IF NOT EXISTS updates (
    revision INTEGER PRIMARY KEY AUTOINCREMENT,
    updated_at INTEGER NOT NULL
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
