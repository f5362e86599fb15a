use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};

use super::{
    ids::{AlbumId, ArtistId, GenreId, TrackId},
    roles::{RoleSet, TrackRole},
};

/// Where the audio of a track lives. Unique per track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceLocator(pub String);

impl ResourceLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceLocator {
    fn from(locator: &str) -> Self {
        Self::new(locator)
    }
}

impl From<String> for ResourceLocator {
    fn from(locator: String) -> Self {
        Self(locator)
    }
}

/// Reference to a cover image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtworkRef(pub String);

impl ArtworkRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }
}

/// Upsert identity of a track. Absent album and artist are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackIdentity {
    pub title: String,
    pub album: String,
    pub artist: String,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
}

impl TrackIdentity {
    pub fn new(
        title: impl Into<String>,
        artist: Option<&str>,
        album: Option<&str>,
        track_number: Option<u32>,
        disc_number: Option<u32>,
    ) -> Self {
        Self {
            title: title.into(),
            album: album.unwrap_or_default().to_string(),
            artist: artist.unwrap_or_default().to_string(),
            track_number,
            disc_number,
        }
    }
}

/// Track metadata as handed to ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub title: String,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub duration: Duration,
    pub resource: ResourceLocator,
    pub modified_at: DateTime<Utc>,
    pub rating: u8,
    pub genre: Option<String>,
    pub composer: Option<String>,
    pub lyricist: Option<String>,
    pub is_valid: bool,
    pub cover: Option<ArtworkRef>,
}

impl TrackRecord {
    pub fn new(title: impl Into<String>, resource: impl Into<ResourceLocator>) -> Self {
        Self {
            title: title.into(),
            album: None,
            artist: None,
            track_number: None,
            disc_number: None,
            duration: Duration::ZERO,
            resource: resource.into(),
            modified_at: DateTime::<Utc>::default(),
            rating: 0,
            genre: None,
            composer: None,
            lyricist: None,
            is_valid: true,
            cover: None,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_position(mut self, track_number: u32, disc_number: u32) -> Self {
        self.track_number = Some(track_number);
        self.disc_number = Some(disc_number);
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_cover(mut self, cover: impl Into<String>) -> Self {
        self.cover = Some(ArtworkRef::new(cover));
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = rating;
        self
    }

    /// empty optional texts collapse to `None`
    pub fn normalized(mut self) -> Self {
        for text in [
            &mut self.album,
            &mut self.artist,
            &mut self.genre,
            &mut self.composer,
            &mut self.lyricist,
        ] {
            if text.as_deref().is_some_and(str::is_empty) {
                *text = None;
            }
        }
        if self.cover.as_ref().is_some_and(|c| c.0.is_empty()) {
            self.cover = None;
        }
        self
    }

    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity::new(
            self.title.clone(),
            self.artist.as_deref(),
            self.album.as_deref(),
            self.track_number,
            self.disc_number,
        )
    }
}

/// Snapshot of a persisted track, including what it inherits from its album.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub album: Option<String>,
    pub album_id: Option<AlbumId>,
    pub artist: Option<String>,
    pub artist_id: Option<ArtistId>,
    pub album_artist: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub duration: Duration,
    pub resource: ResourceLocator,
    pub modified_at: DateTime<Utc>,
    pub rating: u8,
    pub genre: Option<String>,
    pub genre_id: Option<GenreId>,
    pub composer: Option<String>,
    pub lyricist: Option<String>,
    pub is_valid: bool,
    pub cover: Option<ArtworkRef>,
    pub album_cover: Option<ArtworkRef>,
}

impl Track {
    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity::new(
            self.title.clone(),
            self.artist.as_deref(),
            self.album.as_deref(),
            self.track_number,
            self.disc_number,
        )
    }

    /// true when re-ingesting `record` would not change any persisted field
    pub fn same_content(&self, record: &TrackRecord) -> bool {
        self.duration == record.duration
            && self.resource == record.resource
            && self.modified_at == record.modified_at
            && self.rating == record.rating
            && self.genre == record.genre
            && self.composer == record.composer
            && self.lyricist == record.lyricist
            && self.is_valid == record.is_valid
            && self.cover == record.cover
    }

    /// Roles that differ between two snapshots of the same track.
    pub fn changed_roles(&self, after: &Track) -> RoleSet {
        let mut roles = RoleSet::new();
        let mut check = |differs: bool, role: TrackRole| {
            if differs {
                roles.insert(role);
            }
        };
        check(self.title != after.title, TrackRole::Title);
        check(self.album != after.album, TrackRole::Album);
        check(self.artist != after.artist, TrackRole::Artist);
        check(self.album_artist != after.album_artist, TrackRole::AlbumArtist);
        check(self.track_number != after.track_number, TrackRole::TrackNumber);
        check(self.disc_number != after.disc_number, TrackRole::DiscNumber);
        check(self.duration != after.duration, TrackRole::Duration);
        check(self.resource != after.resource, TrackRole::Resource);
        check(self.modified_at != after.modified_at, TrackRole::ModifiedAt);
        check(self.rating != after.rating, TrackRole::Rating);
        check(self.genre != after.genre, TrackRole::Genre);
        check(self.composer != after.composer, TrackRole::Composer);
        check(self.lyricist != after.lyricist, TrackRole::Lyricist);
        check(self.is_valid != after.is_valid, TrackRole::IsValid);
        check(self.cover != after.cover, TrackRole::Cover);
        check(self.album_cover != after.album_cover, TrackRole::AlbumCover);
        roles
    }

    #[cfg(test)]
    pub(crate) fn placeholder(id: TrackId, title: &str, resource: ResourceLocator) -> Self {
        Self {
            id,
            title: title.to_string(),
            album: None,
            album_id: None,
            artist: None,
            artist_id: None,
            album_artist: None,
            track_number: None,
            disc_number: None,
            duration: Duration::ZERO,
            resource,
            modified_at: DateTime::<Utc>::default(),
            rating: 0,
            genre: None,
            genre_id: None,
            composer: None,
            lyricist: None,
            is_valid: true,
            cover: None,
            album_cover: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_record_drops_empty_texts() {
        let record = TrackRecord::new("title", "/a")
            .with_album("")
            .with_artist("artist")
            .with_genre("")
            .with_cover("")
            .normalized();

        assert_eq!(record.album, None);
        assert_eq!(record.artist.as_deref(), Some("artist"));
        assert_eq!(record.genre, None);
        assert_eq!(record.cover, None);
        assert_eq!(record.identity().album, "");
    }

    #[test]
    fn same_content_sees_sub_millisecond_changes() {
        let mut track = Track::placeholder(TrackId(1), "title", ResourceLocator::new("/a"));
        track.duration = Duration::from_millis(1500);

        let mut record = TrackRecord::new("title", "/a");
        record.duration = Duration::from_millis(1500);
        assert!(track.same_content(&record));

        record.duration = Duration::from_micros(1_500_400);
        assert!(!track.same_content(&record));

        record.duration = track.duration;
        record.rating = 4;
        assert!(!track.same_content(&record));
    }

    #[test]
    fn changed_roles_lists_only_differing_fields() {
        let before = Track::placeholder(TrackId(1), "title", ResourceLocator::new("/a"));
        let mut after = before.clone();
        after.rating = 5;
        after.album_cover = Some(ArtworkRef::new("cover"));

        let roles = before.changed_roles(&after);
        assert_eq!(roles, RoleSet::from([TrackRole::Rating, TrackRole::AlbumCover]));
        assert!(before.changed_roles(&before).is_empty());
    }
}
