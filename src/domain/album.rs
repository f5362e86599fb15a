use std::collections::HashMap;

use super::{
    ids::{AlbumId, ArtistId, GenreId},
    track::ArtworkRef,
};

/// Displayed artist of an album whose valid tracks disagree on the artist.
pub const VARIOUS_ARTISTS: &str = "Various Artists";

/// Album title to explicitly assigned cover, passed along with an ingest batch.
pub type CoverMap = HashMap<String, ArtworkRef>;

/// Album derived from the valid tracks sharing its title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub id: AlbumId,
    pub title: String,
    /// single shared track artist, or [`VARIOUS_ARTISTS`]
    pub artist: Option<String>,
    pub artist_id: Option<ArtistId>,
    pub track_count: u32,
    pub cover: Option<ArtworkRef>,
    /// cover came from a cover map rather than from a track
    pub cover_explicit: bool,
}

impl Album {
    pub fn is_various_artists(&self) -> bool {
        self.artist.as_deref() == Some(VARIOUS_ARTISTS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
}
