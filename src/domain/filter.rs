use super::{
    ids::{AlbumId, ArtistId, GenreId},
    roles::{RoleSet, TrackRole},
    track::Track,
};

/// Restricts a track listing by parent association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackFilter {
    #[default]
    All,
    /// only tracks flagged valid
    Valid,
    Album(AlbumId),
    Artist(ArtistId),
    Genre(GenreId),
}

impl TrackFilter {
    pub fn matches(&self, track: &Track) -> bool {
        match self {
            TrackFilter::All => true,
            TrackFilter::Valid => track.is_valid,
            TrackFilter::Album(id) => track.album_id == Some(*id),
            TrackFilter::Artist(id) => track.artist_id == Some(*id),
            TrackFilter::Genre(id) => track.genre_id == Some(*id),
        }
    }

    /// Roles whose modification can move a track in or out of this filter.
    ///
    /// Album membership follows validity: invalid tracks belong to no album.
    pub fn membership_roles(&self) -> RoleSet {
        match self {
            TrackFilter::All => RoleSet::new(),
            TrackFilter::Valid | TrackFilter::Album(_) => RoleSet::from([TrackRole::IsValid]),
            TrackFilter::Artist(_) => RoleSet::from([TrackRole::Artist]),
            TrackFilter::Genre(_) => RoleSet::from([TrackRole::Genre]),
        }
    }
}

/// Restricts an album listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlbumFilter {
    #[default]
    All,
    /// albums credited to the artist or holding one of the artist's tracks
    Artist(ArtistId),
    /// albums holding at least one track of the genre
    Genre(GenreId),
}
