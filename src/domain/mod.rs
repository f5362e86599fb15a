pub mod album;
pub mod filter;
pub mod ids;
pub mod roles;
pub mod track;

pub use album::{Album, Artist, CoverMap, Genre, VARIOUS_ARTISTS};
pub use filter::{AlbumFilter, TrackFilter};
pub use ids::{AlbumId, ArtistId, GenreId, Revision, TrackId};
pub use roles::{RoleSet, TrackRole};
pub use track::{ArtworkRef, ResourceLocator, Track, TrackIdentity, TrackRecord};
