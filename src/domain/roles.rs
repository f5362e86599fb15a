use std::collections::BTreeSet;

/// A field of a track as seen by a list consumer.
///
/// `AlbumArtist` and `AlbumCover` are derived from the owning album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrackRole {
    Title,
    Album,
    Artist,
    AlbumArtist,
    TrackNumber,
    DiscNumber,
    Duration,
    Resource,
    ModifiedAt,
    Rating,
    Genre,
    Composer,
    Lyricist,
    IsValid,
    Cover,
    AlbumCover,
}

/// Set of roles touched by a modification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet(BTreeSet<TrackRole>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: TrackRole) -> bool {
        self.0.insert(role)
    }

    pub fn contains(&self, role: TrackRole) -> bool {
        self.0.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = TrackRole> + '_ {
        self.0.iter().copied()
    }

    pub fn intersects(&self, other: &RoleSet) -> bool {
        self.0.iter().any(|role| other.0.contains(role))
    }
}

impl FromIterator<TrackRole> for RoleSet {
    fn from_iter<I: IntoIterator<Item = TrackRole>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<TrackRole> for RoleSet {
    fn extend<I: IntoIterator<Item = TrackRole>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl<const N: usize> From<[TrackRole; N]> for RoleSet {
    fn from(roles: [TrackRole; N]) -> Self {
        roles.into_iter().collect()
    }
}
