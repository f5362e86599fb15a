//! Shared fixture: 23 tracks over 5 albums, the last one by various artists.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use chrono::DateTime;

use crate::{
    config::StoreConfig,
    domain::{ArtworkRef, CoverMap, TrackRecord},
};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory store config whose name no other test uses.
pub(crate) fn unique_store(prefix: &str) -> StoreConfig {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    StoreConfig::in_memory(format!("{prefix}-{}-{n}", std::process::id()))
}

const ALBUMS: [(&str, &[&str], &str); 5] = [
    ("album1", &["artist1"; 4], "genre1"),
    ("album2", &["artist1"; 6], "genre1"),
    ("album3", &["artist2"; 3], "genre2"),
    ("album4", &["artist2"; 5], "genre2"),
    (
        "album5",
        &["artist1", "artist2", "artist3", "artist4", "artist2"],
        "genre3",
    ),
];

pub(crate) fn fixture_tracks() -> Vec<TrackRecord> {
    let mut tracks = Vec::new();
    let mut i: u32 = 0;
    for (album, artists, genre) in ALBUMS {
        for (position, artist) in artists.iter().enumerate() {
            i += 1;
            let number = position as u32 + 1;
            let mut track = TrackRecord::new(format!("track{number}"), format!("/${i}"))
                .with_album(album)
                .with_artist(*artist)
                .with_position(number, 1)
                .with_genre(genre)
                .with_cover(format!("file://image{i}"))
                .with_rating((i % 5) as u8);
            track.duration = Duration::from_millis(u64::from(i) * 1000);
            track.modified_at =
                DateTime::from_timestamp_millis(i64::from(i) * 1000).expect("valid timestamp");
            track.composer = Some("composer1".to_string());
            track.lyricist = Some("lyricist1".to_string());
            tracks.push(track);
        }
    }
    tracks
}

pub(crate) fn fixture_covers() -> CoverMap {
    ALBUMS
        .iter()
        .map(|(album, _, _)| (album.to_string(), ArtworkRef::new(*album)))
        .collect()
}
