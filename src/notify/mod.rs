//! In-process publish surface for catalog mutations.
//!
//! Each subscriber owns an unbounded crossbeam receiver. Events of one write
//! call are sent back to back in a fixed order and always end with
//! [`CatalogEvent::StoreChanged`].

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use log::debug;

use crate::domain::{Album, Artist, Genre, Revision, RoleSet, Track};

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    /// every track inserted by one ingest call
    TracksAdded(Vec<Track>),
    TrackModified { track: Track, roles: RoleSet },
    /// snapshot of the track as it was before removal
    TrackRemoved(Track),
    AlbumAdded(Album),
    AlbumModified(Album),
    AlbumRemoved(Album),
    ArtistAdded(Artist),
    ArtistRemoved(Artist),
    GenreAdded(Genre),
    GenreRemoved(Genre),
    StoreChanged,
}

/// An event stamped with the store revision of the write that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub revision: Revision,
    pub event: CatalogEvent,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationBus {
    subscribers: Arc<Mutex<Vec<Sender<Notification>>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Sends `events` in order to every live subscriber.
    ///
    /// Subscribers whose receiver was dropped are forgotten.
    pub fn publish(&self, revision: Revision, events: impl IntoIterator<Item = CatalogEvent>) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for event in events {
            subscribers.retain(|tx| {
                tx.send(Notification {
                    revision,
                    event: event.clone(),
                })
                .is_ok()
            });
        }
        debug!("published {revision} to {} subscribers", subscribers.len());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
