use std::thread::{self, JoinHandle};

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info};

use crate::{
    config::StoreConfig,
    domain::{CoverMap, ResourceLocator, TrackRecord},
    notify::{Notification, NotificationBus},
    storage::{
        catalog::Catalog,
        error::StorageError,
        report::{IngestReport, RemoveReport},
    },
};

pub type Reply<T> = Receiver<Result<T, StorageError>>;

enum Request {
    Ingest {
        records: Vec<TrackRecord>,
        covers: CoverMap,
        reply: Sender<Result<IngestReport, StorageError>>,
    },
    Remove {
        locators: Vec<ResourceLocator>,
        reply: Sender<Result<RemoveReport, StorageError>>,
    },
}

/// Owns a [`Catalog`] on a dedicated thread so callers never wait on disk.
///
/// Requests are served in submission order. Each returns a reply receiver
/// that yields exactly one result.
pub struct CatalogWorker {
    requests: Option<Sender<Request>>,
    handle: Option<JoinHandle<()>>,
    bus: NotificationBus,
}

impl CatalogWorker {
    pub fn spawn(config: StoreConfig) -> Result<Self, StorageError> {
        let catalog = Catalog::open(config)?;
        let bus = catalog.bus().clone();
        let (requests, inbox) = crossbeam_channel::unbounded();

        let handle = thread::Builder::new()
            .name("catalog-writer".into())
            .spawn(move || serve(catalog, inbox))
            .context("failed to spawn catalog writer thread")?;

        Ok(Self {
            requests: Some(requests),
            handle: Some(handle),
            bus,
        })
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        self.bus.subscribe()
    }

    pub fn ingest(
        &self,
        records: Vec<TrackRecord>,
        covers: CoverMap,
    ) -> Result<Reply<IngestReport>, StorageError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Request::Ingest {
            records,
            covers,
            reply,
        })?;
        Ok(rx)
    }

    pub fn remove(
        &self,
        locators: Vec<ResourceLocator>,
    ) -> Result<Reply<RemoveReport>, StorageError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Request::Remove { locators, reply })?;
        Ok(rx)
    }

    /// Finishes queued requests and joins the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, request: Request) -> Result<(), StorageError> {
        self.requests
            .as_ref()
            .ok_or(StorageError::WorkerGone)?
            .send(request)
            .map_err(|_| StorageError::WorkerGone)
    }

    fn stop(&mut self) {
        drop(self.requests.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("catalog writer thread panicked");
            }
        }
    }
}

impl Drop for CatalogWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(mut catalog: Catalog, inbox: Receiver<Request>) {
    info!("catalog writer for '{}' started", catalog.config().name);
    for request in inbox {
        match request {
            Request::Ingest {
                records,
                covers,
                reply,
            } => {
                let result = catalog.ingest_tracks(records, &covers);
                if let Err(e) = &result {
                    error!("ingest failed: {e}");
                }
                if reply.send(result).is_err() {
                    debug!("ingest reply dropped by caller");
                }
            }
            Request::Remove { locators, reply } => {
                let result = catalog.remove_tracks(&locators);
                if let Err(e) = &result {
                    error!("removal failed: {e}");
                }
                if reply.send(result).is_err() {
                    debug!("remove reply dropped by caller");
                }
            }
        }
    }
    info!("catalog writer for '{}' stopped", catalog.config().name);
}
