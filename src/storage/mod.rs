pub mod catalog;
pub mod db;
pub mod error;
pub mod queries;
pub mod report;
pub(crate) mod schema;
mod upsert;
pub mod worker;

pub use catalog::{Catalog, RevisionCheck};
pub use error::StorageError;
pub use report::{IngestReport, ItemOutcome, Rejection, RemoveReport};
pub use worker::CatalogWorker;
