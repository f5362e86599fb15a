//! Embedded music catalog store.
//!
//! The [`storage::catalog::Catalog`] persists tracks and the albums, artists and
//! genres derived from them. Every completed write publishes typed
//! [`notify::Notification`]s which [`projection::ListProjection`] turns into
//! bracketed row events for a UI model.

pub mod config;
pub mod domain;
pub mod notify;
pub mod projection;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
