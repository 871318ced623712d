//! Sluice - Asset Manager
//!
//! Enrichments may depend on remote files (lookup databases, scripts).
//! This crate owns their lifecycle:
//!
//! 1. **Initial load** - every configured asset is fetched before the
//!    pipeline starts; any failure aborts startup
//! 2. **Periodic refresh** - a background task re-fetches every asset on a
//!    long period and compares content hashes
//! 3. **Coherent swap** - when anything changed, the manager pauses record
//!    intake, drains in-flight enrich calls, rebuilds the registry against
//!    the new files, swaps the shared snapshot atomically, and resumes
//!
//! The [`PauseGate`] is the coordination point with the enrich stage: the
//! pipeline enters the gate per record, the manager pauses and drains it
//! around a swap. Reads of the registry itself stay lock-free.

mod client;
mod error;
mod gate;
mod manager;

pub use client::{AssetClient, FetchedAsset};
pub use error::AssetError;
pub use gate::{InFlightGuard, PauseGate};
pub use manager::{AssetManager, RefreshHandle};
