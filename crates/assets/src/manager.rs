//! The asset manager
//!
//! Owns the shared registry reference and the local copies of every
//! enrichment asset. Fetches everything once before the pipeline starts
//! (fatal on failure), then refreshes on a long period in the background.
//! A refresh that finds changed content performs the coherent swap
//! described in [`crate::gate`]; a refresh that fails anywhere is
//! abandoned whole and the previous registry stays in service.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sluice_config::{AssetsConfig, EnrichmentConfig};
use sluice_enrich::{build_registry, configured_asset_uris, AssetPaths, SharedRegistry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AssetClient, AssetError, FetchedAsset, PauseGate};

/// One installed asset.
#[derive(Debug, Clone)]
struct AssetEntry {
    path: PathBuf,
    hash: String,
}

/// Handle for forcing a refresh outside the periodic schedule.
pub struct RefreshHandle {
    trigger: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Request an immediate refresh. Returns false if the manager is gone
    /// or a trigger is already queued.
    pub fn trigger_refresh(&self) -> bool {
        self.trigger.try_send(()).is_ok()
    }
}

pub struct AssetManager {
    client: AssetClient,
    enrichment_configs: Vec<EnrichmentConfig>,
    registry: SharedRegistry,
    gate: Arc<PauseGate>,
    directory: PathBuf,
    update_period: Duration,
    state: HashMap<(String, String), AssetEntry>,
    trigger_rx: mpsc::Receiver<()>,
}

impl AssetManager {
    pub fn new(
        config: &AssetsConfig,
        enrichment_configs: Vec<EnrichmentConfig>,
        registry: SharedRegistry,
        gate: Arc<PauseGate>,
    ) -> Result<(Self, RefreshHandle), AssetError> {
        let client = AssetClient::new(&config.directory, config.fetch_timeout)?;
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        let manager = Self {
            client,
            enrichment_configs,
            registry,
            gate,
            directory: config.directory.clone(),
            update_period: config.update_period,
            state: HashMap::new(),
            trigger_rx,
        };

        Ok((manager, RefreshHandle { trigger: trigger_tx }))
    }

    /// Fetch every configured asset and build the first registry.
    ///
    /// Called before the pipeline starts; any failure here is fatal.
    pub async fn initial_load(&mut self) -> Result<(), AssetError> {
        let uris = configured_asset_uris(&self.enrichment_configs);

        for (kind, uri) in &uris {
            let fetched = self.client.fetch(uri).await?;
            let dest = self.asset_path(kind, uri);
            self.client.install(&fetched, &dest).await?;
            self.state.insert(
                (kind.clone(), uri.clone()),
                AssetEntry {
                    path: dest,
                    hash: fetched.hash,
                },
            );
        }

        let registry = build_registry(&self.enrichment_configs, &self.asset_paths())?;
        info!(
            assets = uris.len(),
            enrichments = ?registry.names(),
            "initial asset load complete"
        );
        self.registry.store(Arc::new(registry));
        Ok(())
    }

    /// Periodic refresh loop. Spawn as a task after `initial_load`.
    pub async fn run(mut self, cancel: CancellationToken) {
        if configured_asset_uris(&self.enrichment_configs).is_empty() {
            debug!("no enrichment assets configured, refresh loop idle");
            cancel.cancelled().await;
            return;
        }

        // First periodic refresh one full period from now; initial load
        // already fetched everything.
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.update_period,
            self.update_period,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            period_secs = self.update_period.as_secs(),
            "asset refresh loop started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("asset refresh loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                Some(()) = self.trigger_rx.recv() => {
                    debug!("manual asset refresh triggered");
                    self.refresh().await;
                }
            }
        }
    }

    /// One refresh cycle: fetch all, swap if anything changed.
    ///
    /// Visible for tests; production refreshes go through [`Self::run`].
    pub async fn refresh(&mut self) {
        let uris = configured_asset_uris(&self.enrichment_configs);

        // Fetch everything first. Any failure abandons the whole cycle
        // before the gate is touched.
        let mut fetched: Vec<((String, String), FetchedAsset)> = Vec::with_capacity(uris.len());
        for (kind, uri) in uris {
            match self.client.fetch(&uri).await {
                Ok(asset) => fetched.push(((kind, uri), asset)),
                Err(e) => {
                    warn!(
                        uri = %uri,
                        error = %e,
                        "asset refresh abandoned, keeping previous registry"
                    );
                    self.client.clean_temp().await;
                    return;
                }
            }
        }

        let changed: Vec<&((String, String), FetchedAsset)> = fetched
            .iter()
            .filter(|(key, asset)| {
                self.state
                    .get(key)
                    .map(|entry| entry.hash != asset.hash)
                    .unwrap_or(true)
            })
            .collect();

        if changed.is_empty() {
            debug!("asset refresh found no changes");
            self.client.clean_temp().await;
            return;
        }

        let changed_uris: Vec<&str> = changed.iter().map(|((_, uri), _)| uri.as_str()).collect();
        info!(changed = ?changed_uris, "assets changed, swapping registry");

        // Coherent swap: no new records enter enrich, in-flight calls
        // finish, then the registry is rebuilt and replaced.
        self.gate.pause();
        self.gate.drain().await;
        let swapped = self.install_and_swap(fetched).await;
        self.gate.resume();

        match swapped {
            Ok(()) => {
                self.client.clean_temp().await;
                info!("registry swap complete");
            }
            Err(e) => {
                // State hashes were not updated, so the next cycle
                // detects the same change and retries.
                warn!(error = %e, "registry rebuild failed, keeping previous registry");
                self.client.clean_temp().await;
            }
        }
    }

    async fn install_and_swap(
        &mut self,
        fetched: Vec<((String, String), FetchedAsset)>,
    ) -> Result<(), AssetError> {
        let mut installed: Vec<((String, String), AssetEntry)> = Vec::with_capacity(fetched.len());

        for ((kind, uri), asset) in fetched {
            let dest = self.asset_path(&kind, &uri);
            let hash = asset.hash.clone();
            self.client.install(&asset, &dest).await?;
            installed.push(((kind, uri), AssetEntry { path: dest, hash }));
        }

        let mut paths = self.asset_paths();
        for (key, entry) in &installed {
            paths.insert(key.clone(), entry.path.clone());
        }

        let registry = build_registry(&self.enrichment_configs, &paths)?;
        self.registry.store(Arc::new(registry));

        for (key, entry) in installed {
            self.state.insert(key, entry);
        }
        Ok(())
    }

    /// Remove the managed asset directory. Called once at shutdown, after
    /// the refresh loop has stopped.
    pub async fn unload(directory: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(directory).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    directory = %directory.display(),
                    error = %e,
                    "failed to remove asset directory"
                );
            }
        }
    }

    fn asset_path(&self, kind: &str, uri: &str) -> PathBuf {
        let file_name = uri
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("asset");
        self.directory.join(kind).join(file_name)
    }

    fn asset_paths(&self) -> AssetPaths {
        self.state
            .iter()
            .map(|(key, entry)| (key.clone(), entry.path.clone()))
            .collect()
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
