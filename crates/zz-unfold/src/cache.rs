//! Caching of unfolded results keyed by (channel, variable, systematic).
//!
//! The cache is dependency-injected into the driver: an in-memory map,
//! optionally backed by a directory of JSON files so that reruns skip the
//! expensive response-matrix and unfolding work. A persisted result is
//! only trusted when it parses cleanly and its binning matches the
//! requested one; anything else is recomputed and rewritten. A `force`
//! flag bypasses reads entirely while still refreshing the store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};
use zz_core::{Binning, Channel, Result};

use crate::bayes::UnfoldedResult;

/// Cache key: one unfolded result per (channel, variable, systematic).
/// The nominal result uses an empty systematic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    /// The channel.
    pub channel: Channel,
    /// Variable name (e.g. "Mass", "Pt").
    pub variable: String,
    /// Systematic name, empty for nominal.
    pub systematic: String,
}

impl ResultKey {
    /// Key for the nominal result.
    pub fn nominal(channel: Channel, variable: impl Into<String>) -> ResultKey {
        ResultKey { channel, variable: variable.into(), systematic: String::new() }
    }

    /// Key for one systematic variation.
    pub fn systematic(
        channel: Channel,
        variable: impl Into<String>,
        systematic: impl Into<String>,
    ) -> ResultKey {
        ResultKey { channel, variable: variable.into(), systematic: systematic.into() }
    }

    fn file_name(&self) -> String {
        let syst = if self.systematic.is_empty() { "nominal" } else { &self.systematic };
        format!("{}_{}_{}.json", self.channel, self.variable, syst)
    }
}

/// In-memory result cache with optional file-backed persistence.
#[derive(Debug, Default)]
pub struct ResultCache {
    memory: HashMap<ResultKey, UnfoldedResult>,
    store_dir: Option<PathBuf>,
    force: bool,
}

impl ResultCache {
    /// Purely in-memory cache.
    pub fn in_memory() -> ResultCache {
        ResultCache::default()
    }

    /// Cache persisting results as JSON files under `dir`.
    pub fn with_store(dir: impl Into<PathBuf>) -> ResultCache {
        ResultCache { store_dir: Some(dir.into()), ..ResultCache::default() }
    }

    /// Ignore all cached entries on read; recomputed results still update
    /// the cache and the store.
    pub fn force_recompute(mut self, force: bool) -> ResultCache {
        self.force = force;
        self
    }

    /// Number of in-memory entries.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Whether the in-memory cache is empty.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Fetch the result for `key`, computing it on a miss.
    ///
    /// Lookup order: in-memory map, then the file store (accepted only when
    /// the persisted binning equals `binning`), then `compute`. Computed
    /// results are cached in memory and, when a store is configured,
    /// written back; a write failure is logged and does not fail the call.
    pub fn get_or_compute(
        &mut self,
        key: &ResultKey,
        binning: &Binning,
        compute: impl FnOnce() -> Result<UnfoldedResult>,
    ) -> Result<UnfoldedResult> {
        if !self.force {
            if let Some(hit) = self.memory.get(key) {
                if hit.binning() == binning {
                    debug!(?key, "cache hit (memory)");
                    return Ok(hit.clone());
                }
            }
            if let Some(loaded) = self.load_from_store(key) {
                if loaded.binning() == binning {
                    debug!(?key, "cache hit (store)");
                    self.memory.insert(key.clone(), loaded.clone());
                    return Ok(loaded);
                }
                debug!(?key, "stored result has stale binning; recomputing");
            }
        }

        let result = compute()?;
        self.persist(key, &result);
        self.memory.insert(key.clone(), result.clone());
        Ok(result)
    }

    /// Drop every cached result for one (channel, variable), in memory and
    /// in the store. Store files are matched by name, so results persisted
    /// by an earlier run are removed even when this cache never loaded them.
    pub fn invalidate(&mut self, channel: Channel, variable: &str) {
        self.memory.retain(|k, _| k.channel != channel || k.variable != variable);
        let Some(dir) = &self.store_dir else { return };
        let prefix = format!("{channel}_{variable}_");
        let Ok(entries) = std::fs::read_dir(dir) else { return };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) && name.ends_with(".json") {
                // missing files are fine
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }

    fn load_from_store(&self, key: &ResultKey) -> Option<UnfoldedResult> {
        let dir = self.store_dir.as_ref()?;
        let path = dir.join(key.file_name());
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(result) => Some(result),
            Err(err) => {
                // partial or corrupt write, fall through to recompute
                warn!(?key, %err, "discarding unreadable stored result");
                None
            }
        }
    }

    fn persist(&self, key: &ResultKey, result: &UnfoldedResult) {
        let Some(dir) = &self.store_dir else { return };
        let write = || -> Result<()> {
            std::fs::create_dir_all(dir)?;
            let text = serde_json::to_string(result)?;
            std::fs::write(dir.join(key.file_name()), text)?;
            Ok(())
        };
        if let Err(err) = write() {
            warn!(?key, %err, "failed to persist unfolded result");
        }
    }
}
