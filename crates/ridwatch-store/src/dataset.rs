//! Directory-of-scenarios datasets.
//!
//! A dataset is a directory of scenario CSVs, read in sorted file-name order
//! so train/test splits and limits are reproducible. Files are independent
//! and are parsed in parallel.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::info;

use ridwatch_core::error::{EngineError, EngineResult};

use crate::reader::LoadStats;
use crate::store::EventStore;

/// Sorted `*.csv` paths in `dir`, truncated to `limit`.
pub fn list_scenarios(dir: &Path, limit: Option<usize>) -> EngineResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|source| EngineError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| EngineError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            paths.push(path);
        }
    }
    paths.sort();

    if let Some(limit) = limit {
        paths.truncate(limit);
    }
    Ok(paths)
}

/// Load every scenario in `dir`. Any unreadable file fails the whole load.
pub fn load_dataset(dir: &Path, limit: Option<usize>) -> EngineResult<Vec<EventStore>> {
    let paths = list_scenarios(dir, limit)?;
    let stores = paths
        .par_iter()
        .map(|path| EventStore::load(path))
        .collect::<EngineResult<Vec<_>>>()?;

    let stats = combined_stats(&stores);
    info!(
        dir = %dir.display(),
        scenarios = stores.len(),
        rx_rows = stats.rx_rows,
        dropped = stats.dropped_total(),
        "loaded dataset"
    );
    Ok(stores)
}

/// Load statistics summed over a dataset.
pub fn combined_stats(stores: &[EventStore]) -> LoadStats {
    let mut total = LoadStats::default();
    for store in stores {
        total.merge(store.stats());
    }
    total
}
