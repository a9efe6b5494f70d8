//! # Statistics File Storage
//!
//! Loads and saves the persisted symbol statistics.
//!
//! - Load maps the file read-only under a shared advisory lock and merges
//!   matching entries into the registry. Any failure leaves the registry
//!   untouched.
//! - Save writes `<file>.new`, created exclusively, then renames it over the
//!   target. If the temporary file already exists another process is saving
//!   and this writer gives up.

use crate::formats::{PersistedStats, StatsSnapshot, stats_from_bytes, stats_to_bytes};
use crate::primitives::{STATS_HEADER_SIZE, TEMP_FILE_SUFFIX};
use crate::registry::Symcache;
use crate::types::{ItemId, SymcacheError};
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// What a successful load merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    /// Entries that matched a registered symbol.
    pub matched: usize,
    /// Entries for symbols that are no longer registered.
    pub ignored: usize,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SymcacheError + '_ {
    move |e| SymcacheError::Io {
        path: path.to_path_buf(),
        cause: e.to_string(),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TEMP_FILE_SUFFIX);
    PathBuf::from(name)
}

/// Map a statistics file read-only. The only unsafe code in the crate.
#[allow(unsafe_code)]
fn map_read_only(file: &File) -> std::io::Result<Mmap> {
    // SAFETY: the map is read-only and dropped before the caller returns;
    // writers never modify the file in place, they rename a new one over it.
    unsafe { Mmap::map(file) }
}

/// Take a shared advisory lock without waiting for a writer to finish.
fn lock_for_read(file: &File, path: &Path) -> Result<(), SymcacheError> {
    fs2::FileExt::try_lock_shared(file).map_err(|e| {
        if e.kind() == ErrorKind::WouldBlock {
            SymcacheError::Io {
                path: path.to_path_buf(),
                cause: "locked by another process".to_string(),
            }
        } else {
            io_error(path)(e)
        }
    })
}

/// Read and decode a statistics file.
pub fn read_snapshot(path: &Path) -> Result<StatsSnapshot, SymcacheError> {
    let file = File::open(path).map_err(io_error(path))?;
    lock_for_read(&file, path)?;

    let size = file.metadata().map_err(io_error(path))?.len() as usize;
    if size < STATS_HEADER_SIZE {
        return Err(SymcacheError::Truncated {
            path: path.to_path_buf(),
            size,
        });
    }

    let map = map_read_only(&file).map_err(io_error(path))?;
    stats_from_bytes(&map, path)
}

/// Decode a statistics file for display.
pub fn inspect(path: impl AsRef<Path>) -> Result<StatsSnapshot, SymcacheError> {
    read_snapshot(path.as_ref())
}

impl Symcache {
    /// Merge statistics from the configured stats file.
    ///
    /// Time, hit count and frequency are restored; weight always comes from
    /// the current configuration. Virtual symbols take their parent's time
    /// and may raise the parent's weight.
    pub fn load_items(&mut self) -> Result<LoadSummary, SymcacheError> {
        let _span = self.span.clone().entered();
        let path = self
            .config
            .cache_filename
            .clone()
            .ok_or(SymcacheError::NoCacheFile)?;

        let snapshot = read_snapshot(&path).inspect_err(|e| info!("{}", e))?;
        let summary = self.apply_snapshot(&snapshot);

        info!(
            "loaded statistics for {} symbols from {:?} ({} unknown)",
            summary.matched, path, summary.ignored
        );
        Ok(summary)
    }

    fn apply_snapshot(&mut self, snapshot: &StatsSnapshot) -> LoadSummary {
        // Totals describe the last loaded file, not the sum of all loads.
        self.total_weight = 0.0;
        self.total_hits = 0;

        let mut summary = LoadSummary::default();
        let mut matched: Vec<ItemId> = Vec::with_capacity(snapshot.len());

        for (name, entry) in snapshot {
            let Some(&id) = self.items_by_symbol.get(name) else {
                trace!("ignore statistics for unknown symbol {}", name);
                summary.ignored += 1;
                continue;
            };
            let Some(item) = self.item_mut(id) else {
                continue;
            };

            if let Some(time) = entry.time {
                item.stats.avg_time = time;
            }
            if let Some(count) = entry.count {
                item.stats.total_hits = count;
                item.stats.last_count = count;
            }
            if let Some(avg) = entry.frequency_avg {
                item.stats.avg_frequency = avg;
            }
            if let Some(stddev) = entry.frequency_stddev {
                item.stats.stddev_frequency = stddev;
            }

            matched.push(id);
            summary.matched += 1;
        }

        // Aliases are timed as their parent and never weigh less than it.
        for &id in &matched {
            let Some(item) = self.items_by_id.get(id.index()) else {
                continue;
            };
            if !item.is_virtual() || item.is_ghost() {
                continue;
            }
            let weight = item.stats.weight;
            let Some(parent) = item.get_parent(self).map(|parent| parent.id) else {
                continue;
            };

            let Some(parent) = self.item_mut(parent) else {
                continue;
            };
            if parent.stats.weight < weight {
                parent.stats.weight = weight;
            }
            let avg_time = parent.stats.avg_time;
            if let Some(item) = self.item_mut(id) {
                item.stats.avg_time = avg_time;
            }
        }

        for &id in &matched {
            if let Some(item) = self.items_by_id.get(id.index()) {
                self.total_weight += item.stats.weight.abs();
                self.total_hits = self.total_hits.saturating_add(item.stats.total_hits);
            }
        }

        summary
    }

    /// Persist the statistics of every registered symbol, aliases included.
    pub fn save_items(&self) -> Result<(), SymcacheError> {
        let _span = self.span.clone().entered();
        let path = self
            .config
            .cache_filename
            .as_deref()
            .ok_or(SymcacheError::NoCacheFile)?;

        let entries: BTreeMap<String, PersistedStats> = self
            .items_by_symbol
            .iter()
            .filter_map(|(name, id)| {
                self.items_by_id
                    .get(id.index())
                    .map(|item| (name.clone(), PersistedStats::from_stats(&item.stats)))
            })
            .collect();
        let bytes = stats_to_bytes(&entries)?;

        let tmp = temp_path(path);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&tmp) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("{:?} exists, another process is saving statistics", tmp);
                return Err(SymcacheError::SaveInProgress(path.to_path_buf()));
            }
            Err(e) => {
                let err = io_error(&tmp)(e);
                info!("{}", err);
                return Err(err);
            }
        };

        let written = file.write_all(&bytes).and_then(|()| file.sync_all());
        drop(file);
        let written = written.and_then(|()| fs::rename(&tmp, path));

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            let err = io_error(path)(e);
            info!("{}", err);
            return Err(err);
        }

        debug!("saved statistics for {} symbols to {:?}", entries.len(), path);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
