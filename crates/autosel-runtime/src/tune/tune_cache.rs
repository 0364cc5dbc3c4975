use hashbrown::HashMap;

use super::AutotuneKey;

#[cfg(feature = "autotune-cache")]
use serde::{Deserialize, Serialize};

/// In-memory cache entry.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    #[cfg(feature = "autotune-cache")]
    checksum_checked: bool,
    fastest_index: usize,
}

/// Persistent cache entry.
#[cfg(feature = "autotune-cache")]
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistentCacheEntry {
    checksum: String,
    fastest_index: usize,
}

/// Used to find and reuse the winning choice for a previously tuned key.
#[derive(Debug)]
pub(crate) struct TuneCache<K> {
    in_memory_cache: HashMap<K, CacheEntry>,
    #[cfg(feature = "autotune-cache")]
    persistent_cache: HashMap<K, PersistentCacheEntry>,
    #[cfg(feature = "autotune-cache")]
    name: String,
    #[cfg(feature = "autotune-cache")]
    device_id: String,
}

/// Result of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneCacheResult {
    /// A winner is known.
    Hit {
        /// The index of the fastest choice to execute.
        fastest_index: usize,
    },
    /// No winner is known yet.
    Miss,
    /// A persisted winner exists, but its checksum has not been validated
    /// against the current choice set.
    #[cfg(feature = "autotune-cache")]
    Unchecked,
}

impl<K: AutotuneKey> TuneCache<K> {
    pub(crate) fn new(
        #[cfg_attr(not(feature = "autotune-cache"), allow(unused_variables))] name: &str,
        #[cfg_attr(not(feature = "autotune-cache"), allow(unused_variables))] device_id: &str,
    ) -> Self {
        #[cfg(feature = "autotune-cache")]
        {
            let mut cache = TuneCache {
                in_memory_cache: HashMap::new(),
                persistent_cache: HashMap::new(),
                name: name.to_string(),
                device_id: device_id.to_string(),
            };
            if let Err(err) = cache.load() {
                log::warn!("Unable to load autotune cache. Cache will be ignored ({err}).");
            }
            cache
        }

        #[cfg(not(feature = "autotune-cache"))]
        {
            TuneCache {
                in_memory_cache: HashMap::new(),
            }
        }
    }

    pub(crate) fn fastest(&self, key: &K) -> TuneCacheResult {
        let entry = match self.in_memory_cache.get(key) {
            Some(entry) => entry,
            None => return TuneCacheResult::Miss,
        };

        #[cfg(feature = "autotune-cache")]
        if !entry.checksum_checked {
            return TuneCacheResult::Unchecked;
        }

        TuneCacheResult::Hit {
            fastest_index: entry.fastest_index,
        }
    }

    /// Validate an unchecked persisted entry against the checksum of the
    /// current choice set, returning a hit only when they match.
    #[cfg(feature = "autotune-cache")]
    pub(crate) fn fastest_with_checksum(&mut self, key: &K, checksum: &str) -> TuneCacheResult {
        let entry = match self.in_memory_cache.get_mut(key) {
            Some(entry) => entry,
            None => return TuneCacheResult::Miss,
        };

        if !entry.checksum_checked {
            let persistent_entry = self
                .persistent_cache
                .get(key)
                .expect("Both caches should be in sync");
            if checksum != persistent_entry.checksum {
                return TuneCacheResult::Miss;
            }
            entry.checksum_checked = true;
        }

        TuneCacheResult::Hit {
            fastest_index: entry.fastest_index,
        }
    }

    pub(crate) fn cache_insert(&mut self, key: K, fastest_index: usize) {
        self.in_memory_cache.insert(
            key,
            CacheEntry {
                #[cfg(feature = "autotune-cache")]
                checksum_checked: true,
                fastest_index,
            },
        );
    }
}

#[cfg(feature = "autotune-cache")]
impl<K: AutotuneKey> TuneCache<K> {
    pub(crate) fn persistent_cache_insert(
        &mut self,
        key: K,
        checksum: String,
        fastest_index: usize,
    ) {
        self.persistent_cache.insert(
            key,
            PersistentCacheEntry {
                checksum,
                fastest_index,
            },
        );
    }

    /// Load the persistent cache data from disk.
    pub(crate) fn load(&mut self) -> Result<(), std::io::Error> {
        let file_path = self.cache_file_path();
        // Reading the whole file into memory is faster than a buffered
        // serde reader here.
        match std::fs::read_to_string(file_path) {
            Ok(data) => {
                let data: Vec<(K, PersistentCacheEntry)> = serde_json::from_str(&data)?;
                for (key, value) in data.into_iter() {
                    self.persistent_cache.insert(key, value);
                }
                Ok(())
            }
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }?;

        for (key, entry) in self.persistent_cache.iter() {
            self.in_memory_cache.insert(
                key.clone(),
                CacheEntry {
                    checksum_checked: false,
                    fastest_index: entry.fastest_index,
                },
            );
        }
        Ok(())
    }

    /// Save the persistent cache to disk.
    pub(crate) fn save(&self) -> Result<(), std::io::Error> {
        let file_path = self.cache_file_path();
        if let Some(parent_dir) = file_path.parent() {
            std::fs::create_dir_all(parent_dir)?;
        }
        let file = std::fs::File::create(&file_path)?;
        let data = self.persistent_cache.iter().collect::<Vec<_>>();
        serde_json::to_writer_pretty(file, &data)?;
        Ok(())
    }

    /// File path of the persistent cache for this tuner.
    pub(crate) fn cache_file_path(&self) -> std::path::PathBuf {
        let config = crate::config::GlobalConfig::get();
        let name = sanitize_filename::sanitize(&self.name);
        let device_id = sanitize_filename::sanitize(&self.device_id);
        config
            .autotune
            .cache
            .root()
            .join("autotune")
            .join(format!("{name}-{device_id}.json"))
    }
}
