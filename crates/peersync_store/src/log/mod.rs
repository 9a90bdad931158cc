//! Append-only key-value log.

mod entry;

pub use entry::{compute_crc32, LogEntry, LOG_MAGIC, LOG_VERSION};

use crate::error::{StoreError, StoreResult};
use entry::{decode_frame, Frame};
use peersync_storage::{InMemoryBackend, StorageBackend};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// What replaying a log on open found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Number of entries applied.
    pub entries: usize,
    /// Bytes of valid log.
    pub valid_bytes: u64,
    /// Bytes cut off a torn tail.
    pub truncated_bytes: u64,
}

/// Result of a compaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Live keys written to the new log.
    pub live_keys: usize,
}

/// An append-only, checksummed key-value log with an in-memory index.
///
/// Keys are grouped by namespace. Every mutation is appended and then
/// applied to the index, so the index never holds a change the log does
/// not. On open the whole log is replayed; a torn last entry is cut off,
/// damage anywhere else is reported as [`StoreError::Corrupted`].
pub struct KvLog {
    backend: Box<dyn StorageBackend>,
    index: BTreeMap<String, BTreeMap<String, String>>,
    replay: ReplayReport,
}

impl std::fmt::Debug for KvLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvLog")
            .field("namespaces", &self.index.len())
            .field("replay", &self.replay)
            .finish()
    }
}

impl KvLog {
    /// Opens a log over `backend`, replaying its content.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or an entry before
    /// the tail is damaged.
    pub fn open(mut backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        let data = backend.read_all()?;
        let mut index = BTreeMap::new();
        let mut offset = 0usize;
        let mut entries = 0usize;

        while offset < data.len() {
            match decode_frame(&data[offset..], offset as u64)? {
                Frame::Complete { entry, len } => {
                    apply(&mut index, entry);
                    entries += 1;
                    offset += len;
                }
                Frame::Incomplete => {
                    // a torn append is always the last frame in the log
                    if let Some(at) = intact_frame_after(&data, offset + 1) {
                        return Err(StoreError::corrupted(
                            offset as u64,
                            format!("frame runs past the end of the log but an intact entry follows at {at}"),
                        ));
                    }
                    break;
                }
                Frame::BadChecksum { len } => {
                    if offset + len < data.len() {
                        return Err(StoreError::corrupted(offset as u64, "checksum mismatch"));
                    }
                    break;
                }
            }
        }

        let truncated_bytes = (data.len() - offset) as u64;
        if truncated_bytes > 0 {
            warn!(
                offset,
                truncated_bytes, "cutting torn tail off key-value log"
            );
            backend.truncate(offset as u64)?;
        }
        debug!(entries, bytes = offset, "replayed key-value log");

        Ok(Self {
            backend,
            index,
            replay: ReplayReport {
                entries,
                valid_bytes: offset as u64,
                truncated_bytes,
            },
        })
    }

    /// Creates an empty log held in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(InMemoryBackend::new()),
            index: BTreeMap::new(),
            replay: ReplayReport::default(),
        }
    }

    /// Returns what the replay on open found.
    #[must_use]
    pub fn replay_report(&self) -> &ReplayReport {
        &self.replay
    }

    /// Returns the value stored for `key` in `namespace`.
    #[must_use]
    pub fn get(&self, namespace: &str, key: &str) -> Option<&str> {
        self.index
            .get(namespace)
            .and_then(|keys| keys.get(key))
            .map(String::as_str)
    }

    /// Returns true if `key` exists in `namespace`.
    #[must_use]
    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        self.get(namespace, key).is_some()
    }

    /// Iterates the keys of `namespace` in key order.
    pub fn iter(&self, namespace: &str) -> impl Iterator<Item = (&str, &str)> {
        self.index
            .get(namespace)
            .into_iter()
            .flat_map(|keys| keys.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Returns the number of keys in `namespace`.
    #[must_use]
    pub fn len(&self, namespace: &str) -> usize {
        self.index.get(namespace).map_or(0, BTreeMap::len)
    }

    /// Returns every namespace holding at least one key.
    #[must_use]
    pub fn namespaces(&self) -> Vec<&str> {
        self.index.keys().map(String::as_str).collect()
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be appended.
    pub fn put(&mut self, namespace: &str, key: &str, value: &str) -> StoreResult<()> {
        self.append(LogEntry::Put {
            namespace: namespace.to_owned(),
            key: key.to_owned(),
            value: value.to_owned(),
        })
    }

    /// Removes `key`. Returns false if it was not present (nothing is
    /// written in that case).
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be appended.
    pub fn delete(&mut self, namespace: &str, key: &str) -> StoreResult<bool> {
        if !self.contains(namespace, key) {
            return Ok(false);
        }
        self.append(LogEntry::Delete {
            namespace: namespace.to_owned(),
            key: key.to_owned(),
        })?;
        Ok(true)
    }

    /// Removes every key of `namespace` and returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be appended.
    pub fn clear(&mut self, namespace: &str) -> StoreResult<usize> {
        let dropped = self.len(namespace);
        self.append(LogEntry::Clear {
            namespace: namespace.to_owned(),
        })?;
        Ok(dropped)
    }

    /// Makes every appended entry durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend sync fails.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    /// Returns the current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn size(&self) -> StoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Rewrites the log so it holds one `Put` per live key.
    ///
    /// # Errors
    ///
    /// Returns an error if the new image cannot be encoded or installed.
    /// The old log is untouched in that case.
    pub fn compact(&mut self) -> StoreResult<CompactionStats> {
        let bytes_before = self.backend.size()?;
        let mut image = Vec::new();
        let mut live_keys = 0usize;

        for (namespace, keys) in &self.index {
            for (key, value) in keys {
                let entry = LogEntry::Put {
                    namespace: namespace.clone(),
                    key: key.clone(),
                    value: value.clone(),
                };
                image.extend_from_slice(&entry.encode_frame()?);
                live_keys += 1;
            }
        }

        self.backend.rewrite(&image)?;
        let bytes_after = image.len() as u64;
        debug!(bytes_before, bytes_after, live_keys, "compacted key-value log");

        Ok(CompactionStats {
            bytes_before,
            bytes_after,
            live_keys,
        })
    }

    fn append(&mut self, entry: LogEntry) -> StoreResult<()> {
        let frame = entry.encode_frame()?;
        self.backend.append(&frame)?;
        self.backend.flush()?;
        apply(&mut self.index, entry);
        Ok(())
    }
}

fn apply(index: &mut BTreeMap<String, BTreeMap<String, String>>, entry: LogEntry) {
    match entry {
        LogEntry::Put {
            namespace,
            key,
            value,
        } => {
            index.entry(namespace).or_default().insert(key, value);
        }
        LogEntry::Delete { namespace, key } => {
            if let Some(keys) = index.get_mut(&namespace) {
                keys.remove(&key);
                if keys.is_empty() {
                    index.remove(&namespace);
                }
            }
        }
        LogEntry::Clear { namespace } => {
            index.remove(&namespace);
        }
    }
}

/// Finds the first offset at or after `from` where a whole, valid frame
/// starts.
fn intact_frame_after(data: &[u8], from: usize) -> Option<usize> {
    (from..data.len()).find(|&at| {
        data[at..].starts_with(&LOG_MAGIC)
            && matches!(
                decode_frame(&data[at..], at as u64),
                Ok(Frame::Complete { .. })
            )
    })
}
