// Scrobble queue module
// Bounded, durable FIFO of scrobbles waiting to be delivered

use crate::player::TrackIdentity;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// A scrobble waiting for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrobbleRecord {
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub album: String,
    /// Unix timestamp of when playback started
    pub started_at: i64,
    #[serde(default)]
    pub duration_seconds: u64,
}

impl ScrobbleRecord {
    pub fn new(identity: &TrackIdentity, started_at: i64, duration_seconds: u64) -> Self {
        Self {
            artist: identity.artist.clone(),
            title: identity.title.clone(),
            album: identity.album.clone(),
            started_at,
            duration_seconds,
        }
    }
}

impl std::fmt::Display for ScrobbleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)?;
        if !self.album.is_empty() {
            write!(f, " [{}]", self.album)?;
        }
        write!(f, " @ {}", self.started_at)
    }
}

#[derive(Debug, Snafu)]
pub enum PersistenceError {
    #[snafu(display("Failed to create queue directory {}: {source}", path.display()))]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to serialize queue: {source}"))]
    Serialize { source: serde_json::Error },

    #[snafu(display("Failed to write queue file {}: {source}", path.display()))]
    Write { path: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to replace queue file {}: {source}", path.display()))]
    Rename { path: PathBuf, source: std::io::Error },
}

/// Durable backing for the queue: whole-state load and replace
pub trait QueueStore {
    /// Last saved records. A missing or unreadable store yields an empty list.
    fn load(&self) -> Vec<ScrobbleRecord>;

    /// Atomically replace the stored records
    fn save(&self, records: &[ScrobbleRecord]) -> Result<(), PersistenceError>;
}

/// JSON array on disk, replaced via write-to-temp-then-rename
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl QueueStore for JsonFileStore {
    fn load(&self) -> Vec<ScrobbleRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                log::warn!("Failed to read queue file {:?}, starting empty: {}", self.path, e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Queue file {:?} is corrupt, starting empty: {}", self.path, e);
                Vec::new()
            }
        }
    }

    fn save(&self, records: &[ScrobbleRecord]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })?;
        }

        let content = serde_json::to_vec(records).context(SerializeSnafu)?;
        let temp = self.temp_path();

        let mut file = fs::File::create(&temp).context(WriteSnafu { path: &temp })?;
        file.write_all(&content).context(WriteSnafu { path: &temp })?;
        file.sync_all().context(WriteSnafu { path: &temp })?;
        drop(file);

        fs::rename(&temp, &self.path).context(RenameSnafu { path: &self.path })?;
        Ok(())
    }
}

/// Bounded FIFO that evicts the oldest records when full.
///
/// Every mutation rewrites the store before returning. A failed write is
/// reported but the in-memory state keeps the mutation.
pub struct ScrobbleQueue<S: QueueStore> {
    store: S,
    records: VecDeque<ScrobbleRecord>,
    capacity: usize,
}

impl<S: QueueStore> ScrobbleQueue<S> {
    /// Load the last durable state, keeping only the newest `capacity` records
    pub fn open(store: S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut records: VecDeque<ScrobbleRecord> = store.load().into();
        if records.len() > capacity {
            let excess = records.len() - capacity;
            log::warn!(
                "Stored queue holds {} records, dropping {} oldest to fit capacity {}",
                records.len(),
                excess,
                capacity
            );
            records.drain(..excess);
        }

        Self {
            store,
            records,
            capacity,
        }
    }

    /// Append a record, evicting from the front when over capacity.
    /// Returns the occupancy ratio after the operation.
    pub fn enqueue(&mut self, record: ScrobbleRecord) -> Result<f64, PersistenceError> {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                log::warn!("Queue full, dropping oldest scrobble: {}", evicted);
            }
        }
        self.persist()?;
        Ok(self.occupancy())
    }

    /// Oldest record, without removing it
    pub fn front(&self) -> Option<&ScrobbleRecord> {
        self.records.front()
    }

    /// Remove and return the oldest record. Delivery is up to the caller.
    pub fn drain_one(&mut self) -> Result<Option<ScrobbleRecord>, PersistenceError> {
        let Some(record) = self.records.pop_front() else {
            return Ok(None);
        };
        self.persist()?;
        Ok(Some(record))
    }

    pub fn peek_all(&self) -> impl Iterator<Item = &ScrobbleRecord> {
        self.records.iter()
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn occupancy(&self) -> f64 {
        self.records.len() as f64 / self.capacity as f64
    }

    fn persist(&self) -> Result<(), PersistenceError> {
        let records: Vec<ScrobbleRecord> = self.records.iter().cloned().collect();
        self.store.save(&records)
    }
}
