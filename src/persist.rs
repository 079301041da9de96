// Persistent store facade
//
// The durable triple (currentTerm, votedFor, log) must survive a crash and
// restart. This module owns the encoding of that triple and defines the
// `Persister` trait at the seam to the storage backend; the backend itself
// is otherwise out of scope for the consensus core.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::error::{RaftError, Result};
use crate::log::Log;
use crate::state::{PeerIndex, Term};

/// The durable triple, encoded as a single opaque blob by `Persister::save`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, bincode::Encode, bincode::Decode)]
pub struct PersistentState {
    pub current_term: Term,
    pub voted_for: Option<PeerIndex>,
    pub log: Log,
}

impl PersistentState {
    pub fn new() -> Self {
        Self {
            current_term: 0,
            voted_for: None,
            log: Log::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .expect("PersistentState encoding is infallible")
    }

    pub fn decode(blob: &[u8]) -> Result<Self> {
        bincode::decode_from_slice(blob, bincode::config::standard())
            .map(|(state, _)| state)
            .map_err(|e| RaftError::Corrupt(e.to_string()))
    }
}

impl Default for PersistentState {
    fn default() -> Self {
        Self::new()
    }
}

/// Atomically replaces a single opaque blob and returns the last-saved one
/// on restart. The consensus core never inspects the blob's bytes itself;
/// `PersistentState::encode`/`decode` own that.
#[async_trait]
pub trait Persister: Send + Sync {
    async fn save(&self, blob: Vec<u8>) -> Result<()>;

    async fn load(&self) -> Result<Option<Vec<u8>>>;
}

/// In-memory `Persister`, used by tests and the demo binary. Surviving a
/// "restart" means constructing a new peer against the *same* `Arc` of this
/// persister, not a fresh one.
#[derive(Default)]
pub struct MemoryPersister {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persister for MemoryPersister {
    async fn save(&self, blob: Vec<u8>) -> Result<()> {
        *self.blob.lock() = Some(blob);
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.blob.lock().clone())
    }
}

/// Crash-safe file-based `Persister`: writes to a sibling temp file, fsyncs
/// it, then renames over the target. The rename is atomic on the same
/// filesystem, so a crash mid-write never leaves a half-written blob in
/// place of the last good one.
pub struct FilePersister {
    path: PathBuf,
}

impl FilePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone();
        let mut name = tmp
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        tmp.set_file_name(name);
        tmp
    }
}

#[async_trait]
impl Persister for FilePersister {
    async fn save(&self, blob: Vec<u8>) -> Result<()> {
        let tmp_path = self.tmp_path();
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&blob).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
