//! One-file-per-entry cache store.
//!
//! Each entry lives at `<dir>/<message id>.cbor`. Writes are queued to a
//! background task so the state task never blocks on disk; the queue is
//! FIFO, so the last write issued for an id is the one left on disk.
//!
//! # Crash Safety
//!
//! Records are written to `<id>.cbor.tmp` and renamed into place. A crash
//! leaves either the old record or the new one, plus possibly a stray
//! temporary file that the next [`load`](CacheStore::load) removes.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::sync::{mpsc, oneshot};

use super::{CacheStore, MessageId, StoreError, StoredMessage};

const RECORD_EXTENSION: &str = "cbor";
const TEMP_EXTENSION: &str = "tmp";

enum DiskOp {
    Write { id: MessageId, bytes: Vec<u8> },
    Remove { id: MessageId },
    Flush(oneshot::Sender<()>),
}

/// Filesystem-backed [`CacheStore`].
pub struct FileStore {
    dir: PathBuf,
    queue: mpsc::UnboundedSender<DiskOp>,
}

impl FileStore {
    /// Open (creating if needed) a cache directory and start its writer.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` if the directory cannot be created
    /// - `StoreError::NoRuntime` outside a Tokio runtime
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let (queue, ops) = mpsc::unbounded_channel();
        runtime.spawn(run_writer(dir.clone(), ops));

        tracing::debug!(dir = %dir.display(), "cache store opened");
        Ok(Self { dir, queue })
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn enqueue(&self, op: DiskOp) -> Result<(), StoreError> {
        self.queue.send(op).map_err(|_| StoreError::WriterClosed)
    }
}

impl CacheStore for FileStore {
    fn load(&mut self) -> Result<Vec<(MessageId, StoredMessage)>, StoreError> {
        let mut records = Vec::new();

        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            let extension = path.extension().and_then(|e| e.to_str());

            if extension == Some(TEMP_EXTENSION) {
                tracing::debug!(path = %path.display(), "removing interrupted cache write");
                remove_quietly(&path);
                continue;
            }
            if extension != Some(RECORD_EXTENSION) {
                continue;
            }

            let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse().ok())
            else {
                tracing::warn!(path = %path.display(), "skipping cache file with invalid name");
                continue;
            };

            match read_record(&path) {
                Ok(record) => records.push((id, record)),
                Err(error) => {
                    tracing::warn!(%id, %error, "dropping unreadable cache record");
                    remove_quietly(&path);
                },
            }
        }

        Ok(records)
    }

    fn save(&mut self, id: MessageId, record: &StoredMessage) -> Result<(), StoreError> {
        let mut bytes = Vec::with_capacity(record.raw_bytes.len() + 32);
        ciborium::into_writer(record, &mut bytes).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.enqueue(DiskOp::Write { id, bytes })
    }

    fn delete(&mut self, id: MessageId) -> Result<(), StoreError> {
        self.enqueue(DiskOp::Remove { id })
    }

    fn flush(&self) -> Option<oneshot::Receiver<()>> {
        let (done, wait) = oneshot::channel();
        match self.enqueue(DiskOp::Flush(done)) {
            Ok(()) => Some(wait),
            Err(_) => None,
        }
    }
}

fn record_path(dir: &Path, id: MessageId) -> PathBuf {
    dir.join(format!("{id}.{RECORD_EXTENSION}"))
}

fn read_record(path: &Path) -> Result<StoredMessage, StoreError> {
    let bytes = fs::read(path)?;
    ciborium::from_reader(bytes.as_slice()).map_err(|e| StoreError::Decode(e.to_string()))
}

fn remove_quietly(path: &Path) {
    if let Err(error) = fs::remove_file(path) {
        if error.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), %error, "failed to remove cache file");
        }
    }
}

async fn run_writer(dir: PathBuf, mut ops: mpsc::UnboundedReceiver<DiskOp>) {
    while let Some(op) = ops.recv().await {
        match op {
            DiskOp::Write { id, bytes } => {
                if let Err(error) = write_record(&dir, id, &bytes).await {
                    tracing::error!(%id, %error, "failed to persist cache record");
                }
            },
            DiskOp::Remove { id } => match tokio::fs::remove_file(record_path(&dir, id)).await {
                Ok(()) => {},
                Err(error) if error.kind() == ErrorKind::NotFound => {},
                Err(error) => tracing::error!(%id, %error, "failed to delete cache record"),
            },
            DiskOp::Flush(done) => {
                let _ = done.send(());
            },
        }
    }
    tracing::debug!(dir = %dir.display(), "cache writer stopped");
}

async fn write_record(dir: &Path, id: MessageId, bytes: &[u8]) -> std::io::Result<()> {
    let path = record_path(dir, id);
    let temp = path.with_extension(format!("{RECORD_EXTENSION}.{TEMP_EXTENSION}"));
    tokio::fs::write(&temp, bytes).await?;
    tokio::fs::rename(&temp, &path).await
}
