//! On-disk read cache.
//!
//! The download endpoint hands out one non-seekable stream per request,
//! so random access goes through a cache slot instead: the first open
//! of a key returns a [`CacheWriter`] that a background task fills from
//! the stream, and every reader, the first one included, is served from
//! the backing file as bytes land in it. Later opens find the slot and
//! never touch the network again.
use std::{
    collections::HashMap,
    io,
    io::SeekFrom,
    path::PathBuf,
    pin::pin,
    sync::{Arc, Mutex},
};

use arkiv::events::{EventSink, FileRef};
use async_trait::async_trait;
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::Notify,
};
use tracing::{debug, warn};

use crate::errors::Error;

#[derive(Debug, Default)]
struct SlotState {
    written: u64,
    finished: bool,
    failed: bool,
}

#[derive(Debug)]
struct Slot {
    path: PathBuf,
    len: u64,
    state: Mutex<SlotState>,
    progress: Notify,
}

async fn remove_backing(slot: &Slot) {
    if let Err(err) = fs::remove_file(&slot.path).await {
        warn!("failed to remove cache file: {err}");
    }
}

/// A directory of cached downloads, keyed by file id.
///
/// Cheap to clone; clones share the slots.
#[derive(Debug, Clone)]
pub struct ReadCache {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    dir: PathBuf,
    slots: tokio::sync::Mutex<HashMap<String, Arc<Slot>>>,
}

impl ReadCache {
    /// Cache slots live under `dir`, which is created on first use.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                dir: dir.into(),
                slots: tokio::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Open the slot for `key`, creating it if needed.
    ///
    /// A [`CacheWriter`] comes back only for a fresh slot; the caller is
    /// expected to fill it with exactly `len` bytes. A slot whose
    /// producer failed, or whose recorded length no longer matches
    /// `len`, is evicted and replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// Local I/O errors from creating or opening the backing file.
    pub async fn open(
        &self,
        key: &str,
        len: u64,
    ) -> crate::Result<(CacheReader, Option<CacheWriter>)> {
        let mut slots = self.inner.slots.lock().await;

        if let Some(slot) = slots.get(key) {
            let stale = slot.state.lock().unwrap().failed || slot.len != len;

            if stale {
                debug!("evicting stale cache slot for {key}");

                if let Some(slot) = slots.remove(key) {
                    remove_backing(&slot).await;
                }
            } else {
                let reader = CacheReader::open(Arc::clone(slot)).await?;
                return Ok((reader, None));
            }
        }

        fs::create_dir_all(&self.inner.dir).await?;

        let path = self.inner.dir.join(uuid::Uuid::new_v4().to_string());
        let file = fs::File::create(&path).await?;

        let slot = Arc::new(Slot {
            path,
            len,
            state: Mutex::new(SlotState::default()),
            progress: Notify::new(),
        });

        slots.insert(key.to_owned(), Arc::clone(&slot));

        let reader = CacheReader::open(Arc::clone(&slot)).await?;
        let writer = CacheWriter {
            slot,
            file,
            finished: false,
        };

        Ok((reader, Some(writer)))
    }

    /// Drop the slot for `key` and delete its backing file. Readers that
    /// are already open keep reading their copy.
    pub async fn invalidate(&self, key: &str) {
        let slot = self.inner.slots.lock().await.remove(key);

        if let Some(slot) = slot {
            debug!("invalidating cache slot for {key}");
            remove_backing(&slot).await;
        }
    }
}

#[async_trait]
impl EventSink for ReadCache {
    async fn files_modified(&self, files: &[FileRef]) {
        for file in files {
            self.invalidate(&file.id).await;
        }
    }

    async fn files_removed(&self, files: &[FileRef]) {
        for file in files {
            self.invalidate(&file.id).await;
        }
    }
}

/// Producer half of a cache slot. Dropping it before [`finish`](Self::finish)
/// marks the slot failed, which wakes blocked readers with an error and
/// schedules the slot for eviction on the next open.
#[derive(Debug)]
pub struct CacheWriter {
    slot: Arc<Slot>,
    file: fs::File,
    finished: bool,
}

impl CacheWriter {
    /// Append `data` to the slot and wake readers waiting for it.
    ///
    /// # Errors
    ///
    /// Local I/O errors from the backing file.
    pub async fn write(&mut self, data: &[u8]) -> crate::Result<()> {
        self.file.write_all(data).await?;
        // readers get woken only for bytes that are actually in the file
        self.file.flush().await?;

        let mut state = self.slot.state.lock().unwrap();
        state.written += data.len() as u64;
        drop(state);

        self.slot.progress.notify_waiters();

        Ok(())
    }

    /// Mark the slot complete.
    pub fn finish(mut self) {
        self.finished = true;

        let mut state = self.slot.state.lock().unwrap();
        state.finished = true;
        drop(state);

        self.slot.progress.notify_waiters();
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let mut state = self.slot.state.lock().unwrap();
        state.failed = true;
        drop(state);

        self.slot.progress.notify_waiters();
    }
}

/// Reader over a cache slot, with its own file handle and no shared
/// position.
#[derive(Debug)]
pub struct CacheReader {
    slot: Arc<Slot>,
    file: fs::File,
}

impl CacheReader {
    async fn open(slot: Arc<Slot>) -> crate::Result<Self> {
        let file = fs::File::open(&slot.path).await?;

        Ok(Self { slot, file })
    }

    /// Fill `buf` from the slot starting at `offset`, waiting for the
    /// producer if the bytes are not there yet.
    ///
    /// Returns the number of bytes read, short only at the end of the
    /// slot. Reading at or past the recorded length returns 0.
    ///
    /// # Errors
    ///
    /// An I/O error if the producer dropped the slot without finishing,
    /// or if the backing file fails.
    pub async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> crate::Result<usize> {
        if offset >= self.slot.len || buf.is_empty() {
            return Ok(0);
        }

        let wanted = self.slot.len.min(offset + buf.len() as u64);

        let end = loop {
            let mut notified = pin!(self.slot.progress.notified());
            // register before checking, so no wakeup can slip in between
            notified.as_mut().enable();

            {
                let state = self.slot.state.lock().unwrap();

                if state.failed {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "cache population failed",
                    )));
                }

                if state.written >= wanted || state.finished {
                    break wanted.min(state.written);
                }
            }

            notified.await;
        };

        if offset >= end {
            return Ok(0);
        }

        #[allow(clippy::cast_possible_truncation)]
        let n = (end - offset) as usize;

        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.read_exact(&mut buf[..n]).await?;

        Ok(n)
    }
}
