use std::{fmt, io::SeekFrom, path::PathBuf};

use arkiv::{files::File, range::ByteRange, Client};
use bytes::{Buf, Bytes};
use futures::{stream::BoxStream, StreamExt};
use tokio::{
    fs,
    io::{AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    cache::{CacheReader, CacheWriter, ReadCache},
    errors::Error,
};

type DownloadStream = BoxStream<'static, Result<Bytes, arkiv::Error>>;

#[derive(Debug)]
struct Scratch {
    path: PathBuf,
    file: fs::File,
}

/// An open remote file.
///
/// Writes go to a private scratch file and reach the server only on
/// [`close`](Self::close). Reads pull from the download stream, or from
/// the read cache when one is configured.
pub struct RemoteFile {
    client: Client,
    cache: Option<ReadCache>,
    scratch_dir: PathBuf,
    path: String,
    file: Option<File>,
    scratch: Option<Scratch>,
    stream: Option<DownloadStream>,
    pending: Bytes,
    cache_reader: Option<CacheReader>,
    pos: u64,
}

impl fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFile")
            .field("path", &self.path)
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

impl RemoteFile {
    pub(crate) fn new(
        client: Client,
        cache: Option<ReadCache>,
        scratch_dir: PathBuf,
        path: String,
        file: Option<File>,
    ) -> Self {
        Self {
            client,
            cache,
            scratch_dir,
            path,
            file,
            scratch: None,
            stream: None,
            pending: Bytes::new(),
            cache_reader: None,
            pos: 0,
        }
    }

    /// Full remote path of this handle.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The remote record, present once the file exists server-side.
    #[must_use]
    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }

    async fn scratch_file(&mut self) -> crate::Result<&mut fs::File> {
        if self.scratch.is_none() {
            fs::create_dir_all(&self.scratch_dir).await?;

            let path = self.scratch_dir.join(Uuid::new_v4().to_string());
            let file = fs::File::create(&path).await?;

            debug!("buffering writes in {}", path.display());
            self.scratch = Some(Scratch { path, file });
        }

        match &mut self.scratch {
            Some(scratch) => Ok(&mut scratch.file),
            None => unreachable!("just inserted"),
        }
    }

    /// Append `data` to the write buffer.
    ///
    /// # Errors
    ///
    /// Local I/O errors from the scratch file.
    pub async fn write(&mut self, data: &[u8]) -> crate::Result<()> {
        self.scratch_file().await?.write_all(data).await?;

        Ok(())
    }

    /// Write `data` into the buffer at `offset`. The cursor is shared
    /// with [`write`](Self::write), which continues after the last
    /// `write_at`.
    ///
    /// # Errors
    ///
    /// Local I/O errors from the scratch file.
    pub async fn write_at(&mut self, data: &[u8], offset: u64) -> crate::Result<()> {
        let file = self.scratch_file().await?;

        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;

        Ok(())
    }

    /// Read the next bytes of the file into `buf`.
    ///
    /// Returns 0 at the end of the file. Without a cache this drives a
    /// single sequential download stream; seeking back is not possible.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the file does not exist remotely yet
    /// - network errors from the download
    pub async fn read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        // random access already started; keep serving from the cache
        if self.cache_reader.is_some() {
            let n = self.read_at(buf, self.pos).await?;
            self.pos += n as u64;

            return Ok(n);
        }

        if self.stream.is_none() {
            let Some(file) = &self.file else {
                return Err(Error::NotFound(self.path.clone()));
            };

            debug!("opening download stream for {}", file.id);
            self.stream = Some(self.client.download(&file.id, ByteRange::full()).await?);
        }

        loop {
            if !self.pending.is_empty() {
                let n = self.pending.len().min(buf.len());

                buf[..n].copy_from_slice(&self.pending[..n]);
                self.pending.advance(n);
                self.pos += n as u64;

                return Ok(n);
            }

            match &mut self.stream {
                Some(stream) => match stream.next().await {
                    Some(chunk) => self.pending = chunk?,
                    None => return Ok(0),
                },
                None => unreachable!("just opened"),
            }
        }
    }

    /// Read into `buf` at `offset` through the read cache.
    ///
    /// The first call opens a cache slot and spawns a task that copies
    /// the download stream into it; this and all later reads, from any
    /// handle, are served from the slot.
    ///
    /// # Errors
    ///
    /// - [`Error::NotSupported`] if no cache is configured
    /// - [`Error::NotFound`] if the file does not exist remotely yet
    /// - I/O errors from the slot, including a failed population
    pub async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> crate::Result<usize> {
        let Some(cache) = &self.cache else {
            return Err(Error::NotSupported);
        };

        if self.cache_reader.is_none() {
            let Some(file) = &self.file else {
                return Err(Error::NotFound(self.path.clone()));
            };

            debug!("opening cache slot for {}", file.id);

            let (reader, writer) = cache.open(&file.id, file.size).await?;

            if let Some(writer) = writer {
                tokio::spawn(populate(self.client.clone(), file.id.clone(), writer));
            }

            self.cache_reader = Some(reader);
        }

        match &mut self.cache_reader {
            Some(reader) => reader.read_at(buf, offset).await,
            None => unreachable!("just inserted"),
        }
    }

    /// Upload the write buffer and consume the handle.
    ///
    /// Returns the finished record, or `None` if nothing was written.
    /// The scratch file is removed whether the upload succeeds or not.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyFile`] if the buffer holds zero bytes
    /// - upload errors from the client
    pub async fn close(mut self) -> crate::Result<Option<File>> {
        let Some(mut scratch) = self.scratch.take() else {
            return Ok(None);
        };

        let uploaded = self.upload_scratch(&mut scratch).await;

        if let Err(err) = fs::remove_file(&scratch.path).await {
            warn!("failed to remove scratch file: {err}");
        }

        uploaded.map(Some)
    }

    async fn upload_scratch(&self, scratch: &mut Scratch) -> crate::Result<File> {
        scratch.file.flush().await?;

        let size = fs::metadata(&scratch.path).await?.len();

        if size == 0 {
            return Err(Error::EmptyFile);
        }

        debug!("uploading {} bytes to {}", size, self.path);

        let reader = fs::File::open(&scratch.path).await?;
        let file = self.client.chunked_upload(reader, &self.path, size).await?;

        Ok(file)
    }
}

/// Copy the download stream into the slot. Returning early on any
/// failure drops the writer, which marks the slot failed.
async fn populate(client: Client, id: String, mut writer: CacheWriter) {
    let mut stream = match client.download(&id, ByteRange::full()).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!("cache population failed to start: {err}");
            return;
        }
    };

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!("cache population aborted mid-stream: {err}");
                return;
            }
        };

        if let Err(err) = writer.write(&chunk).await {
            warn!("cache write failed: {err}");
            return;
        }
    }

    writer.finish();
}

impl Drop for RemoteFile {
    fn drop(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            // close() never ran; discard the buffered bytes
            drop(scratch.file);

            if let Err(err) = std::fs::remove_file(&scratch.path) {
                warn!("failed to remove scratch file: {err}");
            }
        }
    }
}
