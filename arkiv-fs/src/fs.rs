//! The filesystem adapter itself.
use std::{env, path::PathBuf};

use arkiv::{
    files::{Entry, File, Folder},
    path, Client,
};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::{cache::ReadCache, errors::Error, file::RemoteFile};

/// Filesystem-flavoured operations over the remote folder tree.
///
/// Every path is absolute and slash-delimited, `/` being the account
/// root. Cheap to clone; clones share the client and the cache.
#[derive(Debug, Clone)]
pub struct RemoteFs {
    client: Client,
    scratch_dir: PathBuf,
    cache: Option<ReadCache>,
}

impl RemoteFs {
    /// Adapter over `client`, buffering writes under the system temp
    /// directory and with random-access reads disabled.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            scratch_dir: env::temp_dir(),
            cache: None,
        }
    }

    /// Buffer writes under `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_scratch_dir(self, dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: dir.into(),
            ..self
        }
    }

    /// Enable `read_at` on file handles, backed by `cache`.
    #[must_use]
    pub fn with_cache(self, cache: ReadCache) -> Self {
        Self {
            cache: Some(cache),
            ..self
        }
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Resolve `path`, mapping remote absence to [`Error::NotFound`].
    async fn resolve(&self, path: &str) -> crate::Result<Entry> {
        match self.client.find(path).await {
            Ok(entry) => Ok(entry),
            Err(arkiv::Error::NoFile | arkiv::Error::NoFolder) => {
                Err(Error::NotFound(path.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Open the file at `path` for reading.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if nothing lives there
    /// - [`Error::IsADirectory`] if a folder does
    #[instrument(skip(self))]
    pub async fn open(&self, path: &str) -> crate::Result<RemoteFile> {
        match self.resolve(path).await? {
            Entry::File(file) => Ok(RemoteFile::new(
                self.client.clone(),
                self.cache.clone(),
                self.scratch_dir.clone(),
                path.to_owned(),
                Some(file),
            )),
            Entry::Folder(_) => Err(Error::IsADirectory(path.to_owned())),
        }
    }

    /// A writable handle for the file at `path`.
    ///
    /// Nothing is sent yet; the file materializes remotely when the
    /// handle is closed after its first write.
    #[must_use]
    pub fn create(&self, path: &str) -> RemoteFile {
        RemoteFile::new(
            self.client.clone(),
            self.cache.clone(),
            self.scratch_dir.clone(),
            path.to_owned(),
            None,
        )
    }

    /// Metadata of whatever lives at `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if nothing does
    #[instrument(skip(self))]
    pub async fn stat(&self, path: &str) -> crate::Result<Metadata> {
        Ok(Metadata::from(&self.resolve(path).await?))
    }

    /// List the folder at `path`: subfolders first, then files, in
    /// snapshot order.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if nothing lives there
    /// - [`Error::NotADirectory`] if a file does
    #[instrument(skip(self))]
    pub async fn read_dir(&self, path: &str) -> crate::Result<Vec<Metadata>> {
        match self.resolve(path).await? {
            Entry::Folder(folder) => {
                let mut entries: Vec<Metadata> =
                    folder.subfolders.iter().map(Metadata::from).collect();
                entries.extend(folder.files.iter().map(Metadata::from));

                Ok(entries)
            }
            Entry::File(_) => Err(Error::NotADirectory(path.to_owned())),
        }
    }

    /// Create the folder at `path`. A folder already being there is a
    /// success, not an error.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the parent does not exist
    /// - [`Error::NotADirectory`] if the parent is a file
    #[instrument(skip(self))]
    pub async fn mkdir(&self, path: &str) -> crate::Result<()> {
        let (parent, name) = path::split(path);

        if name.is_empty() {
            // the root cannot be created, but it always exists
            return Ok(());
        }

        let folder = match self.resolve(&parent).await? {
            Entry::Folder(folder) => folder,
            Entry::File(_) => return Err(Error::NotADirectory(parent)),
        };

        if folder.subfolder(name).is_some() {
            debug!("folder already exists");
            return Ok(());
        }

        self.client
            .create_folder(&path::join(&folder.path, name))
            .await?;

        Ok(())
    }

    /// Create the folder at `path` along with every missing ancestor,
    /// walking the tree top-down one segment at a time.
    ///
    /// # Errors
    ///
    /// - [`Error::NotADirectory`] if a file occupies any segment
    #[instrument(skip(self))]
    pub async fn mkdir_all(&self, path: &str) -> crate::Result<()> {
        match self.resolve(path).await {
            Ok(Entry::Folder(_)) => return Ok(()),
            Ok(Entry::File(_)) => return Err(Error::NotADirectory(path.to_owned())),
            Err(Error::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let mut current = self.client.folders().await?;

        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            if current.file(segment).is_some() {
                return Err(Error::NotADirectory(path::join(&current.path, segment)));
            }

            current = match current.subfolder(segment) {
                Some(subfolder) => subfolder.clone(),
                None => {
                    self.client
                        .create_folder(&path::join(&current.path, segment))
                        .await?
                }
            };
        }

        Ok(())
    }

    /// Delete whatever lives at `path`. Removing a folder removes its
    /// entire subtree in one call.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if nothing lives there
    #[instrument(skip(self))]
    pub async fn remove(&self, path: &str) -> crate::Result<()> {
        match self.resolve(path).await? {
            Entry::File(file) => {
                debug!("removing file {}", file.id);
                self.client.delete_files(&[&file.id]).await?;
            }
            Entry::Folder(folder) => {
                debug!("removing folder and its subtree");
                self.client.delete_folder(&folder.path).await?;
            }
        }

        Ok(())
    }

    /// Move and/or rename whatever lives at `from` so it ends up at
    /// `to`.
    ///
    /// Folders take one request either way. Files take a move request,
    /// a rename request, or both; the API has no combined call.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if nothing lives at `from`
    /// - server rejections, e.g. an occupied destination
    #[instrument(skip(self))]
    pub async fn rename(&self, from: &str, to: &str) -> crate::Result<()> {
        let (old_parent, old_name) = path::split(from);
        let (new_parent, new_name) = path::split(to);

        match self.resolve(from).await? {
            Entry::Folder(folder) => {
                let parent = (new_parent != old_parent).then_some(new_parent.as_str());

                self.client
                    .patch_folder(&folder.path, parent, Some(new_name))
                    .await?;
            }
            Entry::File(file) => {
                if new_parent != old_parent {
                    self.client.move_files(&new_parent, &[&file.id]).await?;
                }

                if new_name != old_name {
                    self.client.rename_file(&file.id, new_name).await?;
                }
            }
        }

        Ok(())
    }
}

/// What `stat` and `read_dir` report about an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    name: String,
    size: u64,
    modified: Option<OffsetDateTime>,
    dir: bool,
}

impl Metadata {
    /// Base name of the entry.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes; for directories, the server-reported subtree
    /// total.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Upload time. Directories carry none.
    #[must_use]
    pub fn modified(&self) -> Option<OffsetDateTime> {
        self.modified
    }

    /// Whether the entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.dir
    }
}

impl From<&File> for Metadata {
    fn from(file: &File) -> Self {
        Self {
            name: file.name.clone(),
            size: file.size,
            modified: Some(file.date_added),
            dir: false,
        }
    }
}

impl From<&Folder> for Metadata {
    fn from(folder: &Folder) -> Self {
        Self {
            name: folder.name.clone(),
            size: folder.size,
            modified: None,
            dir: true,
        }
    }
}

impl From<&Entry> for Metadata {
    fn from(entry: &Entry) -> Self {
        match entry {
            Entry::File(file) => file.into(),
            Entry::Folder(folder) => folder.into(),
        }
    }
}
