//! The API client itself.
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::json;
use tracing::{debug, instrument};

use crate::{
    api::{read_json, read_ok},
    auth::Authenticator,
    errors::Error,
    files::{
        DiskUsage, DiskUsageRes, EditFileParams, Entry, File, FilesRes, Folder, FolderRes, Link,
        LinkRes, PatchFolderReq,
    },
    path,
    range::ByteRange,
    transport::{
        header::{self, HeaderMap, HeaderValue},
        Body, Method, Request, Response,
    },
};

const DISK_USAGE: &str = "api/v1/filestorage/disk-usage-summary";
const FILES: &str = "api/v1/filestorage/files";
const DELETE_FILES: &str = "api/v1/filestorage/delete-files";
const MOVE_FILES: &str = "api/v1/filestorage/move-files";
const FOLDER: &str = "api/v1/filestorage/folder";
const FOLDERS: &str = "api/v1/filestorage/folders";
const PUT_FOLDER: &str = "api/v1/filestorage/folder-put";
const DELETE_FOLDER: &str = "api/v1/filestorage/delete-folder";
const PATCH_FOLDER: &str = "api/v1/filestorage/folder-patch";

/// An authenticated Arkiv file storage client.
///
/// Cheap to clone; clones share the authenticator and its transport.
#[derive(Debug, Clone)]
pub struct Client {
    auth: Arc<Authenticator>,
}

impl Client {
    /// Wrap an [`Authenticator`] into a client.
    #[must_use]
    pub fn new(auth: Authenticator) -> Self {
        Self {
            auth: Arc::new(auth),
        }
    }

    /// The authenticator this client requests tokens from.
    #[must_use]
    pub fn auth(&self) -> &Authenticator {
        &self.auth
    }

    /// Request skeleton with a fresh bearer token attached.
    pub(crate) async fn authed(&self, method: Method, path: &str) -> crate::Result<Request> {
        let access_token = self.auth.access_token().await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}"))?,
        );

        Ok(Request {
            method,
            url: self.auth.base().join(path)?,
            headers,
            body: Body::Empty,
        })
    }

    pub(crate) async fn execute(&self, req: Request) -> crate::Result<Response> {
        self.auth.transport().execute(req).await
    }

    /// Storage consumption summary across the account's groupware
    /// features.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - authentication errors
    #[instrument(skip(self))]
    pub async fn disk_usage(&self) -> crate::Result<DiskUsage> {
        let req = self.authed(Method::GET, DISK_USAGE).await?;
        let res: DiskUsageRes = read_json(self.execute(req).await?).await?;

        res.disk_usage
            .ok_or_else(|| Error::Api("disk usage missing from response".to_owned()))
    }

    /// The entire folder tree, rooted at `/`.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - authentication errors
    #[instrument(skip(self))]
    pub async fn folders(&self) -> crate::Result<Folder> {
        let req = self.authed(Method::GET, FOLDERS).await?;
        let res: FolderRes = read_json(self.execute(req).await?).await?;

        res.folder
            .ok_or_else(|| Error::Api("folder missing from response".to_owned()))
    }

    /// One folder, with its whole subtree, by full path.
    ///
    /// # Errors
    ///
    /// - [`Error::NoFolder`] if no folder lives at `path`
    /// - network errors
    #[instrument(skip(self))]
    pub async fn folder(&self, path: &str) -> crate::Result<Folder> {
        let mut req = self.authed(Method::POST, FOLDER).await?;
        req.body = Body::Json(json!({ "folder": path }));

        let res: FolderRes = read_json(self.execute(req).await?).await?;
        res.envelope.check()?;

        res.folder
            .ok_or_else(|| Error::Api("folder missing from response".to_owned()))
    }

    /// File records by id. Ids the server does not recognize are left out
    /// of the result.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - authentication errors
    #[instrument(skip(self, ids))]
    pub async fn files(&self, ids: &[&str]) -> crate::Result<Vec<File>> {
        let mut req = self.authed(Method::POST, FILES).await?;
        req.body = Body::Json(json!({ "fileIds": ids }));

        let res: FilesRes = read_json(self.execute(req).await?).await?;

        Ok(res.files)
    }

    /// Delete files by id.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - authentication errors
    #[instrument(skip(self))]
    pub async fn delete_files(&self, ids: &[&str]) -> crate::Result<()> {
        let mut req = self.authed(Method::POST, DELETE_FILES).await?;
        req.body = Body::Json(json!({ "fileIds": ids }));

        read_ok(self.execute(req).await?).await
    }

    /// Move files by id into the folder at `folder`.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - server rejection, e.g. an unknown destination
    #[instrument(skip(self, ids))]
    pub async fn move_files(&self, folder: &str, ids: &[&str]) -> crate::Result<()> {
        let mut req = self.authed(Method::POST, MOVE_FILES).await?;
        // this endpoint spells the id list with a capital D, unlike
        // `files` and `delete-files`
        req.body = Body::Json(json!({ "newFolder": folder, "fileIDs": ids }));

        read_ok(self.execute(req).await?).await
    }

    /// Download a file by id as a stream of chunks.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - authentication errors
    /// - unknown file id
    #[instrument(skip(self, range))]
    pub async fn download(
        &self,
        id: &str,
        range: ByteRange,
    ) -> crate::Result<BoxStream<'static, crate::Result<Bytes>>> {
        debug!("requesting file");

        let mut req = self
            .authed(Method::GET, &format!("api/v1/filestorage/{id}/download"))
            .await?;

        if !range.is_full() {
            req.headers.insert(header::RANGE, range.into());
        }

        let res = self.execute(req).await?;

        if !res.status().is_success() {
            return Err(Error::UnexpectedStatus(res.status()));
        }

        Ok(res.into_stream())
    }

    /// Resolve `target` to the file or folder living at that path.
    ///
    /// The parent folder's snapshot is scanned files first, so a file
    /// shadows a same-named folder. Resolving `/` yields the root folder.
    ///
    /// # Errors
    ///
    /// - [`Error::NoFolder`] if the parent folder does not exist
    /// - [`Error::NoFile`] if nothing in the parent matches the leaf
    #[instrument(skip(self))]
    pub async fn find(&self, target: &str) -> crate::Result<Entry> {
        let (parent, leaf) = path::split(target);

        let folder = if parent == "/" {
            self.folders().await?
        } else {
            self.folder(&parent).await?
        };

        if leaf.is_empty() {
            return Ok(Entry::Folder(folder));
        }

        folder.entry(leaf).ok_or(Error::NoFile)
    }

    /// Create the folder at `path`. The parent must already exist.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - server rejection, e.g. a missing parent
    #[instrument(skip(self))]
    pub async fn create_folder(&self, path: &str) -> crate::Result<Folder> {
        let (parent, name) = path::split(path);

        let mut req = self.authed(Method::POST, PUT_FOLDER).await?;
        req.body = Body::Json(json!({ "parentFolder": parent, "folder": name }));

        let res: FolderRes = read_json(self.execute(req).await?).await?;
        res.envelope.check()?;

        res.folder
            .ok_or_else(|| Error::Api("folder missing from response".to_owned()))
    }

    /// Delete the folder at `path`, including everything inside it.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - server rejection
    #[instrument(skip(self))]
    pub async fn delete_folder(&self, path: &str) -> crate::Result<()> {
        let (parent, name) = path::split(path);

        let mut req = self.authed(Method::POST, DELETE_FOLDER).await?;
        req.body = Body::Json(json!({ "parentFolder": parent, "folder": name }));

        read_ok(self.execute(req).await?).await
    }

    /// Move and/or rename the folder at `path` in one call.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - server rejection, e.g. an occupied destination
    #[instrument(skip(self))]
    pub async fn patch_folder(
        &self,
        path: &str,
        new_parent: Option<&str>,
        new_name: Option<&str>,
    ) -> crate::Result<()> {
        let mut req = self.authed(Method::POST, PATCH_FOLDER).await?;
        req.body = Body::Json(serde_json::to_value(PatchFolderReq {
            folder: path,
            new_parent_folder: new_parent,
            new_folder_name: new_name,
        })?);

        read_ok(self.execute(req).await?).await
    }

    /// Rename a file in place.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - server rejection, e.g. a name collision
    #[instrument(skip(self))]
    pub async fn rename_file(&self, id: &str, name: &str) -> crate::Result<()> {
        let mut req = self
            .authed(Method::POST, &format!("api/v1/filestorage/{id}/edit"))
            .await?;
        req.body = Body::Json(json!({ "newFilename": name }));

        read_ok(self.execute(req).await?).await
    }

    /// Update the publish settings of a file.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - server rejection
    #[instrument(skip(self, params))]
    pub async fn edit_file(&self, id: &str, params: &EditFileParams) -> crate::Result<()> {
        let mut req = self
            .authed(Method::POST, &format!("api/v1/filestorage/{id}/edit"))
            .await?;
        req.body = Body::Json(serde_json::to_value(params)?);

        read_ok(self.execute(req).await?).await
    }

    /// Sharing links of a file. The file has to be published through
    /// [`edit_file`](Self::edit_file) for the links to actually work.
    ///
    /// # Errors
    ///
    /// - network errors
    /// - server rejection
    #[instrument(skip(self))]
    pub async fn link(&self, id: &str) -> crate::Result<Link> {
        let req = self
            .authed(Method::GET, &format!("api/v1/filestorage/{id}/getlink"))
            .await?;

        let res: LinkRes = read_json(self.execute(req).await?).await?;
        res.envelope.check()?;

        Ok(res.link)
    }
}
