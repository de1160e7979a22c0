//! File and folder records.
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::Envelope;

/// A file stored in Arkiv.
///
/// Records are snapshots; the server never mutates a record in place, it
/// replaces it (a successful upload returns a fresh one).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Opaque server-assigned identifier, unique and stable for the
    /// lifetime of the file.
    pub id: String,
    /// File name, without any path.
    #[serde(rename = "fileName")]
    pub name: String,
    /// Media type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Size in bytes.
    pub size: u64,
    /// Upload timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub date_added: OffsetDateTime,
    /// Path of the containing folder.
    pub folder_path: String,
}

/// A folder subtree snapshot.
///
/// The server always returns whole subtrees, so `subfolders` is fully
/// populated recursively. A snapshot is not a live reference; it only
/// reflects the tree at fetch time.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Folder {
    /// Folder name, without any path.
    pub name: String,
    /// Full path of this folder.
    pub path: String,
    /// Total size of the contained files in bytes.
    pub size: u64,
    /// Server-side revision marker.
    pub version: String,
    /// Number of files in this folder.
    pub count: u32,
    /// Direct subfolders, each a full subtree.
    pub subfolders: Vec<Folder>,
    /// Files in this folder.
    pub files: Vec<File>,
}

impl Folder {
    /// All folders in this subtree, root first, every parent before its
    /// children.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Folder> {
        let mut folders = Vec::new();
        self.collect(&mut folders);
        folders
    }

    fn collect<'a>(&'a self, folders: &mut Vec<&'a Folder>) {
        folders.push(self);

        for subfolder in &self.subfolders {
            subfolder.collect(folders);
        }
    }

    /// Direct subfolder named `name`.
    #[must_use]
    pub fn subfolder(&self, name: &str) -> Option<&Folder> {
        self.subfolders.iter().find(|folder| folder.name == name)
    }

    /// Direct child file named `name`.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&File> {
        self.files.iter().find(|file| file.name == name)
    }

    /// Direct child named `name`. Files are checked before subfolders, so
    /// a file shadows a folder with the same name.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<Entry> {
        self.file(name)
            .cloned()
            .map(Entry::File)
            .or_else(|| self.subfolder(name).cloned().map(Entry::Folder))
    }
}

/// A resolved directory entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A file.
    File(File),
    /// A folder subtree.
    Folder(Folder),
}

impl Entry {
    /// Name of the entry.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Entry::File(file) => &file.name,
            Entry::Folder(folder) => &folder.name,
        }
    }

    /// Size in bytes. For folders, the total size of the contained files.
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Entry::File(file) => file.size,
            Entry::Folder(folder) => folder.size,
        }
    }

    /// Upload timestamp. Folders carry none.
    #[must_use]
    pub fn modified(&self) -> Option<OffsetDateTime> {
        match self {
            Entry::File(file) => Some(file.date_added),
            Entry::Folder(_) => None,
        }
    }

    /// Whether the entry is a folder.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        matches!(self, Entry::Folder(_))
    }

    /// The file, if this entry is one.
    #[must_use]
    pub fn into_file(self) -> Option<File> {
        match self {
            Entry::File(file) => Some(file),
            Entry::Folder(_) => None,
        }
    }

    /// The folder, if this entry is one.
    #[must_use]
    pub fn into_folder(self) -> Option<Folder> {
        match self {
            Entry::Folder(folder) => Some(folder),
            Entry::File(_) => None,
        }
    }
}

/// Storage consumption across the groupware features of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiskUsage {
    /// Total bytes the plan allows.
    pub allowed: u64,
    /// Total bytes in use.
    pub used: u64,
    /// Bytes used by mailboxes.
    pub mailboxes: u64,
    /// Bytes used by appointments.
    pub appointments_used: u64,
    /// Bytes used by contacts.
    pub contacts_used: u64,
    /// Bytes used by notes.
    pub notes_used: u64,
    /// Bytes used by tasks.
    pub tasks_used: u64,
    /// Bytes used by file storage.
    pub file_storage_used: u64,
    /// Bytes used by meeting workspaces.
    pub meeting_workspace_used: u64,
    /// Bytes used by chat attachments.
    pub chat_files_used: u64,
}

/// Sharing links of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Link {
    /// Full public download link.
    pub public_link: String,
    /// Shortened link.
    pub short_link: String,
    /// Whether the file is currently published.
    pub is_public: bool,
}

/// Publish settings accepted by the file edit endpoint.
///
/// Unset options are omitted from the request and left untouched by the
/// server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditFileParams {
    /// Whether the file should be publicly accessible.
    pub published: bool,
    /// Password protecting the public link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// When the public link expires.
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_until: Option<OffsetDateTime>,
    /// Shortened link to assign.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_link: Option<String>,
    /// Public download link to assign.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_download_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FolderRes {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub folder: Option<Folder>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct FilesRes {
    pub files: Vec<File>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiskUsageRes {
    pub disk_usage: Option<DiskUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkRes {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(flatten)]
    pub link: Link,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PatchFolderReq<'a> {
    pub folder: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_parent_folder: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_folder_name: Option<&'a str>,
}
