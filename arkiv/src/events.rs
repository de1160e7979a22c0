//! Typed change notifications.
//!
//! The server pushes change feeds over a hub connection; producing that
//! connection is up to the caller. This module only defines the payload
//! shapes, the [`EventSink`] hooks, and a [`dispatch`] loop that routes a
//! stream of events into a sink.
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;

/// A file referenced by a change feed entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    /// Backend file id.
    pub id: String,
    /// Originating subsystem.
    pub source: String,
}

/// A folder was created, renamed, moved or deleted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderChange {
    /// Backend-defined action code.
    pub action: i32,
    /// Parent of the affected folder.
    pub parent_folder: String,
    /// The affected folder.
    pub folder: String,
}

/// Account-wide usage changed.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxSizeUpdate {
    /// Bytes in use.
    pub size: i64,
    /// Quota, negative when unlimited.
    pub max_size: i64,
}

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Files appeared.
    FilesAdded(Vec<FileRef>),
    /// Files went away.
    FilesRemoved(Vec<FileRef>),
    /// File contents or metadata changed.
    FilesModified(Vec<FileRef>),
    /// A folder changed.
    FolderChanged(FolderChange),
    /// Usage changed.
    MailboxSizeUpdate(MailboxSizeUpdate),
}

/// Receiver side of the change feed. Every hook defaults to a no-op, so
/// implementations override only what they care about.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Files appeared.
    async fn files_added(&self, _files: &[FileRef]) {}

    /// Files went away.
    async fn files_removed(&self, _files: &[FileRef]) {}

    /// File contents or metadata changed.
    async fn files_modified(&self, _files: &[FileRef]) {}

    /// A folder was created, renamed, moved or deleted.
    async fn folder_changed(&self, _change: &FolderChange) {}

    /// Account-wide usage changed.
    async fn mailbox_size_update(&self, _update: MailboxSizeUpdate) {}
}

/// Drive `events` to completion, routing each entry into `sink`.
///
/// Returns when the stream ends. Hooks run one at a time, in stream
/// order.
pub async fn dispatch<S, E>(mut events: S, sink: &E)
where
    S: Stream<Item = Event> + Unpin,
    E: EventSink + ?Sized,
{
    while let Some(event) = events.next().await {
        match event {
            Event::FilesAdded(files) => sink.files_added(&files).await,
            Event::FilesRemoved(files) => sink.files_removed(&files).await,
            Event::FilesModified(files) => sink.files_modified(&files).await,
            Event::FolderChanged(change) => sink.folder_changed(&change).await,
            Event::MailboxSizeUpdate(update) => sink.mailbox_size_update(update).await,
        }
    }
}
