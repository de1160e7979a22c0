use std::io::ErrorKind;

use arkiv::{
    auth::Authenticator,
    transport::{mock::MockTransport, StatusCode},
    Client,
};
use arkiv_fs::{cache::ReadCache, Error, RemoteFs};
use rand::RngCore;
use serde_json::json;
use tempfile::TempDir;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

async fn login(transport: &MockTransport) -> Client {
    let now = OffsetDateTime::now_utc();
    transport.push_json(
        StatusCode::OK,
        json!({
            "username": "alice",
            "accessToken": "tok",
            "accessTokenExpiration": (now + Duration::hours(1)).format(&Rfc3339).unwrap(),
            "refreshToken": "refresh",
            "refreshTokenExpiration": (now + Duration::days(30)).format(&Rfc3339).unwrap(),
        }),
    );

    let auth = Authenticator::new("https://mail.example.com".parse().unwrap())
        .with_transport(transport.clone());
    auth.login("alice", "hunter2", None).await.unwrap();

    Client::new(auth)
}

async fn remote_fs(transport: &MockTransport) -> (RemoteFs, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let fs = RemoteFs::new(login(transport).await)
        .with_scratch_dir(dir.path())
        .with_cache(ReadCache::new(dir.path().join("cache")));

    (fs, dir)
}

fn documents_folder() -> serde_json::Value {
    json!({
        "name": "documents",
        "path": "/documents",
        "subfolders": [
            {"name": "reports", "path": "/documents/reports"}
        ],
        "files": [
            {
                "id": "f-1",
                "fileName": "q3.pdf",
                "type": "application/pdf",
                "size": 4096,
                "dateAdded": "2024-03-01T12:00:00Z",
                "folderPath": "/documents"
            }
        ]
    })
}

/// Response to the tree fetch. Resolving a path directly under `/` hits
/// this endpoint.
fn tree() -> serde_json::Value {
    json!({
        "success": true,
        "folder": {
            "name": "",
            "path": "/",
            "subfolders": [documents_folder()],
            "files": []
        }
    })
}

/// Response to a `/documents` snapshot fetch. Resolving a path inside
/// `/documents` hits this endpoint.
fn documents() -> serde_json::Value {
    json!({"success": true, "folder": documents_folder()})
}

fn ok() -> serde_json::Value {
    json!({"success": true})
}

fn uploaded_record() -> serde_json::Value {
    json!({
        "id": "f-9",
        "fileName": "notes.txt",
        "type": "text/plain",
        "size": 11,
        "dateAdded": "2024-03-02T09:00:00Z",
        "folderPath": "/documents"
    })
}

#[tokio::test]
async fn writes_upload_on_close() {
    let transport = MockTransport::new();
    let (fs, dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, uploaded_record());

    let mut file = fs.create("/documents/notes.txt");
    file.write(b"hello ").await.unwrap();
    file.write(b"world").await.unwrap();

    let uploaded = file.close().await.unwrap().unwrap();
    assert_eq!(uploaded.id, "f-9");

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].url.path(), "/api/upload");

    let form = requests[1].body.as_multipart().unwrap();
    assert_eq!(&form.data[..], b"hello world");
    assert_eq!(form.field("resumableFilename"), Some("notes.txt"));
    assert_eq!(form.field("resumableTotalSize"), Some("11"));
    assert_eq!(form.field("resumableTotalChunks"), Some("1"));
    assert_eq!(
        form.field("contextData"),
        Some(r#"{"folder":"/documents"}"#)
    );

    // the scratch file is gone once the handle closes
    let stray = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|entry| entry.as_ref().unwrap().file_type().unwrap().is_file())
        .count();
    assert_eq!(stray, 0);
}

#[tokio::test]
async fn write_at_patches_the_scratch_buffer() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, uploaded_record());

    let mut file = fs.create("/documents/notes.txt");
    file.write(b"hello world").await.unwrap();
    file.write_at(b"W", 6).await.unwrap();
    file.close().await.unwrap();

    let requests = transport.requests();
    let form = requests[1].body.as_multipart().unwrap();
    assert_eq!(&form.data[..], b"hello World");
}

#[tokio::test]
async fn empty_files_are_rejected_on_close() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;

    let mut file = fs.create("/documents/empty.txt");
    file.write(b"").await.unwrap();

    assert!(matches!(file.close().await, Err(Error::EmptyFile)));
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn close_without_writes_is_a_no_op() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;

    let file = fs.create("/documents/untouched.txt");
    assert!(file.close().await.unwrap().is_none());
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn open_resolves_the_record() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, documents());

    let file = fs.open("/documents/q3.pdf").await.unwrap();
    assert_eq!(file.path(), "/documents/q3.pdf");
    assert_eq!(file.file().unwrap().id, "f-1");
}

#[tokio::test]
async fn open_maps_absence_to_not_found() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, documents());

    let err = fs.open("/documents/missing.txt").await.unwrap_err();
    assert!(matches!(&err, Error::NotFound(path) if path == "/documents/missing.txt"));
    assert_eq!(std::io::Error::from(err).kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn open_refuses_directories() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, documents());

    assert!(matches!(
        fs.open("/documents/reports").await,
        Err(Error::IsADirectory(path)) if path == "/documents/reports"
    ));
}

#[tokio::test]
async fn read_streams_the_download() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, documents());
    transport.push_bytes(StatusCode::OK, &b"abcdefgh"[..]);

    let mut file = fs.open("/documents/q3.pdf").await.unwrap();

    let mut contents = Vec::new();
    let mut buf = [0; 3];
    loop {
        let n = file.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        contents.extend_from_slice(&buf[..n]);
    }

    assert_eq!(contents, b"abcdefgh");

    let requests = transport.requests();
    assert_eq!(requests[2].url.path(), "/api/v1/filestorage/f-1/download");
}

#[tokio::test]
async fn read_at_needs_the_cache() {
    let transport = MockTransport::new();
    let dir = tempfile::tempdir().unwrap();
    let fs = RemoteFs::new(login(&transport).await).with_scratch_dir(dir.path());
    transport.push_json(StatusCode::OK, documents());

    let mut file = fs.open("/documents/q3.pdf").await.unwrap();
    let mut buf = [0; 16];

    assert!(matches!(
        file.read_at(&mut buf, 0).await,
        Err(Error::NotSupported)
    ));
}

#[tokio::test]
async fn read_at_populates_once_and_serves_everyone() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;

    let mut payload = vec![0; 4096];
    rand::thread_rng().fill_bytes(&mut payload);

    transport.push_json(StatusCode::OK, documents());
    transport.push_bytes(StatusCode::OK, payload.clone());

    let mut first = fs.open("/documents/q3.pdf").await.unwrap();
    let mut buf = vec![0; 1000];
    let n = first.read_at(&mut buf, 0).await.unwrap();
    assert_eq!(n, 1000);
    assert_eq!(buf[..n], payload[..1000]);

    // a second handle is served from the cache, with no second download
    transport.push_json(StatusCode::OK, documents());
    let mut second = fs.open("/documents/q3.pdf").await.unwrap();
    let n = second.read_at(&mut buf, 4000).await.unwrap();
    assert_eq!(n, 96);
    assert_eq!(buf[..n], payload[4000..]);

    assert_eq!(transport.request_count(), 4);
}

#[tokio::test]
async fn mkdir_is_idempotent() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, tree());

    fs.mkdir("/documents/reports").await.unwrap();
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn mkdir_creates_missing_folders() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, tree());
    transport.push_json(
        StatusCode::OK,
        json!({"success": true, "folder": {"name": "drafts", "path": "/documents/drafts"}}),
    );

    fs.mkdir("/documents/drafts").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests[2].url.path(), "/api/v1/filestorage/folder-put");
    assert_eq!(
        requests[2].body.as_json().unwrap(),
        &json!({"parentFolder": "/documents", "folder": "drafts"})
    );
}

#[tokio::test]
async fn mkdir_all_walks_iteratively() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    // the initial probe fails, `/documents/a` does not exist yet
    transport.push_json(
        StatusCode::OK,
        json!({"success": false, "message": "Folder not found"}),
    );
    transport.push_json(StatusCode::OK, tree());
    transport.push_json(
        StatusCode::OK,
        json!({"success": true, "folder": {"name": "a", "path": "/documents/a"}}),
    );
    transport.push_json(
        StatusCode::OK,
        json!({"success": true, "folder": {"name": "b", "path": "/documents/a/b"}}),
    );

    fs.mkdir_all("/documents/a/b").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(
        requests[3].body.as_json().unwrap(),
        &json!({"parentFolder": "/documents", "folder": "a"})
    );
    assert_eq!(
        requests[4].body.as_json().unwrap(),
        &json!({"parentFolder": "/documents/a", "folder": "b"})
    );
}

#[tokio::test]
async fn mkdir_all_refuses_file_collisions() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(
        StatusCode::OK,
        json!({"success": false, "message": "Folder not found"}),
    );
    transport.push_json(StatusCode::OK, tree());

    assert!(matches!(
        fs.mkdir_all("/documents/q3.pdf/sub").await,
        Err(Error::NotADirectory(path)) if path == "/documents/q3.pdf"
    ));
}

#[tokio::test]
async fn remove_dispatches_on_entry_kind() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;

    transport.push_json(StatusCode::OK, documents());
    transport.push_json(StatusCode::OK, ok());
    fs.remove("/documents/q3.pdf").await.unwrap();

    transport.push_json(StatusCode::OK, tree());
    transport.push_json(StatusCode::OK, ok());
    fs.remove("/documents").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests[2].url.path(), "/api/v1/filestorage/delete-files");
    assert_eq!(
        requests[2].body.as_json().unwrap(),
        &json!({"fileIds": ["f-1"]})
    );
    assert_eq!(requests[4].url.path(), "/api/v1/filestorage/delete-folder");
    assert_eq!(
        requests[4].body.as_json().unwrap(),
        &json!({"parentFolder": "/", "folder": "documents"})
    );
}

#[tokio::test]
async fn rename_moves_and_renames_files_in_two_calls() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, documents());
    transport.push_json(StatusCode::OK, ok());
    transport.push_json(StatusCode::OK, ok());

    fs.rename("/documents/q3.pdf", "/archive/q3-final.pdf")
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests[2].url.path(), "/api/v1/filestorage/move-files");
    assert_eq!(
        requests[2].body.as_json().unwrap(),
        &json!({"newFolder": "/archive", "fileIDs": ["f-1"]})
    );
    assert_eq!(requests[3].url.path(), "/api/v1/filestorage/f-1/edit");
    assert_eq!(
        requests[3].body.as_json().unwrap(),
        &json!({"newFilename": "q3-final.pdf"})
    );
}

#[tokio::test]
async fn rename_folders_is_one_patch() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, tree());
    transport.push_json(StatusCode::OK, ok());

    fs.rename("/documents", "/paperwork").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[2].url.path(), "/api/v1/filestorage/folder-patch");
    assert_eq!(
        requests[2].body.as_json().unwrap(),
        &json!({"folder": "/documents", "newFolderName": "paperwork"})
    );
}

#[tokio::test]
async fn stat_translates_entries() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;

    transport.push_json(StatusCode::OK, documents());
    let meta = fs.stat("/documents/q3.pdf").await.unwrap();
    assert_eq!(meta.name(), "q3.pdf");
    assert_eq!(meta.size(), 4096);
    assert!(meta.modified().is_some());
    assert!(!meta.is_dir());

    transport.push_json(StatusCode::OK, tree());
    let meta = fs.stat("/documents").await.unwrap();
    assert!(meta.is_dir());
    assert!(meta.modified().is_none());
}

#[tokio::test]
async fn read_dir_lists_subfolders_then_files() {
    let transport = MockTransport::new();
    let (fs, _dir) = remote_fs(&transport).await;
    transport.push_json(StatusCode::OK, tree());

    let entries = fs.read_dir("/documents").await.unwrap();
    let names: Vec<_> = entries.iter().map(|entry| entry.name()).collect();

    assert_eq!(names, ["reports", "q3.pdf"]);
    assert!(entries[0].is_dir());
    assert!(!entries[1].is_dir());

    transport.push_json(StatusCode::OK, documents());
    assert!(matches!(
        fs.read_dir("/documents/q3.pdf").await,
        Err(Error::NotADirectory(_))
    ));
}
