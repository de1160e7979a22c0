//! Resumable chunked uploads.
//!
//! Files go up in bounded multipart transfers: every chunk repeats the
//! session fields, and the server only materializes the file once the
//! final chunk arrives. Nothing is visible remotely before that.
use std::{io, iter};

use bytes::{Bytes, BytesMut};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::{
    api::Envelope,
    errors::Error,
    files::File,
    path,
    transport::{Body, Form, Method},
    Client,
};

const UPLOAD: &str = "api/upload";

/// Chunk size in bytes. Uploads larger than this are cut into
/// sequentially numbered chunks; the chunk boundary is part of the wire
/// protocol, so this is not a tuning knob.
pub const CHUNK_SIZE: u64 = 15 * 1024 * 1024;

/// Plan an upload: 1-based chunk numbers paired with the byte count each
/// chunk carries. Every chunk is [`CHUNK_SIZE`] long except the final
/// one, which takes the remainder.
fn chunk_lengths(size: u64) -> impl Iterator<Item = (u64, u64)> {
    let mut pos = 0;

    iter::from_fn(move || {
        if pos >= size {
            return None;
        }

        let chunk = pos / CHUNK_SIZE + 1;
        let len = (size - pos).min(CHUNK_SIZE);
        pos += len;

        Some((chunk, len))
    })
}

/// Fields repeated in every chunk of one upload session.
fn session_fields(
    session: Uuid,
    name: &str,
    size: u64,
    total_chunks: u64,
    parent: &str,
) -> Vec<(String, String)> {
    vec![
        ("resumableChunkSize".to_owned(), CHUNK_SIZE.to_string()),
        ("resumableTotalSize".to_owned(), size.to_string()),
        ("resumableIdentifier".to_owned(), session.to_string()),
        (
            "resumableType".to_owned(),
            mime::APPLICATION_OCTET_STREAM.to_string(),
        ),
        ("resumableFilename".to_owned(), name.to_owned()),
        ("resumableRelativePath".to_owned(), name.to_owned()),
        ("resumableTotalChunks".to_owned(), total_chunks.to_string()),
        ("context".to_owned(), "file-storage".to_owned()),
        (
            "contextData".to_owned(),
            json!({ "folder": parent }).to_string(),
        ),
    ]
}

/// Read exactly `len` bytes.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, len: u64) -> io::Result<Bytes> {
    #[allow(clippy::cast_possible_truncation)]
    let len = len as usize; // chunk lengths never exceed CHUNK_SIZE

    let mut buf = BytesMut::with_capacity(len);
    buf.resize(len, 0);

    let mut cursor = 0;

    loop {
        let n = reader.read(&mut buf[cursor..]).await?;

        if n == 0 {
            // The buffer is full or the reader is empty, or both.
            break;
        }

        cursor += n;
    }

    if cursor < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "reader ended before the promised upload size",
        ));
    }

    Ok(buf.freeze())
}

impl Client {
    /// Upload `size` bytes from `reader` to the file at `target`,
    /// creating or replacing it.
    ///
    /// Chunks are posted strictly in order within one session; the chunk
    /// index is the server's reassembly key. The finished file record
    /// comes back with the final chunk.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyUpload`] if `size` is zero; nothing is sent
    /// - [`Error::ChunkRejected`] if the server refuses a chunk; the
    ///   upload is abandoned and no partial file exists remotely
    /// - [`Error::Io`] if `reader` runs dry before `size` bytes
    /// - [`Error::IncompleteUpload`] if every chunk was accepted but no
    ///   file record came back
    #[instrument(skip(self, reader))]
    pub async fn chunked_upload<R>(
        &self,
        mut reader: R,
        target: &str,
        size: u64,
    ) -> crate::Result<File>
    where
        R: AsyncRead + Unpin,
    {
        if size == 0 {
            return Err(Error::EmptyUpload);
        }

        let (parent, name) = path::split(target);
        let total_chunks = size.div_ceil(CHUNK_SIZE);
        let session = Uuid::new_v4();
        let fields = session_fields(session, name, size, total_chunks, &parent);

        debug!("uploading {} bytes in {} chunks", size, total_chunks);

        for (chunk, len) in chunk_lengths(size) {
            let data = read_chunk(&mut reader, len).await?;

            trace!("posting chunk {} ({} bytes)", chunk, len);

            let mut fields = fields.clone();
            fields.push(("resumableChunkNumber".to_owned(), chunk.to_string()));
            fields.push(("resumableCurrentChunkSize".to_owned(), len.to_string()));

            let mut req = self.authed(Method::POST, UPLOAD).await?;
            req.body = Body::Multipart(Form {
                fields,
                file_name: name.to_owned(),
                data,
            });

            let res = self.execute(req).await?;
            let status = res.status();

            if !status.is_success() {
                let body = res.bytes().await?;
                let message = serde_json::from_slice::<Envelope>(&body)
                    .ok()
                    .and_then(|envelope| envelope.message)
                    .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());

                return Err(Error::ChunkRejected {
                    chunk,
                    status,
                    message,
                });
            }

            if chunk == total_chunks {
                return res.json().await;
            }
        }

        Err(Error::IncompleteUpload)
    }
}

#[cfg(test)]
mod tests {
    use rand::RngCore;
    use serde_json::json;
    use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

    use crate::{
        auth::Authenticator,
        transport::{mock::MockTransport, StatusCode},
    };

    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn chunk_plan() {
        assert_eq!(chunk_lengths(1).collect::<Vec<_>>(), [(1, 1)]);
        assert_eq!(
            chunk_lengths(20 * MIB).collect::<Vec<_>>(),
            [(1, 15 * MIB), (2, 5 * MIB)]
        );
        assert_eq!(
            chunk_lengths(30 * MIB).collect::<Vec<_>>(),
            [(1, 15 * MIB), (2, 15 * MIB)]
        );
        assert_eq!(chunk_lengths(0).count(), 0);
    }

    #[test]
    fn only_the_final_chunk_is_short() {
        for size in [1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 47 * MIB] {
            let plan: Vec<_> = chunk_lengths(size).collect();

            assert_eq!(plan.iter().map(|(_, len)| len).sum::<u64>(), size);
            assert!(plan[..plan.len() - 1]
                .iter()
                .all(|&(_, len)| len == CHUNK_SIZE));
            assert_eq!(plan.last().unwrap().0, size.div_ceil(CHUNK_SIZE));
        }
    }

    async fn client(transport: &MockTransport) -> Client {
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

    #[tokio::test]
    async fn upload_round_trips_across_chunks() {
        let mut payload = vec![0_u8; (CHUNK_SIZE + CHUNK_SIZE / 3) as usize];
        rand::thread_rng().fill_bytes(&mut payload);

        let transport = MockTransport::new();
        let client = client(&transport).await;
        transport.push_json(StatusCode::OK, json!({"success": true}));
        transport.push_json(
            StatusCode::OK,
            json!({
                "id": "f-9",
                "fileName": "big.bin",
                "type": "application/octet-stream",
                "size": payload.len(),
                "dateAdded": "2024-03-01T12:00:00Z",
                "folderPath": "/documents"
            }),
        );

        let file = client
            .chunked_upload(payload.as_slice(), "/documents/big.bin", payload.len() as u64)
            .await
            .unwrap();
        assert_eq!(file.id, "f-9");

        let requests = transport.requests();
        assert_eq!(requests.len(), 3, "login plus two chunks");

        let mut reassembled = Vec::new();

        for (i, req) in requests[1..].iter().enumerate() {
            assert_eq!(req.url.path(), "/api/upload");

            let form = req.body.as_multipart().unwrap();
            assert_eq!(
                form.field("resumableChunkNumber").unwrap(),
                (i + 1).to_string()
            );
            assert_eq!(form.field("resumableTotalChunks").unwrap(), "2");
            assert_eq!(
                form.field("resumableTotalSize").unwrap(),
                payload.len().to_string()
            );
            assert_eq!(form.field("context").unwrap(), "file-storage");
            assert_eq!(
                form.field("contextData").unwrap(),
                r#"{"folder":"/documents"}"#
            );
            assert_eq!(form.field("resumableFilename").unwrap(), "big.bin");

            reassembled.extend_from_slice(&form.data);
        }

        assert_eq!(
            reassembled, payload,
            "chunking must be transparent to the payload"
        );
    }

    #[tokio::test]
    async fn rejected_chunk_aborts_the_upload() {
        let payload = vec![7_u8; (CHUNK_SIZE + 1) as usize];

        let transport = MockTransport::new();
        let client = client(&transport).await;
        transport.push_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"success": false, "message": "chunk out of order"}),
        );

        let err = client
            .chunked_upload(payload.as_slice(), "/big.bin", payload.len() as u64)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::ChunkRejected { chunk: 1, message, .. } if message == "chunk out of order"
        ));
        assert_eq!(
            transport.request_count(),
            2,
            "no further chunks after a rejection"
        );
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_locally() {
        let transport = MockTransport::new();
        let client = client(&transport).await;

        let err = client.chunked_upload(&b""[..], "/x", 0).await.unwrap_err();

        assert!(matches!(err, Error::EmptyUpload));
        assert_eq!(transport.request_count(), 1, "only the login request");
    }

    #[tokio::test]
    async fn short_reader_is_an_io_error() {
        let transport = MockTransport::new();
        let client = client(&transport).await;

        let err = client
            .chunked_upload(&b"0123456789"[..], "/short.bin", 20)
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof)
        );
        assert_eq!(transport.request_count(), 1, "nothing was posted");
    }
}
