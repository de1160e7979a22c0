//! Pluggable HTTP transport.
//!
//! Everything the client sends goes through a [`Transport`], so tests can
//! swap the real HTTP stack for a scripted double and alternative runtimes
//! can bring their own client.
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{future, stream, stream::BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;

pub use reqwest::{header, Method, StatusCode};
use reqwest::{header::HeaderMap, Url};

use crate::errors::Error;

/// `User-Agent` sent with every request.
pub static USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
    " ",
    env!("CARGO_PKG_REPOSITORY")
);

/// A protocol-level request, independent of the HTTP client executing it.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: Url,
    /// Extra headers (authorization, range and friends).
    pub headers: HeaderMap,
    /// Request payload.
    pub body: Body,
}

/// Request payload variants understood by every [`Transport`].
#[derive(Debug, Clone)]
pub enum Body {
    /// No payload.
    Empty,
    /// A JSON document.
    Json(serde_json::Value),
    /// A `multipart/form-data` payload.
    Multipart(Form),
}

impl Body {
    /// The JSON document, if this is a JSON body.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The form, if this is a multipart body.
    #[must_use]
    pub fn as_multipart(&self) -> Option<&Form> {
        match self {
            Body::Multipart(form) => Some(form),
            _ => None,
        }
    }
}

/// A multipart form: text fields plus a single binary `file` part.
#[derive(Debug, Clone)]
pub struct Form {
    /// Text fields, in submission order.
    pub fields: Vec<(String, String)>,
    /// File name advertised for the binary part.
    pub file_name: String,
    /// Contents of the binary part.
    pub data: Bytes,
}

impl Form {
    /// Value of the first text field named `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn into_reqwest(self) -> crate::Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();

        for (key, value) in self.fields {
            form = form.text(key, value);
        }

        let part = reqwest::multipart::Part::bytes(self.data.to_vec())
            .file_name(self.file_name)
            .mime_str(mime::APPLICATION_OCTET_STREAM.as_ref())?;

        Ok(form.part("file", part))
    }
}

/// A transport-level response: a status code and a body stream.
pub struct Response {
    status: StatusCode,
    body: BoxStream<'static, crate::Result<Bytes>>,
}

impl Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Response {
    /// Assemble a response from its parts.
    #[must_use]
    pub fn new(status: StatusCode, body: BoxStream<'static, crate::Result<Bytes>>) -> Self {
        Self { status, body }
    }

    /// Response with an in-memory body.
    #[must_use]
    pub fn from_bytes(status: StatusCode, body: Bytes) -> Self {
        Self {
            status,
            body: stream::once(future::ready(Ok(body))).boxed(),
        }
    }

    /// Status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The body as a stream of chunks.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, crate::Result<Bytes>> {
        self.body
    }

    /// Buffer the whole body.
    ///
    /// # Errors
    ///
    /// Any transport error raised while the body was streaming.
    pub async fn bytes(self) -> crate::Result<Bytes> {
        let mut body = self.body;
        let mut buf = BytesMut::new();

        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }

        Ok(buf.freeze())
    }

    /// Buffer the whole body and decode it as JSON.
    ///
    /// # Errors
    ///
    /// - transport errors while the body was streaming
    /// - malformed JSON
    pub async fn json<T: DeserializeOwned>(self) -> crate::Result<T> {
        let bytes = self.bytes().await?;

        serde_json::from_slice(&bytes).map_err(Into::into)
    }
}

/// Something that can execute [`Request`]s, typically an HTTP client.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    /// Execute a request, returning the response head and body stream.
    async fn execute(&self, req: Request) -> crate::Result<Response>;
}

/// The default [`Transport`], backed by [`reqwest`].
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Transport with the default client configuration.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend fails to initialize.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap(),
        }
    }

    /// Wrap an existing [`reqwest::Client`].
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, req: Request) -> crate::Result<Response> {
        let mut builder = self.client.request(req.method, req.url).headers(req.headers);

        builder = match req.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Multipart(form) => builder.multipart(form.into_reqwest()?),
        };

        let res = builder.send().await?;

        Ok(Response::new(
            res.status(),
            res.bytes_stream().map_err(Error::from).boxed(),
        ))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    //! A scripted transport double for tests.
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::{Request, Response, StatusCode, Transport};
    use crate::errors::Error;

    /// A [`Transport`](super::Transport) replaying canned responses in
    /// FIFO order and recording every request it sees.
    ///
    /// Clones share the same script and request log, so tests can keep a
    /// handle after handing the transport off.
    #[derive(Debug, Clone, Default)]
    pub struct MockTransport {
        inner: Arc<Inner>,
    }

    #[derive(Debug, Default)]
    struct Inner {
        responses: Mutex<VecDeque<(StatusCode, Bytes)>>,
        requests: Mutex<Vec<Request>>,
    }

    impl MockTransport {
        /// An empty transport. Executing a request with no scripted
        /// response left returns an error.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a JSON response.
        pub fn push_json(&self, status: StatusCode, body: serde_json::Value) {
            self.push_bytes(status, Bytes::from(body.to_string()));
        }

        /// Queue a raw response body.
        pub fn push_bytes(&self, status: StatusCode, body: impl Into<Bytes>) {
            self.inner
                .responses
                .lock()
                .unwrap()
                .push_back((status, body.into()));
        }

        /// Every request executed so far, oldest first.
        #[must_use]
        pub fn requests(&self) -> Vec<Request> {
            self.inner.requests.lock().unwrap().clone()
        }

        /// Number of requests executed so far.
        #[must_use]
        pub fn request_count(&self) -> usize {
            self.inner.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(&self, req: Request) -> crate::Result<Response> {
            self.inner.requests.lock().unwrap().push(req);

            let (status, body) = self
                .inner
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Api("mock transport script exhausted".to_owned()))?;

            Ok(Response::from_bytes(status, body))
        }
    }
}
