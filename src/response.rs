//! Outgoing response buffer and the writer capability handed to handlers.
//!
//! Every request gets one fresh [`ResponseWriter`]. The pipeline writes to
//! it, or hands it to a handler that asked for it, and finally converts it
//! into an `http::Response`. Nothing reaches the socket before that, so a
//! failure late in the pipeline can still discard a half-written body.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

/// The writer capability.
///
/// Taking a `ResponseWriter` parameter tells the binder the handler produces
/// the response itself. Clones share one buffer. Once the pipeline has sent
/// the response the writer is sealed: later writes fail with
/// [`io::ErrorKind::BrokenPipe`] and header or status changes are ignored.
///
/// ```rust
/// use std::io::Write;
/// use rivet::ResponseWriter;
///
/// async fn download(mut w: ResponseWriter) {
///     w.set_status(http::StatusCode::OK);
///     w.insert_header(http::header::CONTENT_TYPE, "text/csv");
///     let _ = w.write_all(b"id,name\n1,alice\n");
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct ResponseWriter {
    inner: Arc<Mutex<Buffer>>,
}

#[derive(Debug, Default)]
struct Buffer {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    sealed: bool,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status line. Defaults to `200 OK` if never called.
    pub fn set_status(&self, status: StatusCode) {
        let mut buf = self.lock();
        if !buf.sealed {
            buf.status = Some(status);
        }
    }

    /// The status set so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.lock().status
    }

    pub fn insert_header(&self, name: HeaderName, value: &'static str) {
        self.insert_header_value(name, HeaderValue::from_static(value));
    }

    pub fn insert_header_value(&self, name: HeaderName, value: HeaderValue) {
        let mut buf = self.lock();
        if !buf.sealed {
            buf.headers.insert(name, value);
        }
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.lock().headers.get(name).cloned()
    }

    pub fn set_content_type(&self, content_type: &'static str) {
        self.insert_header(CONTENT_TYPE, content_type);
    }

    /// Appends to the body.
    pub fn write_body(&self, bytes: &[u8]) -> io::Result<()> {
        let mut buf = self.lock();
        if buf.sealed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "response already sent"));
        }
        buf.body.extend_from_slice(bytes);
        Ok(())
    }

    /// Number of body bytes written so far.
    pub fn written(&self) -> usize {
        self.lock().body.len()
    }

    /// Drops everything written so far: status, headers and body.
    pub(crate) fn reset(&self) {
        let mut buf = self.lock();
        if !buf.sealed {
            buf.status = None;
            buf.headers.clear();
            buf.body.clear();
        }
    }

    /// Seals the writer and takes its contents as a response.
    pub(crate) fn finish(&self) -> http::Response<Full<Bytes>> {
        let mut buf = self.lock();
        buf.sealed = true;
        let body = std::mem::take(&mut buf.body);
        let mut response = http::Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = buf.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = std::mem::take(&mut buf.headers);
        response
    }

    // A panic while holding the lock leaves the buffer consistent: every
    // mutation above is a single assignment or append.
    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl io::Write for ResponseWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.write_body(bytes)?;
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use http_body_util::BodyExt;

    use super::*;

    async fn body_of(res: http::Response<Full<Bytes>>) -> Bytes {
        res.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn defaults_to_empty_200() {
        let res = ResponseWriter::new().finish();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_of(res).await.is_empty());
    }

    #[tokio::test]
    async fn clones_share_one_buffer() {
        let w = ResponseWriter::new();
        let mut handle = w.clone();
        handle.set_status(StatusCode::CREATED);
        handle.write_all(b"hello").unwrap();
        assert_eq!(w.written(), 5);

        let res = w.finish();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(body_of(res).await, "hello");
    }

    #[test]
    fn sealed_writer_rejects_writes() {
        let w = ResponseWriter::new();
        let mut late = w.clone();
        let _ = w.finish();

        let err = late.write_all(b"too late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        late.set_status(StatusCode::IM_A_TEAPOT);
        assert_eq!(late.status(), None);
    }

    #[test]
    fn reset_discards_partial_output() {
        let w = ResponseWriter::new();
        w.set_content_type("application/json");
        w.write_body(b"{\"da").unwrap();
        w.reset();
        assert_eq!(w.written(), 0);
        assert!(w.header(&CONTENT_TYPE).is_none());
    }
}
