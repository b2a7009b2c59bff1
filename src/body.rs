use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use futures::FutureExt;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::error::BoxError;

pub type ByteStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// Asynchronous "how many bytes will this stream yield" query.
pub type LengthQuery = Arc<dyn Fn() -> BoxFuture<'static, Result<u64, BoxError>> + Send + Sync>;

/// A request body as declared by the caller.
///
/// Normalized exactly once into a [`Payload`] before anything is sent.
#[derive(Clone)]
pub enum Body {
    Text(String),
    /// Sent as its lossy UTF-8 text: invalid sequences become U+FFFD. Use
    /// [`Body::Stream`] for binary uploads.
    Bytes(Bytes),
    Stream(BodyStream),
    /// Serialized as JSON when it is an object; any other shape is dropped.
    Json(serde_json::Value),
}

impl Body {
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Body::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
            Body::Json(value) => f.debug_tuple("Json").field(value).finish(),
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

impl From<BodyStream> for Body {
    fn from(stream: BodyStream) -> Self {
        Body::Stream(stream)
    }
}

/// What actually goes on the wire once a [`Body`] has been normalized.
#[derive(Clone, Debug)]
pub enum Payload {
    Text(String),
    Stream(BodyStream),
}

/// A byte stream that is piped into the request.
///
/// Clones share the underlying stream: it is handed to the transport once and
/// every later `take` returns `None`. A stream may carry a deferred length
/// query, which the pre-send length step awaits to fill in `content-length`.
#[derive(Clone)]
pub struct BodyStream {
    inner: Arc<Mutex<Option<ByteStream>>>,
    length: Option<LengthQuery>,
}

impl BodyStream {
    pub fn new<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let stream = stream.map(|chunk| chunk.map_err(Into::into)).boxed();
        Self {
            inner: Arc::new(Mutex::new(Some(stream))),
            length: None,
        }
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::new(ReaderStream::new(reader))
    }

    /// Streams a file from disk, with its size as the known length.
    pub async fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self::from_reader(file).with_known_length(len))
    }

    pub fn with_length<F, Fut>(mut self, query: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<u64, BoxError>> + Send + 'static,
    {
        self.length = Some(Arc::new(move || query().boxed()));
        self
    }

    pub fn with_known_length(self, len: u64) -> Self {
        self.with_length(move || futures::future::ready(Ok(len)))
    }

    pub fn has_length(&self) -> bool {
        self.length.is_some()
    }

    /// Runs the deferred length query, if the stream declared one.
    pub async fn length(&self) -> Option<Result<u64, BoxError>> {
        match &self.length {
            Some(query) => Some(query().await),
            None => None,
        }
    }

    /// Hands out the stream. Only the first call gets it.
    pub fn take(&self) -> Option<ByteStream> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn is_consumed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("consumed", &self.is_consumed())
            .field("has_length", &self.has_length())
            .finish()
    }
}

/// Ordered field mapping used for query strings and multipart forms.
///
/// A key maps to one value or to a sequence; a sequence is expanded into one
/// entry per element with the key repeated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields(Vec<(String, FieldValue)>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::One(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::One(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::Many(values)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(values: Vec<&str>) -> Self {
        FieldValue::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for FieldValue {
    fn from(values: [&str; N]) -> Self {
        FieldValue::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an earlier value for the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
        self
    }

    /// Adds `value` under `key`, turning an existing single value into a sequence.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => {
                let mut values = match std::mem::replace(slot, FieldValue::Many(Vec::new())) {
                    FieldValue::One(first) => vec![first],
                    FieldValue::Many(values) => values,
                };
                values.push(value);
                *slot = FieldValue::Many(values);
            }
            None => self.0.push((key, FieldValue::One(value))),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flattened `(key, value)` pairs, sequences expanded in order.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        for (key, value) in self.iter() {
            match value {
                FieldValue::One(v) => pairs.push((key, v.as_str())),
                FieldValue::Many(values) => {
                    pairs.extend(values.iter().map(|v| (key, v.as_str())));
                }
            }
        }
        pairs
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `application/x-www-form-urlencoded` rendering of [`Fields::pairs`].
    pub fn to_query(&self) -> Result<String, serde_urlencoded::ser::Error> {
        serde_urlencoded::to_string(self.pairs())
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (key, value) in iter {
            fields.insert(key, value);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_pairs_expand_sequences() {
        let fields: Fields = [
            ("a", FieldValue::from("1")),
            ("b", FieldValue::from(["x", "y"])),
        ]
        .into_iter()
        .collect();
        assert_eq!(fields.pairs(), vec![("a", "1"), ("b", "x"), ("b", "y")]);
        assert_eq!(fields.to_query().unwrap(), "a=1&b=x&b=y");
    }

    #[test]
    fn test_fields_push() {
        let mut fields = Fields::new();
        fields.push("tag", "one").push("tag", "two").push("other", "3");
        assert_eq!(
            fields.pairs(),
            vec![("tag", "one"), ("tag", "two"), ("other", "3")]
        );
    }

    #[test]
    fn test_query_escaping() {
        let fields: Fields = [("q", "a b&c")].into_iter().collect();
        assert_eq!(fields.to_query().unwrap(), "q=a+b%26c");
    }

    #[tokio::test]
    async fn test_stream_taken_once() {
        let chunks = vec![Ok::<_, std::io::Error>(Bytes::from_static(b"hi"))];
        let stream = BodyStream::new(futures::stream::iter(chunks)).with_known_length(2);
        let shared = stream.clone();

        assert_eq!(stream.length().await.unwrap().unwrap(), 2);
        let mut taken = shared.take().unwrap();
        assert!(stream.is_consumed());
        assert!(stream.take().is_none());
        assert_eq!(taken.next().await.unwrap().unwrap(), Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn test_stream_without_length() {
        let stream = BodyStream::from_reader(&b"abc"[..]);
        assert!(!stream.has_length());
        assert!(stream.length().await.is_none());
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, [0u8, 159, 146, 150]).unwrap();

        let stream = BodyStream::from_file(&path).await.unwrap();
        assert_eq!(stream.length().await.unwrap().unwrap(), 4);
        let mut collected = Vec::new();
        let mut inner = stream.take().unwrap();
        while let Some(chunk) = inner.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, vec![0u8, 159, 146, 150]);
    }
}
