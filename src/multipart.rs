//! `multipart/form-data` encoding for form field mappings.
//!
//! Every field becomes one text part. The encoded form is exposed as a
//! [`BodyStream`] whose length is known up front, so `content-length` can be
//! filled in without buffering the parts into one allocation.

use bytes::Bytes;
use rand::Rng;

use crate::body::{BodyStream, FieldValue, Fields};

pub struct Form {
    boundary: String,
    parts: Vec<(String, String)>,
}

fn gen_boundary() -> String {
    let mut rng = rand::thread_rng();
    let a: u64 = rng.gen();
    let b: u64 = rng.gen();
    let c: u64 = rng.gen();
    let d: u64 = rng.gen();

    format!("{a:016x}-{b:016x}-{c:016x}-{d:016x}")
}

// Quotes and line breaks would end the disposition header early
fn escape_name(name: &str) -> String {
    name.replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

impl Form {
    pub fn new() -> Self {
        Self::with_boundary(gen_boundary())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    /// One part per scalar value, one part per element of a sequence.
    pub fn from_fields(fields: &Fields) -> Self {
        let mut form = Form::new();
        for (key, value) in fields.iter() {
            match value {
                FieldValue::One(v) => form.append(key, v),
                FieldValue::Many(values) => {
                    for v in values {
                        form.append(key, v);
                    }
                }
            }
        }
        form
    }

    pub fn append(&mut self, name: &str, value: &str) {
        self.parts.push((name.to_string(), value.to_string()));
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    fn encode_part(&self, name: &str, value: &str) -> Bytes {
        let mut buf = Vec::with_capacity(self.boundary.len() + name.len() + value.len() + 64);
        buf.extend_from_slice(b"--");
        buf.extend_from_slice(self.boundary.as_bytes());
        buf.extend_from_slice(b"\r\nContent-Disposition: form-data; name=\"");
        buf.extend_from_slice(escape_name(name).as_bytes());
        buf.extend_from_slice(b"\"\r\n\r\n");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
        Bytes::from(buf)
    }

    fn trailer(&self) -> Bytes {
        Bytes::from(format!("--{}--\r\n", self.boundary))
    }

    fn chunks(&self) -> Vec<Bytes> {
        let mut chunks: Vec<Bytes> = self
            .parts
            .iter()
            .map(|(name, value)| self.encode_part(name, value))
            .collect();
        chunks.push(self.trailer());
        chunks
    }

    /// Total encoded size in bytes.
    pub fn length(&self) -> u64 {
        self.chunks().iter().map(|c| c.len() as u64).sum()
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.chunks().concat())
    }

    pub fn into_stream(self) -> BodyStream {
        let chunks = self.chunks();
        let len = chunks.iter().map(|c| c.len() as u64).sum();
        let stream = futures::stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        BodyStream::new(stream).with_known_length(len)
    }
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}
