//! Fully materialized HTTP response.
//!
//! The body is consumed to the end before a [`Response`] exists. Its decoded
//! form is chosen once by the call's [`DecodeMode`]; the raw buffer stays
//! available through [`Response::buffer`] regardless of mode.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;
use crate::headers::Headers;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// UTF-8 text, invalid sequences replaced.
    #[default]
    Text,
    Buffer,
    Json,
}

impl DecodeMode {
    pub fn from_flags(json: bool, buffer: bool) -> Self {
        if json {
            DecodeMode::Json
        } else if buffer {
            DecodeMode::Buffer
        } else {
            DecodeMode::Text
        }
    }

    pub(crate) fn decode(self, buffer: &Bytes) -> Result<ResponseBody, Error> {
        Ok(match self {
            DecodeMode::Buffer => ResponseBody::Bytes(buffer.clone()),
            DecodeMode::Json => {
                ResponseBody::Json(serde_json::from_slice(buffer).map_err(Error::InvalidJson)?)
            }
            DecodeMode::Text => ResponseBody::Text(String::from_utf8_lossy(buffer).into_owned()),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
}

#[derive(Clone, Debug)]
pub struct Response {
    /// URL of the terminal hop: the last `Location` followed, or the request URL.
    pub url: Url,
    pub status: StatusCode,
    /// Headers exactly as the transport delivered them.
    pub raw_headers: HeaderMap,
    pub headers: Headers,
    pub body: ResponseBody,
    pub(crate) buffer: Bytes,
    pub(crate) redirects: usize,
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Number of redirects followed to reach this response.
    pub fn redirects(&self) -> usize {
        self.redirects
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Parses the raw buffer as JSON into any deserializable type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.buffer).map_err(Error::InvalidJson)
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_modes() {
        let buffer = Bytes::from_static(br#"{"x":1}"#);
        assert_eq!(
            DecodeMode::Text.decode(&buffer).unwrap(),
            ResponseBody::Text(r#"{"x":1}"#.to_string())
        );
        assert_eq!(
            DecodeMode::Buffer.decode(&buffer).unwrap(),
            ResponseBody::Bytes(buffer.clone())
        );
        assert_eq!(
            DecodeMode::Json.decode(&buffer).unwrap(),
            ResponseBody::Json(serde_json::json!({"x": 1}))
        );
    }

    #[test]
    fn test_invalid_json() {
        let err = DecodeMode::Json
            .decode(&Bytes::from_static(b"<html>"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidJson(_)));
    }

    #[test]
    fn test_lossy_text() {
        let body = DecodeMode::Text
            .decode(&Bytes::from_static(b"ok \xff"))
            .unwrap();
        assert_eq!(body, ResponseBody::Text("ok \u{fffd}".to_string()));
    }

    #[test]
    fn test_typed_json() {
        #[derive(serde::Deserialize)]
        struct Echo {
            x: u32,
        }

        let response = Response {
            url: Url::parse("http://example.test/").unwrap(),
            status: StatusCode::OK,
            raw_headers: HeaderMap::new(),
            headers: Headers::new(),
            body: ResponseBody::Text(r#"{"x":7}"#.to_string()),
            buffer: Bytes::from_static(br#"{"x":7}"#),
            redirects: 0,
        };
        assert_eq!(response.json::<Echo>().unwrap().x, 7);
        assert_eq!(response.as_text(), Some(r#"{"x":7}"#));
        assert!(response.as_json().is_none());
        assert_eq!(response.status_code(), 200);
    }
}
