//! Pre-send steps and wire request construction.
//!
//! The steps run strictly in order, each finishing before the next starts:
//! body normalization, then content length, then cookies. Content length
//! depends on the normalized payload, and cookie lookup depends on the final
//! URL, so the query string is merged before any of them.

use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use url::Url;

use crate::body::{Body, ByteStream, Fields, Payload};
use crate::client::{OutgoingBody, RequestParts};
use crate::error::Error;
use crate::multipart::Form;
use crate::options::Request;

pub async fn prepare(mut request: Request) -> Result<Request, Error> {
    merge_query(&mut request.url, request.query.as_ref())?;
    normalize_body(&mut request);
    set_content_length(&mut request).await?;
    set_cookies(&mut request).await?;
    Ok(request)
}

/// Replaces the URL's query string with the encoded fields.
pub fn merge_query(url: &mut Url, query: Option<&Fields>) -> Result<(), Error> {
    let Some(query) = query else {
        return Ok(());
    };
    let encoded = query
        .to_query()
        .map_err(|err| Error::invalid_url(url.as_str(), err))?;
    if encoded.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&encoded));
    }
    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Turns the declared body (or form) into the payload that goes on the wire.
pub fn normalize_body(request: &mut Request) {
    let form = request.form.take();
    let body = request.body.take();

    request.payload = if let Some(fields) = form {
        let form = Form::from_fields(&fields);
        request.headers.set("content-type", form.content_type());
        Some(Payload::Stream(form.into_stream()))
    } else {
        match body {
            Some(Body::Text(text)) => Some(Payload::Text(text)),
            Some(Body::Bytes(bytes)) => {
                Some(Payload::Text(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Some(Body::Stream(stream)) => Some(Payload::Stream(stream)),
            Some(Body::Json(value @ serde_json::Value::Object(_))) => {
                request.headers.set("content-type", "application/json");
                Some(Payload::Text(value.to_string()))
            }
            Some(Body::Json(other)) => {
                tracing::debug!(
                    kind = json_kind(&other),
                    "dropping JSON body that is not an object"
                );
                None
            }
            None => None,
        }
    };
}

pub async fn set_content_length(request: &mut Request) -> Result<(), Error> {
    if request.headers.contains("content-length") {
        return Ok(());
    }
    let length = match &request.payload {
        None => return Ok(()),
        Some(Payload::Text(text)) => text.len() as u64,
        Some(Payload::Stream(stream)) => match stream.length().await {
            Some(result) => result.map_err(|err| Error::adapter("body length query", err))?,
            // chunked
            None => return Ok(()),
        },
    };
    request.headers.set("content-length", length.to_string());
    Ok(())
}

pub async fn set_cookies(request: &mut Request) -> Result<(), Error> {
    let Some(jar) = request.jar.clone() else {
        return Ok(());
    };
    if request.headers.contains("cookie") {
        return Ok(());
    }
    let cookies = jar
        .get_cookie_string(&request.url)
        .await
        .map_err(|err| Error::adapter("cookie lookup", err))?;
    if !cookies.is_empty() {
        request.headers.set("cookie", cookies);
        request.cookie_from_jar = true;
    }
    Ok(())
}

fn full<T: Into<Bytes>>(chunk: T) -> OutgoingBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn empty() -> OutgoingBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn streamed(stream: ByteStream) -> OutgoingBody {
    StreamBody::new(stream.map(|chunk| chunk.map(hyper::body::Frame::data))).boxed_unsync()
}

/// Builds the wire request for the current hop.
///
/// Text payloads are written whole on every hop. A stream can only be piped
/// once; later hops go out with an empty body and no `content-length`.
pub fn build(request: &Request) -> Result<http::Request<OutgoingBody>, Error> {
    let parts = RequestParts::parse(&request.url)
        .map_err(|err| Error::invalid_url(request.url.as_str(), err))?;

    let mut headers = request.headers.clone();
    if !headers.contains("host") {
        headers.set("host", parts.host);
    }
    if let Some(authorization) = parts.authorization {
        if !headers.contains("authorization") {
            headers.set("authorization", authorization);
        }
    }

    let spent_stream = matches!(&request.payload, Some(Payload::Stream(s)) if s.is_consumed());
    if spent_stream {
        tracing::warn!(
            url = %request.url,
            "stream body was already sent, this hop goes out without a body"
        );
        headers.remove("content-length");
    }
    let header_map = headers.to_header_map()?;

    let body = match &request.payload {
        Some(Payload::Text(text)) => full(text.clone()),
        Some(Payload::Stream(stream)) => match stream.take() {
            Some(stream) => streamed(stream),
            None => empty(),
        },
        None => empty(),
    };

    let mut builder = http::Request::builder()
        .method(request.method.clone())
        .uri(parts.uri.as_str());
    if let Some(map) = builder.headers_mut() {
        *map = header_map;
    }
    Ok(builder.body(body)?)
}
