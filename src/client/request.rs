use futures::future::BoxFuture;
use http_body_util::BodyExt;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;

use super::connect::connect;
use super::types::ConnectionKind;
use super::{IncomingBody, OutgoingBody, SendOptions, Transport};
use crate::error::{BoxError, TimedOut};

/// HTTP/1.1 over a fresh TCP or TLS connection per request.
///
/// The timeout bounds connecting plus waiting for the response head; reading
/// the body afterwards is not bounded. `decompress` is accepted but no codec
/// is applied: bodies are returned as sent.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport;

impl HttpTransport {
    pub fn new() -> Self {
        Self
    }
}

fn origin_form(uri: &http::Uri) -> Result<http::Uri, BoxError> {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Ok(path.parse()?)
}

async fn exchange(
    connection: ConnectionKind,
    request: Request<OutgoingBody>,
) -> Result<Response<hyper::body::Incoming>, BoxError> {
    let stream = connect(&connection).await?;
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "connection closed with error");
        }
    });

    sender.send_request(request).await.map_err(Into::into)
}

async fn send_request(
    request: Request<OutgoingBody>,
    options: SendOptions,
) -> Result<Response<IncomingBody>, BoxError> {
    let connection = ConnectionKind::from_uri(request.uri())?;
    let (mut parts, body) = request.into_parts();
    parts.uri = origin_form(&parts.uri)?;
    let request = Request::from_parts(parts, body);

    tracing::trace!(
        connection = ?connection,
        decompress = options.decompress,
        timeout_ms = options.timeout.as_millis() as u64,
        "opening connection"
    );

    let round_trip = exchange(connection, request);
    let response = match tokio::time::timeout(options.timeout, round_trip).await {
        Ok(result) => result?,
        Err(_) => return Err(Box::new(TimedOut)),
    };

    Ok(response.map(|body| body.map_err(|e| Box::new(e) as BoxError).boxed_unsync()))
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: Request<OutgoingBody>,
        options: SendOptions,
    ) -> BoxFuture<'static, Result<Response<IncomingBody>, BoxError>> {
        Box::pin(send_request(request, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_form() {
        let uri: http::Uri = "http://example.test:8080/a/b?c=d".parse().unwrap();
        assert_eq!(origin_form(&uri).unwrap(), "/a/b?c=d");
        let uri: http::Uri = "http://example.test".parse().unwrap();
        assert_eq!(origin_form(&uri).unwrap(), "/");
    }
}
