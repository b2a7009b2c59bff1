mod connect;
mod request;
mod types;

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::combinators::UnsyncBoxBody;

use crate::error::BoxError;

pub use self::request::HttpTransport;
pub use self::types::{ConnectionKind, RequestParts};

pub type OutgoingBody = UnsyncBoxBody<Bytes, BoxError>;
pub type IncomingBody = UnsyncBoxBody<Bytes, BoxError>;

/// Per-hop settings handed to the transport untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendOptions {
    pub timeout: Duration,
    pub decompress: bool,
}

/// Performs one request/response round-trip.
///
/// The request carries an absolute URI and complete headers (including
/// `host`). The returned body has not been read yet.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: http::Request<OutgoingBody>,
        options: SendOptions,
    ) -> BoxFuture<'static, Result<http::Response<IncomingBody>, BoxError>>;
}
