//! The request/response execution pipeline.
//!
//! ```text
//! Request
//!     → request.rs (query merge, body normalization, content length, cookies)
//!     → response.rs (send, follow redirects, harvest cookies, consume, decode)
//!     → Response
//! ```

pub mod request;
pub mod response;


use tracing::Instrument;

use crate::client::Transport;
use crate::error::Error;
use crate::options::Request;
use crate::response::Response;

/// Runs one logical call to completion.
///
/// A pre-send failure means nothing was transmitted.
pub async fn execute(request: Request, transport: &dyn Transport) -> Result<Response, Error> {
    let span = tracing::debug_span!("grab", method = %request.method, url = %request.url);
    async move {
        let request = request::prepare(request).await?;
        response::run(request, transport).await
    }
    .instrument(span)
    .await
}
