//! Sending, redirect following, cookie harvesting and decoding.
//!
//! ```text
//! Building → Sent → (Redirecting → Building)* → Receiving → Decoding → Done
//! ```
//!
//! Any step can fail the call. Redirects are followed in a loop: the hop
//! counter, jar and descriptor carry over, and nothing is copied per hop.

use futures::future::try_join_all;
use http::header::LOCATION;
use http_body_util::BodyExt;
use url::Url;

use super::request::{build, merge_query, set_cookies};
use crate::client::{IncomingBody, SendOptions, Transport};
use crate::cookies::CookieJar;
use crate::error::Error;
use crate::headers::Headers;
use crate::options::Request;
use crate::response::Response;

pub async fn run(mut request: Request, transport: &dyn Transport) -> Result<Response, Error> {
    let mut redirects = 0usize;
    let options = SendOptions {
        timeout: request.timeout,
        decompress: request.decompress,
    };

    loop {
        let wire = build(&request)?;
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            hop = redirects,
            "sending request"
        );

        let response = transport.send(wire, options).await.map_err(Error::Transport)?;
        let status = response.status();

        if request.redirects && status.is_redirection() {
            match location(&response) {
                Some(location) => {
                    redirects += 1;
                    if redirects > request.max_redirects {
                        tracing::debug!(
                            url = %request.url,
                            max = request.max_redirects,
                            "redirect limit reached"
                        );
                        return Err(Error::TooManyRedirects {
                            max: request.max_redirects,
                        });
                    }
                    let next = resolve_location(&request.url, &location)?;
                    tracing::debug!(
                        status = status.as_u16(),
                        from = %request.url,
                        to = %next,
                        "following redirect"
                    );
                    drop(response);
                    follow(&mut request, next).await?;
                    continue;
                }
                None => {
                    tracing::warn!(
                        status = status.as_u16(),
                        url = %request.url,
                        "redirect status without a Location header"
                    );
                }
            }
        }

        return receive(request, response, redirects).await;
    }
}

fn location(response: &http::Response<IncomingBody>) -> Option<String> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Absolute locations are taken as-is; relative ones resolve against the
/// URL that answered with the redirect.
fn resolve_location(current: &Url, location: &str) -> Result<Url, Error> {
    Url::parse(location)
        .or_else(|_| current.join(location))
        .map_err(|err| Error::invalid_url(location, err))
}

async fn follow(request: &mut Request, next: Url) -> Result<(), Error> {
    request.url = next;
    merge_query(&mut request.url, request.query.as_ref())?;
    // Cookies the jar attached were scoped to the previous URL
    if request.cookie_from_jar {
        request.headers.remove("cookie");
        request.cookie_from_jar = false;
    }
    set_cookies(request).await
}

async fn receive(
    request: Request,
    response: http::Response<IncomingBody>,
    redirects: usize,
) -> Result<Response, Error> {
    let (parts, body) = response.into_parts();
    let headers = Headers::from(&parts.headers);

    harvest_cookies(request.jar.as_deref(), &request.url, &headers).await?;

    let buffer = body.collect().await.map_err(Error::Transport)?.to_bytes();
    let decoded = request.decode.decode(&buffer)?;

    tracing::debug!(
        status = parts.status.as_u16(),
        url = %request.url,
        bytes = buffer.len(),
        redirects,
        "response complete"
    );

    Ok(Response {
        url: request.url,
        status: parts.status,
        raw_headers: parts.headers,
        headers,
        body: decoded,
        buffer,
        redirects,
    })
}

/// Submits every `set-cookie` value to the jar concurrently and waits for all.
pub async fn harvest_cookies(
    jar: Option<&dyn CookieJar>,
    url: &Url,
    headers: &Headers,
) -> Result<(), Error> {
    let (Some(jar), Some(cookies)) = (jar, headers.get_all("set-cookie")) else {
        return Ok(());
    };
    try_join_all(cookies.iter().map(|cookie| jar.set_cookie(cookie, url)))
        .await
        .map_err(|err| Error::adapter("cookie store", err))?;
    Ok(())
}
