use std::sync::Arc;
use std::time::Duration;

use http::Method;
use url::Url;

use crate::body::{Body, Fields, Payload};
use crate::cookies::CookieJar;
use crate::error::Error;
use crate::headers::Headers;
use crate::response::DecodeMode;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Declared intent for a call. Every field is optional; unset fields fall
/// through to the layer below (factory defaults, then [`Options::defaults`]).
#[derive(Clone, Default, bon::Builder)]
pub struct Options {
    pub method: Option<Method>,
    #[builder(into)]
    pub url: Option<String>,
    /// Replaces the URL's query string.
    pub query: Option<Fields>,
    #[builder(into)]
    pub body: Option<Body>,
    /// Sent as `multipart/form-data`; takes precedence over `body`.
    pub form: Option<Fields>,
    /// Decode the response as JSON.
    pub json: Option<bool>,
    /// Keep the response as raw bytes. `json` wins when both are set.
    pub buffer: Option<bool>,
    #[builder(default)]
    pub headers: Headers,
    pub decompress: Option<bool>,
    pub timeout: Option<Duration>,
    pub jar: Option<Arc<dyn CookieJar>>,
    pub redirects: Option<bool>,
    pub max_redirects: Option<usize>,
}

impl Options {
    /// The compiled-in bottom layer.
    pub fn defaults() -> Self {
        Options::builder()
            .method(Method::GET)
            .decompress(true)
            .redirects(true)
            .max_redirects(DEFAULT_MAX_REDIRECTS)
            .timeout(DEFAULT_TIMEOUT)
            .build()
    }

    /// A new option set where fields set on `self` win over `defaults`.
    /// Headers are merged key by key. Neither input is modified.
    pub fn layered_over(&self, defaults: &Options) -> Options {
        Options {
            method: self.method.clone().or_else(|| defaults.method.clone()),
            url: self.url.clone().or_else(|| defaults.url.clone()),
            query: self.query.clone().or_else(|| defaults.query.clone()),
            body: self.body.clone().or_else(|| defaults.body.clone()),
            form: self.form.clone().or_else(|| defaults.form.clone()),
            json: self.json.or(defaults.json),
            buffer: self.buffer.or(defaults.buffer),
            headers: self.headers.layered_over(&defaults.headers),
            decompress: self.decompress.or(defaults.decompress),
            timeout: self.timeout.or(defaults.timeout),
            jar: self.jar.clone().or_else(|| defaults.jar.clone()),
            redirects: self.redirects.or(defaults.redirects),
            max_redirects: self.max_redirects.or(defaults.max_redirects),
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("form", &self.form)
            .field("json", &self.json)
            .field("buffer", &self.buffer)
            .field("headers", &self.headers)
            .field("decompress", &self.decompress)
            .field("timeout", &self.timeout)
            .field("jar", &self.jar.as_ref().map(|_| "CookieJar"))
            .field("redirects", &self.redirects)
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}

/// A fully resolved request descriptor for one logical call.
///
/// `url` is rewritten as redirects are followed. `body` and `form` are drained
/// into `payload` by body normalization, after which only the payload is sent.
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub query: Option<Fields>,
    pub body: Option<Body>,
    pub form: Option<Fields>,
    pub decode: DecodeMode,
    pub headers: Headers,
    pub decompress: bool,
    pub timeout: Duration,
    pub jar: Option<Arc<dyn CookieJar>>,
    pub redirects: bool,
    pub max_redirects: usize,
    pub(crate) payload: Option<Payload>,
    /// The `cookie` header was attached from the jar rather than by the caller.
    pub(crate) cookie_from_jar: bool,
}

impl Request {
    /// Resolves `options` over [`Options::defaults`].
    pub fn from_options(options: Options) -> Result<Self, Error> {
        let options = options.layered_over(&Options::defaults());
        let raw_url = options
            .url
            .ok_or_else(|| Error::invalid_url("", "no URL given"))?;
        let url = Url::parse(&raw_url).map_err(|err| Error::invalid_url(raw_url.as_str(), err))?;

        Ok(Request {
            method: options.method.unwrap_or(Method::GET),
            url,
            query: options.query,
            body: options.body,
            form: options.form,
            decode: DecodeMode::from_flags(
                options.json.unwrap_or(false),
                options.buffer.unwrap_or(false),
            ),
            headers: options.headers,
            decompress: options.decompress.unwrap_or(true),
            timeout: options.timeout.unwrap_or(DEFAULT_TIMEOUT),
            jar: options.jar,
            redirects: options.redirects.unwrap_or(true),
            max_redirects: options.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS),
            payload: None,
            cookie_from_jar: false,
        })
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cookies::MemoryCookieJar;

    #[test]
    fn test_resolve_defaults() {
        let request = Request::from_options(Options::builder().url("http://example.test/").build())
            .unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.timeout, Duration::from_millis(30_000));
        assert_eq!(request.max_redirects, 10);
        assert!(request.redirects);
        assert!(request.decompress);
        assert!(request.jar.is_none());
        assert_eq!(request.decode, DecodeMode::Text);
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_resolve_requires_valid_url() {
        let err = Request::from_options(Options::default()).err().unwrap();
        assert!(matches!(err, Error::InvalidUrl { .. }));

        let err = Request::from_options(Options::builder().url("not a url").build())
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn test_decode_flags() {
        let resolve = |json, buffer| {
            Request::from_options(
                Options::builder()
                    .url("http://example.test/")
                    .json(json)
                    .buffer(buffer)
                    .build(),
            )
            .unwrap()
            .decode
        };
        assert_eq!(resolve(false, false), DecodeMode::Text);
        assert_eq!(resolve(false, true), DecodeMode::Buffer);
        assert_eq!(resolve(true, false), DecodeMode::Json);
        assert_eq!(resolve(true, true), DecodeMode::Json);
    }

    #[test]
    fn test_layering_does_not_mutate() {
        let mut base_headers = Headers::new();
        base_headers.set("x-base", "1");
        let defaults = Options::builder()
            .max_redirects(3)
            .headers(base_headers)
            .jar(Arc::new(MemoryCookieJar::new()) as Arc<dyn CookieJar>)
            .build();

        let mut call_headers = Headers::new();
        call_headers.set("x-call", "2");
        let call = Options::builder()
            .method(Method::POST)
            .max_redirects(5)
            .headers(call_headers)
            .build();

        let merged = call.layered_over(&defaults);
        assert_eq!(merged.method, Some(Method::POST));
        assert_eq!(merged.max_redirects, Some(5));
        assert!(merged.jar.is_some());
        assert_eq!(merged.headers.get("x-base"), Some("1"));
        assert_eq!(merged.headers.get("x-call"), Some("2"));

        assert_eq!(defaults.method, None);
        assert_eq!(defaults.max_redirects, Some(3));
        assert!(defaults.headers.get("x-call").is_none());
        assert!(call.jar.is_none());
    }
}
