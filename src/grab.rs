use std::sync::Arc;

use http::Method;

use crate::client::{HttpTransport, Transport};
use crate::cookies::CookieJar;
use crate::error::Error;
use crate::options::{Options, Request};
use crate::pipeline;
use crate::response::Response;

/// A request factory: default options plus the transport calls go out on.
///
/// Cloning is cheap and clones share the transport and any jar.
#[derive(Clone)]
pub struct Grab {
    options: Options,
    transport: Arc<dyn Transport>,
}

impl Default for Grab {
    fn default() -> Self {
        Self::new()
    }
}

impl Grab {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Grab {
            options,
            transport: Arc::new(HttpTransport::new()),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// A new factory whose defaults are `options` layered over this one's.
    /// Neither this factory nor `options` is modified.
    pub fn defaults(&self, options: Options) -> Grab {
        Grab {
            options: options.layered_over(&self.options),
            transport: self.transport.clone(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The jar configured when this factory was created, if any.
    pub fn jar(&self) -> Option<Arc<dyn CookieJar>> {
        self.options.jar.clone()
    }

    pub async fn request(
        &self,
        url: impl Into<String>,
        options: Options,
    ) -> Result<Response, Error> {
        let mut options = options.layered_over(&self.options);
        options.url = Some(url.into());
        let request = Request::from_options(options)?;
        pipeline::execute(request, self.transport.as_ref()).await
    }

    async fn verb(
        &self,
        method: Method,
        url: String,
        mut options: Options,
    ) -> Result<Response, Error> {
        options.method = Some(method);
        self.request(url, options).await
    }

    pub async fn get(&self, url: impl Into<String>, options: Options) -> Result<Response, Error> {
        self.verb(Method::GET, url.into(), options).await
    }

    pub async fn head(&self, url: impl Into<String>, options: Options) -> Result<Response, Error> {
        self.verb(Method::HEAD, url.into(), options).await
    }

    pub async fn post(&self, url: impl Into<String>, options: Options) -> Result<Response, Error> {
        self.verb(Method::POST, url.into(), options).await
    }

    pub async fn put(&self, url: impl Into<String>, options: Options) -> Result<Response, Error> {
        self.verb(Method::PUT, url.into(), options).await
    }

    pub async fn patch(&self, url: impl Into<String>, options: Options) -> Result<Response, Error> {
        self.verb(Method::PATCH, url.into(), options).await
    }

    pub async fn delete(
        &self,
        url: impl Into<String>,
        options: Options,
    ) -> Result<Response, Error> {
        self.verb(Method::DELETE, url.into(), options).await
    }
}
