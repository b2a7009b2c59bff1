pub mod body;
pub mod client;
pub mod cookies;
pub mod error;
pub mod grab;
pub mod headers;
pub mod multipart;
pub mod options;
pub mod pipeline;
pub mod response;
pub mod trace;

pub use crate::body::{Body, BodyStream, FieldValue, Fields};
pub use crate::client::{HttpTransport, Transport};
pub use crate::cookies::{CookieJar, MemoryCookieJar};
pub use crate::error::{BoxError, Error};
pub use crate::grab::Grab;
pub use crate::headers::Headers;
pub use crate::options::{Options, Request};
pub use crate::response::{DecodeMode, Response, ResponseBody};
