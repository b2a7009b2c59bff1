//! Cookie jar capability and an in-memory implementation.
//!
//! The request pipeline only ever talks to a jar through [`CookieJar`]:
//! `get_cookie_string` before a request goes out and `set_cookie` for every
//! `Set-Cookie` header of the response. Jars are shared between concurrent
//! calls, so implementations synchronize internally.
//!
//! [`MemoryCookieJar`] handles the subset of RFC 6265 a client needs: `Domain`
//! (host-only vs domain cookies), `Path` (with the default-path rule),
//! `Secure`, `HttpOnly`, `SameSite`, `Expires` and `Max-Age`. Setting an
//! already-expired cookie removes any stored cookie with the same name,
//! domain and path. Nothing is persisted.

use std::sync::RwLock;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::BoxError;

pub trait CookieJar: Send + Sync {
    /// The `Cookie` request header value for `url`. Empty when nothing matches.
    fn get_cookie_string<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<String, BoxError>>;

    /// Stores one `Set-Cookie` header value received from `url`.
    fn set_cookie<'a>(
        &'a self,
        cookie: &'a str,
        url: &'a Url,
    ) -> BoxFuture<'a, Result<(), BoxError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Host the cookie was set by, or the `Domain` attribute without its leading dot.
    pub domain: String,
    /// `true` when no `Domain` attribute was given: only the exact host matches.
    pub host_only: bool,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CookieError(String);

impl std::fmt::Display for CookieError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CookieError {}

fn default_path(url: &Url) -> String {
    let path = url.path();
    if !path.starts_with('/') {
        return "/".to_string();
    }
    match path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir.to_string(),
        _ => "/".to_string(),
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host.eq_ignore_ascii_case(domain)
        || (host.len() > domain.len()
            && host[host.len() - domain.len()..].eq_ignore_ascii_case(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}

// Netscape-style dates, as in `Thu, 01-Jan-1970 00:00:01 GMT`
const DASHED_FORMATS: [&str; 2] = ["%a, %d-%b-%y %H:%M:%S GMT", "%a, %d-%b-%Y %H:%M:%S GMT"];

fn parse_expires(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    DASHED_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// `now` shifted by `seconds`, saturating at the representable range.
fn expires_after(now: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    Duration::try_seconds(seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(if seconds < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

impl Cookie {
    /// Parses a `Set-Cookie` header value received from `url`.
    pub fn parse(header: &str, url: &Url) -> Result<Self, CookieError> {
        let host = url
            .host_str()
            .ok_or_else(|| CookieError(format!("URL has no host: {}", url)))?
            .to_ascii_lowercase();

        let mut attributes = header.split(';');
        let pair = attributes.next().unwrap_or_default();
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| CookieError(format!("Cookie failed to parse: {:?}", header)))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(CookieError(format!("Cookie has no name: {:?}", header)));
        }

        let now = Utc::now();
        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: host.clone(),
            host_only: true,
            path: default_path(url),
            secure: false,
            http_only: false,
            same_site: None,
            expires: None,
            created: now,
        };

        let mut max_age = None;
        for attribute in attributes {
            let attribute = attribute.trim();
            let (key, val) = match attribute.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attribute, ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    if !domain_matches(&host, &domain) {
                        return Err(CookieError(format!(
                            "Cookie not in this host's domain. Cookie:{} Request:{}",
                            domain, host
                        )));
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "expires" => cookie.expires = parse_expires(val).or(cookie.expires),
                "max-age" => max_age = val.parse::<i64>().ok(),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "samesite" => {
                    let normalized = if val.eq_ignore_ascii_case("lax") {
                        "Lax"
                    } else if val.eq_ignore_ascii_case("strict") {
                        "Strict"
                    } else if val.eq_ignore_ascii_case("none") {
                        "None"
                    } else {
                        val
                    };
                    cookie.same_site = Some(normalized.to_string());
                }
                _ => {}
            }
        }

        // Max-Age takes precedence over Expires
        if let Some(seconds) = max_age {
            cookie.expires = Some(expires_after(now, seconds));
        }

        Ok(cookie)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    fn matches(&self, url: &Url, now: DateTime<Utc>) -> bool {
        let host = url.host_str().unwrap_or_default();
        let host_ok = if self.host_only {
            host.eq_ignore_ascii_case(&self.domain)
        } else {
            domain_matches(host, &self.domain)
        };
        let secure_ok = !self.secure || url.scheme() == "https" || url.scheme() == "wss";

        host_ok && secure_ok && path_matches(url.path(), &self.path) && !self.is_expired(now)
    }

    fn same_slot(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}

/// Cookie jar that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: RwLock<Vec<Cookie>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, header: &str, url: &Url) -> Result<(), CookieError> {
        let cookie = Cookie::parse(header, url)?;
        let now = Utc::now();
        let mut cookies = self
            .cookies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let existing = cookies.iter().position(|c| c.same_slot(&cookie));
        match (existing, cookie.is_expired(now)) {
            (Some(idx), true) => {
                cookies.remove(idx);
            }
            (Some(idx), false) => {
                // replacement keeps its creation time
                let created = cookies[idx].created;
                cookies[idx] = Cookie { created, ..cookie };
            }
            (None, true) => {}
            (None, false) => cookies.push(cookie),
        }
        Ok(())
    }

    /// Matching cookies, longest path first, then oldest first.
    pub fn matching(&self, url: &Url) -> Vec<Cookie> {
        let now = Utc::now();
        let cookies = self
            .cookies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut matching: Vec<Cookie> = cookies
            .iter()
            .filter(|c| c.matches(url, now))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then(a.created.cmp(&b.created))
        });
        matching
    }

    pub fn cookie_string(&self, url: &Url) -> String {
        self.matching(url)
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Snapshot of every stored cookie, expired ones included.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.cookies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl CookieJar for MemoryCookieJar {
    fn get_cookie_string<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<String, BoxError>> {
        Box::pin(async move { Ok(self.cookie_string(url)) })
    }

    fn set_cookie<'a>(
        &'a self,
        cookie: &'a str,
        url: &'a Url,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move { self.store(cookie, url).map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use static_assertions::assert_impl_all;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_jar_is_send_sync() {
        assert_impl_all!(MemoryCookieJar: Send, Sync);
    }

    #[test]
    fn test_parse_attributes() {
        let cookie = Cookie::parse(
            "sid=abc; Path=/app; Domain=.Example.test; Secure; HttpOnly; SameSite=lax",
            &url("https://www.example.test/app/login"),
        )
        .unwrap();
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.value, "abc");
        assert_eq!(cookie.domain, "example.test");
        assert!(!cookie.host_only);
        assert_eq!(cookie.path, "/app");
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site.as_deref(), Some("Lax"));
    }

    #[test]
    fn test_default_path() {
        let cookie = Cookie::parse("a=1", &url("http://example.test/docs/page.html")).unwrap();
        assert_eq!(cookie.path, "/docs");
        let cookie = Cookie::parse("a=1", &url("http://example.test/page")).unwrap();
        assert_eq!(cookie.path, "/");
    }

    #[test]
    fn test_parse_rejects() {
        let from = url("http://example.test/");
        assert!(Cookie::parse("novalue", &from).is_err());
        assert!(Cookie::parse("=1", &from).is_err());
        assert!(Cookie::parse("a=1; Domain=other.test", &from).is_err());
    }

    #[test]
    fn test_cookie_string_matching() {
        let jar = MemoryCookieJar::new();
        let origin = url("http://example.test/");
        jar.store("a=1", &origin).unwrap();
        jar.store("b=2; Path=/api", &origin).unwrap();
        jar.store("s=3; Secure", &origin).unwrap();

        assert_eq!(jar.cookie_string(&url("http://example.test/")), "a=1");
        assert_eq!(
            jar.cookie_string(&url("http://example.test/api/items")),
            "b=2; a=1"
        );
        assert_eq!(jar.cookie_string(&url("http://example.test/apix")), "a=1");
        assert_eq!(jar.cookie_string(&url("https://example.test/")), "a=1; s=3");
        assert_eq!(jar.cookie_string(&url("http://other.test/")), "");
    }

    #[test]
    fn test_host_only_vs_domain() {
        let jar = MemoryCookieJar::new();
        let from = url("http://example.test/");
        jar.store("host=1", &from).unwrap();
        jar.store("dom=2; Domain=example.test", &from).unwrap();

        assert_eq!(jar.cookie_string(&url("http://sub.example.test/")), "dom=2");
        assert_eq!(jar.cookie_string(&url("http://example.test/")), "host=1; dom=2");
        assert_eq!(jar.cookie_string(&url("http://badexample.test/")), "");
    }

    #[test]
    fn test_replace_and_expire() {
        let jar = MemoryCookieJar::new();
        let from = url("http://example.test/");
        jar.store("a=1", &from).unwrap();
        jar.store("a=2", &from).unwrap();
        assert_eq!(jar.cookie_string(&from), "a=2");
        assert_eq!(jar.cookies().len(), 1);

        jar.store("a=gone; Max-Age=0", &from).unwrap();
        assert_eq!(jar.cookie_string(&from), "");
        assert!(jar.cookies().is_empty());

        jar.store("b=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT", &from).unwrap();
        assert!(jar.cookies().is_empty());
    }

    #[test]
    fn test_dashed_expires_deletes() {
        let jar = MemoryCookieJar::new();
        let from = url("http://example.test/");
        jar.store("sid=1", &from).unwrap();
        jar.store("sid=deleted; expires=Thu, 01-Jan-1970 00:00:01 GMT", &from)
            .unwrap();
        assert_eq!(jar.cookie_string(&from), "");
        assert!(jar.cookies().is_empty());

        jar.store("sid=2; expires=Thu, 01-Jan-70 00:00:01 GMT", &from)
            .unwrap();
        assert!(jar.cookies().is_empty());
    }

    #[test]
    fn test_dashed_expires_parse() {
        let expected = Utc.with_ymd_and_hms(2037, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(parse_expires("Thu, 31-Dec-2037 23:59:59 GMT"), Some(expected));
        assert_eq!(parse_expires("Thu, 31-Dec-37 23:59:59 GMT"), Some(expected));
        assert_eq!(parse_expires("Thu, 31 Dec 2037 23:59:59 GMT"), Some(expected));
        assert_eq!(parse_expires("tomorrow"), None);
    }

    #[test]
    fn test_out_of_range_max_age() {
        let jar = MemoryCookieJar::new();
        let from = url("http://example.test/");

        jar.store("a=1; Max-Age=99999999999999999", &from).unwrap();
        jar.store("b=1; Max-Age=100000000000000", &from).unwrap();
        let cookies = jar.cookies();
        assert_eq!(cookies.len(), 2);
        assert!(cookies
            .iter()
            .all(|c| c.expires == Some(DateTime::<Utc>::MAX_UTC)));
        assert_eq!(jar.cookie_string(&from), "a=1; b=1");

        jar.store("a=gone; Max-Age=-99999999999999999", &from)
            .unwrap();
        assert_eq!(jar.cookie_string(&from), "b=1");
    }

    #[tokio::test]
    async fn test_trait_roundtrip() {
        let jar = MemoryCookieJar::new();
        let from = url("http://example.test/login");
        let jar: &dyn CookieJar = &jar;
        jar.set_cookie("token=xyz", &from).await.unwrap();
        assert_eq!(jar.get_cookie_string(&from).await.unwrap(), "token=xyz");
        assert!(jar.set_cookie("broken", &from).await.is_err());
    }
}
