//! Cookie jar - per-collection cookie storage with RFC-6265-style matching
//!
//! Cookies are keyed by (domain, path, name); storing an existing triple
//! replaces the entry in place. Domain matching follows the standard suffix
//! rule: an exact host match, or the stored domain as a dot-suffix of the
//! host. Host-only cookies (no `Domain` attribute) match the origin host
//! exactly.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single stored cookie
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    /// Without leading dot, lowercased
    pub domain: String,
    /// Always begins with '/'
    pub path: String,
    /// `None` marks a session cookie
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
    /// Set when the Set-Cookie line had no `Domain` attribute
    pub host_only: bool,
    /// URL of the response that set the cookie
    pub origin: String,
}

impl StoredCookie {
    /// A cookie is expired iff it has an absolute expiry strictly in the past
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires, Some(expiry) if expiry < now)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CookieParseError {
    #[error("Set-Cookie line is empty")]
    Empty,
    #[error("cookie has no name=value pair")]
    MissingPair,
    #[error("cookie name is empty")]
    EmptyName,
    #[error("invalid origin URL: {0}")]
    BadOrigin(String),
    #[error("cookie domain does not cover the origin host")]
    DomainMismatch,
}

/// Ordered cookie store owned by exactly one collection
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: Vec<StoredCookie>,
}

impl CookieJar {
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredCookie> {
        self.cookies.iter()
    }

    pub fn get(&self, index: usize) -> Option<&StoredCookie> {
        self.cookies.get(index)
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Insert or replace by (domain, path, name). Replacement keeps the
    /// position of the replaced entry. Returns the entry's index.
    pub fn store(&mut self, cookie: StoredCookie) -> usize {
        let existing = self.cookies.iter().position(|c| {
            c.domain == cookie.domain && c.path == cookie.path && c.name == cookie.name
        });
        match existing {
            Some(i) => {
                self.cookies[i] = cookie;
                i
            }
            None => {
                self.cookies.push(cookie);
                self.cookies.len() - 1
            }
        }
    }

    /// Drop cookies past their absolute expiry. Idempotent.
    pub fn cleanup_expired(&mut self) {
        let now = Utc::now();
        self.cookies.retain(|c| !c.is_expired(now));
    }

    /// Build the outbound `Cookie` header for a URL, or `None` when nothing
    /// matches. Selected cookies are ordered by decreasing path length, ties
    /// broken by insertion order. Secure cookies never travel over an
    /// insecure URL.
    pub fn build_cookie_header(&self, url: &str, is_secure: bool) -> Option<String> {
        let target = reqwest::Url::parse(url).ok()?;
        let host = target.host_str()?.to_ascii_lowercase();
        let path = target.path();
        let now = Utc::now();

        let mut matching: Vec<&StoredCookie> = self
            .cookies
            .iter()
            .filter(|c| !c.is_expired(now))
            .filter(|c| domain_matches(c, &host))
            .filter(|c| path_matches(&c.path, path))
            .filter(|c| !c.secure || is_secure)
            .collect();
        if matching.is_empty() {
            return None;
        }
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        Some(
            matching
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Parse a single Set-Cookie line and store the result, returning the
    /// stored index.
    pub fn parse_set_cookie(
        &mut self,
        header_value: &str,
        origin_url: &str,
    ) -> Result<usize, CookieParseError> {
        let header_value = header_value.trim();
        if header_value.is_empty() {
            return Err(CookieParseError::Empty);
        }

        let origin = reqwest::Url::parse(origin_url)
            .map_err(|e| CookieParseError::BadOrigin(e.to_string()))?;
        let origin_host = origin
            .host_str()
            .ok_or_else(|| CookieParseError::BadOrigin(origin_url.to_string()))?
            .to_ascii_lowercase();

        let mut segments = header_value.split(';');
        let pair = segments.next().unwrap_or("");
        let (name, value) = pair.split_once('=').ok_or(CookieParseError::MissingPair)?;
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            return Err(CookieParseError::EmptyName);
        }

        let mut domain = origin_host.clone();
        let mut host_only = true;
        let mut path: Option<String> = None;
        let mut expires: Option<DateTime<Utc>> = None;
        let mut max_age: Option<i64> = None;
        let mut secure = false;
        let mut http_only = false;

        for segment in segments {
            let segment = segment.trim();
            let (attr, attr_value) = match segment.split_once('=') {
                Some((a, v)) => (a.trim(), v.trim()),
                None => (segment, ""),
            };
            if attr.eq_ignore_ascii_case("domain") {
                let cleaned = attr_value.trim_start_matches('.').to_ascii_lowercase();
                if !cleaned.is_empty() {
                    domain = cleaned;
                    host_only = false;
                }
            } else if attr.eq_ignore_ascii_case("path") {
                if attr_value.starts_with('/') {
                    path = Some(attr_value.to_string());
                }
            } else if attr.eq_ignore_ascii_case("expires") {
                expires = parse_http_date(attr_value);
            } else if attr.eq_ignore_ascii_case("max-age") {
                max_age = attr_value.parse::<i64>().ok();
            } else if attr.eq_ignore_ascii_case("secure") {
                secure = true;
            } else if attr.eq_ignore_ascii_case("httponly") {
                http_only = true;
            }
            // unknown attributes are skipped
        }

        // a Domain attribute must still cover the origin host
        if !host_only && origin_host != domain && !origin_host.ends_with(&format!(".{domain}")) {
            return Err(CookieParseError::DomainMismatch);
        }

        // Max-Age takes precedence over Expires
        if let Some(seconds) = max_age {
            expires = Some(if seconds <= 0 {
                DateTime::<Utc>::UNIX_EPOCH
            } else {
                Utc::now() + chrono::Duration::seconds(seconds)
            });
        }

        let cookie = StoredCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain,
            path: path.unwrap_or_else(|| default_path(origin.path())),
            expires,
            secure,
            http_only,
            host_only,
            origin: origin_url.to_string(),
        };
        Ok(self.store(cookie))
    }
}

fn domain_matches(cookie: &StoredCookie, host: &str) -> bool {
    if cookie.host_only {
        host == cookie.domain
    } else {
        host == cookie.domain || host.ends_with(&format!(".{}", cookie.domain))
    }
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// Default path is the origin URL's path directory
fn default_path(origin_path: &str) -> String {
    if !origin_path.starts_with('/') {
        return "/".to_string();
    }
    match origin_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => origin_path[..i].to_string(),
    }
}

/// Parse the date formats servers actually emit in `Expires`
fn parse_http_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    // rfc850 and the dashed rfc2822 variant, both ending in "GMT"
    for format in [
        "%a, %d-%b-%Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    None
}
