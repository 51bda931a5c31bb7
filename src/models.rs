use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_STATUS_TEXT_LEN;
use crate::cookies::CookieJar;

/// HTTP Method enum
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    /// Non-standard verb, at most 10 upper-ASCII characters
    Custom(String),
}

impl HttpMethod {
    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::Custom(name) => name,
        }
    }

    /// Resolve a method name to a builtin verb, falling back to `Custom`
    pub fn parse(s: &str) -> HttpMethod {
        match s.to_ascii_uppercase().as_str() {
            "GET" => HttpMethod::GET,
            "POST" => HttpMethod::POST,
            "PUT" => HttpMethod::PUT,
            "DELETE" => HttpMethod::DELETE,
            "PATCH" => HttpMethod::PATCH,
            "HEAD" => HttpMethod::HEAD,
            "OPTIONS" => HttpMethod::OPTIONS,
            other => HttpMethod::Custom(other.to_string()),
        }
    }

    /// Cycle through the builtin verbs (shells bind this to a key)
    pub fn next(&self) -> HttpMethod {
        match self {
            HttpMethod::GET => HttpMethod::POST,
            HttpMethod::POST => HttpMethod::PUT,
            HttpMethod::PUT => HttpMethod::DELETE,
            HttpMethod::DELETE => HttpMethod::PATCH,
            HttpMethod::PATCH => HttpMethod::HEAD,
            HttpMethod::HEAD => HttpMethod::OPTIONS,
            HttpMethod::OPTIONS => HttpMethod::GET,
            HttpMethod::Custom(_) => HttpMethod::GET,
        }
    }

    pub fn has_body(&self) -> bool {
        matches!(
            self,
            HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH | HttpMethod::Custom(_)
        )
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP Header
///
/// Duplicates are allowed; lookup is case-insensitive on the name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Header {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A frozen HTTP request, immutable once handed to the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<Header>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// First header value matching `name`, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn is_secure(&self) -> bool {
        let scheme = self.url.split("://").next().unwrap_or("");
        scheme.eq_ignore_ascii_case("https")
    }
}

/// Response from an HTTP request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    /// Human status phrase, clipped to 64 bytes
    pub status_text: String,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
    /// Set when the body was cut at the configured response-size cap
    pub truncated: bool,
    pub elapsed_ms: u64,
    /// Content-Length when the server sent one, body length otherwise
    pub total_size: u64,
}

impl Response {
    /// First header value matching `name`, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All header values matching `name`, in arrival order
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, lossily decoded
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body re-serialized with indentation when it parses as JSON,
    /// raw text otherwise. The stored bytes are never modified.
    pub fn pretty_body(&self) -> String {
        let text = self.body_text();
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(text),
            Err(_) => text,
        }
    }
}

/// Clip a status phrase to the model limit
pub fn clip_status_text(text: &str) -> String {
    if text.len() <= MAX_STATUS_TEXT_LEN {
        text.to_string()
    } else {
        let mut end = MAX_STATUS_TEXT_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

/// The mutable working copy of the active request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestDraft {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<Header>,
    pub body: String,
    /// Set by every mutator, cleared on activation. Tiebreaker that keeps
    /// autosync from clobbering in-flight edits.
    #[serde(skip)]
    pub edited: bool,
}

impl Default for RequestDraft {
    fn default() -> Self {
        RequestDraft {
            method: HttpMethod::GET,
            url: String::new(),
            headers: vec![
                Header::new("Content-Type", "application/json"),
                Header::new("Accept", "application/json"),
            ],
            body: String::new(),
            edited: false,
        }
    }
}

impl RequestDraft {
    /// Freeze the draft into an immutable request, cloning all strings
    pub fn freeze(&self) -> Request {
        Request {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: if self.body.is_empty() {
                None
            } else {
                Some(self.body.clone().into_bytes())
            },
        }
    }

    /// Rebuild a draft mirroring a stored request
    pub fn from_request(request: &Request) -> Self {
        RequestDraft {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request
                .body
                .as_deref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default(),
            edited: false,
        }
    }
}

/// A named request stored inside a collection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedRequest {
    pub name: String,
    pub request: Request,
}

/// A collection of requests sharing a cookie jar
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Collection {
    pub id: u64,
    pub name: String,
    pub requests: Vec<SavedRequest>,
    pub jar: CookieJar,
    pub modified: DateTime<Utc>,
    /// Pending unsaved changes; cleared by the autosaver
    #[serde(skip)]
    pub dirty: bool,
}

impl Collection {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Collection {
            id,
            name: name.into(),
            requests: Vec::new(),
            jar: CookieJar::default(),
            modified: Utc::now(),
            dirty: false,
        }
    }

    /// Stamp a modification
    pub fn touch(&mut self) {
        self.modified = Utc::now();
        self.dirty = true;
    }
}

/// History entry: a sent request and how it went
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub request: Request,
    pub status: Option<u16>,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}
