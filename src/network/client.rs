//! HTTP transport adapter - executes a single request over reqwest
//!
//! The response body is streamed chunk by chunk so the caller's progress
//! callback can observe byte counts and signal abort, and so oversize bodies
//! can be cut at the configured cap instead of buffered whole.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS, DEFAULT_MAX_RESPONSE_SIZE,
    DEFAULT_TOTAL_TIMEOUT, DEFAULT_USER_AGENT, MAX_HEADERS, MAX_RESPONSE_SIZE, MIN_RESPONSE_SIZE,
};
use crate::models::{clip_status_text, Header, HttpMethod, Request, Response};

/// Transport limits applied to every request the engine sends
#[derive(Clone, Debug)]
pub struct Limits {
    /// Cap on the buffered response body; clamped to [1 KiB, 1 GiB]
    pub max_response_size: usize,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub max_redirects: usize,
    pub verify_tls: bool,
    pub user_agent: String,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            total_timeout: DEFAULT_TOTAL_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            verify_tls: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Limits {
    /// Clamp the response-size cap into its allowed range
    pub fn clamped(mut self) -> Self {
        self.max_response_size = self
            .max_response_size
            .clamp(MIN_RESPONSE_SIZE, MAX_RESPONSE_SIZE);
        self
    }
}

/// Classified transport failures. `Display` is the human phrase surfaced on
/// the handle and the error bus.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid URL")]
    InvalidUrl,
    #[error("malformed URL")]
    MalformedUrl,
    #[error("could not resolve host")]
    Dns,
    #[error("connection failed")]
    Connect,
    #[error("request timed out")]
    Timeout,
    #[error("TLS handshake failed")]
    Tls,
    #[error("too many redirects")]
    TooManyRedirects,
    #[error("failed to send request")]
    SendFailed,
    #[error("failed to read response")]
    RecvFailed,
    #[error("failed to buffer response")]
    WriteFailed,
    #[error("out of memory while buffering response")]
    OutOfMemory,
    #[error("request cancelled")]
    Cancelled,
    #[error("network error (code {0})")]
    Network(i32),
}

/// Build the shared client. Called once at engine construction; a failure
/// here is the fatal transport-init case.
pub fn create_client(limits: &Limits) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(limits.connect_timeout)
        .timeout(limits.total_timeout)
        .redirect(reqwest::redirect::Policy::limited(limits.max_redirects))
        .user_agent(limits.user_agent.clone())
        .danger_accept_invalid_certs(!limits.verify_tls)
        .build()
}

fn to_transport_method(method: &HttpMethod) -> Result<reqwest::Method, TransportError> {
    match method {
        HttpMethod::GET => Ok(reqwest::Method::GET),
        HttpMethod::POST => Ok(reqwest::Method::POST),
        HttpMethod::PUT => Ok(reqwest::Method::PUT),
        HttpMethod::DELETE => Ok(reqwest::Method::DELETE),
        HttpMethod::PATCH => Ok(reqwest::Method::PATCH),
        HttpMethod::HEAD => Ok(reqwest::Method::HEAD),
        HttpMethod::OPTIONS => Ok(reqwest::Method::OPTIONS),
        HttpMethod::Custom(name) => reqwest::Method::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::SendFailed),
    }
}

/// Header list -> transport headers. The cookie header, when present,
/// replaces any drafted `Cookie` entry for this transport call only.
fn to_header_map(
    headers: &[Header],
    cookie_header: Option<&str>,
) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for header in headers {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| TransportError::SendFailed)?;
        let value =
            HeaderValue::from_str(&header.value).map_err(|_| TransportError::SendFailed)?;
        map.append(name, value);
    }
    if let Some(cookie) = cookie_header {
        let value = HeaderValue::from_str(cookie).map_err(|_| TransportError::SendFailed)?;
        map.insert(reqwest::header::COOKIE, value);
    }
    Ok(map)
}

/// Execute one request. `progress` is called with (expected total, bytes so
/// far) at chunk granularity; returning true aborts the transfer.
pub async fn send(
    client: &reqwest::Client,
    request: &Request,
    limits: &Limits,
    cookie_header: Option<&str>,
    mut progress: impl FnMut(u64, u64) -> bool,
) -> Result<Response, TransportError> {
    let method = to_transport_method(&request.method)?;
    let url = reqwest::Url::parse(&request.url).map_err(|_| TransportError::MalformedUrl)?;
    let headers = to_header_map(&request.headers, cookie_header)?;

    let mut builder = client.request(method, url).headers(headers);
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    let start = Instant::now();
    let resp = builder.send().await.map_err(|e| classify(&e))?;

    let status = resp.status();
    let status_text = clip_status_text(status.canonical_reason().unwrap_or(""));

    let mut headers = Vec::new();
    let mut content_length: Option<u64> = None;
    for (name, value) in resp.headers() {
        if headers.len() >= MAX_HEADERS {
            break;
        }
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        if name.as_str().eq_ignore_ascii_case("content-length") {
            content_length = value.trim().parse().ok();
        }
        headers.push(Header::new(name.as_str(), value));
    }

    let mut body: Vec<u8> = Vec::new();
    let mut truncated = false;
    let mut received: u64 = 0;
    let mut stream = resp.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| classify(&e))?;
        received += bytes.len() as u64;

        let allowance = limits.max_response_size - body.len();
        let take = bytes.len().min(allowance);
        body.try_reserve(take)
            .map_err(|_| TransportError::OutOfMemory)?;
        body.extend_from_slice(&bytes[..take]);
        if take < bytes.len() {
            truncated = true;
        }

        let total = content_length.unwrap_or(0).max(received);
        if progress(total, received) {
            return Err(TransportError::Cancelled);
        }
        if truncated {
            // drop the stream to abort the rest of the transfer
            break;
        }
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let total_size = content_length.unwrap_or(body.len() as u64);

    Ok(Response {
        status: status.as_u16(),
        status_text,
        headers,
        body,
        truncated,
        elapsed_ms,
        total_size,
    })
}

/// Map a reqwest failure onto the transport taxonomy
fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    if err.is_redirect() {
        return TransportError::TooManyRedirects;
    }
    if err.is_builder() {
        return TransportError::MalformedUrl;
    }
    let chain = chain_text(err);
    if chain.contains("dns") || chain.contains("resolve") {
        return TransportError::Dns;
    }
    if chain.contains("certificate") || chain.contains("tls") || chain.contains("handshake") {
        return TransportError::Tls;
    }
    if err.is_connect() {
        return TransportError::Connect;
    }
    if err.is_body() || err.is_decode() {
        return TransportError::RecvFailed;
    }
    if err.is_request() {
        return TransportError::SendFailed;
    }
    TransportError::Network(io_code(err).unwrap_or(0))
}

/// Concatenated, lowercased source chain used for error sniffing
fn chain_text(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text.to_ascii_lowercase()
}

/// OS error code from the source chain, when one exists
fn io_code(err: &reqwest::Error) -> Option<i32> {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if let Some(code) = io.raw_os_error() {
                return Some(code);
            }
        }
        source = inner.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_clamp() {
        let tiny = Limits {
            max_response_size: 10,
            ..Limits::default()
        }
        .clamped();
        assert_eq!(tiny.max_response_size, MIN_RESPONSE_SIZE);

        let huge = Limits {
            max_response_size: usize::MAX,
            ..Limits::default()
        }
        .clamped();
        assert_eq!(huge.max_response_size, MAX_RESPONSE_SIZE);
    }

    #[test]
    fn test_header_map_keeps_duplicates() {
        let headers = vec![
            Header::new("Accept", "application/json"),
            Header::new("accept", "text/plain"),
        ];
        let map = to_header_map(&headers, None).unwrap();
        assert_eq!(map.get_all("accept").iter().count(), 2);
    }

    #[test]
    fn test_cookie_header_replaces_drafted_cookie() {
        let headers = vec![Header::new("Cookie", "stale=1")];
        let map = to_header_map(&headers, Some("sid=abc")).unwrap();
        let cookies: Vec<_> = map.get_all("cookie").iter().collect();
        assert_eq!(cookies, vec!["sid=abc"]);
    }

    #[test]
    fn test_custom_method_conversion() {
        let method = to_transport_method(&HttpMethod::Custom("PURGE".to_string())).unwrap();
        assert_eq!(method.as_str(), "PURGE");
    }
}
